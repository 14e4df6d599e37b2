// src/roster.rs
// Guild search -> member list -> (name, rank) rows plus the event number.

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;

use crate::error::ScrapeError;
use crate::model::Member;
use crate::page::{remove_ads, safe_click, safe_js_click, wait_for, Select};
use crate::webdriver::{Locator, Session};

pub struct GuildScraper<'a> {
    session: &'a Session,
    timeout: Duration,
}

impl<'a> GuildScraper<'a> {
    pub fn new(session: &'a Session, timeout: Duration) -> Self {
        Self { session, timeout }
    }

    /// Search the overall ranking for `guild_name` and open its member list.
    pub fn open_guild_page(&self, guild_name: &str, base_url: &str) -> Result<()> {
        let s = self.session;
        s.goto(base_url).with_context(|| format!("opening {base_url}"))?;
        tracing::info!("opened {base_url}");
        remove_ads(s)?;

        safe_js_click(s, &Locator::LinkText("総合".into()), self.timeout)
            .context("clicking the overall ranking link")?;
        tracing::info!("clicked overall ranking");
        remove_ads(s)?;

        let search = wait_for(s, &Locator::Name("q".into()), self.timeout).context("guild search box")?;
        s.send_keys(&search, guild_name)?;
        safe_js_click(s, &Locator::XPath("//form//button".into()), self.timeout)
            .context("submitting guild search")?;
        tracing::info!("searched for guild {guild_name}");

        let row = wait_for(s, &Locator::XPath(guild_row_xpath(guild_name)), self.timeout)
            .with_context(|| format!("guild row for {guild_name}"))?;
        let links = s.find_all_in(&row, &Locator::TagName("a".into()))?;
        let members_link = links.get(1).ok_or(ScrapeError::Missing("member list link"))?;

        remove_ads(s)?;
        safe_click(s, members_link)?;
        tracing::info!("opened member list");
        remove_ads(s)?;
        Ok(())
    }

    /// Event number from the selected `<select id="day-select">` option, e.g. "78回 本戦終了" -> 78.
    pub fn event_number(&self) -> Result<Option<u32>> {
        let el = self.session.find(&Locator::Id("day-select".into())).context("event dropdown")?;
        let text = Select::new(self.session, el).first_selected_text()?.unwrap_or_default();
        let n = parse_event_number(&text);
        match n {
            Some(n) => tracing::info!("event number: {n}"),
            None => tracing::warn!("no event number in {text:?}"),
        }
        Ok(n)
    }

    /// (name, rank) from the first and third cells of each body row.
    pub fn scrape_member_table(&self) -> Result<Vec<Member>> {
        let s = self.session;
        wait_for(s, &Locator::Css("table.table".into()), self.timeout).context("member table")?;

        let rows = s.find_all(&Locator::Css("table.table tbody tr".into()))?;
        let mut members = Vec::with_capacity(rows.len());
        for row in rows {
            let cells = s.find_all_in(&row, &Locator::TagName("td".into()))?;
            if cells.len() < 3 {
                continue;
            }
            let name = s.text(&cells[0])?;
            let rank = s.text(&cells[2])?;
            members.push(Member::new(&name, &rank));
        }
        tracing::info!("scraped {} members", members.len());
        Ok(members)
    }
}

fn guild_row_xpath(guild_name: &str) -> String {
    format!("//tr[td/a[contains(text(), {})]]", xpath_literal(guild_name))
}

/// Quote `s` as an XPath string literal, falling back to concat() when it has both quote kinds.
pub fn xpath_literal(s: &str) -> String {
    if !s.contains('"') {
        return format!("\"{s}\"");
    }
    if !s.contains('\'') {
        return format!("'{s}'");
    }
    let parts: Vec<String> = s.split('"').map(|p| format!("\"{p}\"")).collect();
    format!("concat({})", parts.join(", '\"', "))
}

pub fn parse_event_number(text: &str) -> Option<u32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\d+)回").expect("static regex"));
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_number_from_option_text() {
        assert_eq!(parse_event_number("78回 本戦終了"), Some(78));
        assert_eq!(parse_event_number("第102回 予選"), Some(102));
        assert_eq!(parse_event_number("本戦終了"), None);
        assert_eq!(parse_event_number(""), None);
    }

    #[test]
    fn xpath_literals_quote_safely() {
        assert_eq!(xpath_literal("団"), "\"団\"");
        assert_eq!(xpath_literal("a\"b"), "'a\"b'");
        assert_eq!(xpath_literal("a\"b'c"), "concat(\"a\", '\"', \"b'c\")");
    }

    #[test]
    fn guild_row_xpath_embeds_name() {
        assert_eq!(guild_row_xpath("Foo"), "//tr[td/a[contains(text(), \"Foo\")]]");
    }
}
