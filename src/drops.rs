// src/drops.rs
// Drop tracker page -> trials / blue chest / hihi counters, cumulative and monthly.
//
// The tracker has no stable ids. Counters sit next to icon images, so each one is probed
// through a short list of selectors, with a body-text scan as the last resort for trials.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::Login;
use crate::error::{ScrapeError, WebDriverError};
use crate::model::{Aggregate, DropCountSample, DropData};
use crate::page::{remove_ads, settle, wait_for, Select};
use crate::webdriver::{Element, Locator, Session};

const MULTI_NEEDLES: [&str; 2] = ["つよばは", "つよバハ"];

const TRIALS_PROBES: [(&str, &str); 3] = [
    ("//img[contains(@src, 'toubatsu64')]/following-sibling::*[1]", "toubatsu64 icon sibling"),
    ("//img[contains(@src, 'toubatsu')]/following-sibling::*[1]", "toubatsu icon sibling"),
    ("//img[@title='討伐数']/following-sibling::*[1]", "討伐数 title sibling"),
];
const BLUE_CHEST_IMGS: &str = "//img[contains(@src, 'bluebox')]";
const BLUE_CHEST_TITLE: &str = "青箱数";
const HIHI_IMGS: &str = "//img[@title='青箱ヒヒの数']";

pub struct DropScraper<'a> {
    session: &'a Session,
    timeout: Duration,
    settle_ms: u64,
}

impl<'a> DropScraper<'a> {
    pub fn new(session: &'a Session, timeout: Duration, settle_ms: u64) -> Self {
        Self { session, timeout, settle_ms }
    }

    pub fn scrape(&self, url: &str, login: Option<&Login>) -> Result<DropData> {
        self.session.goto(url).with_context(|| format!("opening {url}"))?;
        tracing::info!("opened {url}");
        settle(self.settle_ms);

        if let Some(login) = login {
            // Public numbers are still readable when logged out.
            if let Err(e) = self.login(url, login) {
                tracing::warn!("login failed, continuing without it: {e:#}");
            }
        }

        remove_ads(self.session)?;
        self.select_multi();

        let cumulative = self.read_aggregate(Aggregate::Cumulative)?;
        tracing::info!("cumulative: {cumulative:?}");
        let monthly = self.read_aggregate(Aggregate::Monthly)?;
        tracing::info!("monthly: {monthly:?}");

        Ok(DropData { cumulative, monthly })
    }

    fn login(&self, url: &str, login: &Login) -> Result<()> {
        let s = self.session;
        tracing::info!("logging in as {}", login.username);

        let open = wait_for(
            s,
            &Locator::XPath("//a[@data-bs-toggle='modal'][@data-bs-target='#loginModal']".into()),
            self.timeout,
        )
        .context("login modal button")?;
        s.click(&open)?;
        settle(self.settle_ms);

        let email = wait_for(s, &Locator::Id("username".into()), self.timeout).context("username field")?;
        s.clear(&email)?;
        s.send_keys(&email, &login.username)?;

        let password = wait_for(s, &Locator::Id("password".into()), self.timeout).context("password field")?;
        s.clear(&password)?;
        s.send_keys(&password, &login.password)?;

        let submit = wait_for(
            s,
            &Locator::XPath("//button[@type='submit'][contains(@class, 'btn-primary')]".into()),
            self.timeout,
        )
        .context("login submit button")?;
        s.click(&submit)?;
        settle(self.settle_ms + 1000);
        tracing::info!("login submitted");

        s.goto(url)?;
        settle(self.settle_ms + 1000);
        Ok(())
    }

    /// Pick the raid in the first dropdown. Falls back to whatever the page shows.
    fn select_multi(&self) {
        let picked = wait_for(self.session, &Locator::TagName("select".into()), self.timeout)
            .and_then(|el| Select::new(self.session, el).select_containing(&MULTI_NEEDLES));
        match picked {
            Ok(Some(text)) => {
                tracing::info!("selected raid {text}");
                settle(self.settle_ms);
            }
            Ok(None) => tracing::warn!("raid option not found, using page default"),
            Err(e) => tracing::warn!("raid selection skipped: {e}"),
        }
    }

    /// Switch the second dropdown to `agg`; a page without it keeps its current view.
    fn select_aggregate(&self, agg: Aggregate) {
        let picked = self
            .session
            .find_all(&Locator::TagName("select".into()))
            .and_then(|selects| match selects.into_iter().nth(1) {
                Some(el) => Select::new(self.session, el).select_containing(&[agg.site_label()]),
                None => Ok(None),
            });
        match picked {
            Ok(Some(text)) => {
                tracing::info!("aggregation set to {text}");
                settle(self.settle_ms);
            }
            Ok(None) => tracing::warn!("no aggregation option for {}", agg.name()),
            Err(e) => tracing::warn!("aggregation change skipped: {e}"),
        }
    }

    fn read_aggregate(&self, agg: Aggregate) -> Result<DropCountSample> {
        self.select_aggregate(agg);
        remove_ads(self.session)?;
        tracing::info!("reading {} counters", agg.name());

        let trials = self.read_trials().with_context(|| format!("{} trials", agg.name()))?;

        let blue_chest = self.read_blue_chest().unwrap_or_else(|e| {
            tracing::debug!("blue chest probe failed: {e}");
            None
        });
        let hihi = self.read_hihi().unwrap_or_else(|e| {
            tracing::debug!("hihi probe failed: {e}");
            None
        });

        build_sample(agg, trials, blue_chest, hihi)
    }

    fn read_trials(&self) -> Result<u64> {
        let s = self.session;
        for (xpath, what) in TRIALS_PROBES {
            let text = match s.find(&Locator::XPath(xpath.into())).and_then(|el| s.text(&el)) {
                Ok(t) => t,
                Err(e) => {
                    tracing::debug!("trials probe '{what}' missed: {e}");
                    continue;
                }
            };
            if let Some(n) = digits_only(&text) {
                tracing::info!("trials: {n} (via {what})");
                return Ok(n);
            }
        }

        tracing::warn!("trials selectors missed, scanning page text");
        let body = s.find(&Locator::TagName("body".into())).and_then(|b| s.text(&b))?;
        match trials_from_body_text(&body) {
            Some(n) => {
                tracing::info!("trials: {n} (via page text)");
                Ok(n)
            }
            None => Err(ScrapeError::Missing("trial count").into()),
        }
    }

    fn read_blue_chest(&self) -> Result<Option<u64>, WebDriverError> {
        let s = self.session;
        let imgs = s.find_all(&Locator::XPath(BLUE_CHEST_IMGS.into()))?;
        tracing::debug!("{} bluebox images", imgs.len());
        for img in imgs {
            if s.attribute(&img, "title")?.as_deref() != Some(BLUE_CHEST_TITLE) {
                continue;
            }
            let text = self.parent_next_sibling_text(&img)?;
            if let Some(n) = text.as_deref().and_then(count_before_paren) {
                tracing::info!("blue chests: {n}");
                return Ok(Some(n));
            }
        }
        Ok(None)
    }

    fn read_hihi(&self) -> Result<Option<u64>, WebDriverError> {
        let imgs = self.session.find_all(&Locator::XPath(HIHI_IMGS.into()))?;
        tracing::debug!("{} hihi images", imgs.len());
        for (i, img) in imgs.iter().enumerate() {
            let text = match self.parent_next_sibling_text(img) {
                Ok(t) => t,
                Err(e) => {
                    tracing::debug!("hihi img[{i}]: {e}");
                    continue;
                }
            };
            if let Some(n) = text.as_deref().and_then(count_before_paren) {
                tracing::info!("hihi: {n}");
                return Ok(Some(n));
            }
        }
        Ok(None)
    }

    /// Text of the element right after `img`'s parent, if there is one.
    fn parent_next_sibling_text(&self, img: &Element) -> Result<Option<String>, WebDriverError> {
        let s = self.session;
        let parent = s.find_in(img, &Locator::XPath("..".into()))?;
        let siblings = s.find_all_in(&parent, &Locator::XPath("./following-sibling::*".into()))?;
        match siblings.first() {
            Some(sib) => Ok(Some(s.text(sib)?.trim().to_string())),
            None => Ok(None),
        }
    }
}

/// Fill missing counters with 0 and check the ordering. When the blue chest counter
/// was not found, a nonzero hihi count is reported as that, not as a bare inconsistency.
fn build_sample(agg: Aggregate, trials: u64, blue_chest: Option<u64>, hihi: Option<u64>) -> Result<DropCountSample> {
    if blue_chest.is_none() {
        tracing::warn!("{}: blue chest count not found, using 0", agg.name());
    }
    if hihi.is_none() {
        tracing::warn!("{}: hihi count not found, using 0", agg.name());
    }
    let sample = DropCountSample::new(trials, blue_chest.unwrap_or(0), hihi.unwrap_or(0));
    match (sample, blue_chest) {
        (Ok(sample), _) => Ok(sample),
        (Err(e), None) => Err(e).with_context(|| {
            format!(
                "{} counters: blue chest counter not found but hihi={}",
                agg.name(),
                hihi.unwrap_or(0)
            )
        }),
        (Err(e), Some(_)) => Err(e).with_context(|| format!("{} counters", agg.name())),
    }
}

/// All ASCII digits in `text`, concatenated ("1,234体" -> 1234).
pub fn digits_only(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Count shown before a parenthesised rate ("12 (3.41%)" -> 12).
pub fn count_before_paren(text: &str) -> Option<u64> {
    let head = text.split('(').next().unwrap_or_default();
    digits_only(head)
}

/// First line mentioning 体 (the kill counter unit) that carries a number.
pub fn trials_from_body_text(body: &str) -> Option<u64> {
    body.lines()
        .filter(|l| l.contains('体'))
        .find_map(digits_only)
}
