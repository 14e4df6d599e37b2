// src/page.rs
// Waits, ad removal and click/select helpers shared by both scrapers.

use std::thread;
use std::time::{Duration, Instant};

use crate::error::WebDriverError;
use crate::webdriver::{Element, Locator, Session};

const POLL: Duration = Duration::from_millis(500);
const SCROLL_PAUSE: Duration = Duration::from_millis(300);

const HIDE_ADS: &str = r#"
    document.querySelectorAll('.adsbygoogle, .ad, iframe, .banner')
        .forEach(ad => ad.style.display = 'none');
"#;

/// Poll until `loc` is present or `timeout` runs out.
pub fn wait_for(s: &Session, loc: &Locator, timeout: Duration) -> Result<Element, WebDriverError> {
    let start = Instant::now();
    loop {
        match s.find(loc) {
            Ok(el) => return Ok(el),
            Err(WebDriverError::NoSuchElement(_)) if start.elapsed() < timeout => thread::sleep(POLL),
            Err(WebDriverError::NoSuchElement(_)) => {
                tracing::error!("timed out waiting for {loc}");
                return Err(WebDriverError::Timeout { what: loc.to_string(), secs: timeout.as_secs() });
            }
            Err(e) => return Err(e),
        }
    }
}

pub fn remove_ads(s: &Session) -> Result<(), WebDriverError> {
    s.execute(HIDE_ADS, &[])?;
    Ok(())
}

/// Scroll into view, then click through JS so overlays cannot swallow the click.
pub fn safe_click(s: &Session, el: &Element) -> Result<(), WebDriverError> {
    s.execute("arguments[0].scrollIntoView(true);", &[el])?;
    thread::sleep(SCROLL_PAUSE);
    s.execute("arguments[0].click();", &[el])?;
    Ok(())
}

pub fn safe_js_click(s: &Session, loc: &Locator, timeout: Duration) -> Result<(), WebDriverError> {
    let el = wait_for(s, loc, timeout)?;
    safe_click(s, &el)
}

/// Give the page time to re-render after a filter change.
pub fn settle(ms: u64) {
    thread::sleep(Duration::from_millis(ms));
}

/// A `<select>` element.
pub struct Select<'a> {
    session: &'a Session,
    el: Element,
}

impl<'a> Select<'a> {
    pub fn new(session: &'a Session, el: Element) -> Self {
        Self { session, el }
    }

    /// (element, visible text) for every `<option>`.
    pub fn options(&self) -> Result<Vec<(Element, String)>, WebDriverError> {
        let opts = self.session.find_all_in(&self.el, &Locator::TagName("option".into()))?;
        opts.into_iter()
            .map(|o| -> Result<(Element, String), WebDriverError> {
                let text = self.session.text(&o)?;
                Ok((o, text))
            })
            .collect()
    }

    pub fn first_selected_text(&self) -> Result<Option<String>, WebDriverError> {
        for (o, text) in self.options()? {
            if self.session.is_selected(&o)? {
                return Ok(Some(text.trim().to_string()));
            }
        }
        Ok(None)
    }

    /// Select the first option whose text contains any of `needles`; returns its text.
    pub fn select_containing(&self, needles: &[&str]) -> Result<Option<String>, WebDriverError> {
        let options = self.options()?;
        let texts: Vec<&str> = options.iter().map(|(_, t)| t.as_str()).collect();
        let Some(i) = position_containing(&texts, needles) else {
            return Ok(None);
        };
        let (o, text) = &options[i];
        self.session.click(o)?;
        Ok(Some(text.trim().to_string()))
    }
}

pub fn position_containing(texts: &[&str], needles: &[&str]) -> Option<usize> {
    texts.iter().position(|t| needles.iter().any(|n| t.contains(n)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_option_matching_any_needle() {
        let opts = ["つよバハ (HL)", "ルシHL", "つよばは"];
        assert_eq!(position_containing(&opts, &["つよばは", "つよバハ"]), Some(0));
        assert_eq!(position_containing(&opts, &["ルシ"]), Some(1));
        assert_eq!(position_containing(&opts, &["ベルゼ"]), None);
        assert_eq!(position_containing(&["累計", "月"], &["月"]), Some(1));
    }
}
