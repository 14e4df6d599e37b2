// src/webdriver.rs
// Just enough of the W3C WebDriver protocol to drive one browser session.
// Blocking; callers run it inside `spawn_blocking`.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{json, Value};

use crate::error::WebDriverError;

// W3C web element identifier key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

type Result<T> = std::result::Result<T, WebDriverError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
    LinkText(String),
    TagName(String),
    Id(String),
    Name(String),
}

impl Locator {
    /// (using, value) as sent on the wire. Id/Name have no W3C strategy; they go through CSS.
    pub fn wire(&self) -> (&'static str, String) {
        match self {
            Locator::Css(s) => ("css selector", s.clone()),
            Locator::XPath(s) => ("xpath", s.clone()),
            Locator::LinkText(s) => ("link text", s.clone()),
            Locator::TagName(s) => ("tag name", s.clone()),
            Locator::Id(s) => ("css selector", format!("[id=\"{}\"]", css_escape(s))),
            Locator::Name(s) => ("css selector", format!("[name=\"{}\"]", css_escape(s))),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (using, value) = self.wire();
        write!(f, "{using}='{value}'")
    }
}

fn css_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    pub id: String,
}

impl Element {
    fn to_json(&self) -> Value {
        json!({ ELEMENT_KEY: self.id })
    }
}

pub struct Session {
    http: Client,
    base: String, // <driver>/session/<id>
    closed: bool,
}

impl Session {
    /// Open a Chrome session on the driver at `driver_url`.
    pub fn start(driver_url: &str, headless: bool) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(60)).build()?;
        let mut args = vec!["--window-size=1280,1024"];
        if headless {
            args.push("--headless=new");
        }
        let caps = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        });
        let root = driver_url.trim_end_matches('/').to_string();
        let value = send(http.post(format!("{root}/session")).json(&caps))?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| WebDriverError::Protocol(format!("no sessionId in {value}")))?;
        tracing::debug!("webdriver: session {id} on {root}");
        Ok(Self { http, base: format!("{root}/session/{id}"), closed: false })
    }

    fn post(&self, path: &str, body: Value) -> Result<Value> {
        send(self.http.post(format!("{}{}", self.base, path)).json(&body))
    }

    fn get(&self, path: &str) -> Result<Value> {
        send(self.http.get(format!("{}{}", self.base, path)))
    }

    pub fn goto(&self, url: &str) -> Result<()> {
        self.post("/url", json!({ "url": url }))?;
        Ok(())
    }

    pub fn find(&self, loc: &Locator) -> Result<Element> {
        let (using, value) = loc.wire();
        let v = self.post("/element", json!({ "using": using, "value": value }))
            .map_err(|e| not_found_as(e, loc))?;
        element_from(&v)
    }

    pub fn find_all(&self, loc: &Locator) -> Result<Vec<Element>> {
        let (using, value) = loc.wire();
        let v = self.post("/elements", json!({ "using": using, "value": value }))?;
        elements_from(&v)
    }

    pub fn find_in(&self, parent: &Element, loc: &Locator) -> Result<Element> {
        let (using, value) = loc.wire();
        let v = self
            .post(&format!("/element/{}/element", parent.id), json!({ "using": using, "value": value }))
            .map_err(|e| not_found_as(e, loc))?;
        element_from(&v)
    }

    pub fn find_all_in(&self, parent: &Element, loc: &Locator) -> Result<Vec<Element>> {
        let (using, value) = loc.wire();
        let v = self.post(&format!("/element/{}/elements", parent.id), json!({ "using": using, "value": value }))?;
        elements_from(&v)
    }

    pub fn text(&self, el: &Element) -> Result<String> {
        let v = self.get(&format!("/element/{}/text", el.id))?;
        Ok(v.as_str().unwrap_or_default().to_string())
    }

    pub fn attribute(&self, el: &Element, name: &str) -> Result<Option<String>> {
        let v = self.get(&format!("/element/{}/attribute/{}", el.id, name))?;
        Ok(v.as_str().map(str::to_string))
    }

    pub fn is_selected(&self, el: &Element) -> Result<bool> {
        let v = self.get(&format!("/element/{}/selected", el.id))?;
        Ok(v.as_bool().unwrap_or(false))
    }

    pub fn click(&self, el: &Element) -> Result<()> {
        self.post(&format!("/element/{}/click", el.id), json!({}))?;
        Ok(())
    }

    pub fn clear(&self, el: &Element) -> Result<()> {
        self.post(&format!("/element/{}/clear", el.id), json!({}))?;
        Ok(())
    }

    pub fn send_keys(&self, el: &Element, text: &str) -> Result<()> {
        self.post(&format!("/element/{}/value", el.id), json!({ "text": text }))?;
        Ok(())
    }

    pub fn execute(&self, script: &str, args: &[&Element]) -> Result<Value> {
        let args: Vec<Value> = args.iter().map(|e| e.to_json()).collect();
        self.post("/execute/sync", json!({ "script": script, "args": args }))
    }

    pub fn quit(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        send(self.http.delete(&self.base))?;
        tracing::info!("browser session closed");
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.quit() {
            tracing::warn!("closing browser session: {e}");
        }
    }
}

/// Send, then unwrap the `{ "value": ... }` envelope or map the driver error.
fn send(req: RequestBuilder) -> Result<Value> {
    let resp = req.send()?;
    let status = resp.status();
    let body: Value = resp.json()?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(value);
    }
    Err(driver_error(&value))
}

fn driver_error(value: &Value) -> WebDriverError {
    let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value.get("message").and_then(Value::as_str).unwrap_or_default();
    if error == "no such element" {
        return WebDriverError::NoSuchElement(message.to_string());
    }
    WebDriverError::Driver { error: error.to_string(), message: message.to_string() }
}

fn not_found_as(e: WebDriverError, loc: &Locator) -> WebDriverError {
    match e {
        WebDriverError::NoSuchElement(_) => WebDriverError::NoSuchElement(loc.to_string()),
        other => other,
    }
}

fn element_from(v: &Value) -> Result<Element> {
    v.get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| Element { id: id.to_string() })
        .ok_or_else(|| WebDriverError::Protocol(format!("not an element reference: {v}")))
}

fn elements_from(v: &Value) -> Result<Vec<Element>> {
    v.as_array()
        .ok_or_else(|| WebDriverError::Protocol(format!("expected an array: {v}")))?
        .iter()
        .map(element_from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locators_map_to_w3c_strategies() {
        assert_eq!(Locator::Id("day-select".into()).wire(), ("css selector", "[id=\"day-select\"]".into()));
        assert_eq!(Locator::Name("q".into()).wire(), ("css selector", "[name=\"q\"]".into()));
        assert_eq!(Locator::LinkText("総合".into()).wire().0, "link text");
        assert_eq!(Locator::XPath("//form//button".into()).wire().0, "xpath");
    }

    #[test]
    fn element_reference_roundtrips() {
        let el = Element { id: "abc-1".into() };
        assert_eq!(element_from(&el.to_json()).unwrap(), el);
        assert!(matches!(element_from(&json!({ "foo": 1 })), Err(WebDriverError::Protocol(_))));
    }

    #[test]
    fn element_lists_parse() {
        let v = json!([{ ELEMENT_KEY: "a" }, { ELEMENT_KEY: "b" }]);
        let ids: Vec<String> = elements_from(&v).unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, ["a", "b"]);
        assert!(elements_from(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn driver_errors_are_classified() {
        let e = driver_error(&json!({ "error": "no such element", "message": "gone" }));
        assert!(matches!(e, WebDriverError::NoSuchElement(m) if m == "gone"));
        let e = driver_error(&json!({ "error": "invalid session id", "message": "x" }));
        assert!(matches!(e, WebDriverError::Driver { ref error, .. } if error == "invalid session id"));
        let e = not_found_as(WebDriverError::NoSuchElement("raw".into()), &Locator::Css("table.table".into()));
        assert_eq!(e.to_string(), "no such element: css selector='table.table'");
    }
}
