use thiserror::Error;

/// Failures talking to the WebDriver endpoint.
#[derive(Debug, Error)]
pub enum WebDriverError {
    #[error("webdriver http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no such element: {0}")]
    NoSuchElement(String),

    #[error("timed out after {secs}s waiting for {what}")]
    Timeout { what: String, secs: u64 },

    #[error("webdriver error `{error}`: {message}")]
    Driver { error: String, message: String },

    #[error("unexpected webdriver response: {0}")]
    Protocol(String),
}

/// Failures talking to the spreadsheet backend.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("spreadsheet authentication failed: {0}")]
    Auth(String),

    #[error("spreadsheet not found: {0}")]
    NotFound(String),

    #[error("not a spreadsheet url: {0}")]
    BadUrl(String),

    #[error("sheets http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sheets api returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Page content that did not match what the scrapers expect.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("could not find {0} on the page")]
    Missing(&'static str),

    #[error("inconsistent drop counts: trials={trials} blue_chest={blue_chest} hihi={hihi}")]
    Inconsistent { trials: u64, blue_chest: u64, hihi: u64 },
}
