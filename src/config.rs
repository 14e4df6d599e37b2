use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

const PASSWORD_ENV: &str = "GRABLU_LOGIN_PASSWORD";
const WEBDRIVER_ENV: &str = "GRABLU_WEBDRIVER_URL";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    pub site: Option<Site>,
    pub guild: Option<Guild>,
    pub spreadsheet: Option<Spreadsheet>,
    pub drop_stats: Option<DropStats>,
    #[serde(default)]
    pub webdriver: WebDriver,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Site {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Guild {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Spreadsheet {
    pub url: String,
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
    #[serde(default = "default_token_env")]
    pub token_env: String, // env var holding the OAuth bearer token
}

#[derive(Debug, Deserialize, Clone)]
pub struct DropStats {
    pub url: String,
    pub blue_chest_probability: f64,
    pub hihi_probability: f64, // given a blue chest
    #[serde(default = "default_output_directory")]
    pub output_directory: String,
    pub login: Option<Login>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Login {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WebDriver {
    pub url: String,
    pub headless: bool,
    pub wait_timeout_secs: u64,
    pub settle_ms: u64,
}

impl Default for WebDriver {
    fn default() -> Self {
        Self {
            url: "http://localhost:9515".to_string(),
            headless: false,
            wait_timeout_secs: 10,
            settle_ms: 2000,
        }
    }
}

fn default_sheet_name() -> String {
    "団員管理".to_string()
}

fn default_token_env() -> String {
    "GOOGLE_OAUTH_TOKEN".to_string()
}

fn default_output_directory() -> String {
    ".".to_string()
}

/// What the roster job needs, all present.
pub struct RosterSettings<'a> {
    pub site: &'a Site,
    pub guild: &'a Guild,
    pub spreadsheet: &'a Spreadsheet,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let mut cfg = Self::parse(&text).with_context(|| format!("parsing {}", path.display()))?;
        cfg.apply_env(|k| std::env::var(k).ok());
        tracing::info!("loaded config {}", path.display());
        Ok(cfg)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Secrets and per-machine settings may live in the environment instead of the file.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(url) = get(WEBDRIVER_ENV).filter(|u| !u.is_empty()) {
            self.webdriver.url = url;
        }
        if let Some(password) = get(PASSWORD_ENV).filter(|p| !p.is_empty()) {
            if let Some(ds) = self.drop_stats.as_mut() {
                ds.login.get_or_insert_with(Login::default).password = password;
            }
        }
    }

    pub fn roster(&self) -> Result<RosterSettings<'_>> {
        let site = self.site.as_ref().context("missing [site] section (site.base_url)")?;
        let guild = self.guild.as_ref().context("missing [guild] section (guild.name)")?;
        let spreadsheet = self.spreadsheet.as_ref().context("missing [spreadsheet] section (spreadsheet.url)")?;
        if site.base_url.trim().is_empty() {
            bail!("site.base_url is empty");
        }
        if guild.name.trim().is_empty() {
            bail!("guild.name is empty");
        }
        if spreadsheet.url.trim().is_empty() {
            bail!("spreadsheet.url is empty");
        }
        Ok(RosterSettings { site, guild, spreadsheet })
    }

    pub fn drop_stats(&self) -> Result<&DropStats> {
        let ds = self
            .drop_stats
            .as_ref()
            .context("missing [drop_stats] section (url, blue_chest_probability, hihi_probability)")?;
        if ds.url.trim().is_empty() {
            bail!("drop_stats.url is empty");
        }
        check_probability("drop_stats.blue_chest_probability", ds.blue_chest_probability)?;
        check_probability("drop_stats.hihi_probability", ds.hihi_probability)?;
        Ok(ds)
    }
}

impl DropStats {
    /// Login only when both halves are filled in.
    pub fn login(&self) -> Option<&Login> {
        self.login
            .as_ref()
            .filter(|l| !l.username.is_empty() && !l.password.is_empty())
    }
}

fn check_probability(key: &str, p: f64) -> Result<()> {
    if !(p > 0.0 && p < 1.0) {
        bail!("{key} must be in (0, 1), got {p}");
    }
    Ok(())
}
