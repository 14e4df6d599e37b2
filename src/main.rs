mod analysis;
mod chart;
mod cli;
mod config;
mod drops;
mod error;
mod logging;
mod model;
mod page;
mod roster;
mod sheet;
mod webdriver;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::task;

use crate::analysis::DropAnalyzer;
use crate::cli::Command;
use crate::config::{Config, DropStats, Guild, Site, WebDriver};
use crate::drops::DropScraper;
use crate::error::SheetError;
use crate::model::{DropData, Member};
use crate::roster::GuildScraper;
use crate::sheet::GoogleSheet;
use crate::webdriver::Session;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    dotenvy::dotenv().ok();
    let args = cli::parse();

    let log_file = args
        .log_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(args.command.default_log_file()));
    if let Err(e) = logging::init_logging(args.verbose, &log_file) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }

    if let Err(e) = run(args).await {
        tracing::error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: cli::Cli) -> Result<()> {
    let cfg = Config::load(&args.config)?;
    match args.command {
        Command::Roster { dry_run } => run_roster(&cfg, dry_run).await,
        Command::Drops { out, no_chart } => run_drops(&cfg, out, no_chart).await,
    }
}

async fn run_roster(cfg: &Config, dry_run: bool) -> Result<()> {
    tracing::info!("roster job started");
    let settings = cfg.roster()?;
    let (site, guild, spreadsheet) =
        (settings.site.clone(), settings.guild.clone(), settings.spreadsheet.clone());
    let driver = cfg.webdriver.clone();

    let (event_number, members) =
        task::spawn_blocking(move || scrape_roster(&driver, &site, &guild)).await??;

    for m in &members {
        println!("{}: {}", m.name, m.rank);
    }

    if dry_run {
        tracing::info!("dry run: spreadsheet left untouched");
        return Ok(());
    }

    let summary = task::spawn_blocking(move || {
        sheet::publish_ranking(event_number, &members, || {
            let token = std::env::var(&spreadsheet.token_env).map_err(|_| {
                SheetError::Auth(format!("environment variable {} not set", spreadsheet.token_env))
            })?;
            GoogleSheet::open(&spreadsheet.url, &spreadsheet.sheet_name, &token)
        })
    })
    .await??;

    tracing::info!(
        "roster job finished: event {}, {} updated, {} new",
        event_number.unwrap_or_default(),
        summary.updated,
        summary.appended
    );
    Ok(())
}

/// Browser half of the roster job. The session is closed on every path.
fn scrape_roster(driver: &WebDriver, site: &Site, guild: &Guild) -> Result<(Option<u32>, Vec<Member>)> {
    let mut session = Session::start(&driver.url, driver.headless)
        .with_context(|| format!("starting browser session at {}", driver.url))?;
    tracing::info!("browser session started");

    let result = (|| -> Result<(Option<u32>, Vec<Member>)> {
        let scraper = GuildScraper::new(&session, Duration::from_secs(driver.wait_timeout_secs));
        scraper.open_guild_page(&guild.name, &site.base_url)?;
        let n = scraper.event_number()?;
        let members = scraper.scrape_member_table()?;
        Ok((n, members))
    })();

    if let Err(e) = session.quit() {
        tracing::warn!("closing browser session: {e}");
    }
    result
}

async fn run_drops(cfg: &Config, out: Option<PathBuf>, no_chart: bool) -> Result<()> {
    tracing::info!("drop statistics job started");
    let ds = cfg.drop_stats()?.clone();
    let driver = cfg.webdriver.clone();

    // CLI override > config
    let out_dir = out.unwrap_or_else(|| PathBuf::from(&ds.output_directory));

    let scraped = ds.clone();
    let data = task::spawn_blocking(move || scrape_drops(&driver, &scraped)).await??;

    log_samples(&data);
    let cumulative = DropAnalyzer::new(data.cumulative, ds.blue_chest_probability, ds.hihi_probability);
    let monthly = DropAnalyzer::new(data.monthly, ds.blue_chest_probability, ds.hihi_probability);

    println!("\n{}", "=".repeat(60));
    println!("Drop analysis");
    println!("{}", "=".repeat(60));
    print!("{}", cumulative.report().render("cumulative"));
    print!("{}", monthly.report().render("monthly"));

    if !no_chart {
        write_chart(&cumulative, &monthly, &out_dir)?;
    }

    tracing::info!("drop statistics job finished");
    Ok(())
}

fn scrape_drops(driver: &WebDriver, ds: &DropStats) -> Result<DropData> {
    let mut session = Session::start(&driver.url, driver.headless)
        .with_context(|| format!("starting browser session at {}", driver.url))?;
    tracing::info!("browser session started");

    let scraper = DropScraper::new(&session, Duration::from_secs(driver.wait_timeout_secs), driver.settle_ms);
    let result = scraper.scrape(&ds.url, ds.login()).context("scraping drop tracker");

    if let Err(e) = session.quit() {
        tracing::warn!("closing browser session: {e}");
    }
    result
}

fn log_samples(data: &DropData) {
    for (name, s) in [("cumulative", &data.cumulative), ("monthly", &data.monthly)] {
        tracing::info!(
            "{name}: trials={} blue_chest={} hihi={}",
            s.trials,
            s.blue_chest_count,
            s.hihi_count
        );
    }
}

fn write_chart(cumulative: &DropAnalyzer, monthly: &DropAnalyzer, out_dir: &Path) -> Result<()> {
    let path = chart::output_path(out_dir, Local::now().date_naive())?;
    chart::render(cumulative, monthly, &path)
}
