//! Argument parsing and command dispatch.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Datelike, Local, NaiveDate};
use clap::{Args, Parser, Subcommand};

use gantry_analytics::{day_bucket, journal, month_view, sector_bars};
use gantry_client::{BotApi, BotApiConfig};
use gantry_config::{load_config, AppConfig};
use gantry_core::BotConfig;

use crate::monitor::{run_monitor_headless, MonitorSession, MonitorSettings, ShutdownSignal};
use crate::render::{describe_ack, Calendar, JournalTable, SectorTable, SignalTable, StatusReport};
use crate::telemetry::init_tracing;
use crate::tui;

#[derive(Parser)]
#[command(author, version, about = "Operator console for the trading bot")]
pub struct Cli {
    /// Increases logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Selects which configuration environment to load (maps to config/{env}.toml)
    #[arg(long, default_value = "default")]
    env: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Attach the live dashboard to the bot's push stream
    Monitor(MonitorArgs),
    /// One-shot view of bot state and today's numbers
    Status,
    /// Closed trades for one session day
    Journal(JournalArgs),
    /// Calendar of realized P&L bucketed by entry date
    Calendar(CalendarArgs),
    /// Sector strength ranking from the latest snapshot
    Sectors,
    /// Recent scanner signals
    Signals(SignalsArgs),
    /// Inspect or update the bot's runtime settings
    Config(ConfigArgs),
    /// Close one open position at market
    Close(CloseArgs),
    /// Halt new entries; open positions keep running
    KillSwitch,
    /// Allow entries again after a kill switch
    Resume,
    /// Ask the bot process to restart itself
    Restart,
    /// Probe the bot's HTTP liveness endpoint
    Health,
}

#[derive(Args)]
pub struct MonitorArgs {
    /// Log state transitions instead of drawing the dashboard
    #[arg(long)]
    headless: bool,

    /// Bind address for the Prometheus exporter (overrides telemetry.metrics_addr)
    #[arg(long)]
    metrics_addr: Option<String>,
}

impl MonitorArgs {
    async fn run(&self, config: &AppConfig) -> Result<()> {
        let mut settings = MonitorSettings::from_config(config)?;
        if let Some(addr) = &self.metrics_addr {
            settings.metrics_addr = Some(
                addr.parse()
                    .with_context(|| format!("invalid metrics address '{addr}'"))?,
            );
        }
        let shutdown = ShutdownSignal::new();
        if self.headless {
            run_monitor_headless(settings, shutdown).await
        } else {
            let session = MonitorSession::start(settings).await;
            let res = tui::run_monitor(&session, &shutdown);
            session.shutdown().await;
            res
        }
    }
}

#[derive(Args)]
pub struct JournalArgs {
    /// Session day as YYYY-MM-DD; defaults to today
    #[arg(long)]
    date: Option<NaiveDate>,
}

#[derive(Args)]
pub struct CalendarArgs {
    /// Month as YYYY-MM; defaults to the current month
    #[arg(long)]
    month: Option<String>,
}

#[derive(Args)]
pub struct SignalsArgs {
    /// Most recent signals to print
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the active settings as JSON
    Get,
    /// Update one field, e.g. `risk.stop_loss_pct 0.015`
    Set(ConfigSetArgs),
}

#[derive(Args)]
pub struct ConfigSetArgs {
    /// Dot-separated field path
    key: String,

    /// New value; parsed as JSON, else taken as a string
    value: String,
}

#[derive(Args)]
pub struct CloseArgs {
    /// Symbol of the open position to close
    symbol: String,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(Some(&cli.env)).context("failed to load configuration")?;

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| match cli.verbose {
        0 => config.log_level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    });
    let interactive = matches!(&cli.command, Commands::Monitor(args) if !args.headless);
    init_tracing(&filter, config.telemetry.log_file.as_deref(), interactive)
        .context("failed to initialize logging")?;

    match &cli.command {
        Commands::Monitor(args) => args.run(&config).await,
        Commands::Status => status(&bot_api(&config)).await,
        Commands::Journal(args) => journal_report(&bot_api(&config), args.date).await,
        Commands::Calendar(args) => calendar_report(&bot_api(&config), args.month.as_deref()).await,
        Commands::Sectors => sectors_report(&bot_api(&config)).await,
        Commands::Signals(args) => signals_report(&bot_api(&config), args.limit).await,
        Commands::Config(args) => match &args.action {
            ConfigAction::Get => config_get(&bot_api(&config)).await,
            ConfigAction::Set(set) => config_set(&bot_api(&config), &set.key, &set.value).await,
        },
        Commands::Close(args) => close(&bot_api(&config), &args.symbol).await,
        Commands::KillSwitch => kill_switch(&bot_api(&config)).await,
        Commands::Resume => resume(&bot_api(&config)).await,
        Commands::Restart => restart(&bot_api(&config)).await,
        Commands::Health => health(&bot_api(&config)).await,
    }
}

fn bot_api(config: &AppConfig) -> BotApi {
    BotApi::new(BotApiConfig {
        base_url: config.bot.base_url.clone(),
        connect_timeout: config.sync.connect_timeout(),
        request_timeout: config.sync.request_timeout(),
    })
}

async fn status(api: &BotApi) -> Result<()> {
    let snapshot = api.fetch_snapshot().await?;
    print!("{}", StatusReport(&snapshot));
    Ok(())
}

async fn journal_report(api: &BotApi, date: Option<NaiveDate>) -> Result<()> {
    let session = date.unwrap_or_else(|| Local::now().date_naive());
    let snapshot = api.fetch_snapshot().await?;
    let records = journal(&snapshot, session);
    let day = day_bucket(&records, session);
    println!("Session {session}");
    print!("{}", JournalTable(&day.trades));
    Ok(())
}

async fn calendar_report(api: &BotApi, month: Option<&str>) -> Result<()> {
    let today = Local::now().date_naive();
    let (year, month) = match month {
        Some(raw) => parse_month(raw)?,
        None => (today.year(), today.month()),
    };
    let snapshot = api.fetch_snapshot().await?;
    let records = journal(&snapshot, today);
    let view = month_view(&records, year, month);
    print!("{}", Calendar(&view));
    Ok(())
}

async fn sectors_report(api: &BotApi) -> Result<()> {
    let snapshot = api.fetch_snapshot().await?;
    let bars = sector_bars(&snapshot.top_sectors);
    print!("{}", SectorTable(&bars));
    Ok(())
}

async fn signals_report(api: &BotApi, limit: usize) -> Result<()> {
    let snapshot = api.fetch_snapshot().await?;
    let shown = &snapshot.signals[..limit.min(snapshot.signals.len())];
    print!("{}", SignalTable(shown));
    Ok(())
}

async fn config_get(api: &BotApi) -> Result<()> {
    let config = api.fetch_config().await?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

async fn config_set(api: &BotApi, key: &str, value: &str) -> Result<()> {
    let current = api.fetch_config().await?;
    let mut document = serde_json::to_value(&current)?;
    set_field(&mut document, key, value)?;
    let updated: BotConfig =
        serde_json::from_value(document).context("updated settings do not form a valid config")?;
    let ack = api.save_config(&updated).await?;
    println!("{}", describe_ack(&ack));
    Ok(())
}

async fn close(api: &BotApi, symbol: &str) -> Result<()> {
    let ack = api.close_position(&symbol.to_uppercase()).await?;
    println!("{}", describe_ack(&ack));
    Ok(())
}

async fn kill_switch(api: &BotApi) -> Result<()> {
    let ack = api.kill_switch().await?;
    println!("{}", describe_ack(&ack));
    Ok(())
}

async fn resume(api: &BotApi) -> Result<()> {
    let ack = api.resume().await?;
    println!("{}", describe_ack(&ack));
    Ok(())
}

async fn restart(api: &BotApi) -> Result<()> {
    let ack = api.restart().await?;
    println!("{}", describe_ack(&ack));
    Ok(())
}

async fn health(api: &BotApi) -> Result<()> {
    let health = api.health().await?;
    println!("{}", health.status);
    Ok(())
}

/// Walk `path` through nested objects and replace the final field.
fn set_field(document: &mut serde_json::Value, path: &str, raw: &str) -> Result<()> {
    let mut cursor = &mut *document;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let object = cursor
            .as_object_mut()
            .ok_or_else(|| anyhow!("'{segment}' in '{path}' is not an object"))?;
        let entry = object
            .get_mut(segment)
            .ok_or_else(|| anyhow!("settings have no field '{path}'"))?;
        if segments.peek().is_none() {
            *entry = parse_value(raw);
            return Ok(());
        }
        cursor = entry;
    }
    bail!("empty settings path")
}

fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn parse_month(raw: &str) -> Result<(i32, u32)> {
    let (year, month) = raw
        .split_once('-')
        .ok_or_else(|| anyhow!("expected YYYY-MM, got '{raw}'"))?;
    let year: i32 = year
        .parse()
        .with_context(|| format!("invalid year in '{raw}'"))?;
    let month: u32 = month
        .parse()
        .with_context(|| format!("invalid month in '{raw}'"))?;
    if !(1..=12).contains(&month) {
        bail!("month {month} out of range");
    }
    Ok((year, month))
}
