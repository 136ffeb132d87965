mod config;
mod cookie;
mod dispatcher;
mod error;
mod fetcher;
mod model;
mod monitor;
mod notifier;
mod schedule;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use config::AppConfig;
use cookie::SourceStatus;
use dispatcher::Dispatcher;
use fetcher::Fetcher;
use fetcher::browser::BrowserFetcher;
use model::{ChannelKind, Notification};
use monitor::Monitor;
use notifier::build_channels;
use notifier::http::HttpTransport;
use schedule::SchedulePolicy;

const SCREENSHOT_PATH: &str = "debug_screenshot.png";
const TEST_TITLE: &str = "🧪 测试推送";
const TEST_BODY: &str = "这是一条测试消息，说明推送功能正常工作！\n\n*来自 rebalance-notifier*";

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("schedule error")]
    Schedule,
    #[display("browser error")]
    Browser,
    #[display("notification error")]
    Notifier,
}

#[derive(Parser)]
#[command(
    name = "rebalance-notifier",
    about = "Watches a portfolio trade record page and pushes new rebalancing records"
)]
struct Cli {
    /// Path to a dotenv file with settings; ignored when missing
    #[arg(short, long, default_value = ".env", global = true)]
    env_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Monitor continuously and push every new rebalancing record
    Monitor,
    /// Fetch the latest record once and print it
    Fetch {
        /// Save a screenshot of the loaded page
        #[arg(short, long)]
        screenshot: bool,
    },
    /// Send a test notification to every enabled channel
    PushTest,
    /// List available notification channels
    Channels,
    /// Fetch once with a visible browser window, then keep it open
    Debug {
        /// Seconds to keep the browser open
        #[arg(long, default_value_t = 30)]
        hold_secs: u64,
    },
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    load_env_file(&cli.env_file)?;
    let config = config::load().change_context(AppError::Config)?;

    // Held until exit so buffered file log lines are flushed.
    let _log_guard = init_tracing(&config)?;

    match cli.command {
        Command::Monitor => run_monitor(&config).await,
        Command::Fetch { screenshot } => run_fetch(&config, screenshot).await,
        Command::PushTest => run_push_test(&config).await,
        Command::Channels => {
            list_channels(&config);
            Ok(())
        }
        Command::Debug { hold_secs } => run_debug(config, Duration::from_secs(hold_secs)).await,
    }
}

fn load_env_file(path: &Path) -> Result<(), Report<AppError>> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(Report::new(e)
            .change_context(AppError::Config)
            .attach(format!("env file: {}", path.display()))),
    }
}

fn init_tracing(config: &AppConfig) -> Result<Option<WorkerGuard>, Report<AppError>> {
    let filter = EnvFilter::new(&config.general.log_level);
    let json = config.general.log_format == "json";

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if json {
        layers.push(tracing_subscriber::fmt::layer().json().boxed());
    } else {
        layers.push(tracing_subscriber::fmt::layer().boxed());
    }

    let guard = match &config.general.log_file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(open_log_file(path)?);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            if json {
                layers.push(file_layer.json().boxed());
            } else {
                layers.push(file_layer.boxed());
            }
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry().with(layers).with(filter).init();
    Ok(guard)
}

/// Append-only log file; missing parent directories are created.
fn open_log_file(path: &Path) -> Result<RollingFileAppender, Report<AppError>> {
    let file_name = path
        .file_name()
        .ok_or_else(|| {
            Report::new(AppError::Config).attach(format!("LOG_FILE has no file name: {}", path.display()))
        })?
        .to_string_lossy()
        .into_owned();
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .change_context(AppError::Config)
        .attach_with(|| format!("log dir: {}", dir.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(&dir)
        .change_context(AppError::Config)
        .attach_with(|| format!("LOG_FILE: {}", path.display()))
}

fn build_dispatcher(config: &AppConfig) -> Result<Dispatcher, Report<AppError>> {
    let transport = Arc::new(HttpTransport::new().change_context(AppError::Notifier)?);
    let channels = build_channels(&config.notifiers, transport);
    Ok(Dispatcher::new(channels, config.icons.clone()))
}

async fn launch_fetcher(config: &AppConfig) -> Result<BrowserFetcher, Report<AppError>> {
    let cookies = cookie::load(&config.cookies);
    BrowserFetcher::launch(&config.browser, &config.target_url, &cookies)
        .await
        .change_context(AppError::Browser)
}

async fn run_monitor(config: &AppConfig) -> Result<(), Report<AppError>> {
    // Parse the schedule before touching the browser: a bad cron is fatal.
    let policy = SchedulePolicy::from_config(&config.schedule).change_context(AppError::Schedule)?;
    let dispatcher = build_dispatcher(config)?;
    log_startup_summary(config, &policy, &dispatcher.channel_kinds());

    let fetcher = launch_fetcher(config).await?;
    let mut monitor = Monitor::new(Box::new(fetcher), dispatcher);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("ctrl+c received, shutting down");
                signal_cancel.cancel();
            }
            Err(e) => warn!(error = %e, "cannot listen for ctrl+c"),
        }
    });

    schedule::run_until_cancelled(&policy, &mut monitor, &cancel)
        .await
        .change_context(AppError::Schedule)
}

fn log_startup_summary(config: &AppConfig, policy: &SchedulePolicy, channels: &[ChannelKind]) {
    info!(
        target_url = %config.target_url,
        schedule = %policy,
        headless = config.browser.headless,
        "monitor starting"
    );

    if channels.is_empty() {
        warn!("no notification channel enabled; changes will only be logged");
    } else {
        info!(channels = ?channels, "notification channels enabled");
    }

    match cookie::source_status(&config.cookies) {
        SourceStatus::File(path) => info!(path = %path.display(), "cookie file found"),
        SourceStatus::FileMissing(path) => {
            warn!(path = %path.display(), "cookie file missing, continuing without session")
        }
        SourceStatus::Inline => info!("cookies loaded from environment"),
        SourceStatus::NotConfigured => {
            warn!("no cookie configured; some records may need a logged-in session")
        }
    }
}

async fn run_fetch(config: &AppConfig, screenshot: bool) -> Result<(), Report<AppError>> {
    info!(target_url = %config.target_url, "fetching once");
    let mut fetcher = launch_fetcher(config).await?;
    let outcome = fetch_and_print(&fetcher, screenshot).await;
    fetcher.shutdown().await;
    outcome
}

async fn fetch_and_print(fetcher: &dyn Fetcher, screenshot: bool) -> Result<(), Report<AppError>> {
    let record = fetcher.fetch().await.change_context(AppError::Browser)?;

    match record {
        Some(record) => {
            println!("{}", "-".repeat(50));
            println!("{record}");
            println!("{}", "-".repeat(50));
        }
        None => {
            println!("no record found; check network, cookies or the page selectors");
            if !screenshot {
                println!("hint: rerun with --screenshot to inspect the page");
            }
        }
    }

    if screenshot {
        fetcher
            .screenshot(Path::new(SCREENSHOT_PATH))
            .await
            .change_context(AppError::Browser)?;
    }
    Ok(())
}

async fn run_debug(mut config: AppConfig, hold: Duration) -> Result<(), Report<AppError>> {
    config.browser.headless = false;
    info!("debug mode: browser window visible");

    let mut fetcher = launch_fetcher(&config).await?;
    let outcome = fetch_and_print(&fetcher, true).await;
    if outcome.is_ok() {
        info!(hold_secs = hold.as_secs(), "keeping browser open, ctrl+c to quit");
        tokio::select! {
            _ = tokio::time::sleep(hold) => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }
    fetcher.shutdown().await;
    outcome
}

async fn run_push_test(config: &AppConfig) -> Result<(), Report<AppError>> {
    println!("channel status:");
    for kind in ChannelKind::ALL {
        let status = if config.notifiers.is_enabled(kind) {
            "enabled"
        } else {
            "disabled"
        };
        println!("  {:<12} {status}", kind.as_str());
    }

    let dispatcher = build_dispatcher(config)?;
    if dispatcher.channel_kinds().is_empty() {
        return Err(Report::new(AppError::Notifier)
            .attach("no usable channel; set NOTIFIER_<CHANNEL>_ENABLED=true and its credentials"));
    }

    let report = dispatcher.send(&Notification::new(TEST_TITLE, TEST_BODY)).await;
    for result in &report.results {
        let mark = if result.success { "ok  " } else { "FAIL" };
        println!("{mark} [{}] {}", result.channel, result.message);
    }
    println!("{}/{} channels succeeded", report.success_count(), report.len());

    if !report.any_success() {
        return Err(Report::new(AppError::Notifier).attach("every channel failed"));
    }
    Ok(())
}

fn list_channels(config: &AppConfig) {
    println!("available channels:");
    for kind in ChannelKind::ALL {
        let mark = if config.notifiers.is_enabled(kind) { "*" } else { " " };
        println!("{mark} {:<12} {}", kind.as_str(), kind.description());
    }
    println!("enable one with NOTIFIER_<CHANNEL>_ENABLED=true (* = enabled)");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["rebalance-notifier", "fetch", "--screenshot"]).unwrap();
        assert!(matches!(cli.command, Command::Fetch { screenshot: true }));

        let cli = Cli::try_parse_from(["rebalance-notifier", "debug", "--hold-secs", "5"]).unwrap();
        assert!(matches!(cli.command, Command::Debug { hold_secs: 5 }));

        let cli =
            Cli::try_parse_from(["rebalance-notifier", "push-test", "--env-file", "prod.env"]).unwrap();
        assert!(matches!(cli.command, Command::PushTest));
        assert_eq!(cli.env_file, PathBuf::from("prod.env"));
    }

    #[test]
    fn log_file_created_with_parent_dirs() {
        use std::io::Write;

        let dir = std::env::temp_dir().join(format!("rebalance-notifier-log-{}", std::process::id()));
        let path = dir.join("nested").join("monitor.log");
        let mut appender = open_log_file(&path).unwrap();
        writeln!(appender, "check 1").unwrap();
        appender.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "check 1\n");
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_env_file_is_ignored() {
        assert!(load_env_file(Path::new("/nonexistent/.env")).is_ok());
    }
}
