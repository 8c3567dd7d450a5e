use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, info};

use cmdorc_tui::app::App;
use cmdorc_tui::config::create_default_config;
use cmdorc_tui::controller::Controller;
use cmdorc_tui::logger::FileLogger;
use cmdorc_tui::notifier::BufferNotifier;
use cmdorc_tui::preview::PreviewOrchestrator;
use cmdorc_tui::tui;

const LOG_FILE_NAME: &str = "cmdorc-tui.log";
const NOTICE_LIMIT: usize = 200;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file; a starter config is written if it does not exist
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log file (default: cmdorc-tui.log next to the config)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Do not start file watchers
    #[arg(long)]
    no_watch: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn default_log_path(config: &Path) -> PathBuf {
    config
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from(LOG_FILE_NAME), |dir| dir.join(LOG_FILE_NAME))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_path = cli
        .log_file
        .clone()
        .unwrap_or_else(|| default_log_path(&cli.config));
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let echo = FileLogger::init(&log_path, level)
        .map_err(|err| anyhow!("failed to open log file {}: {err}", log_path.display()))?;
    info!("cmdorc-tui {} starting", env!("CARGO_PKG_VERSION"));

    create_default_config(&cli.config)
        .with_context(|| format!("failed to create {}", cli.config.display()))?;

    let notices = BufferNotifier::new(NOTICE_LIMIT);
    let mut controller = Controller::new(
        &cli.config,
        PreviewOrchestrator::new(&[]),
        Box::new(notices.clone()),
        !cli.no_watch,
    )
    .with_context(|| format!("failed to load {}", cli.config.display()))?;
    controller.attach();

    let mut app = App::new(controller, notices);
    echo.disable();
    let result = tui::run(&mut app);
    echo.enable();
    result
}
