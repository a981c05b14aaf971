use backupter::backup::backupter_config::BackupterConfig;
use backupter::backup::dump::BackupRequest;
use backupter::backup::job::Backupter;
use backupter::backup::process::SystemCommandRunner;
use backupter::backup::result_error::error::Error;
use backupter::backup::result_error::result::Result;
use backupter::backup::result_error::WithMsg;
use backupter::backup::statement::DEFAULT_PRINCIPAL;
use backupter::backup::tier::Tier;
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use validator::Validate;

/// Dump PostgreSQL databases into hourly, daily and weekly backup tiers
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Location of config file, defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Back a database up into the hourly tier
    Hourly(JobArgs),
    /// Back a database up into the daily tier
    Daily(JobArgs),
    /// Back a database up into the weekly tier
    Weekly(JobArgs),
    /// Run the configured schedules until killed
    Run,
}

#[derive(Args, Debug)]
struct JobArgs {
    /// Database to dump
    dbname: String,
    /// Local account pg_dump runs as
    #[arg(long, default_value = DEFAULT_PRINCIPAL)]
    as_username: String,
}

fn load_config(path: Option<&Path>) -> Result<BackupterConfig> {
    match path {
        Some(path) => BackupterConfig::from_file(path),
        None => {
            let config = BackupterConfig::default();
            config
                .validate()
                .map_err(Error::from)
                .with_msg("Default config validation failed")?;
            Ok(config)
        }
    }
}

/// Logs go to `<root>/logs/<date>`, or stderr when that file cannot be opened.
fn init_tracing(config: &BackupterConfig) {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_file = config
        .log_dir()
        .join(Local::now().format("%Y-%m-%d").to_string());
    match OpenOptions::new().create(true).append(true).open(&log_file) {
        Ok(file) => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init(),
        Err(e) => {
            tracing_subscriber::fmt().with_env_filter(filter()).init();
            warn!("Cannot open log file {:?}, logging to stderr: {}", log_file, e);
        }
    }
}

fn run(config: BackupterConfig, command: Command) -> Result<()> {
    config.check_tools()?;
    let backupter = Backupter::new(config, Arc::new(SystemCommandRunner));
    let (tier, args) = match command {
        Command::Hourly(args) => (Tier::Hourly, args),
        Command::Daily(args) => (Tier::Daily, args),
        Command::Weekly(args) => (Tier::Weekly, args),
        Command::Run => return backupter.start_loop(),
    };
    let request = BackupRequest::builder()
        .database(args.dbname)
        .as_username(args.as_username)
        .build();
    let path = backupter.run(tier, &request, Local::now().date_naive())?;
    info!("Created backup file: {:?}", path);
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()).and_then(|c| c.bootstrap().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt().init();
            error!("{e}");
            exit(1);
        }
    };
    init_tracing(&config);

    if let Err(e) = run(config, cli.command) {
        error!("{e}");
        exit(1);
    }
}
