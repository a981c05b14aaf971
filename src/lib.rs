//! # backupter
//!
//! Periodic PostgreSQL backups with tiered retention and remote sync.
//!
//! ## Features
//!
//! - **Tiers**: Hourly, daily and weekly jobs, each with its own directory
//! - **Lifecycle Events**: Start/End/Error channels per job, observed by
//!   logging, remote sync and alerting handlers
//! - **Remote Sync**: Mirrors a tier directory to object storage after each
//!   successful backup
//! - **Retention**: Optional per-tier pruning of old artifacts
//! - **Scheduling**: Cron-based loop for running the jobs unattended
//!
//! ## Quick Start
//!
//! ```no_run
//! use backupter::backup::backupter_config::BackupterConfig;
//! use backupter::backup::dump::BackupRequest;
//! use backupter::backup::job::Backupter;
//! use backupter::backup::process::SystemCommandRunner;
//! use std::sync::Arc;
//!
//! let config = BackupterConfig::from_file("backupter.yml")?;
//! config.bootstrap()?;
//!
//! let backupter = Backupter::new(config, Arc::new(SystemCommandRunner));
//! let artifact = backupter.daily(&BackupRequest::new("orders"))?;
//! println!("{}", artifact.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
