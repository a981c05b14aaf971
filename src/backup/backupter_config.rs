use crate::backup::dump::BackupRequest;
use crate::backup::events::{Channel, EventBus, EventBusBuilder, EventHandler, JobKind, Phase};
use crate::backup::function_path;
use crate::backup::handlers::register_logging;
use crate::backup::notifications::NotificationConfig;
use crate::backup::process::CommandRunner;
use crate::backup::remote_sync::RemoteSync;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithFnName, WithMsg};
use crate::backup::statement::DEFAULT_PRINCIPAL;
use crate::backup::tier::{Tier, TierConfigs};
use crate::backup::validate::{
    validate_cron_str, validate_database_identifier, validate_dir_exist_or_created,
};
use bon::Builder;
use chrono::{DateTime, TimeZone};
use function_name::named;
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use validator::Validate;

static DEFAULT_ROOT_DIR: &str = "/tmp/backupter";
static LOG_DIR_NAME: &str = "logs";
static STORE_DIR_NAME: &str = "backups";

fn default_root_dir() -> PathBuf {
    PathBuf::from(DEFAULT_ROOT_DIR)
}

fn default_sudo() -> PathBuf {
    PathBuf::from("sudo")
}

fn default_pg_dump() -> PathBuf {
    PathBuf::from("pg_dump")
}

fn default_sync() -> PathBuf {
    PathBuf::from("s3cmd")
}

fn default_principal() -> String {
    DEFAULT_PRINCIPAL.to_string()
}

/// External programs the pipeline shells out to. Bare names are looked up
/// in `PATH`.
#[derive(Clone, Debug, Serialize, Deserialize, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct ToolPaths {
    #[serde(default = "default_sudo")]
    #[builder(into, default = default_sudo())]
    sudo: PathBuf,
    #[serde(default = "default_pg_dump")]
    #[builder(into, default = default_pg_dump())]
    pg_dump: PathBuf,
    #[serde(default = "default_sync")]
    #[builder(into, default = default_sync())]
    sync: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A job the `run` loop fires on a cron schedule.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct ScheduleConfig {
    tier: Tier,
    #[validate(custom(function = validate_database_identifier))]
    #[builder(into)]
    database: String,
    #[serde(default = "default_principal")]
    #[validate(length(min = 1))]
    #[builder(into, default = default_principal())]
    as_username: String,
    #[validate(custom(function = validate_cron_str))]
    #[builder(into)]
    cron: String,
}

impl ScheduleConfig {
    pub fn request(&self) -> BackupRequest {
        BackupRequest::builder()
            .database(self.database.as_str())
            .as_username(self.as_username.as_str())
            .build()
    }

    /// Next fire time strictly after `after`.
    pub fn next_after<T: TimeZone>(&self, after: &DateTime<T>) -> Result<DateTime<T>> {
        cron_parser::parse(&self.cron, after).map_err(|_| Error::invalid_cron(self.cron.as_str()))
    }
}

/// Everything the tool needs to know, read from a YAML file. Every field has
/// a default, so an empty file is a valid configuration.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct BackupterConfig {
    #[serde(default = "default_root_dir")]
    #[validate(custom(function = validate_dir_exist_or_created))]
    #[builder(into, default = default_root_dir())]
    root_dir: PathBuf,
    /// Where dumps are written before placement. System temp dir if unset.
    #[serde(default)]
    #[builder(into)]
    scratch_dir: Option<PathBuf>,
    #[serde(default)]
    #[builder(default)]
    tools: ToolPaths,
    #[serde(default)]
    #[builder(default)]
    tiers: TierConfigs,
    #[serde(default)]
    #[validate(nested)]
    notification: Option<NotificationConfig>,
    #[serde(default)]
    #[validate(nested)]
    #[builder(default)]
    schedules: Vec<ScheduleConfig>,
}

impl Default for BackupterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BackupterConfig {
    #[named]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = File::open(path)
            .map_err(Error::from)
            .and_then(|f| serde_yml::from_reader::<_, BackupterConfig>(f).map_err(Error::from))
            .with_msg(format!("Parse YAML config failed: {:?}", path))
            .with_fn_name(function_path!())?;
        config
            .validate()
            .map_err(Error::from)
            .with_msg(format!("Config validation failed: {:?}", path))
            .with_fn_name(function_path!())?;
        Ok(config)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root_dir.join(LOG_DIR_NAME)
    }

    pub fn store_dir(&self) -> PathBuf {
        self.root_dir.join(STORE_DIR_NAME)
    }

    pub fn tier_dir(&self, tier: Tier) -> PathBuf {
        self.store_dir().join(tier.dir_name())
    }

    /// Creates the root, `logs/` and `backups/` directories if missing.
    /// Tier directories are left to the first job that needs them.
    pub fn bootstrap(&self) -> Result<()> {
        for dir in [self.root_dir.clone(), self.log_dir(), self.store_dir()] {
            std::fs::create_dir_all(&dir)
                .map_err(Error::from)
                .with_msg(format!("Create directory {:?} failed", dir))?;
        }
        Ok(())
    }

    /// Resolves the dump tools, and the sync tool if any tier has a remote.
    pub fn check_tools(&self) -> Result<()> {
        let mut tools = vec![self.tools.sudo(), self.tools.pg_dump()];
        if Tier::ALL
            .iter()
            .any(|t| self.tiers.get(*t).remote().is_some())
        {
            tools.push(self.tools.sync());
        }
        for tool in tools {
            which::which(tool)
                .map_err(Error::from)
                .with_msg(format!("Cannot find executable {:?}", tool))?;
        }
        Ok(())
    }

    /// Bus builder with the standard observers registered: logging on every
    /// channel, remote sync on the End channel of each tier that has a
    /// remote, and the notifier on every tier Error channel.
    pub fn event_bus_builder(&self, runner: Arc<dyn CommandRunner>) -> EventBusBuilder {
        let mut builder = EventBus::builder();
        register_logging(&mut builder);

        for tier in Tier::ALL {
            if let Some(remote) = self.tiers.get(tier).remote() {
                builder.register(
                    Channel::new(tier.into(), Phase::End),
                    RemoteSync::new(
                        self.tools.sync(),
                        self.tier_dir(tier),
                        remote.clone(),
                        runner.clone(),
                    ),
                );
            }
        }

        if let Some(notification) = &self.notification {
            let notifier: Arc<dyn EventHandler> = Arc::new(notification.clone());
            for channel in alert_channels() {
                builder.register_shared(channel, notifier.clone());
            }
        }

        builder
    }
}

/// Channels the notifier listens on. A failed dump also shows up on its
/// job's Error channel, so the generic one is left to logging.
pub fn alert_channels() -> impl Iterator<Item = Channel> {
    Tier::ALL
        .into_iter()
        .map(|tier| Channel::new(JobKind::from(tier), Phase::Error))
}
