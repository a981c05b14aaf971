use crate::backup::backupter_config::ToolPaths;
use crate::backup::events::{Event, EventBus, JobKind};
use crate::backup::function_path;
use crate::backup::process::CommandRunner;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithFnName, WithMsg};
use crate::backup::statement::{dump_statement, DEFAULT_PRINCIPAL};
use crate::backup::validate::validate_database_identifier;
use bon::Builder;
use function_name::named;
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::Builder as TempFileBuilder;
use validator::Validate;

/// One backup run's input: which database, dumped as which OS user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct BackupRequest {
    #[validate(custom(function = validate_database_identifier))]
    #[builder(into)]
    database: String,
    #[serde(default = "default_principal")]
    #[validate(length(min = 1))]
    #[builder(into, default = default_principal())]
    as_username: String,
}

fn default_principal() -> String {
    DEFAULT_PRINCIPAL.to_string()
}

impl BackupRequest {
    pub fn new<D: Into<String>>(database: D) -> Self {
        Self::builder().database(database).build()
    }
}

/// Runs the dump tool into a fresh scratch file and announces it on the
/// generic `Backupter` channels.
pub struct DumpExecutor<'a> {
    tools: &'a ToolPaths,
    scratch_dir: Option<&'a Path>,
    runner: &'a dyn CommandRunner,
    bus: &'a EventBus,
}

impl<'a> DumpExecutor<'a> {
    pub fn new(
        tools: &'a ToolPaths,
        scratch_dir: Option<&'a Path>,
        runner: &'a dyn CommandRunner,
        bus: &'a EventBus,
    ) -> Self {
        Self {
            tools,
            scratch_dir,
            runner,
            bus,
        }
    }

    /// Dumps the requested database and returns the scratch artifact path.
    ///
    /// Emits `BackupterStart` with the rendered command before running it.
    /// On success emits `BackupterEnd` with the artifact path. If the tool
    /// cannot be started or exits non-zero, emits `BackupterError`, removes
    /// the scratch file and returns the failure.
    #[named]
    pub fn execute(&self, request: &BackupRequest) -> Result<PathBuf> {
        let artifact = self.allocate_artifact().with_fn_name(function_path!())?;
        let statement = dump_statement(
            self.tools,
            &artifact,
            request.database(),
            request.as_username(),
        );

        self.bus
            .send(JobKind::Backupter, Event::Start(statement.to_string()));
        let res = self
            .runner
            .run(&statement)
            .and_then(|outcome| outcome.check(&statement))
            .with_msg(format!("Dump of database {:?} failed", request.database()));

        match res {
            Ok(_) => {
                self.bus
                    .send(JobKind::Backupter, Event::End(artifact.clone()));
                Ok(artifact)
            }
            Err(mut e) => {
                self.bus
                    .send(JobKind::Backupter, Event::Error(e.to_string()));
                if let Err(e2) = std::fs::remove_file(&artifact) {
                    e = e.chain(Error::from(e2).with_msg(format!(
                        "Delete scratch file {:?} failed",
                        artifact
                    )));
                }
                Err(e.with_fn_name(function_path!()))
            }
        }
    }

    fn allocate_artifact(&self) -> Result<PathBuf> {
        let mut builder = TempFileBuilder::new();
        builder.prefix("backupter-").suffix(".dump.sql").disable_cleanup(true);
        let file = match self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(file.path().to_path_buf())
    }
}
