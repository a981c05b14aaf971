use crate::backup::events::{Channel, Event, EventHandler};
use crate::backup::function_path;
use crate::backup::process::{CommandLine, CommandRunner};
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithFnName, WithMsg};
use crate::backup::tier::RemoteDestination;
use function_name::named;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Mirrors a whole tier directory to its remote destination whenever the
/// tier's End event fires. Other events are ignored.
///
/// The transfer runs synchronously inside dispatch. A failed transfer is
/// returned to the bus, which logs it; it is never retried.
pub struct RemoteSync {
    tool: PathBuf,
    local_dir: PathBuf,
    destination: RemoteDestination,
    runner: Arc<dyn CommandRunner>,
}

impl RemoteSync {
    pub fn new<T: Into<PathBuf>, L: Into<PathBuf>>(
        tool: T,
        local_dir: L,
        destination: RemoteDestination,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            tool: tool.into(),
            local_dir: local_dir.into(),
            destination,
            runner,
        }
    }

    /// `<tool> sync <local_dir> <destination>`
    pub fn command(&self) -> CommandLine {
        CommandLine::new(&self.tool)
            .arg("sync")
            .arg(self.local_dir.as_os_str())
            .arg(self.destination.as_str())
    }

    #[named]
    pub fn sync(&self) -> Result<()> {
        let command = self.command();
        info!(
            "syncing {:?} with {}...",
            self.local_dir,
            self.destination
        );
        info!("executing {}", command);
        self.runner
            .run(&command)
            .and_then(|outcome| outcome.check(&command))
            .with_msg(format!(
                "Sync of {:?} to {} failed",
                self.local_dir, self.destination
            ))
            .with_fn_name(function_path!())?;
        info!("sync has finished.");
        Ok(())
    }
}

impl EventHandler for RemoteSync {
    fn handle(&self, _channel: Channel, event: &Event) -> Result<()> {
        match event {
            Event::End(_) => self.sync(),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::events::{EventBus, JobKind, Phase};
    use crate::backup::process::testing::RecordingRunner;

    fn daily_sync(runner: Arc<RecordingRunner>) -> RemoteSync {
        RemoteSync::new(
            "s3cmd",
            "/tmp/backupter/backups/daily",
            "s3://bucket-name/".parse().unwrap(),
            runner,
        )
    }

    #[test]
    fn test_sync_command_targets_whole_tier_dir() {
        let runner = Arc::new(RecordingRunner::default());
        let sync = daily_sync(runner.clone());

        sync.sync().unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].to_string(),
            "s3cmd sync /tmp/backupter/backups/daily s3://bucket-name/"
        );
        assert_eq!(calls[0].stdout(), None);
    }

    #[test]
    fn test_sync_runs_only_on_end_events() {
        let runner = Arc::new(RecordingRunner::default());
        let mut builder = EventBus::builder();
        let sync: Arc<dyn EventHandler> = Arc::new(daily_sync(runner.clone()));
        for phase in [Phase::Start, Phase::End, Phase::Error] {
            builder.register_shared(Channel::new(JobKind::Daily, phase), sync.clone());
        }
        let bus = builder.build();

        bus.send(JobKind::Daily, Event::Start("orders".into()));
        bus.send(JobKind::Daily, Event::Error("boom".into()));
        assert!(runner.calls().is_empty());

        let report = bus.send(
            JobKind::Daily,
            Event::End("/tmp/backupter/backups/daily/orders-2024-03-01.dump.sql".into()),
        );
        assert!(report.is_clean());
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_sync_failure_is_reported_not_raised() {
        let runner = Arc::new(RecordingRunner::default());
        runner.fail_program("s3cmd");
        let mut builder = EventBus::builder();
        builder.register(
            Channel::new(JobKind::Weekly, Phase::End),
            daily_sync(runner.clone()),
        );
        let bus = builder.build();

        let report = bus.send(JobKind::Weekly, Event::End("/x".into()));

        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].to_string().contains("Sync of"));
    }
}
