//! Job entrypoints: one backup run of a database into a retention tier.
//!
//! A run goes `lock tier -> tier Start -> dump -> place into tier ->
//! prune -> tier End`. Any failure up to and including placement aborts
//! the run, emits the tier Error event and is returned to the caller; tier
//! End is only emitted for an artifact that reached its tier directory.
//! Failures of End observers (remote sync) are re-published on the tier
//! Error channel without failing the run.

use crate::backup::backupter_config::BackupterConfig;
use crate::backup::dump::{BackupRequest, DumpExecutor};
use crate::backup::events::{Event, EventBus, JobKind};
use crate::backup::function_path;
use crate::backup::lock::TierLock;
use crate::backup::process::CommandRunner;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithFnName, WithMsg};
use crate::backup::retention::{prune_expired, retain_artifact};
use crate::backup::tier::Tier;
use chrono::{DateTime, Local, NaiveDate};
use function_name::named;
use itertools::Itertools;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use validator::Validate;

pub struct Backupter {
    config: BackupterConfig,
    bus: EventBus,
    runner: Arc<dyn CommandRunner>,
}

impl Backupter {
    /// Wires the standard observers from `config`.
    pub fn new(config: BackupterConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let bus = config.event_bus_builder(runner.clone()).build();
        Self::with_bus(config, runner, bus)
    }

    pub fn with_bus(config: BackupterConfig, runner: Arc<dyn CommandRunner>, bus: EventBus) -> Self {
        Self {
            config,
            bus,
            runner,
        }
    }

    pub fn config(&self) -> &BackupterConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn hourly(&self, request: &BackupRequest) -> Result<PathBuf> {
        self.run(Tier::Hourly, request, Local::now().date_naive())
    }

    pub fn daily(&self, request: &BackupRequest) -> Result<PathBuf> {
        self.run(Tier::Daily, request, Local::now().date_naive())
    }

    pub fn weekly(&self, request: &BackupRequest) -> Result<PathBuf> {
        self.run(Tier::Weekly, request, Local::now().date_naive())
    }

    /// Backs `request` up into `tier`, naming the artifact after `date`.
    /// Returns the artifact's path inside the tier directory.
    #[named]
    pub fn run(&self, tier: Tier, request: &BackupRequest, date: NaiveDate) -> Result<PathBuf> {
        let kind = JobKind::from(tier);
        let res = request
            .validate()
            .map_err(Error::from)
            .and_then(|_| TierLock::acquire(&self.config.store_dir(), tier))
            .and_then(|_lock| self.run_locked(kind, tier, request, date))
            .with_msg(format!(
                "{} backup of database {:?} failed",
                tier,
                request.database()
            ))
            .with_fn_name(function_path!());

        if let Err(e) = &res {
            self.bus.send(kind, Event::Error(e.to_string()));
        }
        res
    }

    fn run_locked(
        &self,
        kind: JobKind,
        tier: Tier,
        request: &BackupRequest,
        date: NaiveDate,
    ) -> Result<PathBuf> {
        self.bus.send(
            kind,
            Event::Start(format!(
                "{} backup of database {:?} as {:?}",
                tier,
                request.database(),
                request.as_username()
            )),
        );

        let artifact = DumpExecutor::new(
            self.config.tools(),
            self.config.scratch_dir().as_deref(),
            self.runner.as_ref(),
            &self.bus,
        )
        .execute(request)?;

        let tier_dir = self.config.tier_dir(tier);
        let retained = match retain_artifact(&artifact, &tier_dir, request.database(), date) {
            Ok(retained) => retained,
            Err(e) => {
                if artifact.exists() {
                    if let Err(e2) = std::fs::remove_file(&artifact) {
                        warn!("Failed to remove scratch artifact {:?}: {}", artifact, e2);
                    }
                }
                return Err(e);
            }
        };

        if let Some(retention) = self.config.tiers().get(tier).retention() {
            match prune_expired(&tier_dir, request.database(), date, *retention) {
                Ok(removed) if !removed.is_empty() => {
                    info!("Pruned {} expired {} artifact(s)", removed.len(), tier)
                }
                Ok(_) => {}
                Err(e) => warn!("Pruning {:?} failed:\n{}", tier_dir, e),
            }
        }

        let report = self.bus.send(kind, Event::End(retained.clone()));
        if !report.is_clean() {
            let why = report.failures.iter().map(|e| e.to_string()).join("\n\n");
            self.bus.send(kind, Event::Error(why));
        }

        Ok(retained)
    }

    /// Fires the configured schedules forever, one job at a time. A failed
    /// job is logged and the loop carries on; only an unusable schedule ends
    /// it.
    pub fn start_loop(&self) -> Result<()> {
        let schedules = self.config.schedules();
        let now = Local::now();
        let mut next: Vec<DateTime<Local>> = schedules
            .iter()
            .map(|s| s.next_after(&now))
            .try_collect()?;

        loop {
            let (idx, due) = next
                .iter()
                .copied()
                .enumerate()
                .min_by_key(|(_, due)| *due)
                .ok_or_else(Error::nothing_scheduled)?;
            let now = Local::now();
            if now < due {
                info!("Sleeping until {due}");
                std::thread::sleep((due - now).to_std().unwrap_or_default());
                continue;
            }

            let schedule = &schedules[idx];
            info!(
                "Running scheduled {} backup of {:?}",
                schedule.tier(),
                schedule.database()
            );
            match self.run(*schedule.tier(), &schedule.request(), now.date_naive()) {
                Ok(path) => info!("Created backup file: {:?}", path),
                Err(e) => error!("{e}"),
            }
            next[idx] = schedule.next_after(&Local::now())?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::backupter_config::{alert_channels, ToolPaths};
    use crate::backup::events::{Channel, Phase};
    use crate::backup::process::testing::RecordingRunner;
    use crate::backup::tier::{TierConfig, TierConfigs};
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    type Seen = Arc<Mutex<Vec<(Channel, Event)>>>;

    struct Fixture {
        root: TempDir,
        runner: Arc<RecordingRunner>,
        seen: Seen,
        backupter: Backupter,
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fixture(tiers: TierConfigs) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let scratch = root.path().join("scratch");
        std::fs::create_dir_all(&scratch).unwrap();
        let config = BackupterConfig::builder()
            .root_dir(root.path())
            .scratch_dir(scratch)
            .tools(ToolPaths::default())
            .tiers(tiers)
            .build();
        config.bootstrap().unwrap();

        let runner = Arc::new(RecordingRunner::with_output("-- pg_dump output\n"));
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let mut builder = config.event_bus_builder(runner.clone());
        for channel in Channel::all() {
            let seen = seen.clone();
            builder.register(channel, move |channel: Channel, event: &Event| -> Result<()> {
                seen.lock().unwrap().push((channel, event.clone()));
                Ok(())
            });
        }
        let backupter = Backupter::with_bus(config, runner.clone(), builder.build());

        Fixture {
            root,
            runner,
            seen,
            backupter,
        }
    }

    fn synced_tiers() -> TierConfigs {
        let remote = || {
            TierConfig::builder()
                .remote("s3://bucket-name/".parse().unwrap())
                .build()
        };
        TierConfigs::builder()
            .hourly(remote())
            .daily(remote())
            .weekly(remote())
            .build()
    }

    fn channels(seen: &Seen) -> Vec<String> {
        seen.lock()
            .unwrap()
            .iter()
            .map(|(c, _)| c.to_string())
            .collect()
    }

    fn scratch_is_empty(f: &Fixture) -> bool {
        std::fs::read_dir(f.root.path().join("scratch")).unwrap().count() == 0
    }

    #[test]
    fn test_daily_backup_places_artifact_and_syncs_once() {
        let f = fixture(synced_tiers());

        let path = f
            .backupter
            .run(Tier::Daily, &BackupRequest::new("orders"), date(2024, 3, 1))
            .unwrap();

        let daily_dir = f.root.path().join("backups/daily");
        assert_eq!(path, daily_dir.join("orders-2024-03-01.dump.sql"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "-- pg_dump output\n");
        assert!(scratch_is_empty(&f));

        let syncs = f.runner.calls_to("s3cmd");
        assert_eq!(syncs.len(), 1);
        assert_eq!(
            syncs[0].to_string(),
            format!("s3cmd sync {} s3://bucket-name/", daily_dir.display())
        );
        assert_eq!(f.runner.calls_to("sudo").len(), 1);
    }

    #[test]
    fn test_event_order_and_tier_end_carries_final_path() {
        let f = fixture(TierConfigs::default());

        let path = f
            .backupter
            .run(Tier::Weekly, &BackupRequest::new("orders"), date(2024, 3, 1))
            .unwrap();

        assert_eq!(
            channels(&f.seen),
            vec![
                "WeeklyBackupStart",
                "BackupterStart",
                "BackupterEnd",
                "WeeklyBackupEnd"
            ]
        );
        let seen = f.seen.lock().unwrap();
        let Event::End(generic_end) = &seen[2].1 else {
            panic!("Expected End event, got {:?}", seen[2].1)
        };
        assert!(generic_end.starts_with(f.root.path().join("scratch")));
        assert_eq!(seen[3].1, Event::End(path));
    }

    #[test]
    fn test_same_day_rerun_keeps_one_file_with_second_contents() {
        let f = fixture(TierConfigs::default());
        let request = BackupRequest::new("orders");

        f.backupter.run(Tier::Daily, &request, date(2024, 3, 1)).unwrap();
        f.runner.set_output("second");
        let path = f.backupter.run(Tier::Daily, &request, date(2024, 3, 1)).unwrap();

        let files: Vec<_> = std::fs::read_dir(f.root.path().join("backups/daily"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files, vec![path.clone()]);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), "second".len() as u64);
    }

    #[test]
    fn test_unwritable_tier_dir_aborts_before_end_and_sync() {
        let f = fixture(synced_tiers());
        std::fs::write(f.root.path().join("backups/daily"), b"in the way").unwrap();

        let res = f
            .backupter
            .run(Tier::Daily, &BackupRequest::new("orders"), date(2024, 3, 1));

        assert!(res.is_err());
        let channels = channels(&f.seen);
        assert!(!channels.contains(&"DailyBackupEnd".to_string()));
        assert_eq!(channels.last().unwrap(), "DailyBackupError");
        assert!(f.runner.calls_to("s3cmd").is_empty());
        assert!(scratch_is_empty(&f));
        assert!(!f.root.path().join("backups/daily.lock").exists());
    }

    #[test]
    fn test_failed_dump_aborts_with_error_events() {
        let f = fixture(synced_tiers());
        f.runner.fail_program("sudo");

        let err = f
            .backupter
            .run(Tier::Hourly, &BackupRequest::new("orders"), date(2024, 3, 1))
            .unwrap_err();

        assert!(err.to_string().contains("hourly backup of database \"orders\" failed"));
        assert_eq!(
            channels(&f.seen),
            vec![
                "HourlyBackupStart",
                "BackupterStart",
                "BackupterError",
                "HourlyBackupError"
            ]
        );
        assert!(!f.root.path().join("backups/hourly").exists());
        assert!(f.runner.calls_to("s3cmd").is_empty());
        assert!(scratch_is_empty(&f));
    }

    #[test]
    fn test_failed_dump_alerts_once() {
        let f = fixture(TierConfigs::default());
        let alerts = Arc::new(Mutex::new(0usize));
        let mut builder = f.backupter.config().event_bus_builder(f.runner.clone());
        for channel in alert_channels() {
            let alerts = alerts.clone();
            builder.register(channel, move |_: Channel, _: &Event| -> Result<()> {
                *alerts.lock().unwrap() += 1;
                Ok(())
            });
        }
        let backupter = Backupter::with_bus(
            f.backupter.config().clone(),
            f.runner.clone(),
            builder.build(),
        );
        f.runner.fail_program("sudo");

        assert!(backupter
            .run(Tier::Hourly, &BackupRequest::new("orders"), date(2024, 3, 1))
            .is_err());
        assert_eq!(*alerts.lock().unwrap(), 1);
    }

    #[test]
    fn test_sync_failure_emits_tier_error_but_job_succeeds() {
        let f = fixture(synced_tiers());
        f.runner.fail_program("s3cmd");

        let path = f
            .backupter
            .run(Tier::Daily, &BackupRequest::new("orders"), date(2024, 3, 1))
            .unwrap();

        assert!(path.exists());
        let seen = f.seen.lock().unwrap();
        let (channel, event) = seen.last().unwrap();
        assert_eq!(channel.to_string(), "DailyBackupError");
        assert_eq!(channel.phase, Phase::Error);
        let Event::Error(why) = event else {
            panic!("Expected Error event, got {event:?}")
        };
        assert!(why.contains("Sync of"));
    }

    #[test]
    fn test_locked_tier_is_rejected_without_dumping() {
        let f = fixture(TierConfigs::default());
        let store = f.backupter.config().store_dir();
        let _held = TierLock::acquire(&store, Tier::Daily).unwrap();

        let err = f
            .backupter
            .run(Tier::Daily, &BackupRequest::new("orders"), date(2024, 3, 1))
            .unwrap_err();

        assert!(err.to_string().contains("already running"));
        assert!(f.runner.calls().is_empty());
        assert_eq!(channels(&f.seen), vec!["DailyBackupError"]);

        assert!(f
            .backupter
            .run(Tier::Weekly, &BackupRequest::new("orders"), date(2024, 3, 1))
            .is_ok());
    }

    #[test]
    fn test_invalid_request_is_rejected_without_dumping() {
        let f = fixture(TierConfigs::default());

        let res = f
            .backupter
            .run(Tier::Daily, &BackupRequest::new("../etc"), date(2024, 3, 1));

        assert!(res.is_err());
        assert!(f.runner.calls().is_empty());
    }

    #[test]
    fn test_retention_prunes_old_artifacts_of_same_database() {
        let tiers = TierConfigs::builder()
            .daily(
                TierConfig::builder()
                    .retention(Duration::from_secs(7 * 24 * 60 * 60))
                    .build(),
            )
            .build();
        let f = fixture(tiers);
        let daily_dir = f.root.path().join("backups/daily");
        std::fs::create_dir_all(&daily_dir).unwrap();
        for name in [
            "orders-2024-02-01.dump.sql",
            "orders-2024-02-25.dump.sql",
            "users-2024-02-01.dump.sql",
        ] {
            std::fs::write(daily_dir.join(name), b"old").unwrap();
        }

        f.backupter
            .run(Tier::Daily, &BackupRequest::new("orders"), date(2024, 3, 1))
            .unwrap();

        let exists = |name: &str| daily_dir.join(name).exists();
        assert!(!exists("orders-2024-02-01.dump.sql"));
        assert!(exists("orders-2024-02-25.dump.sql"));
        assert!(exists("users-2024-02-01.dump.sql"));
        assert!(exists("orders-2024-03-01.dump.sql"));
    }

    #[test]
    fn test_entrypoints_use_their_own_tier() {
        let f = fixture(TierConfigs::default());
        let request = BackupRequest::new("orders");

        let hourly = f.backupter.hourly(&request).unwrap();
        let daily = f.backupter.daily(&request).unwrap();
        let weekly = f.backupter.weekly(&request).unwrap();

        let store = f.root.path().join("backups");
        assert_eq!(hourly.parent(), Some(store.join("hourly").as_path()));
        assert_eq!(daily.parent(), Some(store.join("daily").as_path()));
        assert_eq!(weekly.parent(), Some(store.join("weekly").as_path()));
        assert!(Path::new(&hourly).exists());
    }

    #[test]
    fn test_start_loop_without_schedules_fails() {
        let f = fixture(TierConfigs::default());
        assert!(matches!(
            f.backupter.start_loop(),
            Err(Error::NothingScheduled)
        ));
    }
}
