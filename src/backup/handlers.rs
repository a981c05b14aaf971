//! Logging observers for lifecycle events.

use crate::backup::events::{Channel, Event, EventBusBuilder, JobKind, Phase};
use crate::backup::result_error::result::Result;
use tracing::{error, info};

pub fn log_backupter_start(_channel: Channel, event: &Event) -> Result<()> {
    if let Event::Start(statement) = event {
        info!("Going to execute a new backup doing: {}", statement);
    }
    Ok(())
}

pub fn log_backupter_end(_channel: Channel, event: &Event) -> Result<()> {
    if let Some(path) = event.path() {
        let size = std::fs::metadata(path)?.len();
        info!("Finished backup at {:?} with a size of {} bytes.", path, size);
    }
    Ok(())
}

pub fn log_job_event(channel: Channel, event: &Event) -> Result<()> {
    match event {
        Event::Start(what) => info!("{channel}: {what}"),
        Event::End(path) => info!("{channel}: {:?}", path),
        Event::Error(why) => error!("{channel}:\n{}", indent::indent_all_with("  ", why)),
    }
    Ok(())
}

/// Registers the logging observers on every channel.
pub fn register_logging(builder: &mut EventBusBuilder) {
    builder
        .register(
            Channel::new(JobKind::Backupter, Phase::Start),
            log_backupter_start,
        )
        .register(
            Channel::new(JobKind::Backupter, Phase::End),
            log_backupter_end,
        )
        .register(
            Channel::new(JobKind::Backupter, Phase::Error),
            log_job_event,
        );
    for kind in [JobKind::Hourly, JobKind::Daily, JobKind::Weekly] {
        for phase in [Phase::Start, Phase::End, Phase::Error] {
            builder.register(Channel::new(kind, phase), log_job_event);
        }
    }
}
