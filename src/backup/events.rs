//! Lifecycle events and the synchronous event bus.
//!
//! Every [`JobKind`] owns a Start, End and Error channel. Handlers are
//! registered through [`EventBusBuilder`] once at start-up; the built
//! [`EventBus`] is immutable and only dispatches.
//!
//! Dispatch runs on the calling thread, one handler after another in
//! registration order. A handler returning `Err` is logged and the
//! remaining handlers still run; the failures are handed back to the
//! publisher in a [`DispatchReport`].

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::tier::Tier;
use derive_more::Display;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Who emits on a channel: the generic dump step or one of the tier jobs.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Display)]
pub enum JobKind {
    #[display("Backupter")]
    Backupter,
    #[display("HourlyBackup")]
    Hourly,
    #[display("DailyBackup")]
    Daily,
    #[display("WeeklyBackup")]
    Weekly,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::Backupter,
        JobKind::Hourly,
        JobKind::Daily,
        JobKind::Weekly,
    ];
}

impl From<Tier> for JobKind {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Hourly => JobKind::Hourly,
            Tier::Daily => JobKind::Daily,
            Tier::Weekly => JobKind::Weekly,
        }
    }
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Display)]
pub enum Phase {
    Start,
    End,
    Error,
}

/// A named channel such as `DailyBackupEnd`.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Display)]
#[display("{kind}{phase}")]
pub struct Channel {
    pub kind: JobKind,
    pub phase: Phase,
}

impl Channel {
    pub fn new(kind: JobKind, phase: Phase) -> Self {
        Self { kind, phase }
    }

    pub fn all() -> impl Iterator<Item = Channel> {
        JobKind::ALL.into_iter().flat_map(|kind| {
            [Phase::Start, Phase::End, Phase::Error]
                .into_iter()
                .map(move |phase| Channel::new(kind, phase))
        })
    }
}

/// Payload of a lifecycle event. The variant decides the phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// What is about to run, e.g. the rendered dump command.
    Start(String),
    /// The artifact the phase produced.
    End(PathBuf),
    /// Why the phase failed.
    Error(String),
}

impl Event {
    pub fn phase(&self) -> Phase {
        match self {
            Event::Start(_) => Phase::Start,
            Event::End(_) => Phase::End,
            Event::Error(_) => Phase::Error,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Event::End(path) => Some(path),
            _ => None,
        }
    }
}

pub trait EventHandler: Send + Sync {
    fn handle(&self, channel: Channel, event: &Event) -> Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(Channel, &Event) -> Result<()> + Send + Sync,
{
    fn handle(&self, channel: Channel, event: &Event) -> Result<()> {
        self(channel, event)
    }
}

/// Outcome of one `send`: how many handlers ran and which of them failed.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failures: Vec<Error>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        convert_error_vec(self.failures)
    }
}

type Handlers = HashMap<Channel, Vec<Arc<dyn EventHandler>>>;

/// Collects handler registrations. Every channel exists from the start, so
/// registering on or sending to a channel nobody listens on is fine.
pub struct EventBusBuilder {
    channels: Handlers,
}

impl Default for EventBusBuilder {
    fn default() -> Self {
        Self {
            channels: Channel::all().map(|c| (c, Vec::new())).collect(),
        }
    }
}

impl EventBusBuilder {
    pub fn register<H: EventHandler + 'static>(&mut self, channel: Channel, handler: H) -> &mut Self {
        self.register_shared(channel, Arc::new(handler))
    }

    /// Registers one handler instance on several channels.
    pub fn register_shared(&mut self, channel: Channel, handler: Arc<dyn EventHandler>) -> &mut Self {
        self.channels.entry(channel).or_default().push(handler);
        self
    }

    pub fn build(self) -> EventBus {
        EventBus {
            channels: self.channels,
        }
    }
}

pub struct EventBus {
    channels: Handlers,
}

impl Debug for EventBus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for channel in Channel::all() {
            map.entry(&channel.to_string(), &self.handler_count(channel));
        }
        map.finish()
    }
}

impl EventBus {
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::default()
    }

    pub fn handler_count(&self, channel: Channel) -> usize {
        self.channels.get(&channel).map_or(0, Vec::len)
    }

    /// Dispatches `event` on `kind`'s channel for the event's phase.
    pub fn send(&self, kind: JobKind, event: Event) -> DispatchReport {
        let channel = Channel::new(kind, event.phase());
        let mut report = DispatchReport::default();
        let Some(handlers) = self.channels.get(&channel) else {
            return report;
        };

        for handler in handlers {
            report.delivered += 1;
            if let Err(e) = handler.handle(channel, &event) {
                tracing::warn!("Handler on {channel} failed, continuing:\n{e}");
                report.failures.push(e);
            }
        }
        report
    }
}
