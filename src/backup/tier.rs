//! Retention tiers and their per-tier settings.

use crate::backup::result_error::error::Error;
use bon::Builder;
use derive_more::Display;
use getset::Getters;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize};
use serde_with::skip_serializing_none;
use std::fmt::Formatter;
use std::result;
use std::str::FromStr;
use std::time::Duration;

/// A retention category, each with its own directory under the backup store.
#[derive(
    Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[display("hourly")]
    Hourly,
    #[display("daily")]
    Daily,
    #[display("weekly")]
    Weekly,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Hourly, Tier::Daily, Tier::Weekly];

    /// Name of the tier directory under the backup store root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Tier::Hourly => "hourly",
            Tier::Daily => "daily",
            Tier::Weekly => "weekly",
        }
    }
}

/// Remote location a tier directory is mirrored to, e.g. `s3://bucket-name/`.
#[derive(Clone, Debug, Display, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct RemoteDestination(String);

impl RemoteDestination {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RemoteDestination {
    type Err = Error;

    fn from_str(s: &str) -> result::Result<Self, Self::Err> {
        match s.split_once("://") {
            Some((scheme, rest))
                if !scheme.is_empty()
                    && !rest.is_empty()
                    && scheme.chars().all(|c| c.is_ascii_alphanumeric()) =>
            {
                Ok(RemoteDestination(s.to_string()))
            }
            _ => Err(Error::invalid_remote(s)),
        }
    }
}

struct RemoteDestinationVisitor;

impl Visitor<'_> for RemoteDestinationVisitor {
    type Value = RemoteDestination;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a remote destination like \"s3://bucket-name/\"")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.parse().map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for RemoteDestination {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(RemoteDestinationVisitor)
    }
}

/// Settings for one tier. A tier without `remote` is kept local only, a tier
/// without `retention` is never pruned.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct TierConfig {
    #[serde(default)]
    remote: Option<RemoteDestination>,
    #[serde(default, with = "humantime_serde")]
    retention: Option<Duration>,
}

/// Per-tier settings for all three tiers.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Builder)]
#[serde(deny_unknown_fields)]
pub struct TierConfigs {
    #[serde(default)]
    #[builder(default)]
    pub hourly: TierConfig,
    #[serde(default)]
    #[builder(default)]
    pub daily: TierConfig,
    #[serde(default)]
    #[builder(default)]
    pub weekly: TierConfig,
}

impl TierConfigs {
    pub fn get(&self, tier: Tier) -> &TierConfig {
        match tier {
            Tier::Hourly => &self.hourly,
            Tier::Daily => &self.daily,
            Tier::Weekly => &self.weekly,
        }
    }
}
