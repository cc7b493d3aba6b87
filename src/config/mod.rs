//! Tunable constants for resolution behavior.
//!
//! Values ship with defaults and may be overlaid from a YAML file. None of
//! them change filter semantics; they tune timing margins and presentation
//! caps.

use crate::error::{QueryError, Result};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Safety margin applied when deciding whether a lower date bound lies in
/// the future at resolution time. Empirically tuned against clock skew
/// between client and store; not semantically derived.
pub const NULL_ACCEPT_SKEW_MS: i64 = 5000;

/// Margin added past a calendar boundary before a re-subscription wake-up
/// fires, so the boundary has passed on every clock involved.
pub const RESUBSCRIBE_MARGIN_MS: i64 = 500;

/// Default cap on how many display names a suggested filter name joins.
pub const NAME_SUGGEST_MAX: usize = 3;

/// First day of the week for week-unit arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekStart {
    #[default]
    Monday,
    Saturday,
    Sunday,
}

impl WeekStart {
    #[must_use]
    pub const fn weekday(self) -> Weekday {
        match self {
            Self::Monday => Weekday::Mon,
            Self::Saturday => Weekday::Sat,
            Self::Sunday => Weekday::Sun,
        }
    }
}

/// Resolution tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tunables {
    /// See [`NULL_ACCEPT_SKEW_MS`].
    pub null_accept_skew_ms: i64,
    /// See [`RESUBSCRIBE_MARGIN_MS`].
    pub resubscribe_margin_ms: i64,
    /// First day of the week for week-relative dates.
    pub week_start: WeekStart,
    /// See [`NAME_SUGGEST_MAX`].
    pub name_suggest_max: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            null_accept_skew_ms: NULL_ACCEPT_SKEW_MS,
            resubscribe_margin_ms: RESUBSCRIBE_MARGIN_MS,
            week_start: WeekStart::default(),
            name_suggest_max: NAME_SUGGEST_MAX,
        }
    }
}

impl Tunables {
    /// Load tunables from a YAML file, filling missing fields with
    /// defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let tunables: Self = serde_yaml::from_str(&text)?;
        tunables.validate()?;
        Ok(tunables)
    }

    fn validate(&self) -> Result<()> {
        if self.null_accept_skew_ms < 0 {
            return Err(QueryError::Config(
                "null_accept_skew_ms must be non-negative".to_string(),
            ));
        }
        if self.resubscribe_margin_ms < 0 {
            return Err(QueryError::Config(
                "resubscribe_margin_ms must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}
