//! Process-wide enforcement mode

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

/// How the guard acts on its decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnforcementMode {
    /// Skip the guard entirely
    Disabled,
    /// Evaluate and audit, never reject on the decision
    DryRun,
    /// Evaluate, audit, and reject denied requests
    #[default]
    Enforce,
}

impl EnforcementMode {
    pub fn as_str(self) -> &'static str {
        match self {
            EnforcementMode::Disabled => "disabled",
            EnforcementMode::DryRun => "dry-run",
            EnforcementMode::Enforce => "enforce",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            EnforcementMode::Disabled => 0,
            EnforcementMode::DryRun => 1,
            EnforcementMode::Enforce => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => EnforcementMode::Disabled,
            1 => EnforcementMode::DryRun,
            _ => EnforcementMode::Enforce,
        }
    }
}

impl fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnforcementMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "off" => Ok(EnforcementMode::Disabled),
            "dry-run" | "dry_run" | "dryrun" => Ok(EnforcementMode::DryRun),
            "enforce" | "on" => Ok(EnforcementMode::Enforce),
            other => Err(format!("unknown enforcement mode '{}'", other)),
        }
    }
}

/// Shared, runtime-switchable enforcement mode.
///
/// Reads are a single atomic load so the guard can consult it on every request.
#[derive(Debug, Clone)]
pub struct EnforcementModeHandle {
    mode: Arc<AtomicU8>,
}

impl EnforcementModeHandle {
    pub fn new(mode: EnforcementMode) -> Self {
        Self {
            mode: Arc::new(AtomicU8::new(mode.to_u8())),
        }
    }

    pub fn get(&self) -> EnforcementMode {
        EnforcementMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Switch modes; returns the previous one
    pub fn set(&self, mode: EnforcementMode) -> EnforcementMode {
        let previous = EnforcementMode::from_u8(self.mode.swap(mode.to_u8(), Ordering::AcqRel));
        if previous != mode {
            info!(from = %previous, to = %mode, "Enforcement mode changed");
        }
        previous
    }
}

impl Default for EnforcementModeHandle {
    fn default() -> Self {
        Self::new(EnforcementMode::default())
    }
}
