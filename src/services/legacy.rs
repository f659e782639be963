//! Retired weekly-result staging surface.
//!
//! Statistics, file listing, sync and staging of weekly results were replaced
//! by the CSV import pipeline. Every entry point answers `Removed` without
//! touching storage.

use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::errors::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegacyEndpoint {
    Stats,
    Files,
    Sync,
    Stage,
}

impl LegacyEndpoint {
    pub const ALL: [LegacyEndpoint; 4] = [
        LegacyEndpoint::Stats,
        LegacyEndpoint::Files,
        LegacyEndpoint::Sync,
        LegacyEndpoint::Stage,
    ];

    pub fn path(self) -> &'static str {
        match self {
            LegacyEndpoint::Stats => "weekly-results/stats",
            LegacyEndpoint::Files => "weekly-results/files",
            LegacyEndpoint::Sync => "weekly-results/sync",
            LegacyEndpoint::Stage => "weekly-results/stage",
        }
    }

    /// The only outcome of calling a retired endpoint
    pub fn invoke(self) -> EngineError {
        warn!("Call to removed endpoint {}", self.path());
        EngineError::Removed {
            endpoint: self.path().to_string(),
        }
    }
}

impl fmt::Display for LegacyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for LegacyEndpoint {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stats" => Ok(LegacyEndpoint::Stats),
            "files" => Ok(LegacyEndpoint::Files),
            "sync" => Ok(LegacyEndpoint::Sync),
            "stage" => Ok(LegacyEndpoint::Stage),
            other => Err(EngineError::not_found("endpoint", other)),
        }
    }
}
