use std::fmt;
use std::str::FromStr;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, EngineResult};

/// Robot joint. A7 is the external axis, recorded as `E1` in trajectory tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Axis {
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
    A7,
}

impl Axis {
    pub const ALL: [Axis; 7] = [
        Axis::A1,
        Axis::A2,
        Axis::A3,
        Axis::A4,
        Axis::A5,
        Axis::A6,
        Axis::A7,
    ];

    pub fn index(self) -> u8 {
        match self {
            Axis::A1 => 1,
            Axis::A2 => 2,
            Axis::A3 => 3,
            Axis::A4 => 4,
            Axis::A5 => 5,
            Axis::A6 => 6,
            Axis::A7 => 7,
        }
    }

    pub fn from_index(index: u8) -> EngineResult<Self> {
        Axis::ALL
            .get((index as usize).wrapping_sub(1))
            .copied()
            .ok_or_else(|| EngineError::Validation(format!("axis must be between 1 and 7, got {}", index)))
    }

    /// Column suffix used by trajectory tables (`Curr_A3`, `Curr_E1`)
    pub fn table_suffix(self) -> String {
        match self {
            Axis::A7 => "E1".to_string(),
            other => other.to_string(),
        }
    }

    pub fn current_column(self) -> String {
        format!("Curr_{}", self.table_suffix())
    }

    pub fn max_limit_column(self) -> String {
        format!("MAXCurr_{}", self.table_suffix())
    }

    pub fn min_limit_column(self) -> String {
        format!("MinCurr_{}", self.table_suffix())
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.index())
    }
}

impl FromStr for Axis {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('A')
            .or_else(|| trimmed.strip_prefix('a'))
            .unwrap_or(trimmed);
        if trimmed.eq_ignore_ascii_case("E1") {
            return Ok(Axis::A7);
        }
        let index: u8 = digits
            .parse()
            .map_err(|_| EngineError::Validation(format!("unknown axis '{}'", s)))?;
        Axis::from_index(index)
    }
}

/// Paging parameters shared by listing operations
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

fn default_page() -> u64 {
    1
}

fn default_page_size() -> u64 {
    50
}

pub const MAX_PAGE_SIZE: u64 = 500;

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

impl PageRequest {
    pub fn new(page: u64, page_size: u64) -> Self {
        Self { page, page_size }
    }

    /// Zero-based page index and a clamped page size
    pub fn normalized(self) -> (u64, u64) {
        (
            self.page.max(1) - 1,
            self.page_size.clamp(1, MAX_PAGE_SIZE),
        )
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

/// Inclusive time range; either bound may be open
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct TimeWindow {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn last(duration: Duration) -> Self {
        let now = Utc::now();
        Self {
            since: Some(now - duration),
            until: Some(now),
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        match (self.since, self.until) {
            (Some(since), Some(until)) if since > until => Err(EngineError::Validation(
                "window start must not be after its end".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Point in time `secs` from now. Budgets too large to represent have no
/// deadline.
pub fn deadline_after(secs: u64) -> Option<Instant> {
    Instant::now().checked_add(StdDuration::from_secs(secs))
}

pub fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

/// Caller identity attached to state-changing operations
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
    pub role: Option<String>,
}

pub const ADMIN_ROLE: &str = "admin";

impl Actor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: None,
        }
    }

    pub fn admin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: Some(ADMIN_ROLE.to_string()),
        }
    }

    /// Identity used by the CLI
    pub fn system() -> Self {
        Self::admin("system")
    }

    pub fn is_admin(&self) -> bool {
        self.role
            .as_deref()
            .map(|role| role.eq_ignore_ascii_case(ADMIN_ROLE))
            .unwrap_or(false)
    }

    pub fn require_admin(&self, operation: &str) -> EngineResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(EngineError::Forbidden(format!(
                "{} requires the admin role",
                operation
            )))
        }
    }
}
