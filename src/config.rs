//! Runtime configuration shared by the service and the CLI.

use chrono::FixedOffset;

use crate::domain::default_offset;

/// Default number of optimistic attempts for a ledger mutation.
pub const DEFAULT_MAX_UPDATE_ATTEMPTS: u32 = 16;

/// Club configuration
#[derive(Debug, Clone, Copy)]
pub struct ClubConfig {
    /// Wall clock of the pool; decides "today" and class slots.
    pub utc_offset: FixedOffset,
    /// Attempt budget for `with_atomic_update` before giving up.
    pub max_update_attempts: u32,
}

impl Default for ClubConfig {
    fn default() -> Self {
        Self {
            utc_offset: default_offset(),
            max_update_attempts: DEFAULT_MAX_UPDATE_ATTEMPTS,
        }
    }
}

impl ClubConfig {
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    pub fn with_max_update_attempts(mut self, attempts: u32) -> Self {
        self.max_update_attempts = attempts.max(1);
        self
    }
}
