use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Sessions;

pub type MemberId = Uuid;

/// A registered club member.
///
/// `remaining_sessions` is the authoritative counter. Attendance and payment
/// histories are audit logs next to it and are not guaranteed to sum to it,
/// since manual corrections overwrite the counter without a history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub nickname: Option<String>,
    pub remaining_sessions: Sessions,
    pub created_at: DateTime<Utc>,
}

impl Member {
    /// New members start with zero credits.
    pub fn new(name: &str, nickname: Option<&str>) -> Result<Self, InvalidMember> {
        Ok(Self {
            id: Uuid::new_v4(),
            name: normalize_name(name)?,
            nickname: normalize_nickname(nickname),
            remaining_sessions: 0,
            created_at: Utc::now(),
        })
    }

    /// Nickname if set, full name otherwise.
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.name)
    }

    /// Key used when matching names coming from spreadsheets or the CLI.
    pub fn match_key(&self) -> String {
        name_key(&self.name)
    }

    /// Case-insensitive substring match on name or nickname.
    pub fn matches_search(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&query)
            || self
                .nickname
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(&query))
    }
}

/// Trim a full name and reject empty ones.
pub fn normalize_name(name: &str) -> Result<String, InvalidMember> {
    let name = name.trim();
    if name.is_empty() {
        return Err(InvalidMember::EmptyName);
    }
    Ok(name.to_string())
}

/// Trim a nickname; blank nicknames are treated as absent.
pub fn normalize_nickname(nickname: Option<&str>) -> Option<String> {
    nickname
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

/// Lowercased, trimmed name.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidMember {
    EmptyName,
}

impl fmt::Display for InvalidMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidMember::EmptyName => write!(f, "member name must not be empty"),
        }
    }
}

impl std::error::Error for InvalidMember {}
