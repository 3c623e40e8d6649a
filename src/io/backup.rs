use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Rupiah, Sessions};

/// Format tag written into every backup.
pub const BACKUP_FORMAT_VERSION: &str = "1.0";

/// Full club backup: every member with its payment and attendance history.
///
/// Field names follow the JSON layout older backups were written in, so
/// those files restore without conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub version: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    pub students: Vec<BackupStudent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStudent {
    /// Informational only; restore assigns fresh ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub remaining_sessions: Sessions,
    #[serde(default)]
    pub payments: Vec<BackupPayment>,
    #[serde(default)]
    pub attendances: Vec<BackupAttendance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPayment {
    pub amount: Rupiah,
    pub sessions_added: Sessions,
    #[serde(with = "backup_date")]
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupAttendance {
    #[serde(with = "backup_date")]
    pub date: DateTime<Utc>,
}

/// Dates are written as RFC 3339 strings. On read, the `{seconds,
/// nanoseconds}` object found in older backups is accepted as well.
mod backup_date {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDate {
        Text(String),
        Epoch {
            #[serde(alias = "_seconds")]
            seconds: i64,
            #[serde(default, alias = "_nanoseconds")]
            nanoseconds: u32,
        },
    }

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        match RawDate::deserialize(deserializer)? {
            RawDate::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                .map(|at| at.with_timezone(&Utc))
                .map_err(|e| de::Error::custom(format!("invalid date '{}': {}", s, e))),
            RawDate::Epoch {
                seconds,
                nanoseconds,
            } => DateTime::from_timestamp(seconds, nanoseconds)
                .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {}", seconds))),
        }
    }
}
