use anyhow::Result;
use std::collections::HashMap;
use std::io::Read;
use uuid::Uuid;

use crate::application::{AppError, LedgerService};
use crate::domain::{
    AttendanceRecord, Member, MemberId, PaymentRecord, Sessions, name_key, normalize_nickname,
};
use crate::storage::{MemberBundle, MemberFieldUpdate, StoreCounts};

use super::{
    BACKUP_FORMAT_VERSION, Backup, MEMBER_NAME_HEADER, MEMBER_NICKNAME_HEADER,
    MEMBER_SESSIONS_HEADER,
};

/// Result of a member spreadsheet import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembersImport {
    /// Rows that matched a member and changed at least one field.
    pub updated: usize,
    /// Rows left alone: no matching member, or no cell with a usable value.
    pub skipped: usize,
}

/// Importer for loading data into the club ledger
pub struct Importer<'a> {
    service: &'a LedgerService,
}

impl<'a> Importer<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Replace the whole store with the contents of a JSON backup.
    ///
    /// The document is validated completely before anything is written, and
    /// the replacement runs in one transaction: a failing restore leaves the
    /// previous data in place. Members and records get fresh ids.
    pub async fn restore_backup_json<R: Read>(&self, reader: R) -> Result<StoreCounts> {
        let backup: Backup = serde_json::from_reader(reader)
            .map_err(|e| AppError::ImportFormat(format!("not a valid backup file: {}", e)))?;
        self.restore_backup(backup).await
    }

    /// Replace the whole store with an already parsed backup.
    pub async fn restore_backup(&self, backup: Backup) -> Result<StoreCounts> {
        if backup.version != BACKUP_FORMAT_VERSION {
            tracing::warn!(version = %backup.version, "restoring backup with unknown version");
        }

        let bundles = backup_to_bundles(backup)?;
        let repo = self.service.repository();
        repo.replace_all(&bundles).await?;

        let counts = repo.counts().await?;
        tracing::info!(
            members = counts.members,
            attendances = counts.attendances,
            payments = counts.payments,
            "restored backup"
        );
        Ok(counts)
    }

    /// Update nickname and session counter of existing members from a CSV
    /// member list.
    ///
    /// Rows are matched on the trimmed, lowercased full name. Empty nickname
    /// cells and non-integer session cells leave the field as it is. Nobody
    /// is created or deleted. All updates are applied in one transaction.
    pub async fn import_members_csv<R: Read>(&self, reader: R) -> Result<MembersImport> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| AppError::ImportFormat(format!("unreadable header row: {}", e)))?
            .clone();
        let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
        let name_col = column(MEMBER_NAME_HEADER).ok_or_else(|| {
            AppError::ImportFormat(format!("missing '{}' column", MEMBER_NAME_HEADER))
        })?;
        let nickname_col = column(MEMBER_NICKNAME_HEADER);
        let sessions_col = column(MEMBER_SESSIONS_HEADER);

        let mut by_key: HashMap<String, MemberId> = HashMap::new();
        for member in self.service.list_members(None).await? {
            by_key.entry(member.match_key()).or_insert(member.id);
        }

        let mut rows = 0;
        let mut skipped = 0;
        let mut updates = Vec::new();

        for (line_num, result) in csv_reader.records().enumerate() {
            let line = line_num + 2; // +2 for header and 0-indexing
            rows += 1;

            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(line, error = %e, "skipping unreadable row");
                    skipped += 1;
                    continue;
                }
            };

            let name = record.get(name_col).unwrap_or("");
            let matched = if name.is_empty() {
                None
            } else {
                by_key.get(&name_key(name))
            };
            let Some(member_id) = matched else {
                tracing::debug!(line, name, "no matching member");
                skipped += 1;
                continue;
            };

            let nickname = nickname_col.and_then(|c| normalize_nickname(record.get(c)));
            let remaining_sessions = sessions_col
                .and_then(|c| record.get(c))
                .and_then(parse_session_cell);
            if nickname.is_none() && remaining_sessions.is_none() {
                tracing::debug!(line, name, "row changes nothing");
                skipped += 1;
                continue;
            }

            updates.push(MemberFieldUpdate {
                member_id: *member_id,
                nickname,
                remaining_sessions,
            });
        }

        if rows == 0 {
            return Err(AppError::ImportFormat("the file has no rows".to_string()).into());
        }
        if updates.is_empty() {
            return Err(AppError::ImportFormat(
                "no row matched a registered member with a value to update".to_string(),
            )
            .into());
        }

        self.service
            .repository()
            .apply_field_updates(&updates)
            .await?;

        tracing::info!(updated = updates.len(), skipped, "imported member list");
        Ok(MembersImport {
            updated: updates.len(),
            skipped,
        })
    }
}

/// Validate every student and turn the backup into storable bundles.
fn backup_to_bundles(backup: Backup) -> Result<Vec<MemberBundle>, AppError> {
    backup
        .students
        .into_iter()
        .enumerate()
        .map(|(index, student)| {
            let position = index + 1;
            let mut member = Member::new(&student.name, student.nickname.as_deref())
                .map_err(|e| AppError::ImportFormat(format!("student #{}: {}", position, e)))?;
            member.remaining_sessions = student.remaining_sessions;

            let payments = student
                .payments
                .into_iter()
                .map(|p| {
                    if p.amount <= 0 || p.sessions_added <= 0 {
                        return Err(AppError::ImportFormat(format!(
                            "student #{} ({}): payment amount and sessions must be positive",
                            position, member.name
                        )));
                    }
                    Ok(PaymentRecord {
                        id: Uuid::new_v4(),
                        member_id: member.id,
                        amount: p.amount,
                        sessions_added: p.sessions_added,
                        paid_at: p.date,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let attendances = student
                .attendances
                .into_iter()
                .map(|a| AttendanceRecord::new(member.id, a.date))
                .collect();

            Ok(MemberBundle {
                member,
                attendances,
                payments,
            })
        })
        .collect()
}

/// Integer session counts only; anything else leaves the counter alone.
fn parse_session_cell(cell: &str) -> Option<Sessions> {
    let cell = cell.trim();
    if let Ok(sessions) = cell.parse::<Sessions>() {
        return Some(sessions);
    }
    // Spreadsheet tools like to write whole numbers as "4.0"
    cell.parse::<f64>()
        .ok()
        .filter(|v| v.fract() == 0.0 && v.is_finite())
        .map(|v| v as Sessions)
}
