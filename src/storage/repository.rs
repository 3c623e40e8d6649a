use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    AttendanceRecord, LedgerChange, LedgerEntry, Member, MemberId, PaymentRecord, Rupiah, Sessions,
};

use super::MIGRATION_001_INITIAL;

const MEMBER_COLUMNS: &str = "id, name, nickname, remaining_sessions, version, created_at";

/// Outcome of [`Repository::with_atomic_update`].
#[derive(Debug)]
pub enum AtomicUpdate {
    /// Counter and history row were committed together.
    Committed {
        member: Member,
        change: LedgerChange,
        attempts: u32,
    },
    /// The member does not exist (or was deleted while we retried).
    MemberMissing,
    /// Every attempt lost the race against another writer.
    Exhausted { attempts: u32 },
}

/// A member together with its histories, as written by a full restore.
#[derive(Debug, Clone)]
pub struct MemberBundle {
    pub member: Member,
    pub attendances: Vec<AttendanceRecord>,
    pub payments: Vec<PaymentRecord>,
}

/// Field-level update coming from a spreadsheet. `None` leaves a field as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberFieldUpdate {
    pub member_id: MemberId,
    pub nickname: Option<String>,
    pub remaining_sessions: Option<Sessions>,
}

/// Sum of payments for one member.
#[derive(Debug, Clone)]
pub struct MemberPaymentTotal {
    pub member_id: MemberId,
    pub member_name: String,
    pub total_amount: Rupiah,
    pub payment_count: i64,
}

/// Row counts, for summaries after backup and restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    pub members: i64,
    pub attendances: i64,
    pub payments: i64,
}

/// Repository for persisting members and their attendance/payment histories.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL (`sqlite:path`, `?mode=rwc` to create).
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Member operations
    // ========================

    /// Save a new member.
    pub async fn save_member(&self, member: &Member) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        Self::insert_member(&mut conn, member).await
    }

    /// Get a member by ID.
    pub async fn get_member(&self, id: MemberId) -> Result<Option<Member>> {
        Ok(self.get_member_versioned(id).await?.map(|(member, _)| member))
    }

    async fn get_member_versioned(&self, id: MemberId) -> Result<Option<(Member, i64)>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM members WHERE id = ?",
            MEMBER_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch member")?;

        row.as_ref().map(Self::row_to_member).transpose()
    }

    /// List all members, ordered by name.
    pub async fn list_members(&self) -> Result<Vec<Member>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM members ORDER BY name COLLATE NOCASE, created_at",
            MEMBER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list members")?;

        rows.iter()
            .map(|row| Self::row_to_member(row).map(|(member, _)| member))
            .collect()
    }

    /// Change identity fields. Returns false if the member does not exist.
    pub async fn update_member_identity(
        &self,
        id: MemberId,
        name: &str,
        nickname: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE members SET name = ?, nickname = ? WHERE id = ?")
            .bind(name)
            .bind(nickname)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update member")?;
        Ok(result.rows_affected() > 0)
    }

    /// Overwrite the session counter without writing history.
    ///
    /// Bumps the row version, so an atomic update racing with this one
    /// re-reads instead of committing against the old value.
    pub async fn set_remaining_sessions(&self, id: MemberId, sessions: Sessions) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE members SET remaining_sessions = ?, version = version + 1 WHERE id = ?",
        )
        .bind(sessions)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to set remaining sessions")?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a member. Histories go with it.
    pub async fn delete_member(&self, id: MemberId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM members WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete member")?;
        Ok(result.rows_affected() > 0)
    }

    /// Read-modify-write of a member's counter plus one history append.
    ///
    /// `apply` sees the current member and returns the new counter and entry.
    /// The write is conditional on the version read; if another writer got
    /// there first the transaction is rolled back and `apply` runs again on
    /// a fresh read, at most `max_attempts` times.
    pub async fn with_atomic_update<F>(
        &self,
        id: MemberId,
        max_attempts: u32,
        mut apply: F,
    ) -> Result<AtomicUpdate>
    where
        F: FnMut(&Member) -> LedgerChange,
    {
        let max_attempts = max_attempts.max(1);
        let id_str = id.to_string();

        for attempt in 1..=max_attempts {
            let Some((mut member, version)) = self.get_member_versioned(id).await? else {
                return Ok(AtomicUpdate::MemberMissing);
            };
            let change = apply(&member);

            let mut tx = self
                .pool
                .begin()
                .await
                .context("Failed to begin transaction")?;

            let updated = sqlx::query(
                "UPDATE members SET remaining_sessions = ?, version = version + 1 WHERE id = ? AND version = ?",
            )
            .bind(change.remaining_sessions)
            .bind(&id_str)
            .bind(version)
            .execute(&mut *tx)
            .await
            .context("Failed to update remaining sessions")?
            .rows_affected();

            if updated == 0 {
                tx.rollback()
                    .await
                    .context("Failed to roll back transaction")?;
                if attempt < max_attempts {
                    let delay = retry_delay(attempt);
                    tracing::debug!(member_id = %id, attempt, ?delay, "version changed under us, retrying");
                    tokio::time::sleep(delay).await;
                }
                continue;
            }

            Self::insert_entry(&mut tx, &change.entry).await?;

            tx.commit()
                .await
                .context("Failed to commit ledger update")?;

            member.remaining_sessions = change.remaining_sessions;
            return Ok(AtomicUpdate::Committed {
                member,
                change,
                attempts: attempt,
            });
        }

        Ok(AtomicUpdate::Exhausted {
            attempts: max_attempts,
        })
    }

    /// Apply spreadsheet updates in one transaction. Returns rows touched.
    pub async fn apply_field_updates(&self, updates: &[MemberFieldUpdate]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let mut touched = 0;
        for update in updates {
            let result = sqlx::query(
                r#"
                UPDATE members
                SET nickname = COALESCE(?, nickname),
                    remaining_sessions = COALESCE(?, remaining_sessions),
                    version = version + 1
                WHERE id = ?
                "#,
            )
            .bind(&update.nickname)
            .bind(update.remaining_sessions)
            .bind(update.member_id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to apply member update")?;
            touched += result.rows_affected();
        }

        tx.commit()
            .await
            .context("Failed to commit member updates")?;
        Ok(touched)
    }

    /// Delete every member and history, then insert the given bundles.
    /// All or nothing.
    pub async fn replace_all(&self, bundles: &[MemberBundle]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        sqlx::query("DELETE FROM attendances")
            .execute(&mut *tx)
            .await
            .context("Failed to clear attendances")?;
        sqlx::query("DELETE FROM payments")
            .execute(&mut *tx)
            .await
            .context("Failed to clear payments")?;
        sqlx::query("DELETE FROM members")
            .execute(&mut *tx)
            .await
            .context("Failed to clear members")?;

        for bundle in bundles {
            Self::insert_member(&mut tx, &bundle.member).await?;
            for attendance in &bundle.attendances {
                Self::insert_entry(&mut tx, &LedgerEntry::Attendance(attendance.clone())).await?;
            }
            for payment in &bundle.payments {
                Self::insert_entry(&mut tx, &LedgerEntry::Payment(payment.clone())).await?;
            }
        }

        tx.commit().await.context("Failed to commit restore")?;
        Ok(())
    }

    /// Row counts across the store.
    pub async fn counts(&self) -> Result<StoreCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM members) as members,
                (SELECT COUNT(*) FROM attendances) as attendances,
                (SELECT COUNT(*) FROM payments) as payments
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count rows")?;

        Ok(StoreCounts {
            members: row.get("members"),
            attendances: row.get("attendances"),
            payments: row.get("payments"),
        })
    }

    async fn insert_member(conn: &mut SqliteConnection, member: &Member) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO members (id, name, nickname, remaining_sessions, version, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(member.id.to_string())
        .bind(&member.name)
        .bind(&member.nickname)
        .bind(member.remaining_sessions)
        .bind(encode_timestamp(member.created_at))
        .execute(&mut *conn)
        .await
        .context("Failed to save member")?;
        Ok(())
    }

    async fn insert_entry(conn: &mut SqliteConnection, entry: &LedgerEntry) -> Result<()> {
        match entry {
            LedgerEntry::Attendance(record) => {
                sqlx::query("INSERT INTO attendances (id, member_id, attended_at) VALUES (?, ?, ?)")
                    .bind(record.id.to_string())
                    .bind(record.member_id.to_string())
                    .bind(encode_timestamp(record.attended_at))
                    .execute(&mut *conn)
                    .await
                    .context("Failed to save attendance")?;
            }
            LedgerEntry::Payment(record) => {
                sqlx::query(
                    r#"
                    INSERT INTO payments (id, member_id, amount, sessions_added, paid_at)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .bind(record.id.to_string())
                .bind(record.member_id.to_string())
                .bind(record.amount)
                .bind(record.sessions_added)
                .bind(encode_timestamp(record.paid_at))
                .execute(&mut *conn)
                .await
                .context("Failed to save payment")?;
            }
        }
        Ok(())
    }

    fn row_to_member(row: &SqliteRow) -> Result<(Member, i64)> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");

        let member = Member {
            id: Uuid::parse_str(&id_str).context("Invalid member ID")?,
            name: row.get("name"),
            nickname: row.get("nickname"),
            remaining_sessions: row.get("remaining_sessions"),
            created_at: decode_timestamp(&created_at_str).context("Invalid created_at")?,
        };
        Ok((member, row.get("version")))
    }

    // ========================
    // History operations
    // ========================

    /// Attendance history for a member, newest first.
    pub async fn list_attendances(&self, member_id: MemberId) -> Result<Vec<AttendanceRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, member_id, attended_at
            FROM attendances
            WHERE member_id = ?
            ORDER BY attended_at DESC
            "#,
        )
        .bind(member_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list attendances")?;

        rows.iter().map(Self::row_to_attendance).collect()
    }

    /// Payment history for a member, newest first.
    pub async fn list_payments(&self, member_id: MemberId) -> Result<Vec<PaymentRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, member_id, amount, sessions_added, paid_at
            FROM payments
            WHERE member_id = ?
            ORDER BY paid_at DESC
            "#,
        )
        .bind(member_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list payments")?;

        rows.iter().map(Self::row_to_payment).collect()
    }

    /// Whether a member has any attendance in `[from, to]`.
    pub async fn has_attendance_between(
        &self,
        member_id: MemberId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 as found
            FROM attendances
            WHERE member_id = ? AND attended_at >= ? AND attended_at <= ?
            LIMIT 1
            "#,
        )
        .bind(member_id.to_string())
        .bind(encode_timestamp(from))
        .bind(encode_timestamp(to))
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query attendance range")?;

        Ok(row.is_some())
    }

    /// Attendances of every member, optionally within `[from, to]`, oldest first.
    pub async fn list_attendances_between(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<AttendanceRecord>> {
        let mut query =
            String::from("SELECT id, member_id, attended_at FROM attendances WHERE 1=1");

        let from_str = from.map(encode_timestamp);
        let to_str = to.map(encode_timestamp);

        if from_str.is_some() {
            query.push_str(" AND attended_at >= ?");
        }
        if to_str.is_some() {
            query.push_str(" AND attended_at <= ?");
        }
        query.push_str(" ORDER BY attended_at");

        let mut sql_query = sqlx::query(&query);
        if let Some(ref from_str) = from_str {
            sql_query = sql_query.bind(from_str);
        }
        if let Some(ref to_str) = to_str {
            sql_query = sql_query.bind(to_str);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list attendances in range")?;

        rows.iter().map(Self::row_to_attendance).collect()
    }

    /// Payment totals per member (members without payments are left out),
    /// largest first, optionally within `[from, to]`.
    pub async fn payment_totals(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<MemberPaymentTotal>> {
        let mut query = String::from(
            r#"
            SELECT m.id as member_id, m.name as member_name,
                   COALESCE(SUM(p.amount), 0) as total_amount,
                   COUNT(p.id) as payment_count
            FROM members m
            JOIN payments p ON p.member_id = m.id
            WHERE 1=1
            "#,
        );

        let from_str = from.map(encode_timestamp);
        let to_str = to.map(encode_timestamp);

        if from_str.is_some() {
            query.push_str(" AND p.paid_at >= ?");
        }
        if to_str.is_some() {
            query.push_str(" AND p.paid_at <= ?");
        }
        query.push_str(
            " GROUP BY m.id, m.name HAVING total_amount > 0 ORDER BY total_amount DESC, m.name COLLATE NOCASE",
        );

        let mut sql_query = sqlx::query(&query);
        if let Some(ref from_str) = from_str {
            sql_query = sql_query.bind(from_str);
        }
        if let Some(ref to_str) = to_str {
            sql_query = sql_query.bind(to_str);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to compute payment totals")?;

        rows.iter()
            .map(|row| {
                let id_str: String = row.get("member_id");
                Ok(MemberPaymentTotal {
                    member_id: Uuid::parse_str(&id_str).context("Invalid member ID")?,
                    member_name: row.get("member_name"),
                    total_amount: row.get("total_amount"),
                    payment_count: row.get("payment_count"),
                })
            })
            .collect()
    }

    fn row_to_attendance(row: &SqliteRow) -> Result<AttendanceRecord> {
        let id_str: String = row.get("id");
        let member_id_str: String = row.get("member_id");
        let attended_at_str: String = row.get("attended_at");

        Ok(AttendanceRecord {
            id: Uuid::parse_str(&id_str).context("Invalid attendance ID")?,
            member_id: Uuid::parse_str(&member_id_str).context("Invalid member ID")?,
            attended_at: decode_timestamp(&attended_at_str).context("Invalid attended_at")?,
        })
    }

    fn row_to_payment(row: &SqliteRow) -> Result<PaymentRecord> {
        let id_str: String = row.get("id");
        let member_id_str: String = row.get("member_id");
        let paid_at_str: String = row.get("paid_at");

        Ok(PaymentRecord {
            id: Uuid::parse_str(&id_str).context("Invalid payment ID")?,
            member_id: Uuid::parse_str(&member_id_str).context("Invalid member ID")?,
            amount: row.get("amount"),
            sessions_added: row.get("sessions_added"),
            paid_at: decode_timestamp(&paid_at_str).context("Invalid paid_at")?,
        })
    }
}

/// Fixed-width UTC form so that stored timestamps sort as strings.
fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

/// Exponential backoff (1ms doubling, capped at 32ms) plus up to as much
/// again in random jitter.
fn retry_delay(attempt: u32) -> Duration {
    let base_us = 1_000u64 << attempt.saturating_sub(1).min(5);
    let jitter_us = (Uuid::new_v4().as_u128() as u64) % base_us;
    Duration::from_micros(base_us + jitter_us)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_encoded_timestamps_sort_chronologically() {
        let a = Utc.with_ymd_and_hms(2024, 3, 9, 8, 0, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(1);
        let c = a + chrono::Duration::seconds(1);

        let (ea, eb, ec) = (encode_timestamp(a), encode_timestamp(b), encode_timestamp(c));
        assert_eq!(ea, "2024-03-09T08:00:00.000000000Z");
        assert!(ea < eb && eb < ec);
        assert_eq!(decode_timestamp(&eb).unwrap(), b);
    }

    #[test]
    fn test_retry_delay_grows_and_stays_bounded() {
        for _ in 0..20 {
            let first = retry_delay(1);
            assert!(first >= Duration::from_millis(1) && first < Duration::from_millis(2));

            let third = retry_delay(3);
            assert!(third >= Duration::from_millis(4) && third < Duration::from_millis(8));

            let late = retry_delay(40);
            assert!(late >= Duration::from_millis(32) && late < Duration::from_millis(64));
        }
    }
}
