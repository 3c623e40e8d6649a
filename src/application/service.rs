use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::config::ClubConfig;
use crate::domain::{
    AttendanceRecord, LedgerChange, Member, MemberId, PaymentAmount, PaymentRecord, Rupiah,
    Sessions, attendance_debit, day_bounds, local_date, name_key, normalize_name,
    normalize_nickname, payment_credit, replay_history,
};
use crate::storage::{AtomicUpdate, Repository};

use super::{AppError, ClassReport, ClassReportQuery, FinancialReport, build_class_report};

/// Application service owning the session ledger.
/// This is the primary interface for any client (CLI, API, TUI, etc.).
pub struct LedgerService {
    repo: Repository,
    config: ClubConfig,
}

/// Result of a debit or credit: the member after the commit and the change
/// that was written.
#[derive(Debug, Clone)]
pub struct LedgerReceipt {
    pub member: Member,
    pub change: LedgerChange,
}

impl LedgerReceipt {
    pub fn attendance(&self) -> Option<&AttendanceRecord> {
        self.change.attendance()
    }

    pub fn payment(&self) -> Option<&PaymentRecord> {
        self.change.payment()
    }
}

/// Member with both histories, newest first.
pub struct MemberDetail {
    pub member: Member,
    pub attendances: Vec<AttendanceRecord>,
    pub payments: Vec<PaymentRecord>,
    /// Counter implied by history alone; differs from the stored counter
    /// after manual corrections.
    pub history_balance: Sessions,
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository, config: ClubConfig) -> Self {
        Self { repo, config }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str, config: ClubConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo, config))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str, config: ClubConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo, config))
    }

    pub fn config(&self) -> &ClubConfig {
        &self.config
    }

    pub(crate) fn repository(&self) -> &Repository {
        &self.repo
    }

    // ========================
    // Member operations
    // ========================

    /// Register a new member with zero sessions.
    pub async fn register_member(
        &self,
        name: &str,
        nickname: Option<&str>,
    ) -> Result<Member, AppError> {
        let member = Member::new(name, nickname)?;
        self.repo.save_member(&member).await?;
        tracing::info!(member_id = %member.id, name = %member.name, "registered member");
        Ok(member)
    }

    /// Get a member by ID.
    pub async fn get_member(&self, id: MemberId) -> Result<Member, AppError> {
        self.repo
            .get_member(id)
            .await?
            .ok_or_else(|| AppError::MemberNotFound(id.to_string()))
    }

    /// Resolve a member from a UUID or an exact (case-insensitive) full name.
    pub async fn find_member(&self, reference: &str) -> Result<Member, AppError> {
        if let Ok(id) = Uuid::parse_str(reference.trim()) {
            return self.get_member(id).await;
        }

        let key = name_key(reference);
        let mut matches: Vec<Member> = self
            .repo
            .list_members()
            .await?
            .into_iter()
            .filter(|m| m.match_key() == key)
            .collect();

        match matches.len() {
            0 => Err(AppError::MemberNotFound(reference.to_string())),
            1 => Ok(matches.remove(0)),
            count => Err(AppError::AmbiguousMember {
                reference: reference.to_string(),
                count,
            }),
        }
    }

    /// List members ordered by name, optionally filtered on name or nickname.
    pub async fn list_members(&self, search: Option<&str>) -> Result<Vec<Member>, AppError> {
        let members = self.repo.list_members().await?;
        Ok(match search {
            Some(query) => members
                .into_iter()
                .filter(|m| m.matches_search(query))
                .collect(),
            None => members,
        })
    }

    /// Edit a member's name and nickname. The session counter is untouched.
    pub async fn update_member(
        &self,
        id: MemberId,
        name: &str,
        nickname: Option<&str>,
    ) -> Result<Member, AppError> {
        let name = normalize_name(name)?;
        let nickname = normalize_nickname(nickname);

        if !self
            .repo
            .update_member_identity(id, &name, nickname.as_deref())
            .await?
        {
            return Err(AppError::MemberNotFound(id.to_string()));
        }
        self.get_member(id).await
    }

    /// Delete a member together with its histories.
    pub async fn delete_member(&self, id: MemberId) -> Result<Member, AppError> {
        let member = self.get_member(id).await?;
        if !self.repo.delete_member(id).await? {
            return Err(AppError::MemberNotFound(id.to_string()));
        }
        tracing::info!(member_id = %id, name = %member.name, "deleted member");
        Ok(member)
    }

    // ========================
    // Ledger operations
    // ========================

    /// Check a member in now: one session debited, one attendance recorded.
    ///
    /// Does not look at earlier check-ins; callers that want one check-in a
    /// day ask [`Self::has_attended_today`] first.
    pub async fn record_attendance(&self, id: MemberId) -> Result<LedgerReceipt, AppError> {
        self.record_attendance_at(id, Utc::now()).await
    }

    /// Check a member in at a given time (backfill).
    pub async fn record_attendance_at(
        &self,
        id: MemberId,
        attended_at: DateTime<Utc>,
    ) -> Result<LedgerReceipt, AppError> {
        let receipt = self
            .apply_atomically(id, |member| attendance_debit(member, attended_at))
            .await?;
        tracing::info!(
            member_id = %id,
            remaining_sessions = receipt.member.remaining_sessions,
            "recorded attendance"
        );
        Ok(receipt)
    }

    /// Record a payment now and credit the sessions it buys.
    pub async fn record_payment(
        &self,
        id: MemberId,
        amount: Rupiah,
    ) -> Result<LedgerReceipt, AppError> {
        self.record_payment_at(id, amount, Utc::now()).await
    }

    /// Record a payment at a given time.
    ///
    /// Fails with `InvalidAmount` before touching the store unless the
    /// amount is a positive multiple of the package price.
    pub async fn record_payment_at(
        &self,
        id: MemberId,
        amount: Rupiah,
        paid_at: DateTime<Utc>,
    ) -> Result<LedgerReceipt, AppError> {
        let amount = PaymentAmount::new(amount)?;
        let receipt = self
            .apply_atomically(id, |member| payment_credit(member, amount, paid_at))
            .await?;
        tracing::info!(
            member_id = %id,
            amount = amount.amount(),
            sessions_added = amount.sessions_added(),
            remaining_sessions = receipt.member.remaining_sessions,
            "recorded payment"
        );
        Ok(receipt)
    }

    /// Overwrite the counter. No history is written.
    pub async fn set_sessions_manually(
        &self,
        id: MemberId,
        sessions: Sessions,
    ) -> Result<Member, AppError> {
        if !self.repo.set_remaining_sessions(id, sessions).await? {
            return Err(AppError::MemberNotFound(id.to_string()));
        }
        tracing::info!(member_id = %id, remaining_sessions = sessions, "manual session override");
        self.get_member(id).await
    }

    async fn apply_atomically<F>(&self, id: MemberId, apply: F) -> Result<LedgerReceipt, AppError>
    where
        F: FnMut(&Member) -> LedgerChange,
    {
        match self
            .repo
            .with_atomic_update(id, self.config.max_update_attempts, apply)
            .await?
        {
            AtomicUpdate::Committed {
                member,
                change,
                attempts,
            } => {
                if attempts > 1 {
                    tracing::debug!(member_id = %id, attempts, "ledger update committed after retry");
                }
                Ok(LedgerReceipt { member, change })
            }
            AtomicUpdate::MemberMissing => Err(AppError::MemberNotFound(id.to_string())),
            AtomicUpdate::Exhausted { attempts } => {
                tracing::warn!(member_id = %id, attempts, "gave up on contended ledger update");
                Err(AppError::ConcurrentUpdate {
                    member_id: id,
                    attempts,
                })
            }
        }
    }

    // ========================
    // Queries
    // ========================

    /// Whether the member already checked in on the club's current day.
    pub async fn has_attended_today(&self, id: MemberId) -> Result<bool, AppError> {
        let today = local_date(Utc::now(), self.config.utc_offset);
        self.has_attended_on(id, today).await
    }

    /// Whether the member has an attendance between 00:00:00 and 23:59:59
    /// of `date`, club time.
    pub async fn has_attended_on(&self, id: MemberId, date: NaiveDate) -> Result<bool, AppError> {
        self.get_member(id).await?;
        let (start, end) = day_bounds(date, self.config.utc_offset);
        Ok(self.repo.has_attendance_between(id, start, end).await?)
    }

    /// Attendance history, newest first.
    pub async fn attendance_history(
        &self,
        id: MemberId,
    ) -> Result<Vec<AttendanceRecord>, AppError> {
        self.get_member(id).await?;
        Ok(self.repo.list_attendances(id).await?)
    }

    /// Payment history, newest first.
    pub async fn payment_history(&self, id: MemberId) -> Result<Vec<PaymentRecord>, AppError> {
        self.get_member(id).await?;
        Ok(self.repo.list_payments(id).await?)
    }

    /// Member plus both histories.
    pub async fn member_detail(&self, id: MemberId) -> Result<MemberDetail, AppError> {
        let member = self.get_member(id).await?;
        let attendances = self.repo.list_attendances(id).await?;
        let payments = self.repo.list_payments(id).await?;
        let history_balance = replay_history(&attendances, &payments);

        Ok(MemberDetail {
            member,
            attendances,
            payments,
            history_balance,
        })
    }

    // ========================
    // Reports
    // ========================

    /// Revenue per member, largest first.
    pub async fn financial_report(
        &self,
        from_date: Option<DateTime<Utc>>,
        to_date: Option<DateTime<Utc>>,
    ) -> Result<FinancialReport, AppError> {
        let totals = self.repo.payment_totals(from_date, to_date).await?;
        Ok(FinancialReport::from_totals(from_date, to_date, totals))
    }

    /// Attendance per member and class slot over a period.
    ///
    /// Members and attendances are read separately, so the report is not a
    /// single snapshot. That is fine for reporting.
    pub async fn class_report(&self, query: &ClassReportQuery) -> Result<ClassReport, AppError> {
        let bounds = query.period.bounds(Utc::now(), self.config.utc_offset);
        let members = self.repo.list_members().await?;
        let attendances = self.repo.list_attendances_between(bounds.0, bounds.1).await?;

        Ok(build_class_report(
            &members,
            &attendances,
            self.config.utc_offset,
            bounds,
            query,
        ))
    }
}
