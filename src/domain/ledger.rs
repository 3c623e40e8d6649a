use chrono::{DateTime, Utc};

use super::{AttendanceRecord, Member, PaymentAmount, PaymentRecord, Sessions};

/// History row written together with a counter change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEntry {
    Attendance(AttendanceRecord),
    Payment(PaymentRecord),
}

/// New counter value for a member plus the history row that explains it.
///
/// Both halves are committed as one unit by the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerChange {
    pub remaining_sessions: Sessions,
    pub entry: LedgerEntry,
}

impl LedgerChange {
    pub fn attendance(&self) -> Option<&AttendanceRecord> {
        match &self.entry {
            LedgerEntry::Attendance(record) => Some(record),
            LedgerEntry::Payment(_) => None,
        }
    }

    pub fn payment(&self) -> Option<&PaymentRecord> {
        match &self.entry {
            LedgerEntry::Payment(record) => Some(record),
            LedgerEntry::Attendance(_) => None,
        }
    }
}

/// Debit one session for a check-in. There is no floor: over-drawn members
/// go negative rather than being turned away.
pub fn attendance_debit(member: &Member, attended_at: DateTime<Utc>) -> LedgerChange {
    LedgerChange {
        remaining_sessions: member.remaining_sessions - 1,
        entry: LedgerEntry::Attendance(AttendanceRecord::new(member.id, attended_at)),
    }
}

/// Credit the sessions bought by a payment.
pub fn payment_credit(
    member: &Member,
    amount: PaymentAmount,
    paid_at: DateTime<Utc>,
) -> LedgerChange {
    let record = PaymentRecord::new(member.id, amount, paid_at);
    LedgerChange {
        remaining_sessions: member.remaining_sessions + record.sessions_added,
        entry: LedgerEntry::Payment(record),
    }
}

/// Replay history into a counter, starting from zero.
///
/// Only meaningful for members that never had a manual correction; used to
/// report drift, never to overwrite the stored counter.
pub fn replay_history(attendances: &[AttendanceRecord], payments: &[PaymentRecord]) -> Sessions {
    let credited: Sessions = payments.iter().map(|p| p.sessions_added).sum();
    credited - attendances.len() as Sessions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member_with(sessions: Sessions) -> Member {
        let mut member = Member::new("Dewi Lestari", None).unwrap();
        member.remaining_sessions = sessions;
        member
    }

    #[test]
    fn test_attendance_debit_decrements_by_one() {
        let member = member_with(3);
        let now = Utc::now();
        let change = attendance_debit(&member, now);

        assert_eq!(change.remaining_sessions, 2);
        let record = change.attendance().unwrap();
        assert_eq!(record.member_id, member.id);
        assert_eq!(record.attended_at, now);
        assert!(change.payment().is_none());
    }

    #[test]
    fn test_attendance_debit_goes_negative() {
        let change = attendance_debit(&member_with(0), Utc::now());
        assert_eq!(change.remaining_sessions, -1);

        let change = attendance_debit(&member_with(-4), Utc::now());
        assert_eq!(change.remaining_sessions, -5);
    }

    #[test]
    fn test_payment_credit() {
        let member = member_with(4);
        let amount = PaymentAmount::new(500_000).unwrap();
        let change = payment_credit(&member, amount, Utc::now());

        assert_eq!(change.remaining_sessions, 12);
        let record = change.payment().unwrap();
        assert_eq!(record.amount, 500_000);
        assert_eq!(record.sessions_added, 8);
    }

    #[test]
    fn test_payment_credit_repays_overdraft() {
        let member = member_with(-2);
        let amount = PaymentAmount::new(250_000).unwrap();
        assert_eq!(payment_credit(&member, amount, Utc::now()).remaining_sessions, 2);
    }

    #[test]
    fn test_replay_history() {
        let member = member_with(0);
        let amount = PaymentAmount::new(250_000).unwrap();
        let payments = vec![PaymentRecord::new(member.id, amount, Utc::now())];
        let attendances = vec![
            AttendanceRecord::new(member.id, Utc::now()),
            AttendanceRecord::new(member.id, Utc::now()),
        ];

        assert_eq!(replay_history(&attendances, &payments), 2);
        assert_eq!(replay_history(&[], &[]), 0);
    }
}
