use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{MemberId, PaymentAmount, Rupiah, Sessions};

pub type PaymentId = Uuid;

/// A package purchase. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub member_id: MemberId,
    pub amount: Rupiah,
    pub sessions_added: Sessions,
    pub paid_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn new(member_id: MemberId, amount: PaymentAmount, paid_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            member_id,
            amount: amount.amount(),
            sessions_added: amount.sessions_added(),
            paid_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_record_derives_sessions() {
        let member = Uuid::new_v4();
        let amount = PaymentAmount::new(500_000).unwrap();
        let record = PaymentRecord::new(member, amount, Utc::now());

        assert_eq!(record.member_id, member);
        assert_eq!(record.amount, 500_000);
        assert_eq!(record.sessions_added, 8);
    }
}
