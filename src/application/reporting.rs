use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, FixedOffset, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    AttendanceRecord, ClassSlot, Member, MemberId, Rupiah, classify_instant, day_bounds,
    local_date,
};
use crate::storage::MemberPaymentTotal;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialReport {
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub entries: Vec<FinancialEntry>,
    pub total_revenue: Rupiah,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialEntry {
    pub member_id: MemberId,
    pub member_name: String,
    pub total_amount: Rupiah,
    pub payment_count: i64,
}

impl FinancialReport {
    pub fn from_totals(
        from_date: Option<DateTime<Utc>>,
        to_date: Option<DateTime<Utc>>,
        totals: Vec<MemberPaymentTotal>,
    ) -> Self {
        let entries: Vec<FinancialEntry> = totals
            .into_iter()
            .filter(|t| t.total_amount > 0)
            .map(|t| FinancialEntry {
                member_id: t.member_id,
                member_name: t.member_name,
                total_amount: t.total_amount,
                payment_count: t.payment_count,
            })
            .collect();
        let total_revenue = entries.iter().map(|e| e.total_amount).sum();

        Self {
            from_date,
            to_date,
            entries,
            total_revenue,
        }
    }
}

/// Time window for the class attendance report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    /// The current club-local calendar day.
    Today,
    /// The last seven days up to now.
    Week,
    /// One calendar month back from now.
    #[default]
    Month,
    /// No date filter.
    All,
    /// Inclusive club-local dates.
    Custom { from: NaiveDate, to: NaiveDate },
}

impl ReportPeriod {
    /// Parse the named periods. Custom ranges are built directly.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "today" => Some(ReportPeriod::Today),
            "week" => Some(ReportPeriod::Week),
            "month" => Some(ReportPeriod::Month),
            "all" => Some(ReportPeriod::All),
            _ => None,
        }
    }

    pub fn bounds(
        &self,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        match self {
            ReportPeriod::Today => {
                let (start, end) = day_bounds(local_date(now, offset), offset);
                (Some(start), Some(end))
            }
            ReportPeriod::Week => (Some(now - Duration::days(7)), Some(now)),
            ReportPeriod::Month => {
                let start = now
                    .checked_sub_months(Months::new(1))
                    .unwrap_or(now - Duration::days(30));
                (Some(start), Some(now))
            }
            ReportPeriod::All => (None, None),
            ReportPeriod::Custom { from, to } => {
                let (start, _) = day_bounds(*from, offset);
                let (_, end) = day_bounds(*to, offset);
                (Some(start), Some(end))
            }
        }
    }

    pub fn label(&self) -> String {
        match self {
            ReportPeriod::Today => "today".to_string(),
            ReportPeriod::Week => "last 7 days".to_string(),
            ReportPeriod::Month => "last month".to_string(),
            ReportPeriod::All => "all time".to_string(),
            ReportPeriod::Custom { from, to } => format!("{} to {}", from, to),
        }
    }
}

/// How regularly a member showed up in the period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Inactive,
    Rare,
    Fair,
    Regular,
}

impl ActivityStatus {
    pub fn from_total(total: i64) -> Self {
        match total {
            t if t <= 0 => ActivityStatus::Inactive,
            1..=2 => ActivityStatus::Rare,
            3..=4 => ActivityStatus::Fair,
            _ => ActivityStatus::Regular,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActivityStatus::Inactive => "Tidak Aktif",
            ActivityStatus::Rare => "Jarang",
            ActivityStatus::Fair => "Cukup",
            ActivityStatus::Regular => "Rutin",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassReportQuery {
    pub period: ReportPeriod,
    pub class_filter: Option<ClassSlot>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassReport {
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub class_filter: Option<ClassSlot>,
    pub members: Vec<MemberClassStats>,
    pub totals: ClassReportTotals,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberClassStats {
    pub member_id: MemberId,
    pub name: String,
    pub nickname: Option<String>,
    pub counts: BTreeMap<ClassSlot, i64>,
    /// Check-in times per slot, newest first.
    pub history: BTreeMap<ClassSlot, Vec<DateTime<Utc>>>,
    pub total_in_period: i64,
    pub status: ActivityStatus,
}

impl MemberClassStats {
    fn empty(member: &Member) -> Self {
        Self {
            member_id: member.id,
            name: member.name.clone(),
            nickname: member.nickname.clone(),
            counts: ClassSlot::ALL.iter().map(|slot| (*slot, 0)).collect(),
            history: ClassSlot::ALL.iter().map(|slot| (*slot, Vec::new())).collect(),
            total_in_period: 0,
            status: ActivityStatus::Inactive,
        }
    }

    pub fn count(&self, slot: ClassSlot) -> i64 {
        self.counts.get(&slot).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassReportTotals {
    pub member_count: usize,
    pub total_attendance: i64,
    pub per_slot: BTreeMap<ClassSlot, i64>,
    pub average_per_member: f64,
}

/// Bucket attendances per member and class slot, then filter and rank.
pub fn build_class_report(
    members: &[Member],
    attendances: &[AttendanceRecord],
    offset: FixedOffset,
    bounds: (Option<DateTime<Utc>>, Option<DateTime<Utc>>),
    query: &ClassReportQuery,
) -> ClassReport {
    let mut stats: HashMap<MemberId, MemberClassStats> = members
        .iter()
        .map(|m| (m.id, MemberClassStats::empty(m)))
        .collect();

    for attendance in attendances {
        let Some(entry) = stats.get_mut(&attendance.member_id) else {
            continue;
        };
        let slot = classify_instant(attendance.attended_at, offset);
        *entry.counts.entry(slot).or_insert(0) += 1;
        entry
            .history
            .entry(slot)
            .or_default()
            .push(attendance.attended_at);
        entry.total_in_period += 1;
    }

    let search = query.search.as_deref().unwrap_or("");
    let mut ranked: Vec<MemberClassStats> = members
        .iter()
        .filter(|m| m.matches_search(search))
        .filter_map(|m| stats.remove(&m.id))
        .filter(|s| match query.class_filter {
            Some(slot) => s.count(slot) > 0,
            None => s.total_in_period > 0,
        })
        .map(|mut s| {
            for times in s.history.values_mut() {
                times.sort_by(|a, b| b.cmp(a));
            }
            s.status = ActivityStatus::from_total(s.total_in_period);
            s
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.total_in_period
            .cmp(&a.total_in_period)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });

    let total_attendance: i64 = ranked.iter().map(|s| s.total_in_period).sum();
    let per_slot = ClassSlot::ALL
        .iter()
        .map(|slot| (*slot, ranked.iter().map(|s| s.count(*slot)).sum()))
        .collect();
    let average_per_member = if ranked.is_empty() {
        0.0
    } else {
        total_attendance as f64 / ranked.len() as f64
    };

    ClassReport {
        from_date: bounds.0,
        to_date: bounds.1,
        class_filter: query.class_filter,
        totals: ClassReportTotals {
            member_count: ranked.len(),
            total_attendance,
            per_slot,
            average_per_member,
        },
        members: ranked,
    }
}
