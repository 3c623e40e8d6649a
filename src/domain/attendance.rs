use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{MemberId, to_local};

pub type AttendanceId = Uuid;

/// One check-in. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: AttendanceId,
    pub member_id: MemberId,
    pub attended_at: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn new(member_id: MemberId, attended_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            member_id,
            attended_at,
        }
    }
}

/// Weekly class slots used to bucket attendance in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ClassSlot {
    A,
    B,
    C,
    D,
    E,
    F,
    J,
    /// Anything outside the scheduled windows.
    #[serde(rename = "other")]
    Other,
}

impl ClassSlot {
    /// Every slot in report column order, `Other` last.
    pub const ALL: [ClassSlot; 8] = [
        ClassSlot::A,
        ClassSlot::B,
        ClassSlot::C,
        ClassSlot::D,
        ClassSlot::E,
        ClassSlot::F,
        ClassSlot::J,
        ClassSlot::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassSlot::A => "A",
            ClassSlot::B => "B",
            ClassSlot::C => "C",
            ClassSlot::D => "D",
            ClassSlot::E => "E",
            ClassSlot::F => "F",
            ClassSlot::J => "J",
            ClassSlot::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "a" => Some(ClassSlot::A),
            "b" => Some(ClassSlot::B),
            "c" => Some(ClassSlot::C),
            "d" => Some(ClassSlot::D),
            "e" => Some(ClassSlot::E),
            "f" => Some(ClassSlot::F),
            "j" => Some(ClassSlot::J),
            "other" | "x" => Some(ClassSlot::Other),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ClassSlot::A => "Kelas A",
            ClassSlot::B => "Kelas B",
            ClassSlot::C => "Kelas C",
            ClassSlot::D => "Kelas D",
            ClassSlot::E => "Kelas E",
            ClassSlot::F => "Kelas F",
            ClassSlot::J => "Kelas J",
            ClassSlot::Other => "Lainnya",
        }
    }

    /// Published timetable shown to staff. Detection windows are wider.
    pub fn schedule(&self) -> &'static str {
        match self {
            ClassSlot::A => "Sabtu, 08.00 - 09.30",
            ClassSlot::B => "Sabtu, 09.30 - 11.00",
            ClassSlot::C => "Sabtu, 15.00 - 16.30",
            ClassSlot::D => "Minggu, 08.00 - 09.30",
            ClassSlot::E => "Minggu, 09.30 - 11.00",
            ClassSlot::F => "Minggu, 15.00 - 16.30",
            ClassSlot::J => "Jumat, 15.00 - 16.30",
            ClassSlot::Other => "Luar Jadwal",
        }
    }
}

impl std::fmt::Display for ClassSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Window edges in fractional hours (hour + minute / 60), half-open.
const MORNING_EARLY: (f64, f64) = (7.0, 9.4);
const MORNING_LATE: (f64, f64) = (9.4, 12.0);
const AFTERNOON: (f64, f64) = (14.0, 18.0);

fn within(time: f64, (start, end): (f64, f64)) -> bool {
    time >= start && time < end
}

/// Map a club wall-clock time to its class slot.
pub fn classify_attendance(local: NaiveDateTime) -> ClassSlot {
    let time = local.hour() as f64 + local.minute() as f64 / 60.0;

    match local.weekday() {
        Weekday::Fri if within(time, AFTERNOON) => ClassSlot::J,
        Weekday::Sat if within(time, MORNING_EARLY) => ClassSlot::A,
        Weekday::Sat if within(time, MORNING_LATE) => ClassSlot::B,
        Weekday::Sat if within(time, AFTERNOON) => ClassSlot::C,
        Weekday::Sun if within(time, MORNING_EARLY) => ClassSlot::D,
        Weekday::Sun if within(time, MORNING_LATE) => ClassSlot::E,
        Weekday::Sun if within(time, AFTERNOON) => ClassSlot::F,
        _ => ClassSlot::Other,
    }
}

/// Classify a stored instant using the club's offset.
pub fn classify_instant(at: DateTime<Utc>, offset: FixedOffset) -> ClassSlot {
    classify_attendance(to_local(at, offset))
}
