use std::fmt;

use serde::{Deserialize, Serialize};

/// Money is kept in whole Rupiah. There is no minor unit in day-to-day use.
pub type Rupiah = i64;

/// Session credits. Signed because a member may be over-drawn.
pub type Sessions = i64;

/// Price of one session package.
pub const PACKAGE_PRICE: Rupiah = 250_000;

/// Credits granted for every package paid.
pub const SESSIONS_PER_PACKAGE: Sessions = 4;

/// A payment amount that is a positive multiple of [`PACKAGE_PRICE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Rupiah", into = "Rupiah")]
pub struct PaymentAmount(Rupiah);

impl PaymentAmount {
    pub fn new(amount: Rupiah) -> Result<Self, InvalidPaymentAmount> {
        if amount <= 0 {
            return Err(InvalidPaymentAmount::NotPositive(amount));
        }
        if amount % PACKAGE_PRICE != 0 {
            return Err(InvalidPaymentAmount::NotPackageMultiple(amount));
        }
        Ok(Self(amount))
    }

    pub fn amount(&self) -> Rupiah {
        self.0
    }

    pub fn packages(&self) -> i64 {
        self.0 / PACKAGE_PRICE
    }

    /// Credits this payment buys: `amount / 250000 * 4`.
    pub fn sessions_added(&self) -> Sessions {
        self.packages() * SESSIONS_PER_PACKAGE
    }
}

impl TryFrom<Rupiah> for PaymentAmount {
    type Error = InvalidPaymentAmount;

    fn try_from(value: Rupiah) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PaymentAmount> for Rupiah {
    fn from(value: PaymentAmount) -> Self {
        value.0
    }
}

impl fmt::Display for PaymentAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_rupiah(self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidPaymentAmount {
    NotPositive(Rupiah),
    NotPackageMultiple(Rupiah),
}

impl fmt::Display for InvalidPaymentAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidPaymentAmount::NotPositive(amount) => {
                write!(f, "payment amount must be positive, got {}", amount)
            }
            InvalidPaymentAmount::NotPackageMultiple(amount) => write!(
                f,
                "payment amount {} is not a multiple of the package price {}",
                format_rupiah(*amount),
                format_rupiah(PACKAGE_PRICE)
            ),
        }
    }
}

impl std::error::Error for InvalidPaymentAmount {}

/// Format an amount the way it appears on receipts.
/// Example: 250000 -> "Rp 250.000", -1500 -> "-Rp 1.500"
pub fn format_rupiah(amount: Rupiah) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let digits = amount.unsigned_abs().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    format!("{}Rp {}", sign, grouped)
}

/// Parse a whole-Rupiah amount typed by an operator.
/// Accepts "250000", "250.000", "Rp 250.000" and "rp250_000".
pub fn parse_rupiah(input: &str) -> Result<Rupiah, ParseRupiahError> {
    let mut rest = input.trim();
    if rest.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("rp")) {
        rest = rest[2..].trim_start();
    }

    let negative = rest.starts_with('-');
    let rest = rest.trim_start_matches('-');

    let digits: String = rest.chars().filter(|c| !matches!(c, '.' | '_')).collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseRupiahError::InvalidFormat);
    }

    let value: Rupiah = digits.parse().map_err(|_| ParseRupiahError::Overflow)?;
    Ok(if negative { -value } else { value })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseRupiahError {
    InvalidFormat,
    Overflow,
}

impl fmt::Display for ParseRupiahError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseRupiahError::InvalidFormat => write!(f, "invalid amount format"),
            ParseRupiahError::Overflow => write!(f, "amount is too large"),
        }
    }
}

impl std::error::Error for ParseRupiahError {}
