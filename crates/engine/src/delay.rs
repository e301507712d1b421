//! Calendar-duration delays used by window-end and expiration rules.
//!
//! Delays come from the settings block as a closed textual set: `P<n>Y`,
//! `P<n>M`, `P<n>D`, `PT<n>H`. Addition is calendar arithmetic, not
//! fixed-second multiplication: "1 month" from Jan 31 lands on the last day
//! of February, not 30×86400 seconds later.

use std::fmt;

use chrono::{Days, Months, TimeZone, Utc};
use tracing::warn;

use recert_core::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayUnit {
    Years,
    Months,
    Days,
    Hours,
}

/// A positive calendar delay. Zero-valued durations normalize to "unset" and
/// never construct a `CalendarDelay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDelay {
    pub amount: u32,
    pub unit: DelayUnit,
}

impl CalendarDelay {
    /// Parse one of `P<n>Y`, `P<n>M`, `P<n>D`, `PT<n>H`.
    ///
    /// Returns `None` for anything outside the closed set and for
    /// zero-valued durations (which normalize to unset).
    pub fn parse(s: &str) -> Option<Self> {
        let (amount, unit) = parse_parts(s)?;
        if amount == 0 {
            return None;
        }
        Some(Self { amount, unit })
    }

    /// Whether `s` is a well-formed member of the closed set with a zero
    /// amount. Zero is normal configuration ("unset"), not corruption.
    pub fn is_zero(s: &str) -> bool {
        matches!(parse_parts(s), Some((0, _)))
    }

    /// Add this delay to an epoch-second timestamp using calendar arithmetic.
    ///
    /// Month and year additions clamp to the end of the target month. On
    /// unrepresentable input the timestamp is returned unchanged.
    pub fn add_to(&self, ts: Timestamp) -> Timestamp {
        let Some(base) = Utc.timestamp_opt(ts, 0).single() else {
            warn!(ts, "timestamp outside representable range, delay not applied");
            return ts;
        };
        let shifted = match self.unit {
            DelayUnit::Years => base.checked_add_months(Months::new(self.amount.saturating_mul(12))),
            DelayUnit::Months => base.checked_add_months(Months::new(self.amount)),
            DelayUnit::Days => base.checked_add_days(Days::new(u64::from(self.amount))),
            DelayUnit::Hours => Some(base + chrono::Duration::hours(i64::from(self.amount))),
        };
        match shifted {
            Some(dt) => dt.timestamp(),
            None => {
                warn!(ts, delay = %self, "delay addition overflowed, delay not applied");
                ts
            }
        }
    }
}

impl fmt::Display for CalendarDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            DelayUnit::Years => write!(f, "P{}Y", self.amount),
            DelayUnit::Months => write!(f, "P{}M", self.amount),
            DelayUnit::Days => write!(f, "P{}D", self.amount),
            DelayUnit::Hours => write!(f, "PT{}H", self.amount),
        }
    }
}

fn parse_parts(s: &str) -> Option<(u32, DelayUnit)> {
    let rest = s.trim().strip_prefix('P')?;
    let (digits, unit) = if let Some(t) = rest.strip_prefix('T') {
        (t.strip_suffix('H')?, DelayUnit::Hours)
    } else if let Some(d) = rest.strip_suffix('Y') {
        (d, DelayUnit::Years)
    } else if let Some(d) = rest.strip_suffix('M') {
        (d, DelayUnit::Months)
    } else if let Some(d) = rest.strip_suffix('D') {
        (d, DelayUnit::Days)
    } else {
        return None;
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount = digits.parse().ok()?;
    Some((amount, unit))
}
