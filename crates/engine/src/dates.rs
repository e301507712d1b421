//! Default date calculator: maps resolved rules, caller overrides and the
//! prior period into the five concrete timestamps of a new cycle.
//!
//! Pure functions; the caller decides which phase applies (phase 1 for the
//! user's first period in a certification, phase 2 for every later one) and
//! supplies `now` explicitly.

use recert_core::{Period, Timestamp};

use crate::settings::{
    CertificationSettings, ExpirationRule, ExpirySince, PhaseSettings, ValidSince, WindowEndRule,
    WindowEndSince,
};

/// Which rule phase a new period falls under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    First,
    Recertification,
}

/// Caller-supplied per-field overrides. A set field wins over rule resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateOverrides {
    pub window_start: Option<Timestamp>,
    pub window_due: Option<Timestamp>,
    pub window_end: Option<Timestamp>,
    pub valid_from: Option<Timestamp>,
    pub valid_until: Option<Timestamp>,
}

/// The concrete dates of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodDates {
    pub window_start: Timestamp,
    pub window_due: Option<Timestamp>,
    pub window_end: Option<Timestamp>,
    pub valid_from: Option<Timestamp>,
    pub valid_until: Option<Timestamp>,
}

/// Compute the default dates for a new period.
///
/// `prior` is the period the new cycle continues from, if any; it only
/// influences `window_start`, and only while it is certified, non-revoked,
/// recertifiable and recertification is enabled.
pub fn default_dates(
    settings: &CertificationSettings,
    cycle: Cycle,
    overrides: &DateOverrides,
    prior: Option<&Period>,
    recertify_interval: Option<i64>,
    now: Timestamp,
) -> PeriodDates {
    let phase = phase_for(settings, cycle);

    let window_start = overrides
        .window_start
        .or_else(|| continuation_start(prior, recertify_interval))
        .unwrap_or(now);

    // Recertification cycles get their due date passed explicitly by the
    // sweep (the prior cycle's valid_until); the offset only applies to
    // first cycles.
    let window_due = overrides.window_due.or_else(|| match cycle {
        Cycle::First => phase.due_offset.map(|offset| window_start + offset),
        Cycle::Recertification => None,
    });

    let window_end = overrides
        .window_end
        .or_else(|| resolve_window_end(&phase.window_end, window_start, window_due));

    let valid_from = overrides.valid_from.or_else(|| {
        resolve_valid_from(phase.valid_since, window_start, window_due, window_end, None)
    });

    let valid_until = overrides.valid_until.or_else(|| {
        resolve_valid_until(&phase.expiration, window_start, window_due, window_end, None)
    });

    PeriodDates {
        window_start,
        window_due,
        window_end,
        valid_from,
        valid_until,
    }
}

pub fn phase_for(settings: &CertificationSettings, cycle: Cycle) -> &PhaseSettings {
    match cycle {
        Cycle::First => &settings.phase1,
        Cycle::Recertification => &settings.phase2,
    }
}

fn continuation_start(prior: Option<&Period>, recertify_interval: Option<i64>) -> Option<Timestamp> {
    let prior = prior?;
    let interval = recertify_interval?;
    if prior.is_certified() && !prior.is_revoked() && prior.recertifiable {
        prior.valid_until.map(|until| until - interval)
    } else {
        None
    }
}

pub fn resolve_window_end(
    rule: &WindowEndRule,
    window_start: Timestamp,
    window_due: Option<Timestamp>,
) -> Option<Timestamp> {
    match rule.since {
        WindowEndSince::Never => None,
        WindowEndSince::WindowStart => rule.delay.map(|d| d.add_to(window_start)),
        WindowEndSince::WindowDue => match (window_due, rule.delay) {
            (Some(due), Some(d)) => Some(d.add_to(due)),
            _ => None,
        },
    }
}

/// `certified_at` makes `certified`-anchored rules resolvable; at period
/// creation it is `None` and such rules yield `None`.
pub fn resolve_valid_from(
    since: ValidSince,
    window_start: Timestamp,
    window_due: Option<Timestamp>,
    window_end: Option<Timestamp>,
    certified_at: Option<Timestamp>,
) -> Option<Timestamp> {
    match since {
        ValidSince::Certified => certified_at,
        ValidSince::WindowStart => Some(window_start),
        ValidSince::WindowDue => window_due,
        ValidSince::WindowEnd => window_end,
    }
}

pub fn resolve_valid_until(
    rule: &ExpirationRule,
    window_start: Timestamp,
    window_due: Option<Timestamp>,
    window_end: Option<Timestamp>,
    certified_at: Option<Timestamp>,
) -> Option<Timestamp> {
    let anchor = match rule.since {
        ExpirySince::Never => return None,
        ExpirySince::Certified => certified_at?,
        ExpirySince::WindowStart => window_start,
        ExpirySince::WindowDue => window_due?,
        ExpirySince::WindowEnd => window_end?,
    };
    Some(match rule.delay {
        Some(delay) => delay.add_to(anchor),
        None => anchor,
    })
}
