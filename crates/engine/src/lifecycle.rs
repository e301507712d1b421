//! Period lifecycle: create, override, delete, and derived-flag maintenance.
//!
//! Every mutation re-validates the date ordering invariants and then
//! recomputes the derived `first`/`recertifiable` flags over the user's
//! entire period set for the certification. The recomputation is O(n) in the
//! user's period count; per-user counts are bounded by cycle cadence.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use recert_core::{
    CertificationId, Period, PeriodId, ProgramRef, RecertError, Timestamp, UserId,
};
use recert_store::Repository;

use crate::dates::PeriodDates;
use crate::outbound::{CertificateAuthority, EventSink, RecertEvent};

// ── Patches ─────────────────────────────────────────────────────────

/// A partial update for one optional field: leave it, set it, or clear it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Patch<T> {
    #[default]
    Keep,
    Set(T),
    Clear,
}

impl<T> Patch<T> {
    fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            Patch::Keep => current,
            Patch::Set(value) => Some(value),
            Patch::Clear => None,
        }
    }
}

/// Partial date update for [`PeriodService::override_dates`]. Only supplied
/// fields are touched. `window_start` is required on the period and can only
/// be replaced; `revoked_at` can only be set, never cleared.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodPatch {
    pub window_start: Option<Timestamp>,
    pub window_due: Patch<Timestamp>,
    pub window_end: Patch<Timestamp>,
    pub valid_from: Patch<Timestamp>,
    pub valid_until: Patch<Timestamp>,
    pub certified_at: Patch<Timestamp>,
    pub revoked_at: Option<Timestamp>,
}

// ── Service ─────────────────────────────────────────────────────────

/// Period lifecycle operations. Collaborators are explicit handles; every
/// operation runs against the repository of one open transaction.
pub struct PeriodService {
    pub authority: Arc<dyn CertificateAuthority>,
    pub events: Arc<dyn EventSink>,
}

impl PeriodService {
    pub fn new(authority: Arc<dyn CertificateAuthority>, events: Arc<dyn EventSink>) -> Self {
        Self { authority, events }
    }

    /// Insert a new period and recompute the user's flags.
    ///
    /// The new period is seeded `recertifiable` only when the certification
    /// has recertification enabled; recomputation then settles which period
    /// of the set actually carries the flag.
    pub fn create_period(
        &self,
        repo: &mut impl Repository,
        certification: CertificationId,
        user: UserId,
        program: ProgramRef,
        dates: PeriodDates,
    ) -> Result<Period, RecertError> {
        let cert = repo
            .certification(certification)
            .ok_or(RecertError::CertificationNotFound(certification))?;
        if repo.user(user).is_none() {
            return Err(RecertError::UserNotFound(user));
        }

        validate_ordering(
            dates.window_start,
            dates.window_due,
            dates.window_end,
            dates.valid_from,
            dates.valid_until,
            None,
        )?;

        let period = Period {
            id: Uuid::new_v4(),
            certification,
            user,
            program,
            window_start: dates.window_start,
            window_due: dates.window_due,
            window_end: dates.window_end,
            valid_from: dates.valid_from,
            valid_until: dates.valid_until,
            certified_at: None,
            revoked_at: None,
            first: false,
            recertifiable: cert.recertification_enabled(),
            certificate: None,
        };
        let id = period.id;
        repo.insert_period(period);
        recompute_flags(repo, certification, user)?;

        let period = repo.period(id).ok_or(RecertError::PeriodNotFound(id))?;
        debug!(period = %id, %certification, %user, "period created");
        self.events.publish(RecertEvent::PeriodCreated {
            certification,
            user,
            period: id,
        });
        Ok(period)
    }

    /// Apply a partial date update, re-validate, recompute flags.
    ///
    /// A not-revoked → revoked transition on a period holding a certificate
    /// reference revokes the certificate before returning; a revocation
    /// failure fails the whole operation.
    pub fn override_dates(
        &self,
        repo: &mut impl Repository,
        id: PeriodId,
        patch: PeriodPatch,
    ) -> Result<Period, RecertError> {
        let mut period = repo.period(id).ok_or(RecertError::PeriodNotFound(id))?;
        let was_revoked = period.is_revoked();

        if let Some(start) = patch.window_start {
            period.window_start = start;
        }
        period.window_due = patch.window_due.apply(period.window_due);
        period.window_end = patch.window_end.apply(period.window_end);
        period.valid_from = patch.valid_from.apply(period.valid_from);
        period.valid_until = patch.valid_until.apply(period.valid_until);
        period.certified_at = patch.certified_at.apply(period.certified_at);
        if let Some(revoked) = patch.revoked_at {
            // one-way: an already-revoked period keeps its original timestamp
            period.revoked_at.get_or_insert(revoked);
        }

        validate_ordering(
            period.window_start,
            period.window_due,
            period.window_end,
            period.valid_from,
            period.valid_until,
            period.certified_at,
        )?;

        let now_revoked = !was_revoked && period.is_revoked();
        if now_revoked {
            if let Some(reference) = &period.certificate {
                self.authority.revoke(reference)?;
            }
        }

        repo.update_period(period.clone())?;
        recompute_flags(repo, period.certification, period.user)?;

        if now_revoked {
            self.events.publish(RecertEvent::PeriodRevoked {
                certification: period.certification,
                user: period.user,
                period: id,
            });
        }
        repo.period(id).ok_or(RecertError::PeriodNotFound(id))
    }

    /// Remove a period, revoking its certificate first, and recompute flags
    /// for the remaining set.
    pub fn delete_period(
        &self,
        repo: &mut impl Repository,
        id: PeriodId,
    ) -> Result<(), RecertError> {
        let period = repo.period(id).ok_or(RecertError::PeriodNotFound(id))?;
        if let Some(reference) = &period.certificate {
            self.authority.revoke(reference)?;
        }
        repo.remove_period(id);
        recompute_flags(repo, period.certification, period.user)?;
        debug!(period = %id, "period deleted");
        Ok(())
    }
}

// ── Validation ──────────────────────────────────────────────────────

/// Date-ordering invariants. Fails fast with the offending pair named;
/// callers must not retry unchanged input.
pub(crate) fn validate_ordering(
    window_start: Timestamp,
    window_due: Option<Timestamp>,
    window_end: Option<Timestamp>,
    valid_from: Option<Timestamp>,
    valid_until: Option<Timestamp>,
    certified_at: Option<Timestamp>,
) -> Result<(), RecertError> {
    if window_start <= 0 {
        return Err(RecertError::InvalidParameter("windowstart required"));
    }
    if let Some(due) = window_due {
        if due <= window_start {
            return Err(RecertError::InvalidParameter("windowdue invalid"));
        }
    }
    if let Some(end) = window_end {
        if end <= window_start || window_due.is_some_and(|due| end < due) {
            return Err(RecertError::InvalidParameter("windowend invalid"));
        }
    }
    if certified_at.is_some() && valid_from.is_none() {
        return Err(RecertError::InvalidParameter("timefrom required"));
    }
    if let (Some(from), Some(until)) = (valid_from, valid_until) {
        if until <= from {
            return Err(RecertError::InvalidParameter("timeuntil invalid"));
        }
    }
    Ok(())
}

// ── Flag recomputation ──────────────────────────────────────────────

/// Recompute `first`/`recertifiable` over the user's whole period set.
///
/// Scanning in `window_start` order: the earliest non-revoked period is
/// `first`; if any non-revoked period currently holds `recertifiable`, only
/// the chronologically last non-revoked one retains it. A set with no holder
/// never gains one here — clearing the flag (revocation, sweep self-heal)
/// is permanent.
pub(crate) fn recompute_flags(
    repo: &mut impl Repository,
    certification: CertificationId,
    user: UserId,
) -> Result<(), RecertError> {
    let mut periods = repo.periods_for(certification, user);
    periods.sort_by_key(|p| (p.window_start, p.id));

    let first_id = periods.iter().find(|p| !p.is_revoked()).map(|p| p.id);
    let last_alive_id = periods.iter().rev().find(|p| !p.is_revoked()).map(|p| p.id);
    let has_holder = periods.iter().any(|p| !p.is_revoked() && p.recertifiable);

    for mut period in periods {
        let first = Some(period.id) == first_id;
        let recertifiable = has_holder && Some(period.id) == last_alive_id;
        if period.first != first || period.recertifiable != recertifiable {
            period.first = first;
            period.recertifiable = recertifiable;
            repo.update_period(period)?;
        }
    }
    Ok(())
}
