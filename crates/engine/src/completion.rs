//! External completion handler: finalizes a period when the enrollment
//! system reports the user completed the program backing it.

use tracing::{debug, warn};

use recert_core::{Period, RecertError, Timestamp, UserId};
use recert_store::Repository;

use crate::dates::{resolve_valid_from, resolve_valid_until};
use crate::lifecycle::{recompute_flags, validate_ordering, PeriodService};
use crate::outbound::RecertEvent;
use crate::settings::CertificationSettings;

impl PeriodService {
    /// React to a "program completed" signal for one user allocation.
    ///
    /// Locates the single open period for the program and user, stamps
    /// `certified_at = now`, and resolves the validity dates that become
    /// resolvable once certification has happened. `valid_from` falls back
    /// to `certified_at` itself when the rule yields nothing (it is required
    /// on a certified period); a computed `valid_until` that would not
    /// exceed `valid_from` is clamped to `valid_from + 1`.
    pub fn on_program_completed(
        &self,
        repo: &mut impl Repository,
        program: &str,
        user: UserId,
        now: Timestamp,
    ) -> Result<Period, RecertError> {
        let mut open: Vec<Period> = repo
            .all_periods()
            .into_iter()
            .filter(|p| p.user == user && p.program == program && p.is_open(now))
            .collect();
        open.sort_by_key(|p| (p.window_start, p.id));
        if open.len() > 1 {
            warn!(%user, program, count = open.len(), "multiple open periods, finalizing earliest");
        }
        let mut period = open
            .into_iter()
            .next()
            .ok_or_else(|| RecertError::NoOpenPeriod {
                user,
                program: program.to_string(),
            })?;

        let cert = repo
            .certification(period.certification)
            .ok_or(RecertError::CertificationNotFound(period.certification))?;
        let settings = CertificationSettings::resolve(&cert);
        let phase = if period.first {
            &settings.phase1
        } else {
            &settings.phase2
        };

        period.certified_at = Some(now);

        if period.valid_from.is_none() {
            period.valid_from = resolve_valid_from(
                phase.valid_since,
                period.window_start,
                period.window_due,
                period.window_end,
                Some(now),
            )
            // required once certified; the certification instant is the
            // only anchor guaranteed to exist
            .or(Some(now));
        }

        if period.valid_until.is_none() {
            period.valid_until = resolve_valid_until(
                &phase.expiration,
                period.window_start,
                period.window_due,
                period.window_end,
                Some(now),
            );
            if let (Some(from), Some(until)) = (period.valid_from, period.valid_until) {
                if until <= from {
                    period.valid_until = Some(from + 1);
                }
            }
        }

        validate_ordering(
            period.window_start,
            period.window_due,
            period.window_end,
            period.valid_from,
            period.valid_until,
            period.certified_at,
        )?;

        repo.update_period(period.clone())?;
        recompute_flags(repo, period.certification, period.user)?;

        debug!(period = %period.id, %user, program, "user certified");
        self.events.publish(RecertEvent::UserCertified {
            certification: period.certification,
            user,
            period: period.id,
            certified_at: now,
        });
        if let Some(template) = &cert.certificate_template {
            // fire-and-forget; issuance never joins the failure path
            self.authority.request_issue(period.id, template);
        }

        repo.period(period.id)
            .ok_or(RecertError::PeriodNotFound(period.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::PeriodDates;
    use crate::fixtures::{
        certification, plain_certification, recording_service, seed, service, RecordingAuthority,
        RecordingSink,
    };
    use serde_json::json;
    use std::sync::Arc;

    const T: Timestamp = 1_700_000_000;

    fn dates(start: Timestamp) -> PeriodDates {
        PeriodDates {
            window_start: start,
            window_due: None,
            window_end: None,
            valid_from: None,
            valid_until: None,
        }
    }

    #[test]
    fn certifies_the_open_period() {
        let mut state = recert_store::State::default();
        let cert = certification(
            None,
            json!({
                "valid1": "windowstart",
                "expiration1": {"since": "certified", "delay": "P90D"},
            }),
        );
        let user = seed(&mut state, &cert);
        let svc = service();

        svc.create_period(&mut state, cert.id, user, "prog-first".into(), dates(T))
            .unwrap();

        let done = svc
            .on_program_completed(&mut state, "prog-first", user, T + 100)
            .unwrap();

        assert_eq!(done.certified_at, Some(T + 100));
        assert_eq!(done.valid_from, Some(T)); // windowstart
        assert_eq!(
            done.valid_until,
            Some(crate::delay::CalendarDelay::parse("P90D").unwrap().add_to(T + 100))
        );
    }

    #[test]
    fn valid_from_falls_back_to_certification_instant() {
        let mut state = recert_store::State::default();
        // valid1 anchors on windowdue, but the period has no due date
        let cert = certification(None, json!({"valid1": "windowdue"}));
        let user = seed(&mut state, &cert);
        let svc = service();

        svc.create_period(&mut state, cert.id, user, "prog-first".into(), dates(T))
            .unwrap();

        let done = svc
            .on_program_completed(&mut state, "prog-first", user, T + 100)
            .unwrap();
        assert_eq!(done.valid_from, Some(T + 100));
        assert_eq!(done.valid_until, None);
    }

    #[test]
    fn computed_valid_until_is_clamped_above_valid_from() {
        let mut state = recert_store::State::default();
        // both validity bounds resolve to the certification instant
        let cert = certification(
            None,
            json!({
                "valid1": "certified",
                "expiration1": {"since": "certified"},
            }),
        );
        let user = seed(&mut state, &cert);
        let svc = service();

        svc.create_period(&mut state, cert.id, user, "prog-first".into(), dates(T))
            .unwrap();

        let done = svc
            .on_program_completed(&mut state, "prog-first", user, T + 100)
            .unwrap();
        assert_eq!(done.valid_from, Some(T + 100));
        assert_eq!(done.valid_until, Some(T + 101));
    }

    #[test]
    fn no_open_period_is_an_error() {
        let mut state = recert_store::State::default();
        let cert = plain_certification(None);
        let user = seed(&mut state, &cert);
        let svc = service();

        // window has not started yet at `now`
        svc.create_period(&mut state, cert.id, user, "prog-first".into(), dates(T + 500))
            .unwrap();

        let err = svc
            .on_program_completed(&mut state, "prog-first", user, T)
            .unwrap_err();
        assert!(matches!(err, RecertError::NoOpenPeriod { .. }));
    }

    #[test]
    fn already_certified_period_is_not_matched_again() {
        let mut state = recert_store::State::default();
        let cert = plain_certification(None);
        let user = seed(&mut state, &cert);
        let svc = service();

        svc.create_period(&mut state, cert.id, user, "prog-first".into(), dates(T))
            .unwrap();
        svc.on_program_completed(&mut state, "prog-first", user, T + 100)
            .unwrap();

        let err = svc
            .on_program_completed(&mut state, "prog-first", user, T + 200)
            .unwrap_err();
        assert!(matches!(err, RecertError::NoOpenPeriod { .. }));
    }

    #[test]
    fn emits_event_and_requests_issuance_when_template_configured() {
        let mut state = recert_store::State::default();
        let mut cert = plain_certification(None);
        cert.certificate_template = Some("tpl-default".to_string());
        let user = seed(&mut state, &cert);

        let authority = Arc::new(RecordingAuthority::default());
        let sink = Arc::new(RecordingSink::default());
        let svc = recording_service(authority.clone(), sink.clone());

        let created = svc
            .create_period(&mut state, cert.id, user, "prog-first".into(), dates(T))
            .unwrap();
        svc.on_program_completed(&mut state, "prog-first", user, T + 100)
            .unwrap();

        assert!(sink
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, RecertEvent::UserCertified { .. })));
        assert_eq!(
            authority.issued.lock().unwrap().as_slice(),
            &[(created.id, "tpl-default".to_string())]
        );
    }

    #[test]
    fn no_issuance_without_template() {
        let mut state = recert_store::State::default();
        let cert = plain_certification(None);
        let user = seed(&mut state, &cert);

        let authority = Arc::new(RecordingAuthority::default());
        let svc = recording_service(authority.clone(), Arc::new(RecordingSink::default()));

        svc.create_period(&mut state, cert.id, user, "prog-first".into(), dates(T))
            .unwrap();
        svc.on_program_completed(&mut state, "prog-first", user, T + 100)
            .unwrap();

        assert!(authority.issued.lock().unwrap().is_empty());
    }

    #[test]
    fn later_cycles_use_phase2_rules() {
        let mut state = recert_store::State::default();
        let cert = certification(
            Some(86_400),
            json!({
                "valid1": "windowstart",
                "valid2": "certified",
            }),
        );
        let user = seed(&mut state, &cert);
        let svc = service();

        svc.create_period(&mut state, cert.id, user, "prog-first".into(), dates(T))
            .unwrap();
        let second = svc
            .create_period(&mut state, cert.id, user, "prog-recert".into(), dates(T + 500))
            .unwrap();
        assert!(!second.first);

        let done = svc
            .on_program_completed(&mut state, "prog-recert", user, T + 600)
            .unwrap();
        assert_eq!(done.id, second.id);
        // phase 2: valid since certified, not windowstart
        assert_eq!(done.valid_from, Some(T + 600));
    }
}
