//! Recertification sweep: finds certified periods whose next cycle is due
//! and spawns the successor period.
//!
//! Invoked by an external trigger at cron-like granularity with an explicit
//! `now`. Each candidate is processed in its own transaction; one failure is
//! logged and never aborts the rest of the sweep. Misconfigured candidates
//! are defused (recertifiable cleared) instead of being retried forever.

use std::sync::Arc;

use tracing::{info, warn};

use recert_core::{CertificationId, PeriodId, ProgramRef, RecertError, Timestamp, UserId};
use recert_store::{MemoryStore, Repository, State};

use crate::dates::{default_dates, Cycle, DateOverrides};
use crate::lifecycle::PeriodService;
use crate::outbound::{EnrollmentSync, RecertEvent};
use crate::settings::CertificationSettings;

/// Candidates whose `valid_until` lies further in the past are never
/// resurrected, whatever their flags claim.
pub const DEFAULT_LOOKBACK: i64 = 90 * 86_400;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub spawned: usize,
    pub defused: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum Outcome {
    Spawned {
        certification: CertificationId,
        user: UserId,
        predecessor: PeriodId,
        successor: PeriodId,
        program: ProgramRef,
    },
    Defused,
    Skipped,
}

pub struct RecertSweep {
    service: PeriodService,
    enrollment: Arc<dyn EnrollmentSync>,
    lookback: i64,
}

impl RecertSweep {
    pub fn new(service: PeriodService, enrollment: Arc<dyn EnrollmentSync>) -> Self {
        Self {
            service,
            enrollment,
            lookback: DEFAULT_LOOKBACK,
        }
    }

    pub fn with_lookback(mut self, seconds: i64) -> Self {
        self.lookback = seconds;
        self
    }

    /// Run one sweep. Safe to invoke repeatedly: spawning a successor moves
    /// `recertifiable` onto it, so an immediate second run finds nothing.
    pub fn run(&self, store: &MemoryStore, now: Timestamp) -> SweepReport {
        let candidates = store.read(|state| select_candidates(state, now, self.lookback));
        let mut report = SweepReport {
            examined: candidates.len(),
            ..Default::default()
        };

        for candidate in candidates {
            match self.process(store, candidate, now) {
                Ok(Outcome::Spawned {
                    certification,
                    user,
                    predecessor,
                    successor,
                    program,
                }) => {
                    report.spawned += 1;
                    self.service.events.publish(RecertEvent::RecertificationStarted {
                        certification,
                        user,
                        predecessor,
                        successor,
                    });
                    self.enrollment.sync_allocation(certification, user, &program);
                }
                Ok(Outcome::Defused) => report.defused += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!(period = %candidate, error = %e, "sweep candidate failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            examined = report.examined,
            spawned = report.spawned,
            defused = report.defused,
            skipped = report.skipped,
            failed = report.failed,
            "recertification sweep complete"
        );
        report
    }

    fn process(
        &self,
        store: &MemoryStore,
        id: PeriodId,
        now: Timestamp,
    ) -> Result<Outcome, RecertError> {
        store.transaction(|state| {
            // Re-read fresh: the period may have changed between selection
            // and processing. Stale candidates are silently skipped.
            let Some(period) = state.period(id) else {
                return Ok(Outcome::Skipped);
            };
            if period.is_revoked() || !period.recertifiable || !period.is_certified() {
                return Ok(Outcome::Skipped);
            }
            let Some(valid_until) = period.valid_until else {
                return Ok(Outcome::Skipped);
            };
            let cert = state
                .certification(period.certification)
                .ok_or(RecertError::CertificationNotFound(period.certification))?;
            let Some(interval) = cert.recertify_interval else {
                return Ok(Outcome::Skipped);
            };

            let window_start = valid_until - interval;
            if window_start <= period.window_start {
                // The successor would not follow this period chronologically
                // (recertify interval at least as long as the whole cycle).
                // Defuse instead of spawning out-of-order history.
                let mut defused = period.clone();
                defused.recertifiable = false;
                state.update_period(defused)?;
                warn!(
                    period = %id,
                    window_start,
                    "successor window would not follow current cycle, recertifiable cleared"
                );
                return Ok(Outcome::Defused);
            }

            let settings = CertificationSettings::resolve(&cert);
            let overrides = DateOverrides {
                window_start: Some(window_start),
                // continuity: the new due date is the old expiry
                window_due: Some(valid_until),
                ..Default::default()
            };
            let dates = default_dates(
                &settings,
                Cycle::Recertification,
                &overrides,
                Some(&period),
                Some(interval),
                now,
            );
            let program = cert.program_recert.clone();
            let successor = self.service.create_period(
                state,
                period.certification,
                period.user,
                program.clone(),
                dates,
            )?;

            if let Some(grace) = settings.phase2.grace {
                let extended = valid_until + grace;
                if extended > now {
                    if let Some(mut assignment) = state.assignment(period.certification, period.user)
                    {
                        if assignment.temporary_valid_until.map_or(true, |cur| extended > cur) {
                            assignment.temporary_valid_until = Some(extended);
                            state.put_assignment(assignment);
                        }
                    }
                }
            }

            Ok(Outcome::Spawned {
                certification: period.certification,
                user: period.user,
                predecessor: id,
                successor: successor.id,
                program,
            })
        })
    }
}

/// Select the periods worth processing, in deterministic order.
fn select_candidates(state: &State, now: Timestamp, lookback: i64) -> Vec<PeriodId> {
    let mut due: Vec<(Timestamp, PeriodId)> = state
        .all_periods()
        .into_iter()
        .filter_map(|p| {
            if p.is_revoked() || !p.is_certified() || !p.recertifiable {
                return None;
            }
            let valid_until = p.valid_until?;
            let cert = state.certification(p.certification)?;
            let interval = cert.recertify_interval?;
            if !cert.active {
                return None;
            }
            let assignment = state.assignment(p.certification, p.user)?;
            if assignment.archived {
                return None;
            }
            let user = state.user(p.user)?;
            if user.deleted {
                return None;
            }
            if valid_until - interval > now {
                return None; // trigger time not reached
            }
            if valid_until < now - lookback {
                return None; // expired too long ago to resurrect
            }
            Some((p.window_start, p.id))
        })
        .collect();
    due.sort();
    due.into_iter().map(|(_, id)| id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::PeriodDates;
    use crate::fixtures::{
        certification, plain_certification, service, RecordingEnrollment, RecordingSink,
    };
    use crate::lifecycle::PeriodService;
    use crate::outbound::Discard;
    use recert_core::Certification;
    use serde_json::json;

    const T: Timestamp = 1_700_000_000;
    const DAY: i64 = 86_400;

    fn sweep() -> RecertSweep {
        RecertSweep::new(service(), Arc::new(Discard))
    }

    /// Store with one certified, recertifiable period expiring at `T + 30d`.
    fn seeded_store(cert: &Certification) -> (MemoryStore, UserId, PeriodId) {
        let store = MemoryStore::new();
        let svc = service();
        let (user, period) = store
            .transaction(|state| {
                let user = crate::fixtures::seed(state, cert);
                let period = svc.create_period(
                    state,
                    cert.id,
                    user,
                    cert.program_first.clone(),
                    PeriodDates {
                        window_start: T,
                        window_due: None,
                        window_end: None,
                        valid_from: Some(T),
                        valid_until: Some(T + 30 * DAY),
                    },
                )?;
                let mut certified = state.period(period.id).unwrap();
                certified.certified_at = Some(T + DAY);
                state.update_period(certified)?;
                Ok((user, period.id))
            })
            .unwrap();
        (store, user, period)
    }

    #[test]
    fn spawns_successor_and_raises_grace() {
        let cert = certification(Some(DAY), json!({"grace2": 14 * DAY}));
        let (store, user, predecessor) = seeded_store(&cert);
        let valid_until = T + 30 * DAY;

        let enrollment = Arc::new(RecordingEnrollment::default());
        let sink = Arc::new(RecordingSink::default());
        let sweep = RecertSweep::new(
            PeriodService::new(Arc::new(Discard), sink.clone()),
            enrollment.clone(),
        );

        // run just after the trigger time valid_until - interval
        let now = valid_until - DAY + 60;
        let report = sweep.run(&store, now);
        assert_eq!(report.spawned, 1);
        assert_eq!(report.failed, 0);

        store.read(|state| {
            let periods = state.periods_for(cert.id, user);
            assert_eq!(periods.len(), 2);

            let successor = periods.iter().find(|p| p.id != predecessor).unwrap();
            assert_eq!(successor.window_start, valid_until - DAY);
            assert_eq!(successor.window_due, Some(valid_until));
            assert!(successor.recertifiable);
            assert!(!successor.first);

            let old = state.period(predecessor).unwrap();
            assert!(!old.recertifiable);
            assert!(old.first);

            let assignment = state.assignment(cert.id, user).unwrap();
            assert_eq!(assignment.temporary_valid_until, Some(valid_until + 14 * DAY));
        });

        assert_eq!(enrollment.synced.lock().unwrap().len(), 1);
        assert!(sink
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, RecertEvent::RecertificationStarted { .. })));
    }

    #[test]
    fn second_run_spawns_nothing() {
        let cert = certification(Some(DAY), json!({}));
        let (store, user, _) = seeded_store(&cert);
        let now = T + 30 * DAY - DAY + 60;

        let sweep = sweep();
        assert_eq!(sweep.run(&store, now).spawned, 1);

        let again = sweep.run(&store, now);
        assert_eq!(again.spawned, 0);
        assert_eq!(again.examined, 0);
        store.read(|state| assert_eq!(state.periods_for(cert.id, user).len(), 2));
    }

    #[test]
    fn misconfigured_interval_defuses_the_period() {
        // interval longer than the whole cycle: successor would start before
        // the current period does
        let cert = certification(Some(60 * DAY), json!({}));
        let (store, user, predecessor) = seeded_store(&cert);
        let now = T + 30 * DAY;

        let report = sweep().run(&store, now);
        assert_eq!(report.defused, 1);
        assert_eq!(report.spawned, 0);

        store.read(|state| {
            assert_eq!(state.periods_for(cert.id, user).len(), 1);
            assert!(!state.period(predecessor).unwrap().recertifiable);
        });

        // defusing is sticky: the next run has nothing to examine
        let report = sweep().run(&store, now);
        assert_eq!(report.examined, 0);
    }

    #[test]
    fn trigger_time_not_reached_is_not_selected() {
        let cert = certification(Some(DAY), json!({}));
        let (store, _, _) = seeded_store(&cert);

        // a minute before valid_until - interval
        let report = sweep().run(&store, T + 29 * DAY - 60);
        assert_eq!(report.examined, 0);
    }

    #[test]
    fn lookback_bounds_resurrection() {
        let cert = certification(Some(DAY), json!({}));
        let (store, _, _) = seeded_store(&cert);
        let valid_until = T + 30 * DAY;

        // expired well past the lookback horizon
        let report = sweep().run(&store, valid_until + DEFAULT_LOOKBACK + DAY);
        assert_eq!(report.examined, 0);

        // shrinking the horizon is honored too
        let report = sweep()
            .with_lookback(DAY)
            .run(&store, valid_until + 2 * DAY);
        assert_eq!(report.examined, 0);
    }

    #[test]
    fn inactive_archived_or_deleted_are_excluded() {
        let now = T + 30 * DAY;

        let cert = certification(Some(DAY), json!({}));
        let (store, _user, _) = seeded_store(&cert);
        store
            .transaction(|state| {
                let mut c = state.certification(cert.id).unwrap();
                c.active = false;
                state.put_certification(c);
                Ok(())
            })
            .unwrap();
        assert_eq!(sweep().run(&store, now).examined, 0);

        let cert = certification(Some(DAY), json!({}));
        let (store, user2, _) = seeded_store(&cert);
        store
            .transaction(|state| {
                let mut a = state.assignment(cert.id, user2).unwrap();
                a.archived = true;
                state.put_assignment(a);
                Ok(())
            })
            .unwrap();
        assert_eq!(sweep().run(&store, now).examined, 0);

        let cert = certification(Some(DAY), json!({}));
        let (store, user3, _) = seeded_store(&cert);
        store
            .transaction(|state| {
                let mut u = state.user(user3).unwrap();
                u.deleted = true;
                state.put_user(u);
                Ok(())
            })
            .unwrap();
        assert_eq!(sweep().run(&store, now).examined, 0);
    }

    #[test]
    fn past_or_lower_grace_extension_is_not_applied() {
        // grace so short the extension is already in the past at sweep time
        let cert = certification(Some(DAY), json!({"grace2": 30}));
        let (store, user, _) = seeded_store(&cert);
        let valid_until = T + 30 * DAY;

        sweep().run(&store, valid_until + 60);
        store.read(|state| {
            assert_eq!(state.assignment(cert.id, user).unwrap().temporary_valid_until, None);
        });

        // an already-higher override is kept
        let cert = certification(Some(DAY), json!({"grace2": 14 * DAY}));
        let (store, user, _) = seeded_store(&cert);
        let existing = valid_until + 365 * DAY;
        store
            .transaction(|state| {
                let mut a = state.assignment(cert.id, user).unwrap();
                a.temporary_valid_until = Some(existing);
                state.put_assignment(a);
                Ok(())
            })
            .unwrap();

        sweep().run(&store, valid_until - DAY + 60);
        store.read(|state| {
            assert_eq!(
                state.assignment(cert.id, user).unwrap().temporary_valid_until,
                Some(existing)
            );
        });
    }

    #[test]
    fn one_failing_candidate_does_not_abort_the_sweep() {
        let now = T + 30 * DAY - DAY + 60;
        let store = MemoryStore::new();
        let svc = service();

        // candidate A: phase-2 rules produce valid_until == valid_from,
        // so successor creation fails validation
        let broken = certification(
            Some(DAY),
            json!({
                "valid2": "windowstart",
                "expiration2": {"since": "windowstart"},
            }),
        );
        // candidate B: plain, spawns fine
        let healthy = plain_certification(Some(DAY));

        let mut users = Vec::new();
        for cert in [&broken, &healthy] {
            let user = store
                .transaction(|state| {
                    let user = crate::fixtures::seed(state, cert);
                    let period = svc.create_period(
                        state,
                        cert.id,
                        user,
                        cert.program_first.clone(),
                        PeriodDates {
                            window_start: T,
                            window_due: None,
                            window_end: None,
                            valid_from: Some(T),
                            valid_until: Some(T + 30 * DAY),
                        },
                    )?;
                    let mut certified = state.period(period.id).unwrap();
                    certified.certified_at = Some(T + DAY);
                    state.update_period(certified)?;
                    Ok(user)
                })
                .unwrap();
            users.push(user);
        }

        let report = sweep().run(&store, now);
        assert_eq!(report.examined, 2);
        assert_eq!(report.spawned, 1);
        assert_eq!(report.failed, 1);

        store.read(|state| {
            // the failed candidate rolled back: still a single period, flag intact
            let broken_periods = state.periods_for(broken.id, users[0]);
            assert_eq!(broken_periods.len(), 1);
            assert!(broken_periods[0].recertifiable);

            assert_eq!(state.periods_for(healthy.id, users[1]).len(), 2);
        });
    }
}
