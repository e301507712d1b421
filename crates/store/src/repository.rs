//! Repository seam between the engine and the persistent store.
//!
//! The engine only ever sees a [`Repository`]; the concrete [`State`] is the
//! in-memory implementation that [`MemoryStore`](crate::MemoryStore) wraps in
//! transactions. A SQL-backed store would implement the same trait against a
//! live transaction handle.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use recert_core::{
    Assignment, Certification, CertificationId, Period, PeriodId, RecertError, User, UserId,
};

/// CRUD surface the engine operates against, scoped to one open transaction.
pub trait Repository {
    fn certification(&self, id: CertificationId) -> Option<Certification>;
    fn put_certification(&mut self, certification: Certification);

    fn user(&self, id: UserId) -> Option<User>;
    fn put_user(&mut self, user: User);

    fn assignment(&self, certification: CertificationId, user: UserId) -> Option<Assignment>;
    fn put_assignment(&mut self, assignment: Assignment);

    fn period(&self, id: PeriodId) -> Option<Period>;
    fn insert_period(&mut self, period: Period);
    fn update_period(&mut self, period: Period) -> Result<(), RecertError>;
    fn remove_period(&mut self, id: PeriodId) -> Option<Period>;

    /// All periods for one (certification, user) pair, unordered.
    fn periods_for(&self, certification: CertificationId, user: UserId) -> Vec<Period>;

    /// Every period in the store (sweep candidate selection).
    fn all_periods(&self) -> Vec<Period>;
}

// ── In-memory state ─────────────────────────────────────────────────

/// The complete persisted state. Serializable as one snapshot document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    pub certifications: HashMap<CertificationId, Certification>,
    pub users: HashMap<UserId, User>,
    pub assignments: Vec<Assignment>,
    pub periods: HashMap<PeriodId, Period>,
}

impl Repository for State {
    fn certification(&self, id: CertificationId) -> Option<Certification> {
        self.certifications.get(&id).cloned()
    }

    fn put_certification(&mut self, certification: Certification) {
        self.certifications
            .insert(certification.id, certification);
    }

    fn user(&self, id: UserId) -> Option<User> {
        self.users.get(&id).cloned()
    }

    fn put_user(&mut self, user: User) {
        self.users.insert(user.id, user);
    }

    fn assignment(&self, certification: CertificationId, user: UserId) -> Option<Assignment> {
        self.assignments
            .iter()
            .find(|a| a.certification == certification && a.user == user)
            .cloned()
    }

    fn put_assignment(&mut self, assignment: Assignment) {
        match self
            .assignments
            .iter_mut()
            .find(|a| a.certification == assignment.certification && a.user == assignment.user)
        {
            Some(existing) => *existing = assignment,
            None => self.assignments.push(assignment),
        }
    }

    fn period(&self, id: PeriodId) -> Option<Period> {
        self.periods.get(&id).cloned()
    }

    fn insert_period(&mut self, period: Period) {
        self.periods.insert(period.id, period);
    }

    fn update_period(&mut self, period: Period) -> Result<(), RecertError> {
        match self.periods.get_mut(&period.id) {
            Some(existing) => {
                *existing = period;
                Ok(())
            }
            None => Err(RecertError::PeriodNotFound(period.id)),
        }
    }

    fn remove_period(&mut self, id: PeriodId) -> Option<Period> {
        self.periods.remove(&id)
    }

    fn periods_for(&self, certification: CertificationId, user: UserId) -> Vec<Period> {
        self.periods
            .values()
            .filter(|p| p.certification == certification && p.user == user)
            .cloned()
            .collect()
    }

    fn all_periods(&self) -> Vec<Period> {
        self.periods.values().cloned().collect()
    }
}
