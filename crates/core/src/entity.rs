use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type CertificationId = Uuid;
pub type PeriodId = Uuid;
pub type UserId = Uuid;

/// Epoch seconds. Required timestamps must be > 0.
pub type Timestamp = i64;

/// Opaque reference to an enrollment program in the external system.
pub type ProgramRef = String;
/// Opaque reference to an issued certificate, owned by the issuing collaborator.
pub type CertificateRef = String;
/// Opaque reference to the mechanism that created an assignment.
pub type SourceRef = String;

// ── Certification ───────────────────────────────────────────────────

/// Definition of a recurring requirement a user satisfies via an external
/// enrollment program. Owns two rule phases: phase 1 for a user's first
/// cycle, phase 2 for every recertification cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certification {
    pub id: CertificationId,
    pub name: String,
    pub active: bool,
    /// Program used for first cycles.
    pub program_first: ProgramRef,
    /// Program used for recertification cycles.
    pub program_recert: ProgramRef,
    /// Seconds before a period's `valid_until` at which the next cycle opens.
    /// `None` disables recertification entirely.
    pub recertify_interval: Option<i64>,
    /// Certificate template reference; when set, completion requests issuance.
    pub certificate_template: Option<String>,
    /// Persisted period-rule settings block. Possibly stale or corrupt —
    /// only ever interpreted through the settings resolver.
    pub settings: serde_json::Value,
}

impl Certification {
    pub fn recertification_enabled(&self) -> bool {
        self.recertify_interval.is_some()
    }

    /// Program to enrol for a cycle of the given kind.
    pub fn program_for(&self, first_cycle: bool) -> &ProgramRef {
        if first_cycle {
            &self.program_first
        } else {
            &self.program_recert
        }
    }
}

// ── Period ──────────────────────────────────────────────────────────

/// One certification cycle for one (certification, user) pair.
///
/// Ownership of `certification`/`user`/`program` never changes after insert;
/// a new cycle is always a new row. `first` and `recertifiable` are derived
/// from the user's full ordered period list and are never set directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Period {
    pub id: PeriodId,
    pub certification: CertificationId,
    pub user: UserId,
    pub program: ProgramRef,
    pub window_start: Timestamp,
    pub window_due: Option<Timestamp>,
    pub window_end: Option<Timestamp>,
    pub valid_from: Option<Timestamp>,
    pub valid_until: Option<Timestamp>,
    pub certified_at: Option<Timestamp>,
    /// Set once, never cleared: a revoked period is permanently inert.
    pub revoked_at: Option<Timestamp>,
    pub first: bool,
    pub recertifiable: bool,
    pub certificate: Option<CertificateRef>,
}

impl Period {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_certified(&self) -> bool {
        self.certified_at.is_some()
    }

    /// Whether the window is open for certification at `now`: not yet
    /// certified, not revoked, started, and not past the hard deadline.
    pub fn is_open(&self, now: Timestamp) -> bool {
        !self.is_certified()
            && !self.is_revoked()
            && self.window_start <= now
            && self.window_end.map_or(true, |end| end >= now)
    }
}

// ── Assignment ──────────────────────────────────────────────────────

/// The (certification, user) relationship itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub certification: CertificationId,
    pub user: UserId,
    pub archived: bool,
    /// Grace override: keeps the user valid independent of period state.
    pub temporary_valid_until: Option<Timestamp>,
    pub source: SourceRef,
}

// ── User ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub deleted: bool,
}
