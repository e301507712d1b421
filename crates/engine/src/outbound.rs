//! Outbound collaborator seams.
//!
//! The engine never talks to the certificate issuer, enrollment system or
//! event bus directly; it publishes through these traits. Issuance and event
//! emission are fire-and-forget and must never join a transaction's failure
//! path; revocation reports success or failure.

use serde::Serialize;
use tracing::debug;

use recert_core::{CertificateRef, CertificationId, PeriodId, ProgramRef, RecertError, Timestamp, UserId};

/// External certificate issuing collaborator, addressed by opaque period id.
pub trait CertificateAuthority: Send + Sync {
    /// Request asynchronous issuance for a freshly certified period.
    /// Fire-and-forget: implementations must not block the caller.
    fn request_issue(&self, period: PeriodId, template: &str);

    /// Revoke a previously issued certificate.
    fn revoke(&self, reference: &CertificateRef) -> Result<(), RecertError>;
}

/// Outbound event interface the engine publishes to, decoupled from its
/// transactions.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: RecertEvent);
}

/// Enrollment-system collaborator: aligns the external program allocation
/// with a newly opened cycle.
pub trait EnrollmentSync: Send + Sync {
    fn sync_allocation(&self, certification: CertificationId, user: UserId, program: &ProgramRef);
}

// ── Events ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub enum RecertEvent {
    PeriodCreated {
        certification: CertificationId,
        user: UserId,
        period: PeriodId,
    },
    UserCertified {
        certification: CertificationId,
        user: UserId,
        period: PeriodId,
        certified_at: Timestamp,
    },
    PeriodRevoked {
        certification: CertificationId,
        user: UserId,
        period: PeriodId,
    },
    RecertificationStarted {
        certification: CertificationId,
        user: UserId,
        predecessor: PeriodId,
        successor: PeriodId,
    },
}

// ── No-op collaborators ─────────────────────────────────────────────

/// Discarding implementation of every outbound seam, for deployments without
/// an issuing or messaging backend and as a default in test scaffolding.
pub struct Discard;

impl CertificateAuthority for Discard {
    fn request_issue(&self, period: PeriodId, template: &str) {
        debug!(%period, template, "certificate issuance request discarded");
    }

    fn revoke(&self, reference: &CertificateRef) -> Result<(), RecertError> {
        debug!(reference, "certificate revocation discarded");
        Ok(())
    }
}

impl EventSink for Discard {
    fn publish(&self, event: RecertEvent) {
        debug!(?event, "event discarded");
    }
}

impl EnrollmentSync for Discard {
    fn sync_allocation(&self, certification: CertificationId, user: UserId, program: &ProgramRef) {
        debug!(%certification, %user, program, "allocation sync discarded");
    }
}
