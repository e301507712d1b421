//! Shared test scaffolding: recording collaborators and state builders.

use std::sync::{Arc, Mutex};

use serde_json::json;
use uuid::Uuid;

use recert_core::{
    Assignment, CertificateRef, Certification, CertificationId, PeriodId, ProgramRef, RecertError,
    User, UserId,
};
use recert_store::{Repository, State};

use crate::lifecycle::PeriodService;
use crate::outbound::{CertificateAuthority, EnrollmentSync, EventSink, RecertEvent};

// ── Recording collaborators ─────────────────────────────────────────

#[derive(Default)]
pub(crate) struct RecordingAuthority {
    pub issued: Mutex<Vec<(PeriodId, String)>>,
    pub revoked: Mutex<Vec<CertificateRef>>,
    pub fail_revoke: bool,
}

impl CertificateAuthority for RecordingAuthority {
    fn request_issue(&self, period: PeriodId, template: &str) {
        self.issued.lock().unwrap().push((period, template.to_string()));
    }

    fn revoke(&self, reference: &CertificateRef) -> Result<(), RecertError> {
        if self.fail_revoke {
            return Err(RecertError::Certificate("issuer unreachable".to_string()));
        }
        self.revoked.lock().unwrap().push(reference.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    pub events: Mutex<Vec<RecertEvent>>,
}

impl EventSink for RecordingSink {
    fn publish(&self, event: RecertEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Default)]
pub(crate) struct RecordingEnrollment {
    pub synced: Mutex<Vec<(CertificationId, UserId, ProgramRef)>>,
}

impl EnrollmentSync for RecordingEnrollment {
    fn sync_allocation(&self, certification: CertificationId, user: UserId, program: &ProgramRef) {
        self.synced
            .lock()
            .unwrap()
            .push((certification, user, program.clone()));
    }
}

// ── Builders ────────────────────────────────────────────────────────

pub(crate) fn certification(
    recertify_interval: Option<i64>,
    settings: serde_json::Value,
) -> Certification {
    Certification {
        id: Uuid::new_v4(),
        name: "Forklift operator".to_string(),
        active: true,
        program_first: "prog-first".to_string(),
        program_recert: "prog-recert".to_string(),
        recertify_interval,
        certificate_template: None,
        settings,
    }
}

pub(crate) fn plain_certification(recertify_interval: Option<i64>) -> Certification {
    certification(recertify_interval, json!({}))
}

/// Insert a certification, a user and their assignment; returns the user id.
pub(crate) fn seed(state: &mut State, cert: &Certification) -> UserId {
    let user = Uuid::new_v4();
    state.put_certification(cert.clone());
    state.put_user(User {
        id: user,
        deleted: false,
    });
    state.put_assignment(Assignment {
        certification: cert.id,
        user,
        archived: false,
        temporary_valid_until: None,
        source: "manual".to_string(),
    });
    user
}

pub(crate) fn service() -> PeriodService {
    PeriodService::new(Arc::new(crate::outbound::Discard), Arc::new(crate::outbound::Discard))
}

pub(crate) fn recording_service(
    authority: Arc<RecordingAuthority>,
    sink: Arc<RecordingSink>,
) -> PeriodService {
    PeriodService::new(authority, sink)
}
