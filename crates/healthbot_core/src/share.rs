//! crates/healthbot_core/src/share.rs
//!
//! The share session lifecycle: create, validate, expire.
//!
//! A share session is the only access-control primitive in the system:
//! possession of a live token grants a doctor read access to the patient
//! records it covers. Sessions are never deleted; expiry flips a flag and the
//! row stays behind as audit history.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::domain::ShareSession;
use crate::ports::{PortError, PortResult, RecordStore};

/// Default validity window for a freshly created share, in minutes.
pub const DEFAULT_VALIDITY_MINUTES: i64 = 15;

/// Creates, validates, and expires time-boxed share sessions.
#[derive(Clone)]
pub struct ShareSessionManager {
    store: Arc<dyn RecordStore>,
}

impl ShareSessionManager {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Creates a share session valid for `validity` from now.
    ///
    /// Both the patient and the doctor must already exist; a missing record
    /// propagates as `PortError::NotFound`. Each call creates a fresh session
    /// with a fresh token — concurrent shares for the same pair are not
    /// deduplicated.
    pub async fn create(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        report_id: Option<Uuid>,
        validity: Duration,
    ) -> PortResult<ShareSession> {
        self.store.get_patient(patient_id).await?;
        self.store.get_doctor(doctor_id).await?;
        if let Some(report_id) = report_id {
            let report = self.store.get_report(report_id).await?;
            if report.patient_id != patient_id {
                return Err(PortError::NotFound(format!(
                    "Report {} not found for patient {}",
                    report_id, patient_id
                )));
            }
        }

        let now = Utc::now();
        let session = ShareSession {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            report_id,
            created_at: now,
            expires_at: now + validity,
            active: true,
        };
        self.store.insert_session(session).await
    }

    /// Returns the session only if it is still usable.
    ///
    /// Fails softly: unknown tokens, inactive sessions, and expired sessions
    /// all yield `Ok(None)`. On the first observation of expiry the stored
    /// flag is flipped to inactive; that write is best-effort — a failure is
    /// logged and the session is treated as invalid regardless.
    pub async fn validate(&self, share_id: Uuid) -> PortResult<Option<ShareSession>> {
        let session = match self.store.get_session(share_id).await {
            Ok(session) => session,
            Err(PortError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        if !session.active {
            return Ok(None);
        }

        let now = Utc::now();
        if now >= session.expires_at {
            if let Err(e) = self.store.set_session_active(share_id, false).await {
                warn!(%share_id, error = %e, "failed to persist expiry flip");
            }
            return Ok(None);
        }

        Ok(Some(session))
    }
}
