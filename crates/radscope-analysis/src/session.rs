//! Per-upload patient sessions.
//!
//! Every analysed upload gets a unique session id and checksum so the browser
//! can tell results for different patients apart and drop stale ones.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientSession {
    pub session_id: String,
    pub patient_name: String,
    pub patient_id: String,
    pub study_date: String,
    pub body_part: String,
    pub filename: String,
    pub checksum: String,
    pub isolated: bool,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

/// Identity a client claims for a session.
#[derive(Debug, Clone, Default)]
pub struct SessionClaim<'a> {
    pub patient_name: &'a str,
    pub patient_id: &'a str,
    pub body_part: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionCheck {
    pub valid: bool,
    pub message: String,
}

impl SessionCheck {
    fn fail(message: &str) -> Self {
        Self { valid: false, message: message.to_string() }
    }
}

pub struct SessionManager {
    sessions: RwLock<HashMap<String, PatientSession>>,
    ttl: Duration,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("ttl", &self.ttl)
            .field("sessions", &"<patient sessions>")
            .finish()
    }
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), ttl }
    }

    /// Register a session for one upload and return it.
    pub async fn create(
        &self,
        patient_name: &str,
        patient_id: &str,
        study_date: &str,
        body_part: &str,
        filename: &str,
    ) -> PatientSession {
        let now = Utc::now();
        let patient_hash = sha256_hex(&format!("{patient_name}_{patient_id}_{study_date}_{body_part}"));
        let session_id = format!(
            "{}_{}_{}_{}",
            body_part.to_uppercase(),
            &patient_hash[..16],
            now.timestamp_millis(),
            Uuid::new_v4()
        );

        let session = PatientSession {
            session_id: session_id.clone(),
            patient_name: patient_name.to_string(),
            patient_id: patient_id.to_string(),
            study_date: study_date.to_string(),
            body_part: body_part.to_string(),
            filename: filename.to_string(),
            checksum: checksum(patient_name, patient_id, body_part, now),
            isolated: true,
            created_at: now,
            last_accessed: now,
        };

        self.sessions.write().await.insert(session_id.clone(), session.clone());
        debug!(session_id = %session_id, "Patient session created");
        session
    }

    /// Check that a session exists and belongs to the claimed patient.
    pub async fn validate(&self, session_id: &str, claim: &SessionClaim<'_>) -> SessionCheck {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(session_id) else {
            return SessionCheck::fail("Session not found");
        };
        if self.expired(session, now) {
            sessions.remove(session_id);
            debug!(session_id, "Expired patient session dropped on validate");
            return SessionCheck::fail("Session not found");
        }
        session.last_accessed = now;

        if session.patient_name != claim.patient_name
            || session.patient_id != claim.patient_id
            || session.body_part != claim.body_part
        {
            return SessionCheck::fail("Patient data mismatch - possible contamination");
        }
        SessionCheck { valid: true, message: "Session valid".to_string() }
    }

    /// A live session, or `None` if it is unknown or past the ttl.
    pub async fn info(&self, session_id: &str) -> Option<PatientSession> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(session_id) {
                None => return None,
                Some(s) if !self.expired(s, now) => return Some(s.clone()),
                Some(_) => {}
            }
        }
        self.sessions.write().await.remove(session_id);
        debug!(session_id, "Expired patient session dropped on lookup");
        None
    }

    fn ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX)
    }

    fn expired(&self, session: &PatientSession, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(session.last_accessed) > self.ttl()
    }

    /// Returns whether a session was removed.
    pub async fn clear(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove sessions idle for longer than the ttl. Returns the number removed.
    pub async fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Utc::now()).await
    }

    async fn cleanup_expired_at(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| now.signed_duration_since(s.last_accessed) <= ttl);
        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed, remaining = sessions.len(), "Expired patient sessions removed");
        }
        removed
    }
}

/// `sha256(name_id_bodypart_unixsecs)`, first 32 hex chars.
pub fn checksum(patient_name: &str, patient_id: &str, body_part: &str, at: DateTime<Utc>) -> String {
    let mut hex = sha256_hex(&format!("{patient_name}_{patient_id}_{body_part}_{}", at.timestamp()));
    hex.truncate(32);
    hex
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim<'a>(name: &'a str, id: &'a str, part: &'a str) -> SessionClaim<'a> {
        SessionClaim { patient_name: name, patient_id: id, body_part: part }
    }

    #[tokio::test]
    async fn test_session_id_format() {
        let mgr = SessionManager::new(Duration::from_secs(3600));
        let s = mgr.create("Jane Doe", "P-1", "20240101", "chest", "a.dcm").await;

        let parts: Vec<&str> = s.session_id.splitn(4, '_').collect();
        assert_eq!(parts[0], "CHEST");
        assert_eq!(parts[1].len(), 16);
        assert!(parts[2].parse::<i64>().is_ok());
        assert!(Uuid::parse_str(parts[3]).is_ok());
        assert_eq!(s.checksum.len(), 32);
        assert!(s.isolated);
    }

    #[tokio::test]
    async fn test_two_uploads_of_same_patient_get_distinct_sessions() {
        let mgr = SessionManager::new(Duration::from_secs(3600));
        let a = mgr.create("Jane", "1", "d", "brain", "x.dcm").await;
        let b = mgr.create("Jane", "1", "d", "brain", "x.dcm").await;
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(mgr.len().await, 2);
    }

    #[tokio::test]
    async fn test_validation_detects_mismatch() {
        let mgr = SessionManager::new(Duration::from_secs(3600));
        let s = mgr.create("Jane", "1", "d", "spine", "x.dcm").await;

        assert!(mgr.validate(&s.session_id, &claim("Jane", "1", "spine")).await.valid);

        let other = mgr.validate(&s.session_id, &claim("John", "1", "spine")).await;
        assert!(!other.valid);
        assert_eq!(other.message, "Patient data mismatch - possible contamination");

        let missing = mgr.validate("nope", &claim("Jane", "1", "spine")).await;
        assert_eq!(missing.message, "Session not found");
    }

    #[tokio::test]
    async fn test_clear_and_info() {
        let mgr = SessionManager::new(Duration::from_secs(3600));
        let s = mgr.create("A", "B", "C", "leg", "f.dcm").await;
        assert_eq!(mgr.info(&s.session_id).await.unwrap().filename, "f.dcm");
        assert!(mgr.clear(&s.session_id).await);
        assert!(!mgr.clear(&s.session_id).await);
        assert!(mgr.info(&s.session_id).await.is_none());
        assert!(mgr.is_empty().await);
    }

    #[tokio::test]
    async fn test_cleanup_removes_idle_sessions_only() {
        let mgr = SessionManager::new(Duration::from_secs(60));
        let old = mgr.create("A", "1", "d", "chest", "a.dcm").await;
        let fresh = mgr.create("B", "2", "d", "chest", "b.dcm").await;

        {
            let mut sessions = mgr.sessions.write().await;
            sessions.get_mut(&old.session_id).unwrap().last_accessed =
                Utc::now() - chrono::Duration::seconds(120);
        }

        assert_eq!(mgr.cleanup_expired_at(Utc::now()).await, 1);
        assert!(mgr.info(&old.session_id).await.is_none());
        assert!(mgr.info(&fresh.session_id).await.is_some());
    }

    #[tokio::test]
    async fn test_expired_session_is_not_served_or_revived() {
        let mgr = SessionManager::new(Duration::from_secs(60));
        let s = mgr.create("Jane", "1", "d", "brain", "x.dcm").await;
        let stale = mgr.create("Jane", "1", "d", "brain", "y.dcm").await;
        {
            let mut sessions = mgr.sessions.write().await;
            for id in [&s.session_id, &stale.session_id] {
                sessions.get_mut(id).unwrap().last_accessed = Utc::now() - chrono::Duration::hours(1);
            }
        }

        assert!(mgr.info(&s.session_id).await.is_none());
        assert_eq!(mgr.len().await, 1);

        let check = mgr.validate(&stale.session_id, &claim("Jane", "1", "brain")).await;
        assert!(!check.valid);
        assert_eq!(check.message, "Session not found");
        assert!(mgr.is_empty().await);
        assert!(mgr.info(&stale.session_id).await.is_none());
    }

    #[test]
    fn test_checksum_is_stable_within_a_second() {
        let at = Utc::now();
        assert_eq!(checksum("a", "b", "c", at), checksum("a", "b", "c", at));
        assert_ne!(checksum("a", "b", "c", at), checksum("a", "b", "d", at));
    }
}
