//! Session-Broker
//!
//! Holt pro Verbindungsversuch genau ein kurzlebiges Credential vom Backend.
//! Ein fehlendes oder leeres `value`-Feld ist ein harter Fehler.

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use voxbridge_core::{Result, SessionCredential, SessionError};

use crate::backend::BackendClient;

/// Beschafft Session-Credentials, haelt selbst keinen Zustand
#[derive(Debug, Clone)]
pub struct SessionBroker {
    backend: BackendClient,
}

impl SessionBroker {
    pub fn neu(backend: BackendClient) -> Self {
        Self { backend }
    }

    /// Fordert ein neues Credential an und prueft es
    pub async fn acquire(&self) -> Result<SessionCredential> {
        let antwort = self.backend.session_anfordern().await.map_err(|e| {
            warn!(fehler = %e, "Session-Credential konnte nicht geholt werden");
            e
        })?;

        let feld = antwort.credential.ok_or_else(|| {
            SessionError::CredentialUnavailable("Feld 'credential' fehlt".into())
        })?;

        let value = feld
            .value
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                SessionError::CredentialUnavailable("Feld 'credential.value' fehlt oder ist leer".into())
            })?;

        let expires_at = match feld.expires_at {
            Some(ts) => Some(DateTime::<Utc>::from_timestamp(ts, 0).ok_or_else(|| {
                SessionError::CredentialUnavailable(format!("Ungueltiger Ablaufzeitpunkt: {}", ts))
            })?),
            None => None,
        };

        let credential = SessionCredential::new(value, expires_at);
        if credential.ist_abgelaufen() {
            return Err(SessionError::CredentialUnavailable(
                "Credential ist bereits abgelaufen".into(),
            ));
        }

        info!(expires_at = ?credential.expires_at(), "Session-Credential erhalten");
        Ok(credential)
    }
}
