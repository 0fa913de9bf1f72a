//! ConnectionEstablisher – Offer/Answer-Austausch mit dem Backend
//!
//! Genau ein Versuch pro `connect()`. Das Credential wird nach dem Request
//! verworfen, egal ob er erfolgreich war.

use serde::Deserialize;
use tracing::{debug, info, warn};
use voxbridge_core::{Result, SessionCredential, SessionDescription, SessionError};

use crate::backend::BackendClient;
use crate::handle::ConnectionHandle;

#[derive(Debug, Deserialize)]
struct NegotiateAntwort {
    description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConnectionEstablisher {
    backend: BackendClient,
}

impl ConnectionEstablisher {
    pub fn neu(backend: BackendClient) -> Self {
        Self { backend }
    }

    /// Fuehrt den Offer/Answer-Austausch auf dem Handle durch
    ///
    /// Alle Tracks und der Event-Kanal muessen bereits angehaengt sein.
    pub async fn negotiate(
        &self,
        handle: &ConnectionHandle,
        credential: SessionCredential,
    ) -> Result<()> {
        let transport = handle.transport();

        let offer = transport.create_offer().await?;
        transport.set_local_description(offer.clone()).await?;

        // Nach dem ICE-Gathering enthaelt die lokale Description die Kandidaten
        let lokal = transport.local_description().await.unwrap_or(offer);
        debug!(connection = %handle.id(), sdp_len = lokal.sdp.len(), "Sende Offer");

        let antwort = self.backend.offer_senden(&lokal.sdp, credential.secret()).await;
        drop(credential);
        let body = antwort.map_err(|e| {
            warn!(connection = %handle.id(), fehler = %e, "Negotiation-Request fehlgeschlagen");
            e
        })?;

        let remote = remote_description_lesen(&body)?;
        transport
            .set_remote_description(remote)
            .await
            .map_err(|e| SessionError::InvalidRemoteDescription(e.to_string()))?;

        info!(connection = %handle.id(), "Remote-Description angewendet");
        Ok(())
    }
}

/// Liest `{ "description": "<sdp>" }` als Answer
fn remote_description_lesen(body: &str) -> Result<SessionDescription> {
    let antwort: NegotiateAntwort = serde_json::from_str(body)
        .map_err(|e| SessionError::InvalidRemoteDescription(format!("Kein JSON: {}", e)))?;

    let sdp = antwort
        .description
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| {
            SessionError::InvalidRemoteDescription("Feld 'description' fehlt oder ist leer".into())
        })?;

    let remote = SessionDescription::answer(sdp);
    if !remote.ist_plausibel() {
        return Err(SessionError::InvalidRemoteDescription(
            "Description beginnt nicht mit 'v='".into(),
        ));
    }
    Ok(remote)
}
