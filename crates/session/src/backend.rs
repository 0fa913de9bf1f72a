//! HTTP-Client fuer das Voice-Backend
//!
//! Drei Endpunkte werden genutzt:
//! - `POST {realtime}/session`   – kurzlebiges Session-Credential
//! - `POST {realtime}/negotiate` – SDP-Offer gegen Answer tauschen
//! - `GET  {api}/health`         – Erreichbarkeit pruefen
//!
//! Jeder Endpunkt bildet seine Fehler auf genau eine `SessionError`-Variante
//! ab. Der Client selbst wiederholt nichts.

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};
use voxbridge_core::{Result, SessionError};

use crate::config::BackendEinstellungen;

/// Rohantwort von `POST /session`
#[derive(Debug, Deserialize)]
pub struct SessionAntwort {
    pub credential: Option<CredentialFeld>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialFeld {
    pub value: Option<String>,
    /// Unix-Zeitstempel in Sekunden
    pub expires_at: Option<i64>,
}

/// Antwort von `GET /health`
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(flatten)]
    pub details: HashMap<String, serde_json::Value>,
}

impl HealthStatus {
    pub fn ist_gesund(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy") || self.status.eq_ignore_ascii_case("ok")
    }
}

/// Gemeinsamer HTTP-Client, Clone teilt den Connection-Pool
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    einstellungen: BackendEinstellungen,
}

impl BackendClient {
    pub fn neu(einstellungen: BackendEinstellungen) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(einstellungen.request_timeout())
            .build()
            .map_err(|e| SessionError::transport(format!("HTTP-Client: {}", e)))?;
        Ok(Self { http, einstellungen })
    }

    pub fn einstellungen(&self) -> &BackendEinstellungen {
        &self.einstellungen
    }

    fn realtime(&self, pfad: &str) -> String {
        format!(
            "{}/{}",
            self.einstellungen.realtime_url.trim_end_matches('/'),
            pfad
        )
    }

    /// Fordert ein Session-Credential an
    ///
    /// Jeder Fehler (Netzwerk, Status, JSON) wird zu `CredentialUnavailable`.
    /// Die inhaltliche Pruefung des Credentials macht der Broker.
    #[instrument(skip(self))]
    pub async fn session_anfordern(&self) -> Result<SessionAntwort> {
        let url = self.realtime("session");
        let antwort = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| SessionError::CredentialUnavailable(format!("Request: {}", e)))?;

        let status = antwort.status();
        if !status.is_success() {
            return Err(SessionError::CredentialUnavailable(format!(
                "Backend antwortete mit {}",
                status
            )));
        }

        let text = antwort
            .text()
            .await
            .map_err(|e| SessionError::CredentialUnavailable(format!("Antwort: {}", e)))?;
        debug!(bytes = text.len(), "Session-Antwort empfangen");

        serde_json::from_str(&text)
            .map_err(|e| SessionError::CredentialUnavailable(format!("Ungueltiges JSON: {}", e)))
    }

    /// Sendet das SDP-Offer und gibt den Antwort-Body zurueck
    ///
    /// Das Credential geht ausschliesslich in den `Authorization`-Header.
    #[instrument(skip(self, sdp, secret), fields(sdp_len = sdp.len()))]
    pub async fn offer_senden(&self, sdp: &str, secret: &str) -> Result<String> {
        self.offer_senden_mit_timeout(sdp, secret, self.einstellungen.negotiation_timeout())
            .await
    }

    pub(crate) async fn offer_senden_mit_timeout(
        &self,
        sdp: &str,
        secret: &str,
        timeout: Duration,
    ) -> Result<String> {
        let url = self.realtime("negotiate");

        let antwort = self
            .http
            .post(&url)
            .bearer_auth(secret)
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .body(sdp.to_owned())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| negotiation_fehler(e, timeout))?;

        let status = antwort.status();
        if !status.is_success() {
            return Err(SessionError::NegotiationRequestFailed(format!(
                "Backend antwortete mit {}",
                status
            )));
        }

        antwort
            .text()
            .await
            .map_err(|e| negotiation_fehler(e, timeout))
    }

    /// Prueft die Erreichbarkeit des Backends
    pub async fn health(&self) -> Result<HealthStatus> {
        let url = format!(
            "{}/health",
            self.einstellungen.api_url.trim_end_matches('/')
        );
        let antwort = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SessionError::transport(format!("Health-Check: {}", e)))?;

        let status = antwort.status();
        if !status.is_success() {
            return Err(SessionError::transport(format!(
                "Health-Check antwortete mit {}",
                status
            )));
        }

        antwort
            .json::<HealthStatus>()
            .await
            .map_err(|e| SessionError::transport(format!("Health-Antwort: {}", e)))
    }
}

fn negotiation_fehler(e: reqwest::Error, timeout: Duration) -> SessionError {
    if e.is_timeout() {
        SessionError::NegotiationRequestFailed(format!(
            "Zeitueberschreitung nach {:?}",
            timeout
        ))
    } else {
        SessionError::NegotiationRequestFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> BackendClient {
        BackendClient::neu(BackendEinstellungen {
            realtime_url: format!("{}/api/v1/realtime/", server.uri()),
            api_url: format!("{}/api", server.uri()),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn health_liefert_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "healthy",
                "service": "AI Voice Assistant"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let health = client(&server).health().await.unwrap();
        assert!(health.ist_gesund());
        assert_eq!(health.details["service"], "AI Voice Assistant");
    }

    #[tokio::test]
    async fn health_fehlerstatus_ist_fehler() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = client(&server).health().await;
        assert!(matches!(result, Err(SessionError::Transport(_))));
    }

    #[tokio::test]
    async fn realtime_url_ohne_doppelten_slash() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/realtime/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let antwort = client(&server).session_anfordern().await.unwrap();
        assert!(antwort.credential.is_none());
    }

    #[tokio::test]
    async fn langsames_negotiate_ist_zeitueberschreitung() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/realtime/negotiate"))
            .and(header("authorization", "Bearer geheim"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("v=0\r\n")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let result = client(&server)
            .offer_senden_mit_timeout("v=0\r\n", "geheim", Duration::from_millis(100))
            .await;

        match result {
            Err(SessionError::NegotiationRequestFailed(msg)) => {
                assert!(msg.contains("Zeitueberschreitung"), "{}", msg);
                assert!(msg.contains("100ms"), "{}", msg);
            }
            anderes => panic!("Zeitueberschreitung erwartet, bekommen: {:?}", anderes),
        }
    }

    #[tokio::test]
    async fn rechtzeitige_antwort_trotz_verzoegerung() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/realtime/negotiate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("v=0\r\n")
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;

        let answer = client(&server)
            .offer_senden_mit_timeout("v=0\r\n", "geheim", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(answer, "v=0\r\n");
    }
}
