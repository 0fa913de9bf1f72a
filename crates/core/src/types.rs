//! Gemeinsame Typen des Session-Lebenszyklus
//!
//! IDs verwenden das Newtype-Pattern, Session-Descriptions und
//! Credentials sind bewusst schmale Wertobjekte.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// IDs
// ---------------------------------------------------------------------------

/// Eindeutige ID einer Peer-Connection (pro `connect()` neu vergeben)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Erstellt eine neue zufaellige ConnectionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// ID eines lokalen Audio-Tracks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(pub String);

impl TrackId {
    /// Erstellt eine neue zufaellige TrackId
    pub fn new() -> Self {
        Self(format!("mic-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Verbindungszustand
// ---------------------------------------------------------------------------

/// Zustand des Lifecycle-Controllers
///
/// ```text
/// Idle -> Connecting -> Connected -> Disconnected
///             |                          ^
///             +------- Fehler -----------+
/// ```
///
/// `Idle` und `Disconnected` sind gleichwertige Ausgangszustaende.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionState {
    /// Verbindungsaufbau laeuft oder Verbindung steht
    pub fn ist_aktiv(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Session-Descriptions
// ---------------------------------------------------------------------------

/// Art einer Session-Description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Lokale oder entfernte Session-Description (SDP)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// Prueft die Grundstruktur: nicht leer und beginnt mit der `v=`-Zeile
    pub fn ist_plausibel(&self) -> bool {
        self.sdp.trim_start().starts_with("v=")
    }
}

// ---------------------------------------------------------------------------
// SessionCredential
// ---------------------------------------------------------------------------

/// Kurzlebiges Geheimnis fuer genau einen Negotiation-Request
///
/// Nicht `Clone`: das Credential wird an `negotiate()` uebergeben und dort
/// nach dem Request verworfen. `Debug` gibt den Wert nicht preis.
pub struct SessionCredential {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl SessionCredential {
    pub fn new(value: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Der geheime Wert
    pub fn secret(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Gibt true zurueck wenn ein Ablaufzeitpunkt bekannt und ueberschritten ist
    pub fn ist_abgelaufen(&self) -> bool {
        self.expires_at.is_some_and(|t| t <= Utc::now())
    }
}

impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredential")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn connection_id_eindeutig() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn track_id_praefix() {
        assert!(TrackId::new().as_str().starts_with("mic-"));
    }

    #[test]
    fn aktive_zustaende() {
        assert!(ConnectionState::Connecting.ist_aktiv());
        assert!(ConnectionState::Connected.ist_aktiv());
        assert!(!ConnectionState::Idle.ist_aktiv());
        assert!(!ConnectionState::Disconnected.ist_aktiv());
    }

    #[test]
    fn credential_debug_verbirgt_geheimnis() {
        let c = SessionCredential::new("ek_geheim", None);
        let debug = format!("{:?}", c);
        assert!(!debug.contains("ek_geheim"));
        assert_eq!(c.secret(), "ek_geheim");
    }

    #[test]
    fn credential_ablauf() {
        let alt = SessionCredential::new("x", Some(Utc::now() - Duration::seconds(5)));
        let neu = SessionCredential::new("x", Some(Utc::now() + Duration::seconds(60)));
        let ohne = SessionCredential::new("x", None);
        assert!(alt.ist_abgelaufen());
        assert!(!neu.ist_abgelaufen());
        assert!(!ohne.ist_abgelaufen());
    }

    #[test]
    fn sdp_plausibilitaet() {
        assert!(SessionDescription::answer("v=0\r\no=- 1 2 IN IP4 0.0.0.0\r\n").ist_plausibel());
        assert!(!SessionDescription::answer("").ist_plausibel());
        assert!(!SessionDescription::answer("<html>").ist_plausibel());
    }

    #[test]
    fn description_serde_typ_feld() {
        let json = serde_json::to_value(SessionDescription::offer("v=0")).unwrap();
        assert_eq!(json["type"], "offer");
        assert_eq!(json["sdp"], "v=0");
    }
}
