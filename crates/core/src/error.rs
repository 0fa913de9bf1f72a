//! Fehlertypen fuer den Session-Lebenszyklus
//!
//! Jeder Fehler, der waehrend `connect()` auftreten kann, wird auf genau
//! eine Variante dieses Enums abgebildet und einmalig an den Aufrufer
//! zurueckgegeben.

use thiserror::Error;

/// Globaler Result-Alias fuer voxbridge
pub type Result<T> = std::result::Result<T, SessionError>;

/// Alle moeglichen Fehler einer Voice-Session
#[derive(Debug, Error)]
pub enum SessionError {
    // --- Session-Broker ---
    #[error("Session-Credential nicht verfuegbar: {0}")]
    CredentialUnavailable(String),

    // --- Media ---
    #[error("Mikrofon-Zugriff verweigert: {0}")]
    MediaPermissionDenied(String),

    #[error("Kein Audio-Eingabegeraet verfuegbar: {0}")]
    MediaDeviceUnavailable(String),

    // --- Event-Kanal ---
    #[error("Event-Kanal '{0}' ist nicht geoeffnet")]
    ChannelNotOpen(String),

    // --- Negotiation ---
    #[error("Negotiation-Request fehlgeschlagen: {0}")]
    NegotiationRequestFailed(String),

    #[error("Ungueltige Remote-Description: {0}")]
    InvalidRemoteDescription(String),

    // --- Lebenszyklus ---
    #[error("Verbindungsaufbau laeuft bereits oder Verbindung besteht schon")]
    AlreadyConnecting,

    // --- Lokale Peer-Connection ---
    #[error("Transport-Fehler: {0}")]
    Transport(String),
}

impl SessionError {
    /// Erstellt einen Transport-Fehler aus einer beliebigen Nachricht
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Gibt true zurueck wenn ein erneuter `connect()` sinnvoll sein koennte
    ///
    /// Der Controller wiederholt nie selbst, die Einschaetzung ist nur ein
    /// Hinweis fuer die Oberflaeche.
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(
            self,
            Self::CredentialUnavailable(_)
                | Self::NegotiationRequestFailed(_)
                | Self::Transport(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = SessionError::ChannelNotOpen("oai-events".into());
        assert_eq!(e.to_string(), "Event-Kanal 'oai-events' ist nicht geoeffnet");
    }

    #[test]
    fn wiederholbar_erkennung() {
        assert!(SessionError::NegotiationRequestFailed("HTTP 502".into()).ist_wiederholbar());
        assert!(SessionError::CredentialUnavailable("leer".into()).ist_wiederholbar());
        assert!(!SessionError::MediaPermissionDenied("os".into()).ist_wiederholbar());
        assert!(!SessionError::AlreadyConnecting.ist_wiederholbar());
    }

    #[test]
    fn transport_helfer() {
        let e = SessionError::transport("add_track");
        assert!(matches!(e, SessionError::Transport(ref m) if m == "add_track"));
    }
}
