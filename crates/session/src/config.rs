//! Session-Konfiguration
//!
//! Die Abschnitte werden vom Client aus der TOML-Datei geladen und an
//! Broker, Establisher, Transport-Factory und Media-Pipeline weitergereicht.
//! Alle Felder haben Standardwerte.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Erlaubter Bereich fuer den Negotiation-Timeout in Sekunden
pub const NEGOTIATION_TIMEOUT_BEREICH: (u64, u64) = (10, 30);

/// Backend-Endpunkte und Timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendEinstellungen {
    /// Basis-URL fuer `/session` und `/negotiate`
    pub realtime_url: String,
    /// Basis-URL der allgemeinen API (`/health`)
    pub api_url: String,
    /// Timeout fuer einfache Requests in Sekunden
    pub request_timeout_secs: u64,
    /// Timeout fuer den Negotiation-Request in Sekunden (10..=30)
    pub negotiation_timeout_secs: u64,
}

impl Default for BackendEinstellungen {
    fn default() -> Self {
        Self {
            realtime_url: "http://localhost:8001/api/v1/realtime".into(),
            api_url: "http://localhost:8001/api".into(),
            request_timeout_secs: 10,
            negotiation_timeout_secs: 15,
        }
    }
}

impl BackendEinstellungen {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Negotiation-Timeout, auf den erlaubten Bereich begrenzt
    pub fn negotiation_timeout(&self) -> Duration {
        let (min, max) = NEGOTIATION_TIMEOUT_BEREICH;
        Duration::from_secs(self.negotiation_timeout_secs.clamp(min, max))
    }
}

/// Einstellungen der Peer-Connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtcEinstellungen {
    /// STUN/TURN-URLs
    pub ice_servers: Vec<String>,
    /// Label des Event-Kanals
    pub event_kanal: String,
    /// Maximale Wartezeit auf das ICE-Gathering in Sekunden
    pub ice_gathering_timeout_secs: u64,
}

impl Default for RtcEinstellungen {
    fn default() -> Self {
        Self {
            ice_servers: vec!["stun:stun.l.google.com:19302".into()],
            event_kanal: "oai-events".into(),
            ice_gathering_timeout_secs: 5,
        }
    }
}

/// Audio-Geraete und Codec-Parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    /// Name (Teilstring) des Eingabegeraets, leer = Standardgeraet
    pub eingabegeraet: Option<String>,
    /// Name (Teilstring) des Ausgabegeraets, leer = Standardgeraet
    pub ausgabegeraet: Option<String>,
    /// Abtastrate fuer Capture, Playback und Opus
    pub sample_rate: u32,
    /// Opus-Bitrate in kbit/s
    pub bitrate_kbps: u16,
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        Self {
            eingabegeraet: None,
            ausgabegeraet: None,
            sample_rate: 48000,
            bitrate_kbps: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_timeout_wird_begrenzt() {
        let mut b = BackendEinstellungen::default();
        assert_eq!(b.negotiation_timeout(), Duration::from_secs(15));

        b.negotiation_timeout_secs = 2;
        assert_eq!(b.negotiation_timeout(), Duration::from_secs(10));

        b.negotiation_timeout_secs = 300;
        assert_eq!(b.negotiation_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn teilweise_toml_nutzt_standardwerte() {
        let rtc: RtcEinstellungen = toml::from_str(r#"event_kanal = "events""#).unwrap();
        assert_eq!(rtc.event_kanal, "events");
        assert_eq!(rtc.ice_servers.len(), 1);

        let audio: AudioEinstellungen = toml::from_str(r#"eingabegeraet = "USB""#).unwrap();
        assert_eq!(audio.eingabegeraet.as_deref(), Some("USB"));
        assert_eq!(audio.sample_rate, 48000);
    }
}
