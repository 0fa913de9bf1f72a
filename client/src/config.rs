//! Client-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Client ohne Konfigurationsdatei
//! gegen ein lokales Backend laeuft.

use serde::{Deserialize, Serialize};
use voxbridge_session::{AudioEinstellungen, BackendEinstellungen, RtcEinstellungen};

/// Umgebungsvariable fuer den Pfad der Konfigurationsdatei
pub const CONFIG_ENV: &str = "VOXBRIDGE_CONFIG";
/// Umgebungsvariable, die die Realtime-Basis-URL ueberschreibt
pub const BACKEND_URL_ENV: &str = "VOXBRIDGE_BACKEND_URL";
/// Standardpfad der Konfigurationsdatei
pub const STANDARD_PFAD: &str = "voxbridge.toml";

/// Vollstaendige Client-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend-Endpunkte und Timeouts
    pub backend: BackendEinstellungen,
    /// ICE-Server und Event-Kanal
    pub rtc: RtcEinstellungen,
    /// Audio-Geraete und Codec
    pub audio: AudioEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ClientConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    pub fn aus_toml(inhalt: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(inhalt)
    }

    /// Uebernimmt Ueberschreibungen aus der Umgebung
    pub fn umgebung_anwenden(&mut self) {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            self.backend_url_setzen(&url);
        }
    }

    /// Setzt die Realtime-Basis-URL, leere Werte werden ignoriert
    pub fn backend_url_setzen(&mut self, url: &str) {
        let url = url.trim();
        if url.is_empty() {
            return;
        }
        tracing::debug!(url = url, "Realtime-URL aus Umgebung uebernommen");
        self.backend.realtime_url = url.trim_end_matches('/').to_string();
    }
}

/// Pfad der Konfigurationsdatei aus der Umgebung oder Standard
pub fn config_pfad() -> String {
    std::env::var(CONFIG_ENV).unwrap_or_else(|_| STANDARD_PFAD.into())
}
