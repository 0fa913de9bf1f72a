//! Fehlertypen fuer die Audio-Ein-/Ausgabe

use thiserror::Error;
use voxbridge_core::SessionError;

/// Alle moeglichen Fehler der Audio-Schicht
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio-Geraet nicht gefunden: {0}")]
    GeraetNichtGefunden(String),

    #[error("Kein Standard-Eingabegeraet verfuegbar")]
    KeinStandardEingabegeraet,

    #[error("Kein Standard-Ausgabegeraet verfuegbar")]
    KeinStandardAusgabegeraet,

    #[error("Zugriff auf Audio-Geraet verweigert: {0}")]
    ZugriffVerweigert(String),

    #[error("Stream-Fehler: {0}")]
    StreamFehler(String),

    #[error("Codec-Fehler: {0}")]
    CodecFehler(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

pub type AudioResult<T> = Result<T, AudioError>;

impl From<AudioError> for SessionError {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::GeraetNichtGefunden(_)
            | AudioError::KeinStandardEingabegeraet
            | AudioError::KeinStandardAusgabegeraet
            | AudioError::StreamFehler(_) => SessionError::MediaDeviceUnavailable(e.to_string()),
            AudioError::ZugriffVerweigert(_) => SessionError::MediaPermissionDenied(e.to_string()),
            AudioError::CodecFehler(_) | AudioError::Konfiguration(_) => {
                SessionError::Transport(e.to_string())
            }
        }
    }
}
