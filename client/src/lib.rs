//! voxbridge-client – Terminal-Oberflaeche fuer eine Voice-Session
//!
//! Laedt die Konfiguration, richtet das Logging ein und verdrahtet
//! Broker, Establisher, Media-Pipeline und Transport zu einer `VoiceSession`.

pub mod befehle;
pub mod config;
pub mod konsole;
pub mod logging;

use anyhow::Context;
use config::ClientConfig;
use voxbridge_session::{
    BackendClient, ConnectionEstablisher, LifecycleController, NativeMediaPipeline,
    SessionBroker, VoiceSession, WebRtcTransportFactory,
};

/// Baut eine Session samt Backend-Client aus der Konfiguration
pub fn session_erstellen(config: &ClientConfig) -> anyhow::Result<(VoiceSession, BackendClient)> {
    let backend =
        BackendClient::neu(config.backend.clone()).context("Backend-Client nicht erstellbar")?;
    let factory = WebRtcTransportFactory::neu(config.rtc.clone())
        .context("WebRTC-Transport nicht initialisierbar")?;

    let session = LifecycleController::neu(
        SessionBroker::neu(backend.clone()),
        ConnectionEstablisher::neu(backend.clone()),
        NativeMediaPipeline::neu(config.audio.clone()),
        factory,
        config.rtc.event_kanal.clone(),
    );
    Ok((session, backend))
}
