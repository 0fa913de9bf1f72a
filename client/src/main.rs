//! voxbridge – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet die Konsole.

use anyhow::Result;
use voxbridge_client::config::{self, ClientConfig};
use voxbridge_client::konsole::Konsole;
use voxbridge_client::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let config_pfad = config::config_pfad();

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let mut config = ClientConfig::laden(&config_pfad)?;
    config.umgebung_anwenden();

    logging::logging_initialisieren(&config.logging.level, &config.logging.format);
    if !logging::log_level_gueltig(&config.logging.level) {
        tracing::debug!(level = %config.logging.level, "Log-Level wird als Filter-Direktive verwendet");
    }
    if !logging::log_format_gueltig(&config.logging.format) {
        tracing::warn!(format = %config.logging.format, "Unbekanntes Log-Format, verwende text");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        backend = %config.backend.realtime_url,
        "voxbridge wird initialisiert"
    );

    let (session, backend) = voxbridge_client::session_erstellen(&config)?;
    Konsole::neu(session, backend).ausfuehren().await
}
