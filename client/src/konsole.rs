//! Interaktive Terminal-Konsole
//!
//! Liest Befehle zeilenweise von stdin und gibt Zustandswechsel sowie
//! eingehende Events aus, sobald sie auftreten. `quit`, Ctrl-C und das Ende
//! der Eingabe bauen eine bestehende Verbindung vorher ab.

use crate::befehle::{Befehl, HILFE};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use voxbridge_audio::AudioDevice;
use voxbridge_core::{ConnectionState, SessionError, SessionEvent};
use voxbridge_session::{BackendClient, VoiceSession};

pub struct Konsole {
    session: VoiceSession,
    backend: BackendClient,
}

impl Konsole {
    pub fn neu(session: VoiceSession, backend: BackendClient) -> Self {
        Self { session, backend }
    }

    /// Hauptschleife bis `quit`, Ctrl-C oder EOF
    pub async fn ausfuehren(self) -> anyhow::Result<()> {
        let ausgabe = tokio::spawn(events_ausgeben(self.session.subscribe()));

        println!("voxbridge bereit, 'hilfe' zeigt alle Befehle");
        let mut zeilen = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                zeile = zeilen.next_line() => {
                    let Some(zeile) = zeile? else {
                        debug!("Eingabe beendet");
                        break;
                    };
                    match Befehl::parsen(&zeile) {
                        Ok(Some(Befehl::Quit)) => break,
                        Ok(Some(befehl)) => self.befehl_ausfuehren(befehl).await,
                        Ok(None) => {}
                        Err(e) => println!("{}", e),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C empfangen");
                    break;
                }
            }
        }

        self.session.disconnect().await;
        ausgabe.abort();
        info!("voxbridge beendet");
        Ok(())
    }

    async fn befehl_ausfuehren(&self, befehl: Befehl) {
        match befehl {
            Befehl::Connect => {
                // Aufbau im Hintergrund, die Konsole bleibt bedienbar
                let session = self.session.clone();
                tokio::spawn(async move {
                    if let Err(e) = session.connect().await {
                        println!("{}", verbindungsfehler_text(&e));
                    }
                });
            }
            Befehl::Disconnect => self.session.disconnect().await,
            Befehl::Mute => {
                self.session.set_muted(true);
                println!("Mikrofon stumm");
            }
            Befehl::Unmute => {
                self.session.set_muted(false);
                println!("Mikrofon aktiv");
            }
            Befehl::Status => self.status_ausgeben(),
            Befehl::Health => match self.backend.health().await {
                Ok(health) if health.ist_gesund() => println!("Backend gesund ({})", health.status),
                Ok(health) => println!("Backend meldet: {}", health.status),
                Err(e) => println!("Health-Abfrage fehlgeschlagen: {}", e),
            },
            Befehl::Geraete => {
                // cpal zaehlt Geraete blockierend auf
                match tokio::task::spawn_blocking(voxbridge_audio::list_input_devices).await {
                    Ok(Ok(geraete)) if geraete.is_empty() => println!("Keine Eingabegeraete gefunden"),
                    Ok(Ok(geraete)) => {
                        for geraet in &geraete {
                            println!("{}", geraet_zeile(geraet));
                        }
                    }
                    Ok(Err(e)) => println!("Geraeteliste nicht abrufbar: {}", e),
                    Err(e) => warn!(fehler = %e, "Geraeteabfrage abgebrochen"),
                }
            }
            Befehl::Senden(event) => match self.session.send_event(&event).await {
                Ok(()) => debug!("Event gesendet"),
                Err(e) => println!("Senden fehlgeschlagen: {}", e),
            },
            Befehl::Hilfe => println!("{}", HILFE),
            Befehl::Quit => {}
        }
    }

    fn status_ausgeben(&self) {
        let state = self.session.state();
        let stumm = if self.session.ist_gemutet() { ", stumm" } else { "" };
        match self.session.connection() {
            Some(handle) if state == ConnectionState::Connected => {
                let kanal = handle
                    .channel()
                    .map(|k| if k.is_open() { "offen" } else { "geschlossen" })
                    .unwrap_or("keiner");
                println!(
                    "{} ({}){}, Peer: {:?}, lokale Tracks: {}, Remote-Tracks: {}, Event-Kanal: {}",
                    state,
                    handle.id(),
                    stumm,
                    handle.transport().peer_state(),
                    handle.local_tracks().len(),
                    handle.remote_tracks().len(),
                    kanal
                );
            }
            _ => println!("{}{}", state, stumm),
        }
    }
}

fn verbindungsfehler_text(fehler: &SessionError) -> String {
    if fehler.ist_wiederholbar() {
        format!("Verbindung fehlgeschlagen: {} (erneuter Versuch moeglich)", fehler)
    } else {
        format!("Verbindung fehlgeschlagen: {}", fehler)
    }
}

fn geraet_zeile(geraet: &AudioDevice) -> String {
    let markierung = if geraet.ist_standard { "*" } else { " " };
    format!(
        "{} {} ({} Kanaele, {:?} Hz)",
        markierung, geraet.name, geraet.channels, geraet.sample_rates
    )
}

async fn events_ausgeben(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::ZustandGeaendert { von, nach }) => {
                println!("[{} -> {}]", von, nach);
            }
            Ok(SessionEvent::RemoteTrackEmpfangen { track_id, .. }) => {
                println!("[Remote-Audio empfangen: {}]", track_id);
            }
            Ok(SessionEvent::KanalNachricht { label, payload }) => {
                let typ = payload
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("<ohne type>");
                info!(kanal = %label, typ = typ, "Event empfangen");
                debug!(payload = %payload, "Event-Inhalt");
            }
            Ok(SessionEvent::VerbindungVerloren { peer_state, .. }) => {
                println!("[Verbindung verloren: {:?}]", peer_state);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(verpasst = n, "Konsole kommt mit den Events nicht hinterher");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wiederholbare_fehler_mit_hinweis() {
        let text = verbindungsfehler_text(&SessionError::transport("ICE fehlgeschlagen"));
        assert!(text.ends_with("(erneuter Versuch moeglich)"), "{}", text);

        let text = verbindungsfehler_text(&SessionError::ChannelNotOpen("oai-events".into()));
        assert!(!text.contains("erneuter Versuch"), "{}", text);
    }

    #[test]
    fn standardgeraet_wird_markiert() {
        let mut geraet = AudioDevice {
            name: "USB Mikrofon".into(),
            sample_rates: vec![48000],
            channels: 1,
            ist_standard: true,
        };
        assert_eq!(geraet_zeile(&geraet), "* USB Mikrofon (1 Kanaele, [48000] Hz)");

        geraet.ist_standard = false;
        assert!(geraet_zeile(&geraet).starts_with("  USB Mikrofon"));
    }
}
