//! LifecycleController – Auf- und Abbau einer Voice-Session
//!
//! ```text
//! connect():
//!   Broker.acquire -> Transport erstellen -> Mikrofon oeffnen
//!   -> Tracks anhaengen -> Wiedergabe binden -> Event-Kanal oeffnen
//!   -> Negotiation -> Connected
//!
//! Abbau (disconnect, Fehler im Aufbau, Transport verloren):
//!   Peer-Connection schliessen -> lokale Tracks freigeben -> Wiedergabe entfernen
//! ```
//!
//! Der Controller ist der einzige Besitzer des `ConnectionHandle`. Transport-
//! Events werden von einem Beobachter-Task verarbeitet, damit ein Abbruch
//! durch die Gegenseite denselben Abbau ausloest wie ein `disconnect()`.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use voxbridge_core::{ConnectionState, PeerState, Result, SessionError, SessionEvent};

use crate::broker::SessionBroker;
use crate::channel::EventChannel;
use crate::handle::ConnectionHandle;
use crate::media::MediaPipeline;
use crate::negotiate::ConnectionEstablisher;
use crate::transport::{TransportEvent, TransportFactory};

/// Groesse des Broadcast-Kanals fuer Session-Events
const EVENT_KANAL_GROESSE: usize = 256;

/// Orchestriert Broker, Media, Event-Kanal und Negotiation
///
/// Clone teilt den inneren Zustand.
pub struct LifecycleController<M: MediaPipeline, F: TransportFactory> {
    inner: Arc<ControllerInner<M, F>>,
}

impl<M: MediaPipeline, F: TransportFactory> Clone for LifecycleController<M, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ControllerInner<M: MediaPipeline, F: TransportFactory> {
    broker: SessionBroker,
    establisher: ConnectionEstablisher,
    media: M,
    factory: F,
    kanal_label: String,
    muted: AtomicBool,
    zustand: Mutex<ControllerZustand<M::Source>>,
    event_tx: broadcast::Sender<SessionEvent>,
}

struct ControllerZustand<S> {
    state: ConnectionState,
    /// Zaehlt Verbindungsversuche, Beobachter alter Versuche werden ignoriert
    epoche: u64,
    aktiv: Option<AktiveSession<S>>,
}

struct AktiveSession<S> {
    handle: Arc<ConnectionHandle>,
    source: Option<S>,
    beobachter: Option<JoinHandle<()>>,
}

/// Was bis zu einem Fehler im Aufbau schon belegt wurde
struct Teilaufbau<S> {
    handle: Option<Arc<ConnectionHandle>>,
    source: Option<S>,
}

impl<M: MediaPipeline, F: TransportFactory> LifecycleController<M, F> {
    pub fn neu(
        broker: SessionBroker,
        establisher: ConnectionEstablisher,
        media: M,
        factory: F,
        kanal_label: impl Into<String>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_KANAL_GROESSE);
        Self {
            inner: Arc::new(ControllerInner {
                broker,
                establisher,
                media,
                factory,
                kanal_label: kanal_label.into(),
                muted: AtomicBool::new(false),
                zustand: Mutex::new(ControllerZustand {
                    state: ConnectionState::Idle,
                    epoche: 0,
                    aktiv: None,
                }),
                event_tx,
            }),
        }
    }

    /// Aktueller Zustand
    pub fn state(&self) -> ConnectionState {
        self.inner.zustand.lock().state
    }

    /// Abonniert Zustandswechsel, Remote-Tracks und Kanal-Nachrichten
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn media(&self) -> &M {
        &self.inner.media
    }

    /// Handle der aktiven Verbindung, falls vorhanden
    pub fn connection(&self) -> Option<Arc<ConnectionHandle>> {
        self.inner
            .zustand
            .lock()
            .aktiv
            .as_ref()
            .map(|a| Arc::clone(&a.handle))
    }

    /// Baut eine neue Verbindung auf
    ///
    /// Schlaegt ein Schritt fehl, wird alles bereits Belegte freigegeben und
    /// der ausloesende Fehler zurueckgegeben. Es wird nie automatisch
    /// wiederholt.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<()> {
        let epoche = {
            let mut z = self.inner.zustand.lock();
            if z.state.ist_aktiv() {
                warn!(state = %z.state, "connect() abgelehnt");
                return Err(SessionError::AlreadyConnecting);
            }
            z.epoche += 1;
            self.inner.wechseln(&mut z, ConnectionState::Connecting);
            z.epoche
        };

        let mut teil = Teilaufbau {
            handle: None,
            source: None,
        };

        match self.aufbauen(&mut teil).await {
            Ok((handle, events)) => {
                handle.set_state(ConnectionState::Connected);

                // Connected und aktive Session stehen unter derselben Sperre,
                // bevor der Beobachter das erste Transport-Event sieht
                let mut z = self.inner.zustand.lock();
                self.inner.wechseln(&mut z, ConnectionState::Connected);
                let beobachter = tokio::spawn(transport_beobachten(
                    Arc::downgrade(&self.inner),
                    epoche,
                    Arc::clone(&handle),
                    events,
                ));
                z.aktiv = Some(AktiveSession {
                    handle: Arc::clone(&handle),
                    source: teil.source.take(),
                    beobachter: Some(beobachter),
                });
                info!(connection = %handle.id(), "Voice-Session verbunden");
                Ok(())
            }
            Err(e) => {
                warn!(fehler = %e, "Verbindungsaufbau fehlgeschlagen, gebe Ressourcen frei");
                if let Some(handle) = teil.handle.take() {
                    self.inner.freigeben(&handle, teil.source.take()).await;
                }
                let mut z = self.inner.zustand.lock();
                self.inner.wechseln(&mut z, ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Die einzelnen Schritte von `connect()` in fester Reihenfolge
    async fn aufbauen(
        &self,
        teil: &mut Teilaufbau<M::Source>,
    ) -> Result<(Arc<ConnectionHandle>, broadcast::Receiver<TransportEvent>)> {
        let inner = &self.inner;

        let credential = inner.broker.acquire().await?;

        let transport = inner.factory.create().await?;
        let handle = Arc::new(ConnectionHandle::neu(transport));
        teil.handle = Some(Arc::clone(&handle));
        // Vor allen weiteren Schritten abonnieren, damit kein Event verloren geht
        let events = handle.transport().subscribe();
        debug!(connection = %handle.id(), "Peer-Connection erstellt");

        let source = teil.source.insert(inner.media.capture_local_audio().await?);
        inner.media.set_muted(inner.muted.load(Ordering::Relaxed));
        inner.media.attach_local(&handle, source).await?;
        inner.media.bind_remote_sink(&handle);

        let kanal = EventChannel::open(&handle, &inner.kanal_label).await?;
        let tx = inner.event_tx.clone();
        let label = kanal.label().to_owned();
        kanal.on_message(move |payload| {
            let _ = tx.send(SessionEvent::KanalNachricht {
                label: label.clone(),
                payload,
            });
        });

        inner.establisher.negotiate(&handle, credential).await?;
        Ok((handle, events))
    }

    /// Trennt die aktive Verbindung
    ///
    /// In `Idle`/`Disconnected` ohne Wirkung. Waehrend `Connecting` ebenfalls
    /// ohne Wirkung, der laufende Aufbau muss erst abgeschlossen sein.
    /// Fehler beim Abbau werden nur protokolliert.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        let aktiv = {
            let mut z = self.inner.zustand.lock();
            match z.state {
                ConnectionState::Connected => z.aktiv.take(),
                ConnectionState::Connecting => {
                    warn!("disconnect() waehrend des Verbindungsaufbaus ignoriert");
                    return;
                }
                _ => {
                    debug!("disconnect() ohne aktive Verbindung");
                    return;
                }
            }
        };

        // Abbau laeuft bereits durch den Beobachter
        let Some(mut aktiv) = aktiv else {
            return;
        };

        if let Some(beobachter) = aktiv.beobachter.take() {
            beobachter.abort();
        }
        self.inner.freigeben(&aktiv.handle, aktiv.source.take()).await;

        let mut z = self.inner.zustand.lock();
        self.inner.wechseln(&mut z, ConnectionState::Disconnected);
        info!(connection = %aktiv.handle.id(), "Voice-Session getrennt");
    }

    /// Mikrofon stummschalten, bleibt ueber Reconnects erhalten
    pub fn set_muted(&self, muted: bool) {
        self.inner.muted.store(muted, Ordering::Relaxed);
        self.inner.media.set_muted(muted);
    }

    pub fn ist_gemutet(&self) -> bool {
        self.inner.muted.load(Ordering::Relaxed)
    }

    /// Sendet ein Event ueber den Kanal der aktiven Verbindung
    pub async fn send_event<T: Serialize + Sync + ?Sized>(&self, nachricht: &T) -> Result<()> {
        let kanal = self
            .connection()
            .and_then(|h| h.channel())
            .ok_or_else(|| SessionError::ChannelNotOpen(self.inner.kanal_label.clone()))?;
        kanal.send(nachricht).await
    }
}

impl<M: MediaPipeline, F: TransportFactory> ControllerInner<M, F> {
    fn wechseln(&self, z: &mut ControllerZustand<M::Source>, nach: ConnectionState) {
        let von = z.state;
        if von == nach {
            return;
        }
        z.state = nach;
        debug!(%von, %nach, "Zustandswechsel");
        let _ = self.event_tx.send(SessionEvent::ZustandGeaendert { von, nach });
    }

    /// Abbau in fester Reihenfolge: Verbindung, lokale Tracks, Wiedergabe
    async fn freigeben(&self, handle: &ConnectionHandle, source: Option<M::Source>) {
        handle.schliessen().await;
        self.media.release_local(source).await;
        self.media.release_sink().await;
    }

    /// Die Gegenseite oder das Netz hat die Verbindung beendet
    async fn verbindung_verloren(&self, epoche: u64, peer_state: PeerState) {
        let aktiv = {
            let mut z = self.zustand.lock();
            if z.epoche != epoche || z.state != ConnectionState::Connected {
                return;
            }
            z.aktiv.take()
        };
        let Some(mut aktiv) = aktiv else {
            return;
        };

        warn!(
            connection = %aktiv.handle.id(),
            ?peer_state,
            "Verbindung unerwartet beendet"
        );
        // Der eigene Task wird nicht abgebrochen, er endet nach dem Abbau
        aktiv.beobachter.take();
        self.freigeben(&aktiv.handle, aktiv.source.take()).await;

        let _ = self.event_tx.send(SessionEvent::VerbindungVerloren {
            connection_id: aktiv.handle.id(),
            peer_state,
        });
        let mut z = self.zustand.lock();
        if z.epoche == epoche {
            self.wechseln(&mut z, ConnectionState::Disconnected);
        }
    }
}

/// Verarbeitet Transport-Events einer verbundenen Session
async fn transport_beobachten<M: MediaPipeline, F: TransportFactory>(
    inner: Weak<ControllerInner<M, F>>,
    epoche: u64,
    handle: Arc<ConnectionHandle>,
    mut events: broadcast::Receiver<TransportEvent>,
) {
    loop {
        match events.recv().await {
            Ok(TransportEvent::ConnectionStateChanged(s)) if s.ist_terminal() => {
                if let Some(inner) = inner.upgrade() {
                    inner.verbindung_verloren(epoche, s).await;
                }
                break;
            }
            Ok(TransportEvent::ConnectionStateChanged(PeerState::Disconnected)) => {
                warn!(connection = %handle.id(), "Peer-Verbindung unterbrochen, warte auf Erholung");
            }
            Ok(TransportEvent::ConnectionStateChanged(s)) => {
                debug!(connection = %handle.id(), peer_state = ?s, "Peer-Zustand");
            }
            Ok(TransportEvent::RemoteTrackAdded(track)) => {
                let track_id = track.id();
                handle.remote_track_erfassen(track_id.clone());
                if let Some(inner) = inner.upgrade() {
                    let _ = inner.event_tx.send(SessionEvent::RemoteTrackEmpfangen {
                        connection_id: handle.id(),
                        track_id,
                    });
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(verpasst = n, "Transport-Events verpasst");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!(connection = %handle.id(), "Transport-Beobachter beendet");
}
