//! ConnectionHandle – die Peer-Connection eines Verbindungsversuchs
//!
//! Der Lifecycle-Controller besitzt das Handle exklusiv und ist der einzige,
//! der Zustand und Lebensdauer veraendert. Media-Pipeline und Event-Kanal
//! bekommen nur eine Referenz, um Tracks und Kanal anzuhaengen.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};
use voxbridge_core::{ConnectionId, ConnectionState, Result, SessionError, TrackId};

use crate::channel::EventChannel;
use crate::transport::{OutboundAudio, PeerTransport};

pub struct ConnectionHandle {
    id: ConnectionId,
    transport: Arc<dyn PeerTransport>,
    state: Mutex<ConnectionState>,
    local_tracks: Mutex<Vec<TrackId>>,
    remote_tracks: Mutex<Vec<String>>,
    channel: Mutex<Option<EventChannel>>,
}

impl ConnectionHandle {
    pub fn neu(transport: Arc<dyn PeerTransport>) -> Self {
        Self {
            id: ConnectionId::new(),
            transport,
            state: Mutex::new(ConnectionState::Connecting),
            local_tracks: Mutex::new(Vec::new()),
            remote_tracks: Mutex::new(Vec::new()),
            channel: Mutex::new(None),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn transport(&self) -> &Arc<dyn PeerTransport> {
        &self.transport
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn local_tracks(&self) -> Vec<TrackId> {
        self.local_tracks.lock().clone()
    }

    pub fn remote_tracks(&self) -> Vec<String> {
        self.remote_tracks.lock().clone()
    }

    pub fn channel(&self) -> Option<EventChannel> {
        self.channel.lock().clone()
    }

    /// Haengt einen lokalen Audio-Track fuer den Versand an
    ///
    /// Nur vor dem Erzeugen des Offers sinnvoll, eine Renegotiation gibt es nicht.
    pub async fn attach_local_track(&self, track_id: TrackId) -> Result<Arc<dyn OutboundAudio>> {
        let sender = self.transport.add_audio_track(&track_id).await?;
        debug!(connection = %self.id, track = %track_id, "Lokaler Track angehaengt");
        self.local_tracks.lock().push(track_id);
        Ok(sender)
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    pub(crate) fn remote_track_erfassen(&self, track_id: String) {
        let mut tracks = self.remote_tracks.lock();
        if !tracks.contains(&track_id) {
            tracks.push(track_id);
        }
    }

    /// Registriert den Event-Kanal, hoechstens einer pro Verbindung
    pub(crate) fn channel_setzen(&self, channel: EventChannel) -> Result<()> {
        let mut slot = self.channel.lock();
        if let Some(vorhanden) = slot.as_ref() {
            return Err(SessionError::transport(format!(
                "Event-Kanal '{}' existiert bereits",
                vorhanden.label()
            )));
        }
        *slot = Some(channel);
        Ok(())
    }

    /// Schliesst Event-Kanal und Peer-Connection, Fehler werden nur protokolliert
    pub(crate) async fn schliessen(&self) {
        let kanal = self.channel.lock().take();
        if let Some(kanal) = kanal {
            kanal.close().await;
        }
        if let Err(e) = self.transport.close().await {
            warn!(connection = %self.id, fehler = %e, "Peer-Connection schliessen fehlgeschlagen");
        }
        self.set_state(ConnectionState::Disconnected);
        debug!(connection = %self.id, "Peer-Connection geschlossen");
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("local_tracks", &self.local_tracks.lock().len())
            .field("remote_tracks", &self.remote_tracks.lock().len())
            .finish()
    }
}
