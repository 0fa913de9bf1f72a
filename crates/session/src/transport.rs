//! Transport-Schnittstelle der Peer-Connection
//!
//! Controller, Media-Pipeline, Event-Kanal und Establisher sprechen nur mit
//! diesen Traits. Die produktive Implementierung liegt in `rtc`, Tests
//! nutzen eine In-Memory-Variante.
//!
//! Callbacks der Peer-Connection werden nicht als Closures durchgereicht,
//! sondern als `TransportEvent` ueber einen Broadcast-Kanal verteilt.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use voxbridge_core::{PeerState, Result, SessionDescription, TrackId};

/// Groesse des Broadcast-Kanals fuer Transport-Events
pub const TRANSPORT_EVENT_KANAL_GROESSE: usize = 64;

/// Meldungen der Peer-Connection
#[derive(Debug, Clone)]
pub enum TransportEvent {
    ConnectionStateChanged(PeerState),
    RemoteTrackAdded(RemoteAudioTrack),
}

/// Ausgehender Audio-Track (Opus-Frames)
#[async_trait]
pub trait OutboundAudio: Send + Sync {
    async fn write_frame(&self, payload: Bytes, dauer: Duration) -> Result<()>;
}

/// Eingehender Audio-Track der Gegenseite
#[async_trait]
pub trait InboundAudio: Send + Sync {
    fn id(&self) -> String;

    /// Naechster Opus-Payload, `None` wenn der Track beendet ist
    async fn next_payload(&self) -> Option<Bytes>;
}

/// Geordneter, zuverlaessiger Datenkanal
#[async_trait]
pub trait DataChannelTransport: Send + Sync {
    fn label(&self) -> &str;
    fn is_open(&self) -> bool;
    async fn send_text(&self, text: String) -> Result<()>;

    /// Empfangsseite der Textnachrichten, kann genau einmal abgeholt werden
    fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<String>>;
    async fn close(&self);
}

/// Eine Peer-Connection
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn add_audio_track(&self, track_id: &TrackId) -> Result<Arc<dyn OutboundAudio>>;
    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannelTransport>>;
    async fn create_offer(&self) -> Result<SessionDescription>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;
    async fn local_description(&self) -> Option<SessionDescription>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
    fn peer_state(&self) -> PeerState;
    async fn close(&self) -> Result<()>;
}

/// Erzeugt pro `connect()` eine frische Peer-Connection
#[async_trait]
pub trait TransportFactory: Send + Sync + 'static {
    async fn create(&self) -> Result<Arc<dyn PeerTransport>>;
}

/// Geteilter Verweis auf einen eingehenden Track
#[derive(Clone)]
pub struct RemoteAudioTrack {
    inner: Arc<dyn InboundAudio>,
}

impl RemoteAudioTrack {
    pub fn new(inner: Arc<dyn InboundAudio>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> String {
        self.inner.id()
    }

    pub async fn next_payload(&self) -> Option<Bytes> {
        self.inner.next_payload().await
    }
}

impl std::fmt::Debug for RemoteAudioTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteAudioTrack")
            .field("id", &self.inner.id())
            .finish()
    }
}
