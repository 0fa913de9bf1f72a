//! voxbridge-session – Aufbau und Lebenszyklus einer Voice-Session
//!
//! Komponenten, von unten nach oben:
//! - `SessionBroker` – holt das kurzlebige Session-Credential
//! - `MediaPipeline` – Mikrofon und Wiedergabe
//! - `EventChannel` – JSON-Events neben dem Audio
//! - `ConnectionEstablisher` – Offer/Answer-Austausch
//! - `LifecycleController` – `connect()`/`disconnect()` und Abbau

pub mod backend;
pub mod broker;
pub mod channel;
pub mod config;
pub mod handle;
pub mod lifecycle;
pub mod media;
pub mod negotiate;
pub mod rtc;
pub mod transport;

pub use backend::{BackendClient, HealthStatus};
pub use broker::SessionBroker;
pub use channel::EventChannel;
pub use config::{AudioEinstellungen, BackendEinstellungen, RtcEinstellungen};
pub use handle::ConnectionHandle;
pub use lifecycle::LifecycleController;
pub use media::{MediaPipeline, MediaSink, NativeMediaPipeline, PlaybackSink};
pub use negotiate::ConnectionEstablisher;
pub use rtc::WebRtcTransportFactory;
pub use transport::{
    DataChannelTransport, InboundAudio, OutboundAudio, PeerTransport, RemoteAudioTrack,
    TransportEvent, TransportFactory,
};

/// Controller mit nativer Media-Pipeline und webrtc-rs Transport
pub type VoiceSession = LifecycleController<NativeMediaPipeline, WebRtcTransportFactory>;
