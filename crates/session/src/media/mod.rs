//! Media-Pipeline – Mikrofon rein, Gegenseite raus
//!
//! Der Controller arbeitet nur gegen den `MediaPipeline`-Trait. Die native
//! Implementierung nutzt cpal und Opus, Tests setzen eigene Varianten ein.

mod native;
mod sink;

pub use native::{NativeAudioSource, NativeMediaPipeline};
pub use sink::PlaybackSink;

use async_trait::async_trait;
use voxbridge_core::Result;

use crate::handle::ConnectionHandle;
use crate::transport::RemoteAudioTrack;

/// Erfassung und Wiedergabe fuer genau eine aktive Verbindung
#[async_trait]
pub trait MediaPipeline: Send + Sync + 'static {
    /// Lokale Audioquelle (ein oder mehrere Tracks)
    type Source: Send + 'static;

    /// Oeffnet das Eingabegeraet exklusiv
    async fn capture_local_audio(&self) -> Result<Self::Source>;

    /// Haengt alle Tracks der Quelle an die Verbindung, vor dem Offer
    async fn attach_local(&self, handle: &ConnectionHandle, source: &mut Self::Source)
        -> Result<()>;

    /// Registriert die Wiedergabe fuer Remote-Tracks der Verbindung
    ///
    /// Pro Verbindung wirkt nur die erste Registrierung. Eine Bindung an
    /// eine fruehere Verbindung wird vorher entfernt.
    fn bind_remote_sink(&self, handle: &ConnectionHandle);

    /// Stoppt die lokalen Tracks und gibt das Geraet frei
    async fn release_local(&self, source: Option<Self::Source>);

    /// Entfernt die Wiedergabe, auch wenn nie ein Remote-Track ankam
    async fn release_sink(&self);

    /// Unterdrueckt das Senden, das Geraet bleibt offen
    fn set_muted(&self, muted: bool);
}

/// Ausgabe fuer die Audiospur der Gegenseite
pub trait MediaSink: Send + Sync {
    /// Leitet einen Remote-Track auf die Ausgabe, ersetzt einen vorherigen
    fn attach(&self, track: RemoteAudioTrack) -> Result<()>;

    fn release(&self);
}
