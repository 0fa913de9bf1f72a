//! voxbridge-core – Gemeinsame Typen, Events und Fehlertypen
//!
//! Dieses Crate stellt die Bausteine bereit, die Session-Controller,
//! Audio-Engine und Client gemeinsam nutzen.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Result, SessionError};
pub use event::{PeerState, SessionEvent};
pub use types::{
    ConnectionId, ConnectionState, SdpType, SessionCredential, SessionDescription, TrackId,
};
