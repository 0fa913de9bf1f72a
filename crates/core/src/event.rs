//! Ereignisse rund um eine Voice-Session
//!
//! `PeerState` spiegelt den Zustand der darunterliegenden Peer-Connection,
//! `SessionEvent` ist das, was der Controller an die Oberflaeche meldet.

use crate::types::{ConnectionId, ConnectionState};
use serde::{Deserialize, Serialize};

/// Zustand der Peer-Connection auf Transportebene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerState {
    /// Zustaende nach denen die Verbindung nicht mehr nutzbar ist
    ///
    /// `Disconnected` zaehlt nicht dazu, ICE kann sich davon erholen.
    pub fn ist_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

/// Meldungen des Lifecycle-Controllers an Abonnenten
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Der Controller hat seinen Zustand gewechselt
    ZustandGeaendert {
        von: ConnectionState,
        nach: ConnectionState,
    },
    /// Die Gegenseite hat einen Audio-Track geliefert
    RemoteTrackEmpfangen {
        connection_id: ConnectionId,
        track_id: String,
    },
    /// Nachricht auf dem Event-Kanal
    KanalNachricht {
        label: String,
        payload: serde_json::Value,
    },
    /// Die Verbindung wurde von aussen beendet
    VerbindungVerloren {
        connection_id: ConnectionId,
        peer_state: PeerState,
    },
}
