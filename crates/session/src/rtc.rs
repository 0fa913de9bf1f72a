//! WebRTC-Transport auf Basis von webrtc-rs
//!
//! Uebersetzt die Callbacks der `RTCPeerConnection` in `TransportEvent`s
//! und kapselt Tracks und Datenkanal hinter den Traits aus `transport`.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};
use voxbridge_core::{PeerState, Result, SdpType, SessionDescription, SessionError, TrackId};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::config::RtcEinstellungen;
use crate::transport::{
    DataChannelTransport, InboundAudio, OutboundAudio, PeerTransport, RemoteAudioTrack,
    TransportEvent, TransportFactory, TRANSPORT_EVENT_KANAL_GROESSE,
};

fn rtc_fehler(kontext: &str, e: webrtc::Error) -> SessionError {
    SessionError::transport(format!("{}: {}", kontext, e))
}

fn peer_state(s: RTCPeerConnectionState) -> PeerState {
    match s {
        RTCPeerConnectionState::Connecting => PeerState::Connecting,
        RTCPeerConnectionState::Connected => PeerState::Connected,
        RTCPeerConnectionState::Disconnected => PeerState::Disconnected,
        RTCPeerConnectionState::Failed => PeerState::Failed,
        RTCPeerConnectionState::Closed => PeerState::Closed,
        _ => PeerState::New,
    }
}

fn rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let parsed = match desc.kind {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
    };
    parsed.map_err(|e| rtc_fehler("SDP nicht lesbar", e))
}

fn eigene_description(desc: RTCSessionDescription) -> SessionDescription {
    match desc.sdp_type {
        RTCSdpType::Answer => SessionDescription::answer(desc.sdp),
        _ => SessionDescription::offer(desc.sdp),
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Erzeugt Peer-Connections mit Opus und den Standard-Interceptoren
pub struct WebRtcTransportFactory {
    api: API,
    einstellungen: RtcEinstellungen,
}

impl WebRtcTransportFactory {
    pub fn neu(einstellungen: RtcEinstellungen) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| rtc_fehler("Codecs registrieren", e))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| rtc_fehler("Interceptoren registrieren", e))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api, einstellungen })
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(&self) -> Result<Arc<dyn PeerTransport>> {
        let ice_servers = if self.einstellungen.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.einstellungen.ice_servers.clone(),
                ..Default::default()
            }]
        };
        let config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = self
            .api
            .new_peer_connection(config)
            .await
            .map_err(|e| rtc_fehler("Peer-Connection erstellen", e))?;

        let transport = WebRtcTransport::neu(
            Arc::new(pc),
            Duration::from_secs(self.einstellungen.ice_gathering_timeout_secs),
        );
        Ok(Arc::new(transport))
    }
}

// ---------------------------------------------------------------------------
// Peer-Connection
// ---------------------------------------------------------------------------

pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
    event_tx: broadcast::Sender<TransportEvent>,
    gathering_timeout: Duration,
}

impl WebRtcTransport {
    fn neu(pc: Arc<RTCPeerConnection>, gathering_timeout: Duration) -> Self {
        let (event_tx, _) = broadcast::channel(TRANSPORT_EVENT_KANAL_GROESSE);

        let tx = event_tx.clone();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            debug!(zustand = %s, "Peer-Connection Zustand");
            let _ = tx.send(TransportEvent::ConnectionStateChanged(peer_state(s)));
            Box::pin(async {})
        }));

        let tx = event_tx.clone();
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            info!(track_id = %track.id(), kind = %track.kind(), "Remote-Track empfangen");
            let remote = RemoteAudioTrack::new(Arc::new(WebRtcRemoteTrack { track }));
            let _ = tx.send(TransportEvent::RemoteTrackAdded(remote));
            Box::pin(async {})
        }));

        Self {
            pc,
            event_tx,
            gathering_timeout,
        }
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn add_audio_track(&self, track_id: &TrackId) -> Result<Arc<dyn OutboundAudio>> {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                rtcp_feedback: vec![],
            },
            track_id.to_string(),
            "voxbridge".to_owned(),
        ));

        let rtp_sender = self
            .pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| rtc_fehler("Audio-Track hinzufuegen", e))?;

        // RTCP muss gelesen werden, sonst laufen die Interceptoren nicht
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while rtp_sender.read(&mut rtcp_buf).await.is_ok() {}
            trace!("RTCP-Loop beendet");
        });

        Ok(Arc::new(WebRtcLocalTrack { track }))
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannelTransport>> {
        let dc = self
            .pc
            .create_data_channel(label, None)
            .await
            .map_err(|e| rtc_fehler("Datenkanal erstellen", e))?;

        let (tx, rx) = mpsc::unbounded_channel();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            let tx = tx.clone();
            Box::pin(async move {
                match String::from_utf8(msg.data.to_vec()) {
                    Ok(text) => {
                        let _ = tx.send(text);
                    }
                    Err(_) => debug!("Binaere Kanal-Nachricht verworfen"),
                }
            })
        }));

        let open_label = label.to_owned();
        dc.on_open(Box::new(move || {
            Box::pin(async move {
                info!(label = %open_label, "Datenkanal geoeffnet");
            })
        }));

        Ok(Arc::new(WebRtcDataChannel {
            label: label.to_owned(),
            dc,
            rx: Mutex::new(Some(rx)),
        }))
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| rtc_fehler("Offer erstellen", e))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    /// Setzt die lokale Description und wartet auf das ICE-Gathering,
    /// damit die Kandidaten im gesendeten SDP stehen
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = rtc_description(desc)?;
        let mut gathering = self.pc.gathering_complete_promise().await;

        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| rtc_fehler("Lokale Description setzen", e))?;

        if tokio::time::timeout(self.gathering_timeout, gathering.recv())
            .await
            .is_err()
        {
            warn!(
                timeout = ?self.gathering_timeout,
                "ICE-Gathering nicht abgeschlossen, sende Offer mit bisherigen Kandidaten"
            );
        }
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.pc.local_description().await.map(eigene_description)
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = rtc_description(desc)?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| rtc_fehler("Remote-Description setzen", e))
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.event_tx.subscribe()
    }

    fn peer_state(&self) -> PeerState {
        peer_state(self.pc.connection_state())
    }

    async fn close(&self) -> Result<()> {
        self.pc
            .close()
            .await
            .map_err(|e| rtc_fehler("Peer-Connection schliessen", e))
    }
}

// ---------------------------------------------------------------------------
// Tracks
// ---------------------------------------------------------------------------

struct WebRtcLocalTrack {
    track: Arc<TrackLocalStaticSample>,
}

#[async_trait]
impl OutboundAudio for WebRtcLocalTrack {
    async fn write_frame(&self, payload: Bytes, dauer: Duration) -> Result<()> {
        self.track
            .write_sample(&Sample {
                data: payload,
                duration: dauer,
                ..Default::default()
            })
            .await
            .map_err(|e| rtc_fehler("Audio-Sample schreiben", e))
    }
}

struct WebRtcRemoteTrack {
    track: Arc<TrackRemote>,
}

#[async_trait]
impl InboundAudio for WebRtcRemoteTrack {
    fn id(&self) -> String {
        self.track.id()
    }

    async fn next_payload(&self) -> Option<Bytes> {
        loop {
            match self.track.read_rtp().await {
                Ok((paket, _)) if paket.payload.is_empty() => continue,
                Ok((paket, _)) => return Some(paket.payload),
                Err(e) => {
                    debug!(fehler = %e, "Remote-Track beendet");
                    return None;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Datenkanal
// ---------------------------------------------------------------------------

struct WebRtcDataChannel {
    label: String,
    dc: Arc<RTCDataChannel>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

#[async_trait]
impl DataChannelTransport for WebRtcDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        self.dc.ready_state() == RTCDataChannelState::Open
    }

    async fn send_text(&self, text: String) -> Result<()> {
        self.dc
            .send_text(text)
            .await
            .map(|_| ())
            .map_err(|e| rtc_fehler("Kanal-Nachricht senden", e))
    }

    fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.rx.lock().take()
    }

    async fn close(&self) {
        if let Err(e) = self.dc.close().await {
            warn!(label = %self.label, fehler = %e, "Datenkanal schliessen fehlgeschlagen");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_zustaende_abgebildet() {
        assert_eq!(peer_state(RTCPeerConnectionState::Failed), PeerState::Failed);
        assert_eq!(peer_state(RTCPeerConnectionState::Closed), PeerState::Closed);
        assert_eq!(peer_state(RTCPeerConnectionState::Unspecified), PeerState::New);
    }

    #[tokio::test]
    async fn offer_enthaelt_audio_und_datenkanal() {
        let factory = WebRtcTransportFactory::neu(RtcEinstellungen {
            ice_servers: vec![],
            ..Default::default()
        })
        .unwrap();
        let transport = factory.create().await.unwrap();

        transport.add_audio_track(&TrackId::new()).await.unwrap();
        let kanal = transport.create_data_channel("oai-events").await.unwrap();
        assert!(!kanal.is_open());

        let offer = transport.create_offer().await.unwrap();
        assert!(offer.ist_plausibel());
        assert!(offer.sdp.contains("m=audio"));
        assert!(offer.sdp.contains("m=application"));

        transport.close().await.unwrap();
    }
}
