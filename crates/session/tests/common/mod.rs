//! Gemeinsame Test-Bausteine: In-Memory-Transport, zaehlende Media-Pipeline
//! und ein per wiremock simuliertes Backend.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use voxbridge_core::{
    ConnectionId, PeerState, Result, SessionDescription, SessionError, TrackId,
};
use voxbridge_session::{
    BackendClient, BackendEinstellungen, ConnectionEstablisher, ConnectionHandle,
    DataChannelTransport, InboundAudio, LifecycleController, MediaPipeline, OutboundAudio,
    PeerTransport, RemoteAudioTrack, SessionBroker, TransportEvent, TransportFactory,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const OFFER_SDP: &str = "v=0\r\no=- 4611 2 IN IP4 127.0.0.1\r\ns=fake-offer\r\nt=0 0\r\n";
pub const ANSWER_SDP: &str = "v=0\r\no=- 7702 2 IN IP4 127.0.0.1\r\ns=fake-answer\r\nt=0 0\r\n";

/// Reihenfolge der Abbau-Schritte ueber Transport und Media hinweg
pub type Protokoll = Arc<Mutex<Vec<&'static str>>>;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

pub struct FakeOutbound {
    pub frames: AtomicUsize,
}

#[async_trait]
impl OutboundAudio for FakeOutbound {
    async fn write_frame(&self, _payload: Bytes, _dauer: Duration) -> Result<()> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeInbound {
    id: String,
}

#[async_trait]
impl InboundAudio for FakeInbound {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn next_payload(&self) -> Option<Bytes> {
        None
    }
}

pub struct FakeDataChannel {
    label: String,
    open: AtomicBool,
    tx: mpsc::UnboundedSender<String>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    pub gesendet: Mutex<Vec<String>>,
    pub schliessungen: AtomicUsize,
}

impl FakeDataChannel {
    fn neu(label: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            label: label.to_owned(),
            open: AtomicBool::new(false),
            tx,
            rx: Mutex::new(Some(rx)),
            gesendet: Mutex::new(Vec::new()),
            schliessungen: AtomicUsize::new(0),
        }
    }

    /// Simuliert eine eingehende Nachricht der Gegenseite
    pub fn empfangen(&self, text: &str) {
        let _ = self.tx.send(text.to_owned());
    }

    pub fn oeffnen(&self) {
        self.open.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataChannelTransport for FakeDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send_text(&self, text: String) -> Result<()> {
        self.gesendet.lock().push(text);
        Ok(())
    }

    fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.rx.lock().take()
    }

    async fn close(&self) {
        self.schliessungen.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
    }
}

pub struct FakeTransport {
    protokoll: Protokoll,
    event_tx: broadcast::Sender<TransportEvent>,
    state: Mutex<PeerState>,
    local: Mutex<Option<SessionDescription>>,
    pub remote: Mutex<Option<SessionDescription>>,
    pub kanal: Mutex<Option<Arc<FakeDataChannel>>>,
    pub tracks: Mutex<Vec<Arc<FakeOutbound>>>,
    pub schliessungen: AtomicUsize,
    /// Remote-Description wird vom Transport abgelehnt
    pub remote_ablehnen: AtomicBool,
    /// Meldet direkt nach der Answer `Failed`
    pub abbruch_nach_remote: AtomicBool,
}

impl FakeTransport {
    pub fn neu(protokoll: Protokoll) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            protokoll,
            event_tx,
            state: Mutex::new(PeerState::New),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            kanal: Mutex::new(None),
            tracks: Mutex::new(Vec::new()),
            schliessungen: AtomicUsize::new(0),
            remote_ablehnen: AtomicBool::new(false),
            abbruch_nach_remote: AtomicBool::new(false),
        })
    }

    pub fn zustand_melden(&self, state: PeerState) {
        *self.state.lock() = state;
        let _ = self
            .event_tx
            .send(TransportEvent::ConnectionStateChanged(state));
    }

    pub fn remote_track_melden(&self, id: &str) {
        let track = RemoteAudioTrack::new(Arc::new(FakeInbound { id: id.to_owned() }));
        let _ = self.event_tx.send(TransportEvent::RemoteTrackAdded(track));
    }

    pub fn kanal(&self) -> Arc<FakeDataChannel> {
        self.kanal
            .lock()
            .clone()
            .expect("Datenkanal wurde nicht angelegt")
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn add_audio_track(&self, _track_id: &TrackId) -> Result<Arc<dyn OutboundAudio>> {
        let track = Arc::new(FakeOutbound {
            frames: AtomicUsize::new(0),
        });
        self.tracks.lock().push(Arc::clone(&track));
        Ok(track)
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannelTransport>> {
        let kanal = Arc::new(FakeDataChannel::neu(label));
        *self.kanal.lock() = Some(Arc::clone(&kanal));
        Ok(kanal)
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::offer(OFFER_SDP))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        *self.local.lock() = Some(desc);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        if self.remote_ablehnen.load(Ordering::SeqCst) {
            return Err(SessionError::transport("SDP passt nicht zum Offer"));
        }
        *self.remote.lock() = Some(desc);
        if let Some(kanal) = self.kanal.lock().as_ref() {
            kanal.oeffnen();
        }
        self.zustand_melden(PeerState::Connected);
        if self.abbruch_nach_remote.load(Ordering::SeqCst) {
            self.zustand_melden(PeerState::Failed);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.event_tx.subscribe()
    }

    fn peer_state(&self) -> PeerState {
        *self.state.lock()
    }

    async fn close(&self) -> Result<()> {
        self.protokoll.lock().push("close");
        self.schliessungen.fetch_add(1, Ordering::SeqCst);
        if let Some(kanal) = self.kanal.lock().as_ref() {
            kanal.open.store(false, Ordering::SeqCst);
        }
        self.zustand_melden(PeerState::Closed);
        Ok(())
    }
}

/// Erzeugt FakeTransports und merkt sie sich fuer die Pruefung
#[derive(Clone, Default)]
pub struct FakeFactory {
    protokoll: Protokoll,
    pub erstellt: Arc<Mutex<Vec<Arc<FakeTransport>>>>,
    /// Jeder neue Transport bricht direkt nach der Answer ab
    pub abbruch_nach_remote: Arc<AtomicBool>,
}

impl FakeFactory {
    pub fn neu(protokoll: Protokoll) -> Self {
        Self {
            protokoll,
            erstellt: Arc::default(),
            abbruch_nach_remote: Arc::default(),
        }
    }

    pub fn anzahl(&self) -> usize {
        self.erstellt.lock().len()
    }

    pub fn letzter(&self) -> Arc<FakeTransport> {
        self.erstellt
            .lock()
            .last()
            .cloned()
            .expect("Kein Transport erstellt")
    }
}

#[async_trait]
impl TransportFactory for FakeFactory {
    async fn create(&self) -> Result<Arc<dyn PeerTransport>> {
        let transport = FakeTransport::neu(Arc::clone(&self.protokoll));
        transport
            .abbruch_nach_remote
            .store(self.abbruch_nach_remote.load(Ordering::SeqCst), Ordering::SeqCst);
        self.erstellt.lock().push(Arc::clone(&transport));
        Ok(transport)
    }
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MediaZaehler {
    pub capture: AtomicUsize,
    pub attach: AtomicUsize,
    pub bind: AtomicUsize,
    pub release_local: AtomicUsize,
    pub release_local_mit_quelle: AtomicUsize,
    pub release_sink: AtomicUsize,
    pub sinks_erstellt: AtomicUsize,
}

pub struct FakeSource {
    pub track_id: TrackId,
}

/// Zaehlt alle Aufrufe, Clone teilt die Zaehler
#[derive(Clone, Default)]
pub struct FakeMedia {
    protokoll: Protokoll,
    pub zaehler: Arc<MediaZaehler>,
    pub sink: Arc<Mutex<Option<ConnectionId>>>,
    pub muted: Arc<AtomicBool>,
    pub capture_verweigern: Arc<AtomicBool>,
}

impl FakeMedia {
    pub fn neu(protokoll: Protokoll) -> Self {
        Self {
            protokoll,
            ..Default::default()
        }
    }

    pub fn aktive_sinks(&self) -> usize {
        usize::from(self.sink.lock().is_some())
    }

    pub fn anzahl(z: &AtomicUsize) -> usize {
        z.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaPipeline for FakeMedia {
    type Source = FakeSource;

    async fn capture_local_audio(&self) -> Result<FakeSource> {
        self.zaehler.capture.fetch_add(1, Ordering::SeqCst);
        if self.capture_verweigern.load(Ordering::SeqCst) {
            return Err(SessionError::MediaPermissionDenied("Test".into()));
        }
        Ok(FakeSource {
            track_id: TrackId::new(),
        })
    }

    async fn attach_local(&self, handle: &ConnectionHandle, source: &mut FakeSource) -> Result<()> {
        self.zaehler.attach.fetch_add(1, Ordering::SeqCst);
        handle.attach_local_track(source.track_id.clone()).await?;
        Ok(())
    }

    fn bind_remote_sink(&self, handle: &ConnectionHandle) {
        self.zaehler.bind.fetch_add(1, Ordering::SeqCst);
        let mut sink = self.sink.lock();
        if *sink != Some(handle.id()) {
            *sink = Some(handle.id());
            self.zaehler.sinks_erstellt.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn release_local(&self, source: Option<FakeSource>) {
        self.protokoll.lock().push("release_local");
        self.zaehler.release_local.fetch_add(1, Ordering::SeqCst);
        if source.is_some() {
            self.zaehler
                .release_local_mit_quelle
                .fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn release_sink(&self) {
        self.protokoll.lock().push("release_sink");
        self.zaehler.release_sink.fetch_add(1, Ordering::SeqCst);
        self.sink.lock().take();
    }

    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

pub fn backend_client(server: &MockServer) -> BackendClient {
    BackendClient::neu(BackendEinstellungen {
        realtime_url: format!("{}/api/v1/realtime", server.uri()),
        api_url: format!("{}/api", server.uri()),
        ..Default::default()
    })
    .expect("HTTP-Client sollte erstellbar sein")
}

pub fn answer_body() -> serde_json::Value {
    serde_json::json!({ "description": ANSWER_SDP })
}

pub async fn session_mock(server: &MockServer, antwort: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/api/v1/realtime/session"))
        .respond_with(antwort)
        .mount(server)
        .await;
}

pub async fn negotiate_mock(server: &MockServer, antwort: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/api/v1/realtime/negotiate"))
        .respond_with(antwort)
        .mount(server)
        .await;
}

/// Backend, das ein gueltiges Credential und eine gueltige Answer liefert
pub async fn gesundes_backend() -> MockServer {
    let server = MockServer::start().await;
    session_mock(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({ "credential": { "value": "abc" } })),
    )
    .await;
    negotiate_mock(&server, ResponseTemplate::new(200).set_body_json(answer_body())).await;
    server
}

pub struct Aufbau {
    pub controller: LifecycleController<FakeMedia, FakeFactory>,
    pub media: FakeMedia,
    pub factory: FakeFactory,
    pub protokoll: Protokoll,
}

pub fn controller(server: &MockServer) -> Aufbau {
    let protokoll: Protokoll = Arc::default();
    let media = FakeMedia::neu(Arc::clone(&protokoll));
    let factory = FakeFactory::neu(Arc::clone(&protokoll));
    let backend = backend_client(server);

    let controller = LifecycleController::neu(
        SessionBroker::neu(backend.clone()),
        ConnectionEstablisher::neu(backend),
        media.clone(),
        factory.clone(),
        "oai-events",
    );

    Aufbau {
        controller,
        media,
        factory,
        protokoll,
    }
}

/// Wartet bis die Bedingung erfuellt ist, hoechstens zwei Sekunden
pub async fn warten_bis(bedingung: impl Fn() -> bool) {
    for _ in 0..200 {
        if bedingung() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Bedingung wurde nicht rechtzeitig erfuellt");
}
