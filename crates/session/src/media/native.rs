//! Native Media-Pipeline auf cpal und Opus
//!
//! ## Sende-Pipeline
//! ```text
//! cpal Capture Callback
//!     -> Ring-Buffer (lock-free, ringbuf)
//!     -> Capture-Thread: Frames sammeln (20ms = 960 Samples bei 48kHz)
//!     -> Opus Encode (entfaellt bei Mute)
//!     -> tokio mpsc
//!     -> Pump-Task: OutboundAudio::write_frame
//! ```
//!
//! Die Wiedergabe wird erst beim ersten Remote-Track geoeffnet, siehe
//! `PlaybackSink`.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use ringbuf::traits::Consumer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use voxbridge_audio::{
    load_cpal_input_device, open_capture_stream, CaptureConfig, CaptureConsumer, OpusEncoder,
    OpusSettings,
};
use voxbridge_core::{ConnectionId, Result, SessionError, TrackId};

use super::sink::PlaybackSink;
use super::{MediaPipeline, MediaSink};
use crate::config::AudioEinstellungen;
use crate::handle::ConnectionHandle;
use crate::transport::TransportEvent;

/// Dauer eines Opus-Frames
const FRAME_DAUER: Duration = Duration::from_millis(20);
/// Gepufferte Frames zwischen Capture-Thread und Pump-Task
const FRAME_KANAL_GROESSE: usize = 50;

// ---------------------------------------------------------------------------
// Lokale Quelle
// ---------------------------------------------------------------------------

/// Geoeffnetes Mikrofon mit laufendem Capture-Thread
pub struct NativeAudioSource {
    track_id: TrackId,
    frames: Option<mpsc::Receiver<Bytes>>,
    running: Arc<AtomicBool>,
    capture_thread: Option<std::thread::JoinHandle<()>>,
    pump: Option<JoinHandle<()>>,
}

impl NativeAudioSource {
    pub fn track_id(&self) -> &TrackId {
        &self.track_id
    }

    /// Stoppt Capture und Pump-Task und gibt den Capture-Thread zurueck
    ///
    /// Der Thread endet spaetestens nach einem Sende-Takt von selbst.
    fn anhalten(&mut self) -> Option<std::thread::JoinHandle<()>> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.frames.take();
        self.capture_thread.take()
    }
}

impl Drop for NativeAudioSource {
    fn drop(&mut self) {
        drop(self.anhalten());
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

struct SinkBindung {
    connection_id: ConnectionId,
    beobachter: JoinHandle<()>,
    ausgabe: Arc<Mutex<Option<Arc<PlaybackSink>>>>,
}

impl SinkBindung {
    /// Beendet die Verfolgung der Remote-Tracks und gibt die Wiedergabe heraus
    fn loesen(self) -> Option<Arc<PlaybackSink>> {
        self.beobachter.abort();
        let sink = self.ausgabe.lock().take();
        sink
    }
}

pub struct NativeMediaPipeline {
    einstellungen: AudioEinstellungen,
    muted: Arc<AtomicBool>,
    bindung: Mutex<Option<SinkBindung>>,
}

impl NativeMediaPipeline {
    pub fn neu(einstellungen: AudioEinstellungen) -> Self {
        Self {
            einstellungen,
            muted: Arc::new(AtomicBool::new(false)),
            bindung: Mutex::new(None),
        }
    }

    fn opus_settings(&self) -> OpusSettings {
        OpusSettings {
            sample_rate: self.einstellungen.sample_rate,
            channels: 1,
            bitrate_kbps: self.einstellungen.bitrate_kbps,
            frame_ms: FRAME_DAUER.as_millis() as u32,
        }
    }

    pub fn ist_gemutet(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MediaPipeline for NativeMediaPipeline {
    type Source = NativeAudioSource;

    async fn capture_local_audio(&self) -> Result<NativeAudioSource> {
        let settings = self.opus_settings();
        settings
            .validieren()
            .map_err(|e| SessionError::transport(format!("Opus-Einstellungen: {}", e)))?;

        let geraet = self.einstellungen.eingabegeraet.clone();
        let capture_config = CaptureConfig {
            sample_rate: settings.sample_rate,
            channels: 1,
            buffer_size: settings.sample_rate as usize * 2,
        };

        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let (frame_tx, frame_rx) = mpsc::channel::<Bytes>(FRAME_KANAL_GROESSE);

        let thread_running = Arc::clone(&running);
        let thread_muted = Arc::clone(&self.muted);

        let capture_thread = std::thread::Builder::new()
            .name("voxbridge-capture".to_string())
            .spawn(move || {
                // cpal::Stream lebt in diesem Thread
                let geoeffnet = load_cpal_input_device(geraet.as_deref())
                    .and_then(|device| open_capture_stream(&device, capture_config))
                    .and_then(|(stream, consumer)| {
                        OpusEncoder::new(settings).map(|enc| (stream, consumer, enc))
                    });

                let (_stream, consumer, encoder) = match geoeffnet {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };

                if ready_tx.send(Ok(())).is_err() {
                    return;
                }

                sende_loop(consumer, encoder, frame_tx, thread_running, thread_muted);
                debug!("Capture-Thread beendet, cpal-Stream wird gedroppt");
            })
            .map_err(|e| {
                SessionError::MediaDeviceUnavailable(format!("Capture-Thread: {}", e))
            })?;

        let mut source = NativeAudioSource {
            track_id: TrackId::new(),
            frames: Some(frame_rx),
            running,
            capture_thread: Some(capture_thread),
            pump: None,
        };

        match ready_rx.await {
            Ok(Ok(())) => {
                info!(track = %source.track_id, "Mikrofon geoeffnet");
                Ok(source)
            }
            // Der Thread ist in beiden Faellen bereits beendet
            Ok(Err(e)) => {
                drop(source);
                Err(e)
            }
            Err(_) => {
                drop(source);
                Err(SessionError::MediaDeviceUnavailable(
                    "Capture-Thread vorzeitig beendet".into(),
                ))
            }
        }
    }

    async fn attach_local(
        &self,
        handle: &ConnectionHandle,
        source: &mut NativeAudioSource,
    ) -> Result<()> {
        let mut frames = source.frames.take().ok_or_else(|| {
            SessionError::transport("Audioquelle ist bereits an eine Verbindung gebunden")
        })?;
        let ausgang = handle.attach_local_track(source.track_id.clone()).await?;

        source.pump = Some(tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                if let Err(e) = ausgang.write_frame(frame, FRAME_DAUER).await {
                    trace!(fehler = %e, "Frame konnte nicht geschrieben werden");
                }
            }
            trace!("Pump-Task beendet");
        }));
        Ok(())
    }

    fn bind_remote_sink(&self, handle: &ConnectionHandle) {
        let mut bindung = self.bindung.lock();
        match bindung.take() {
            Some(b) if b.connection_id == handle.id() => {
                debug!(connection = %handle.id(), "Wiedergabe bereits gebunden");
                *bindung = Some(b);
                return;
            }
            Some(veraltet) => {
                warn!(
                    alt = %veraltet.connection_id,
                    neu = %handle.id(),
                    "Veraltete Wiedergabe wird entfernt"
                );
                if let Some(sink) = veraltet.loesen() {
                    sink.release();
                }
            }
            None => {}
        }

        let ausgabe: Arc<Mutex<Option<Arc<PlaybackSink>>>> = Arc::new(Mutex::new(None));
        let beobachter = tokio::spawn(remote_tracks_verfolgen(
            handle.transport().subscribe(),
            Arc::clone(&ausgabe),
            self.einstellungen.ausgabegeraet.clone(),
            self.opus_settings(),
        ));

        *bindung = Some(SinkBindung {
            connection_id: handle.id(),
            beobachter,
            ausgabe,
        });
    }

    async fn release_local(&self, source: Option<NativeAudioSource>) {
        let Some(mut source) = source else {
            return;
        };
        if let Some(thread) = source.anhalten() {
            // join blockiert bis zum naechsten Sende-Takt
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => {}
                _ => warn!(track = %source.track_id, "Capture-Thread ist abgestuerzt"),
            }
        }
        info!(track = %source.track_id, "Mikrofon freigegeben");
    }

    async fn release_sink(&self) {
        let sink = self.bindung.lock().take().and_then(SinkBindung::loesen);
        if let Some(sink) = sink {
            sink.schliessen().await;
        }
    }

    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
        info!("Mikrofon Mute: {}", muted);
    }
}

/// Oeffnet die Wiedergabe beim ersten Remote-Track, weitere Tracks ersetzen die Quelle
async fn remote_tracks_verfolgen(
    mut events: broadcast::Receiver<TransportEvent>,
    ausgabe: Arc<Mutex<Option<Arc<PlaybackSink>>>>,
    geraet: Option<String>,
    settings: OpusSettings,
) {
    loop {
        let track = match events.recv().await {
            Ok(TransportEvent::RemoteTrackAdded(track)) => track,
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(verpasst = n, "Transport-Events verpasst");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let vorhanden = ausgabe.lock().clone();
        let sink = match vorhanden {
            Some(sink) => sink,
            None => match PlaybackSink::oeffnen(geraet.clone(), settings).await {
                Ok(sink) => {
                    let sink = Arc::new(sink);
                    *ausgabe.lock() = Some(Arc::clone(&sink));
                    sink
                }
                Err(e) => {
                    error!(fehler = %e, "Wiedergabe konnte nicht geoeffnet werden");
                    continue;
                }
            },
        };

        if let Err(e) = sink.attach(track) {
            error!(fehler = %e, "Remote-Track konnte nicht abgespielt werden");
        }
    }
}

/// Liest Frames aus dem Capture-Ring-Buffer, kodiert sie und reicht sie weiter
fn sende_loop(
    mut consumer: CaptureConsumer,
    mut encoder: OpusEncoder,
    frame_tx: mpsc::Sender<Bytes>,
    running: Arc<AtomicBool>,
    muted: Arc<AtomicBool>,
) {
    let frame_size = encoder.frame_size();
    let mut frame_buffer = Vec::with_capacity(frame_size * 2);
    let mut temp_buf = vec![0.0f32; frame_size];

    debug!("Sende-Loop gestartet (frame_size={})", frame_size);

    while running.load(Ordering::Relaxed) {
        let available = consumer.pop_slice(&mut temp_buf);
        if available == 0 {
            // 5ms = 1/4 Frame
            std::thread::sleep(Duration::from_millis(5));
            continue;
        }
        frame_buffer.extend_from_slice(&temp_buf[..available]);

        while frame_buffer.len() >= frame_size {
            let frame: Vec<f32> = frame_buffer.drain(..frame_size).collect();
            if muted.load(Ordering::Relaxed) {
                continue;
            }

            let opus = match encoder.encode(&frame) {
                Ok(b) => b,
                Err(e) => {
                    warn!("Opus-Encoding fehlgeschlagen: {}", e);
                    continue;
                }
            };

            match frame_tx.try_send(Bytes::from(opus)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => trace!("Frame-Kanal voll, Frame verworfen"),
                Err(mpsc::error::TrySendError::Closed(_)) => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Quelle mit einem Thread, der nach dem Stopp-Signal noch `nachlauf` braucht
    fn quelle_mit_thread(nachlauf: Duration) -> (NativeAudioSource, Arc<AtomicBool>) {
        let running = Arc::new(AtomicBool::new(true));
        let beendet = Arc::new(AtomicBool::new(false));
        let (_tx, rx) = mpsc::channel(1);

        let thread_running = Arc::clone(&running);
        let thread_beendet = Arc::clone(&beendet);
        let thread = std::thread::spawn(move || {
            while thread_running.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(5));
            }
            std::thread::sleep(nachlauf);
            thread_beendet.store(true, Ordering::SeqCst);
        });

        let source = NativeAudioSource {
            track_id: TrackId::new(),
            frames: Some(rx),
            running,
            capture_thread: Some(thread),
            pump: None,
        };
        (source, beendet)
    }

    #[tokio::test]
    async fn release_local_wartet_auf_capture_thread() {
        let pipeline = NativeMediaPipeline::neu(AudioEinstellungen::default());
        let (source, beendet) = quelle_mit_thread(Duration::from_millis(50));

        pipeline.release_local(Some(source)).await;

        assert!(beendet.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn release_local_blockiert_runtime_nicht() {
        let pipeline = NativeMediaPipeline::neu(AudioEinstellungen::default());
        let (source, _beendet) = quelle_mit_thread(Duration::from_millis(300));

        // Auf einer Single-Thread-Runtime laeuft der Ticker nur, wenn
        // release_local den Worker nicht blockiert
        let ticks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let ticker_ticks = Arc::clone(&ticks);
        let ticker = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ticker_ticks.fetch_add(1, Ordering::SeqCst);
            }
        });

        pipeline.release_local(Some(source)).await;
        ticker.abort();

        assert!(ticks.load(Ordering::SeqCst) >= 5);
    }

    #[test]
    fn drop_wartet_nicht_auf_capture_thread() {
        let (source, beendet) = quelle_mit_thread(Duration::from_millis(300));

        let start = Instant::now();
        drop(source);

        assert!(start.elapsed() < Duration::from_millis(200));
        assert!(!beendet.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn release_sink_ohne_bindung_ist_noop() {
        let pipeline = NativeMediaPipeline::neu(AudioEinstellungen::default());
        pipeline.release_sink().await;
        pipeline.release_local(None).await;
        assert!(!pipeline.ist_gemutet());
    }
}
