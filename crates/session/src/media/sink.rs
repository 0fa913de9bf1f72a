//! PlaybackSink – spielt einen Remote-Track ueber cpal ab
//!
//! ```text
//! RemoteAudioTrack::next_payload()
//!     -> Opus Decode (tokio Task)
//!     -> Playback Ring-Buffer
//!     -> cpal Playback Callback (Audio-Thread)
//! ```
//!
//! Der cpal-Stream ist `!Send` und lebt im Audio-Thread, bis der
//! Stop-Sender gedroppt wird.

use parking_lot::Mutex;
use ringbuf::traits::Producer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use voxbridge_audio::{
    load_cpal_output_device, open_playback_stream, OpusDecoder, OpusSettings, PlaybackConfig,
    PlaybackProducer,
};
use voxbridge_core::{Result, SessionError};

use super::MediaSink;
use crate::transport::RemoteAudioTrack;

/// Puffer der Wiedergabe in Opus-Frames (20ms -> 200ms Jitter-Reserve)
const PUFFER_FRAMES: usize = 10;

type Bereit = Result<(PlaybackProducer, Arc<AtomicU64>)>;

pub struct PlaybackSink {
    settings: OpusSettings,
    producer: Arc<Mutex<PlaybackProducer>>,
    unterlaeufe: Arc<AtomicU64>,
    stop_tx: Mutex<Option<std_mpsc::Sender<()>>>,
    audio_thread: Mutex<Option<std::thread::JoinHandle<()>>>,
    decoder_task: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackSink {
    /// Oeffnet das Ausgabegeraet im eigenen Audio-Thread
    pub async fn oeffnen(geraet: Option<String>, settings: OpusSettings) -> Result<Self> {
        let (ready_tx, ready_rx) = oneshot::channel::<Bereit>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let playback_config = PlaybackConfig::fuer_frames(
            settings.sample_rate,
            settings.channels,
            settings.samples_per_frame(),
            PUFFER_FRAMES,
        );

        let audio_thread = std::thread::Builder::new()
            .name("voxbridge-playback".to_string())
            .spawn(move || {
                let geoeffnet = load_cpal_output_device(geraet.as_deref())
                    .and_then(|device| open_playback_stream(&device, playback_config));
                let (stream, producer) = match geoeffnet {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };

                if ready_tx
                    .send(Ok((producer, stream.unterlauf_zaehler())))
                    .is_err()
                {
                    return;
                }

                // Blockiert bis der Sender gedroppt wird, dann endet der Stream
                let _ = stop_rx.recv();
                debug!(
                    unterlaeufe = stream.unterlaeufe(),
                    "Playback-Thread beendet, cpal-Stream wird gedroppt"
                );
            })
            .map_err(|e| {
                SessionError::MediaDeviceUnavailable(format!("Playback-Thread: {}", e))
            })?;

        let (producer, unterlaeufe) = ready_rx.await.map_err(|_| {
            SessionError::MediaDeviceUnavailable("Playback-Thread vorzeitig beendet".into())
        })??;

        info!(
            sample_rate = settings.sample_rate,
            channels = settings.channels,
            "Wiedergabe geoeffnet"
        );
        Ok(Self {
            settings,
            producer: Arc::new(Mutex::new(producer)),
            unterlaeufe,
            stop_tx: Mutex::new(Some(stop_tx)),
            audio_thread: Mutex::new(Some(audio_thread)),
            decoder_task: Mutex::new(None),
        })
    }

    /// Callbacks, in denen der Wiedergabe Samples fehlten
    pub fn unterlaeufe(&self) -> u64 {
        self.unterlaeufe.load(Ordering::Relaxed)
    }

    /// Gibt die Wiedergabe frei und wartet, bis das Geraet geschlossen ist
    ///
    /// Das Warten laeuft im Blocking-Pool von tokio.
    pub async fn schliessen(&self) {
        let Some(thread) = self.beenden() else {
            return;
        };
        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => debug!("Wiedergabe-Geraet geschlossen"),
            _ => warn!("Playback-Thread ist abgestuerzt"),
        }
    }

    /// Stoppt Decoder und Audio-Thread, ohne auf den Thread zu warten
    fn beenden(&self) -> Option<std::thread::JoinHandle<()>> {
        if let Some(task) = self.decoder_task.lock().take() {
            task.abort();
        }
        // Stop-Sender droppen beendet den Audio-Thread
        let gestoppt = self.stop_tx.lock().take().is_some();
        if gestoppt {
            info!(unterlaeufe = self.unterlaeufe(), "Wiedergabe freigegeben");
        }
        self.audio_thread.lock().take()
    }
}

impl MediaSink for PlaybackSink {
    fn attach(&self, track: RemoteAudioTrack) -> Result<()> {
        let mut decoder = OpusDecoder::new(self.settings)?;
        let producer = Arc::clone(&self.producer);
        let track_id = track.id();

        let task = tokio::spawn(async move {
            while let Some(payload) = track.next_payload().await {
                match decoder.decode(&payload) {
                    Ok(pcm) => {
                        let written = producer.lock().push_slice(&pcm);
                        if written < pcm.len() {
                            trace!(verworfen = pcm.len() - written, "Playback Ring-Buffer voll");
                        }
                    }
                    Err(e) => trace!(fehler = %e, "Opus-Decode fehlgeschlagen"),
                }
            }
            debug!(track = %track.id(), "Remote-Track beendet");
        });

        if let Some(alt) = self.decoder_task.lock().replace(task) {
            debug!("Vorherige Quelle der Wiedergabe ersetzt");
            alt.abort();
        }
        info!(track = %track_id, "Remote-Track auf Wiedergabe geleitet");
        Ok(())
    }

    /// Signalisiert das Ende, der Audio-Thread laeuft selbststaendig aus
    fn release(&self) {
        drop(self.beenden());
    }
}

impl Drop for PlaybackSink {
    fn drop(&mut self) {
        drop(self.beenden());
    }
}
