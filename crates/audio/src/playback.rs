//! Wiedergabe der Gegenseite via cpal
//!
//! Der Opus-Decoder schreibt PCM in einen Ring-Buffer, der cpal-Callback
//! liest daraus. Fehlen Samples, wird mit Stille aufgefuellt und der
//! Callback als Unterlauf gezaehlt.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{
    BuildStreamError, Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig,
};
use ringbuf::traits::{Consumer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{AudioError, AudioResult};

/// Standardpuffer: 50 Frames a 20ms
const STANDARD_PUFFER_FRAMES: usize = 50;

/// Konfiguration fuer die Wiedergabe
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Kanalanzahl
    pub channels: u16,
    /// Ring-Buffer Kapazitaet in Samples (alle Kanaele)
    pub buffer_size: usize,
}

impl PlaybackConfig {
    /// Puffer fuer `puffer_frames` Decoder-Frames
    ///
    /// `frame_samples` zaehlt Samples pro Kanal, wie sie der Opus-Decoder
    /// pro Frame liefert.
    pub fn fuer_frames(
        sample_rate: u32,
        channels: u16,
        frame_samples: usize,
        puffer_frames: usize,
    ) -> Self {
        Self {
            sample_rate,
            channels,
            buffer_size: frame_samples * channels.max(1) as usize * puffer_frames.max(1),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self::fuer_frames(48000, 1, 960, STANDARD_PUFFER_FRAMES)
    }
}

/// Schreibt dekodierte Samples fuer den Playback-Callback
pub type PlaybackProducer = HeapProd<f32>;

/// Laufende Wiedergabe
///
/// `cpal::Stream` ist `!Send` und muss in dem Thread bleiben, der ihn
/// geoeffnet hat. Der Unterlauf-Zaehler darf weitergereicht werden.
pub struct PlaybackStream {
    _stream: Stream,
    config: PlaybackConfig,
    unterlaeufe: Arc<AtomicU64>,
}

impl PlaybackStream {
    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Callbacks, in denen Stille eingefuegt werden musste
    pub fn unterlaeufe(&self) -> u64 {
        self.unterlaeufe.load(Ordering::Relaxed)
    }

    pub fn unterlauf_zaehler(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.unterlaeufe)
    }
}

/// Oeffnet die Wiedergabe auf dem gegebenen Geraet.
///
/// Gibt den Stream und den Producer fuer den Decoder zurueck. Das
/// Sample-Format richtet sich nach dem Geraet, intern wird immer f32
/// gepuffert.
pub fn open_playback_stream(
    device: &Device,
    config: PlaybackConfig,
) -> AudioResult<(PlaybackStream, PlaybackProducer)> {
    let stream_config = StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let (producer, consumer) = HeapRb::<f32>::new(config.buffer_size).split();
    let unterlaeufe = Arc::new(AtomicU64::new(0));
    let zaehler = Arc::clone(&unterlaeufe);

    let stream = match ausgabeformat(device, &config)? {
        SampleFormat::F32 => stream_bauen::<f32>(device, &stream_config, consumer, zaehler)?,
        SampleFormat::I16 => stream_bauen::<i16>(device, &stream_config, consumer, zaehler)?,
        SampleFormat::U16 => stream_bauen::<u16>(device, &stream_config, consumer, zaehler)?,
        anderes => {
            return Err(AudioError::Konfiguration(format!(
                "Ausgabegeraet verlangt {:?}",
                anderes
            )))
        }
    };

    stream
        .play()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    debug!(
        sample_rate = config.sample_rate,
        channels = config.channels,
        puffer = config.buffer_size,
        "Wiedergabe gestartet"
    );

    Ok((
        PlaybackStream {
            _stream: stream,
            config,
            unterlaeufe,
        },
        producer,
    ))
}

/// Bevorzugt eine Konfiguration mit exakt passender Kanalanzahl
fn ausgabeformat(device: &Device, config: &PlaybackConfig) -> AudioResult<SampleFormat> {
    let passend: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| match e {
            cpal::SupportedStreamConfigsError::DeviceNotAvailable => {
                AudioError::GeraetNichtGefunden(e.to_string())
            }
            other => AudioError::StreamFehler(other.to_string()),
        })?
        .filter(|c| {
            c.min_sample_rate().0 <= config.sample_rate
                && c.max_sample_rate().0 >= config.sample_rate
                && c.channels() >= config.channels
        })
        .collect();

    let format = passend
        .iter()
        .find(|c| c.channels() == config.channels)
        .or_else(|| passend.first())
        .map(|c| c.sample_format())
        .unwrap_or(SampleFormat::F32);
    Ok(format)
}

fn stream_bauen<T>(
    device: &Device,
    stream_config: &StreamConfig,
    mut consumer: HeapCons<f32>,
    unterlaeufe: Arc<AtomicU64>,
) -> AudioResult<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut zwischenpuffer = Vec::new();
    device
        .build_output_stream(
            stream_config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if ausgabe_fuellen(&mut consumer, &mut zwischenpuffer, data) > 0 {
                    unterlaeufe.fetch_add(1, Ordering::Relaxed);
                }
            },
            |err| error!(fehler = %err, "Wiedergabe-Fehler"),
            None,
        )
        .map_err(build_fehler)
}

/// Fuellt einen Ausgabepuffer aus dem Ring-Buffer
///
/// Gibt die Anzahl der mit Stille aufgefuellten Samples zurueck. Der
/// Zwischenpuffer waechst nur, wenn cpal groessere Bloecke anfordert.
fn ausgabe_fuellen<T>(
    consumer: &mut HeapCons<f32>,
    zwischenpuffer: &mut Vec<f32>,
    data: &mut [T],
) -> usize
where
    T: Sample + FromSample<f32>,
{
    if zwischenpuffer.len() < data.len() {
        zwischenpuffer.resize(data.len(), 0.0);
    }
    let gelesen = consumer.pop_slice(&mut zwischenpuffer[..data.len()]);

    for (ziel, quelle) in data.iter_mut().zip(&zwischenpuffer[..gelesen]) {
        *ziel = T::from_sample((*quelle).clamp(-1.0, 1.0));
    }
    for ziel in &mut data[gelesen..] {
        *ziel = T::EQUILIBRIUM;
    }
    data.len() - gelesen
}

fn build_fehler(e: BuildStreamError) -> AudioError {
    match e {
        BuildStreamError::DeviceNotAvailable => AudioError::GeraetNichtGefunden(e.to_string()),
        BuildStreamError::StreamConfigNotSupported | BuildStreamError::InvalidArgument => {
            AudioError::Konfiguration(e.to_string())
        }
        other => AudioError::StreamFehler(other.to_string()),
    }
}
