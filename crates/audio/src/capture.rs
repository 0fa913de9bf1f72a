//! Mikrofon-Capture via cpal
//!
//! Oeffnet einen cpal InputStream und schreibt Samples in einen
//! lock-free Ring-Buffer. `cpal::Stream` ist `!Send`, der Stream muss
//! deshalb in dem Thread bleiben, der ihn geoeffnet hat.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BuildStreamError, Device, SampleFormat, Stream, StreamConfig};
use ringbuf::traits::{Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use tracing::{debug, error, trace};

use crate::error::{AudioError, AudioResult};

/// Konfiguration fuer den Audio-Capture
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Kanalanzahl (1 = Mono)
    pub channels: u16,
    /// Ring-Buffer Kapazitaet in Samples
    pub buffer_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
            buffer_size: 48000 * 2, // 2 Sekunden Puffer
        }
    }
}

/// Konsumiert Samples fuer Encoder und Transport
pub type CaptureConsumer = HeapCons<f32>;

/// Audio-Capture-Stream
///
/// Haelt den cpal-Stream am Leben. Wird der CaptureStream gedroppt,
/// stoppt die Aufnahme und das Geraet wird freigegeben.
pub struct CaptureStream {
    _stream: Stream,
    config: CaptureConfig,
}

impl CaptureStream {
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

/// Oeffnet einen Capture-Stream auf dem gegebenen Geraet.
///
/// Fehler beim Aufbau werden unterschieden: ein verschwundenes Geraet
/// ergibt `GeraetNichtGefunden`, eine vom Betriebssystem abgelehnte
/// Aufnahme `ZugriffVerweigert`.
pub fn open_capture_stream(
    device: &Device,
    config: CaptureConfig,
) -> AudioResult<(CaptureStream, CaptureConsumer)> {
    let stream_config = StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let rb = HeapRb::<f32>::new(config.buffer_size);
    let (mut producer, consumer) = rb.split();

    let err_fn = |err| error!("Capture-Fehler: {}", err);

    let supported = device
        .supported_input_configs()
        .map_err(|e| match e {
            cpal::SupportedStreamConfigsError::DeviceNotAvailable => {
                AudioError::GeraetNichtGefunden(e.to_string())
            }
            other => AudioError::ZugriffVerweigert(other.to_string()),
        })?
        .find(|c| {
            c.min_sample_rate().0 <= config.sample_rate
                && c.max_sample_rate().0 >= config.sample_rate
                && c.channels() >= config.channels
        });

    let sample_format = supported
        .map(|c| c.sample_format())
        .unwrap_or(SampleFormat::F32);

    let stream = match sample_format {
        SampleFormat::F32 => device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _| {
                    let written = producer.push_slice(data);
                    if written < data.len() {
                        trace!(verworfen = data.len() - written, "Capture Ring-Buffer voll");
                    }
                },
                err_fn,
                None,
            )
            .map_err(build_fehler)?,
        SampleFormat::I16 => device
            .build_input_stream(
                &stream_config,
                move |data: &[i16], _| {
                    let floats: Vec<f32> =
                        data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                    if producer.push_slice(&floats) < floats.len() {
                        trace!("Capture Ring-Buffer voll");
                    }
                },
                err_fn,
                None,
            )
            .map_err(build_fehler)?,
        other => {
            return Err(AudioError::StreamFehler(format!(
                "Nicht unterstuetztes Sample-Format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| AudioError::ZugriffVerweigert(e.to_string()))?;

    debug!(
        "Capture-Stream geoeffnet: {}Hz {}ch",
        config.sample_rate, config.channels
    );

    Ok((
        CaptureStream {
            _stream: stream,
            config,
        },
        consumer,
    ))
}

fn build_fehler(e: BuildStreamError) -> AudioError {
    match e {
        BuildStreamError::DeviceNotAvailable => AudioError::GeraetNichtGefunden(e.to_string()),
        BuildStreamError::StreamConfigNotSupported | BuildStreamError::InvalidArgument => {
            AudioError::Konfiguration(e.to_string())
        }
        other => AudioError::ZugriffVerweigert(other.to_string()),
    }
}
