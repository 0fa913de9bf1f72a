//! voxbridge-audio – Audio-Ein-/Ausgabe
//!
//! Bausteine fuer die Media-Pipeline der Voice-Session:
//! - Mikrofon-Capture via cpal
//! - Lautsprecher-Playback via cpal
//! - Geraeteauswahl nach Name oder Standardgeraet
//! - Opus Encoding/Decoding

pub mod capture;
pub mod codec;
pub mod device;
pub mod error;
pub mod playback;

// Bequeme Re-Exporte der wichtigsten Typen
pub use capture::{open_capture_stream, CaptureConfig, CaptureConsumer, CaptureStream};
pub use codec::{OpusDecoder, OpusEncoder, OpusSettings};
pub use device::{list_input_devices, load_cpal_input_device, load_cpal_output_device, AudioDevice};
pub use error::{AudioError, AudioResult};
pub use playback::{open_playback_stream, PlaybackConfig, PlaybackProducer, PlaybackStream};
