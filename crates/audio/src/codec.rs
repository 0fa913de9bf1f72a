//! Opus Encoder/Decoder Wrapper
//!
//! Kapselt audiopus und stellt eine f32-PCM basierte API bereit.
//! Sprach-Sessions laufen in Mono, die Abtastrate folgt der
//! Geraetekonfiguration.

use audiopus::{
    coder::{Decoder, Encoder},
    Application, Channels, SampleRate,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AudioError, AudioResult};

/// Einstellungen fuer Opus-Encoder und -Decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpusSettings {
    /// Abtastrate in Hz (8000, 12000, 16000, 24000 oder 48000)
    pub sample_rate: u32,
    /// 1 = Mono, 2 = Stereo
    pub channels: u16,
    /// Ziel-Bitrate in kbps (6..=510)
    pub bitrate_kbps: u16,
    /// Frame-Laenge in Millisekunden
    pub frame_ms: u32,
}

impl Default for OpusSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
            bitrate_kbps: 32,
            frame_ms: 20,
        }
    }
}

impl OpusSettings {
    /// Prueft die Einstellungen gegen die Grenzen von libopus
    pub fn validieren(&self) -> Result<(), String> {
        opus_rate(self.sample_rate)?;
        if !(1..=2).contains(&self.channels) {
            return Err(format!("Ungueltige Kanalanzahl: {}", self.channels));
        }
        if !(6..=510).contains(&self.bitrate_kbps) {
            return Err(format!(
                "Bitrate {}kbps ausserhalb von 6..=510",
                self.bitrate_kbps
            ));
        }
        if ![10, 20, 40, 60].contains(&self.frame_ms) {
            return Err(format!("Ungueltige Frame-Laenge: {}ms", self.frame_ms));
        }
        Ok(())
    }

    /// Samples pro Kanal und Frame
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate * self.frame_ms / 1000) as usize
    }
}

/// Opus-Encoder: kodiert f32-PCM zu Opus-Bytes
pub struct OpusEncoder {
    encoder: Encoder,
    settings: OpusSettings,
    frame_size: usize,
}

impl OpusEncoder {
    pub fn new(settings: OpusSettings) -> AudioResult<Self> {
        settings.validieren().map_err(AudioError::Konfiguration)?;

        let sample_rate = opus_rate(settings.sample_rate).map_err(AudioError::Konfiguration)?;
        let mut encoder = Encoder::new(sample_rate, opus_channels(settings.channels), Application::Voip)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        encoder
            .set_bitrate(audiopus::Bitrate::BitsPerSecond(
                (settings.bitrate_kbps as i32) * 1000,
            ))
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        // FEC hilft bei Paketverlust auf der Peer-Strecke
        encoder
            .set_inband_fec(true)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        let frame_size = settings.samples_per_frame() * settings.channels as usize;

        debug!(
            "OpusEncoder erstellt: {}kbps, {}Hz, frame_size={}",
            settings.bitrate_kbps, settings.sample_rate, frame_size
        );

        Ok(Self {
            encoder,
            settings,
            frame_size,
        })
    }

    /// Kodiert einen PCM-Frame (f32, normalisiert -1.0..1.0) zu Opus-Bytes
    ///
    /// Die Eingabe muss exakt `frame_size()` Samples lang sein.
    pub fn encode(&mut self, pcm: &[f32]) -> AudioResult<Vec<u8>> {
        if pcm.len() != self.frame_size {
            return Err(AudioError::Konfiguration(format!(
                "PCM-Frame muss {} Samples lang sein, war {}",
                self.frame_size,
                pcm.len()
            )));
        }

        // Puffer: max. 4000 Bytes reicht fuer alle Opus-Frames
        let mut output = vec![0u8; 4000];
        let written = self
            .encoder
            .encode_float(pcm, &mut output)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        output.truncate(written);
        Ok(output)
    }

    /// Erwartete Frame-Groesse in Samples (alle Kanaele)
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn settings(&self) -> &OpusSettings {
        &self.settings
    }
}

/// Opus-Decoder: dekodiert Opus-Bytes zu f32-PCM
pub struct OpusDecoder {
    decoder: Decoder,
    channels: u16,
    frame_size: usize,
}

impl OpusDecoder {
    pub fn new(settings: OpusSettings) -> AudioResult<Self> {
        settings.validieren().map_err(AudioError::Konfiguration)?;
        let sample_rate = opus_rate(settings.sample_rate).map_err(AudioError::Konfiguration)?;

        let decoder = Decoder::new(sample_rate, opus_channels(settings.channels))
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        // Platz fuer den laengsten erlaubten Frame (120ms)
        let frame_size = (settings.sample_rate * 120 / 1000) as usize;

        debug!(
            "OpusDecoder erstellt: {}Hz {}ch",
            settings.sample_rate, settings.channels
        );

        Ok(Self {
            decoder,
            channels: settings.channels,
            frame_size,
        })
    }

    /// Dekodiert Opus-Bytes zu f32-PCM
    pub fn decode(&mut self, opus_data: &[u8]) -> AudioResult<Vec<f32>> {
        let mut output = vec![0.0f32; self.frame_size * self.channels as usize];
        let decoded = self
            .decoder
            .decode_float(Some(opus_data), &mut output, false)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        output.truncate(decoded * self.channels as usize);
        Ok(output)
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

fn opus_rate(rate: u32) -> Result<SampleRate, String> {
    match rate {
        8000 => Ok(SampleRate::Hz8000),
        12000 => Ok(SampleRate::Hz12000),
        16000 => Ok(SampleRate::Hz16000),
        24000 => Ok(SampleRate::Hz24000),
        48000 => Ok(SampleRate::Hz48000),
        other => Err(format!("Opus unterstuetzt {}Hz nicht", other)),
    }
}

fn opus_channels(channels: u16) -> Channels {
    if channels == 2 {
        Channels::Stereo
    } else {
        Channels::Mono
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_einstellungen_gueltig() {
        let s = OpusSettings::default();
        assert!(s.validieren().is_ok());
        // 20ms bei 48kHz = 960 Samples
        assert_eq!(s.samples_per_frame(), 960);
    }

    #[test]
    fn ungueltige_einstellungen() {
        let rate = OpusSettings {
            sample_rate: 44100,
            ..Default::default()
        };
        assert!(rate.validieren().is_err());

        let bitrate = OpusSettings {
            bitrate_kbps: 5,
            ..Default::default()
        };
        assert!(bitrate.validieren().is_err());

        let frame = OpusSettings {
            frame_ms: 15,
            ..Default::default()
        };
        assert!(frame.validieren().is_err());
    }

    #[test]
    fn encoder_falscher_frame_size_fehler() {
        let mut enc = OpusEncoder::new(OpusSettings::default()).unwrap();
        let result = enc.encode(&[0.0f32; 100]);
        assert!(matches!(result, Err(AudioError::Konfiguration(_))));
    }

    #[test]
    fn encoder_mit_ungueltiger_rate_abgelehnt() {
        let result = OpusEncoder::new(OpusSettings {
            sample_rate: 22050,
            ..Default::default()
        });
        assert!(matches!(result, Err(AudioError::Konfiguration(_))));
    }

    #[test]
    fn kodierter_frame_wird_dekodiert() {
        let settings = OpusSettings::default();
        let mut enc = OpusEncoder::new(settings).unwrap();
        let mut dec = OpusDecoder::new(settings).unwrap();

        let frame_size = enc.frame_size();
        let pcm_in: Vec<f32> = (0..frame_size)
            .map(|i| (i as f32 / frame_size as f32 * 0.1).sin() * 0.5)
            .collect();

        let encoded = enc.encode(&pcm_in).expect("Encoding sollte funktionieren");
        assert!(!encoded.is_empty());

        let decoded = dec.decode(&encoded).expect("Decoding sollte funktionieren");
        assert_eq!(decoded.len(), frame_size);
    }
}
