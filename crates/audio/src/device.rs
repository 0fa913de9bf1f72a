//! Audio-Geraete-Enumeration und -Auswahl
//!
//! Ein konfigurierter Geraetename wird als Teilstring gegen die
//! cpal-Namen verglichen, ohne Namen gilt das Standardgeraet.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;
use tracing::{debug, warn};

use crate::error::{AudioError, AudioResult};

/// Repraesentiert ein Eingabegeraet mit seinen Eigenschaften
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Anzeigename des Geraets
    pub name: String,
    /// Unterstuetzte gaengige Abtastraten
    pub sample_rates: Vec<u32>,
    /// Maximale Kanalanzahl
    pub channels: u16,
    /// Ob das Geraet das Standard-Eingabegeraet ist
    pub ist_standard: bool,
}

const GAENGIGE_RATEN: [u32; 5] = [8000, 16000, 24000, 44100, 48000];

/// Listet alle verfuegbaren Eingabegeraete auf
pub fn list_input_devices() -> AudioResult<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let standard = host.default_input_device().and_then(|d| d.name().ok());
    let devices = host
        .input_devices()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    let mut result = Vec::new();
    for device in devices {
        match eingabegeraet_beschreiben(&device, standard.as_deref()) {
            Ok(ad) => result.push(ad),
            Err(e) => warn!("Eingabegeraet konnte nicht gelesen werden: {}", e),
        }
    }
    debug!("Gefundene Eingabegeraete: {}", result.len());
    Ok(result)
}

/// Laedt ein cpal-Device fuer Eingabe, ohne Namen das Standardgeraet
pub fn load_cpal_input_device(name: Option<&str>) -> AudioResult<Device> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_input_device()
            .ok_or(AudioError::KeinStandardEingabegeraet),
        Some(n) => {
            let devices = host
                .input_devices()
                .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
            nach_namen_waehlen(devices, n)
        }
    }
}

/// Laedt ein cpal-Device fuer Ausgabe, ohne Namen das Standardgeraet
pub fn load_cpal_output_device(name: Option<&str>) -> AudioResult<Device> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_output_device()
            .ok_or(AudioError::KeinStandardAusgabegeraet),
        Some(n) => {
            let devices = host
                .output_devices()
                .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
            nach_namen_waehlen(devices, n)
        }
    }
}

fn nach_namen_waehlen(devices: impl Iterator<Item = Device>, name: &str) -> AudioResult<Device> {
    for device in devices {
        if let Ok(dev_name) = device.name() {
            if name_passt(&dev_name, name) {
                return Ok(device);
            }
        }
    }
    Err(AudioError::GeraetNichtGefunden(name.to_string()))
}

fn name_passt(geraetename: &str, gesucht: &str) -> bool {
    geraetename
        .to_lowercase()
        .contains(&gesucht.trim().to_lowercase())
}

fn eingabegeraet_beschreiben(device: &Device, standard: Option<&str>) -> AudioResult<AudioDevice> {
    let name = device
        .name()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    let mut sample_rates = Vec::new();
    let mut max_channels = 1u16;

    if let Ok(configs) = device.supported_input_configs() {
        for cfg in configs {
            let min = cfg.min_sample_rate().0;
            let max = cfg.max_sample_rate().0;
            for rate in GAENGIGE_RATEN {
                if rate >= min && rate <= max && !sample_rates.contains(&rate) {
                    sample_rates.push(rate);
                }
            }
            max_channels = max_channels.max(cfg.channels());
        }
    }

    sample_rates.sort_unstable();

    Ok(AudioDevice {
        ist_standard: standard == Some(name.as_str()),
        name,
        sample_rates,
        channels: max_channels,
    })
}
