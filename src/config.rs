/// Runtime configuration, read from an optional JSON file.
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::midi::ports::{DeviceMatch, LogicalPort, PortId};

pub const DEFAULT_TEMPO_BPM: u32 = 120;
pub const MAX_TEMPO_BPM: u32 = 999;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Name of the MIDI client and prefix of its ports
    pub client_name: String,
    #[serde(rename = "tempoBPM")]
    pub tempo_bpm: u32,
    /// Substring of the synthesizer's device name
    #[serde(rename = "inputDeviceNameSubstring")]
    pub input_device: String,
    /// Substring of the pad controller's device name
    #[serde(rename = "controllerDeviceNameSubstring")]
    pub controller_device: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_name: "ndseq".to_string(),
            tempo_bpm: DEFAULT_TEMPO_BPM,
            input_device: "Circuit".to_string(),
            controller_device: "Launchpad".to_string(),
        }
    }
}

impl Config {
    /// Load from `path`, or use the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        };

        let text = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tempo_bpm == 0 || self.tempo_bpm > MAX_TEMPO_BPM {
            return Err(ConfigError::InvalidTempo(self.tempo_bpm));
        }
        Ok(())
    }

    pub fn logical_ports(&self) -> [LogicalPort; 3] {
        let controller = DeviceMatch::contains(self.controller_device.as_str());
        [
            LogicalPort::new(PortId::ControllerIn, controller.clone()),
            LogicalPort::new(PortId::ControllerOut, controller),
            LogicalPort::new(PortId::SynthOut, DeviceMatch::contains(self.input_device.as_str())),
        ]
    }
}
