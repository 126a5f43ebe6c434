/// Error types shared by the engine and its host collaborators.
use std::fmt;

use crate::midi::ports::PortId;

/// Errors raised by the clock and the trigger grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerError {
    /// Tempo is zero or too fast for the current sample rate
    InvalidTempo(u32),
    /// Sample rate is zero or too low for the current tempo
    InvalidSampleRate(u32),
    /// Cell coordinate outside the grid
    OutOfRange { track: usize, step: usize },
    /// Cell velocity above the MIDI maximum of 127
    InvalidVelocity(u8),
}

impl fmt::Display for SequencerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequencerError::InvalidTempo(bpm) => write!(f, "Invalid tempo: {} BPM", bpm),
            SequencerError::InvalidSampleRate(sr) => write!(f, "Invalid sample rate: {} Hz", sr),
            SequencerError::OutOfRange { track, step } => {
                write!(f, "Cell out of range: track {}, step {}", track, step)
            }
            SequencerError::InvalidVelocity(v) => write!(f, "Invalid velocity: {}", v),
        }
    }
}

impl std::error::Error for SequencerError {}

/// Errors found while loading or validating the configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read
    Io(String),
    /// Config file is not valid JSON for [`crate::Config`]
    Parse(String),
    /// Tempo rejected by validation
    InvalidTempo(u32),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "Config read error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Config parse error: {}", msg),
            ConfigError::InvalidTempo(bpm) => write!(f, "Config has invalid tempo: {} BPM", bpm),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Fatal failures while setting up the audio or MIDI host.
#[derive(Debug)]
pub enum DeviceError {
    /// MIDI client could not be created
    ClientInit(String),
    /// A matched port could not be connected
    PortConnect(String),
    /// No audio output device available
    NoAudioDevice,
    /// Audio device configuration could not be read
    AudioConfig(String),
    /// Audio stream could not be built or started
    Stream(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::ClientInit(msg) => write!(f, "MIDI client error: {}", msg),
            DeviceError::PortConnect(msg) => write!(f, "MIDI port connect error: {}", msg),
            DeviceError::NoAudioDevice => write!(f, "No audio device available"),
            DeviceError::AudioConfig(msg) => write!(f, "Audio config error: {}", msg),
            DeviceError::Stream(msg) => write!(f, "Audio stream error: {}", msg),
        }
    }
}

impl std::error::Error for DeviceError {}

/// A logical port that no physical device matched. Logged, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingWarning {
    pub port: PortId,
    pub pattern: String,
}

impl fmt::Display for RoutingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no device matched '{}' for port {}, leaving it unconnected",
            self.pattern,
            self.port.name()
        )
    }
}
