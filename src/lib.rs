/// NDSEQ - A real-time MIDI step sequencer library
///
/// This library bridges a grid pad controller and a percussion synthesizer:
/// - Sample-accurate clock driven by the audio callback
/// - 8 x 64 trigger grid with a shared step cursor
/// - MIDI translation between controller, engine and synthesizer bytes
/// - Host plumbing: cpal audio clock source and midir port routing

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod midi;
pub mod sequencer;

// Re-export commonly used types
pub use audio::AudioHost;
pub use config::Config;
pub use engine::{ControlCell, Engine, ProcessStatus, Scheduler};
pub use error::{ConfigError, DeviceError, RoutingWarning, SequencerError};
pub use midi::ports::{InboundMessage, OutboundBuffers, PortId};
pub use midi::router::PortRouter;
pub use midi::{ControlEvent, MidiEvent};
pub use sequencer::clock::Clock;
pub use sequencer::{StepSequencer, TriggerGrid};
