/// Real-time engine.
///
/// One [`Engine`] owns the clock, the trigger grid and the step cursor. The
/// audio host drives it through the [`Scheduler`] trait once per buffer, so
/// tests can feed it synthetic buffers with no audio or MIDI host present.
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::config::{Config, MAX_TEMPO_BPM};
use crate::error::SequencerError;
use crate::midi::ports::{InboundMessage, OutboundBuffers, PortId};
use crate::midi::{self, ControlEvent};
use crate::sequencer::clock::Clock;
use crate::sequencer::{StepSequencer, TriggerGrid};

/// Lock-free parameters shared between the audio callback and other threads.
#[derive(Debug)]
pub struct ControlCell {
    requested_tempo: AtomicU32,
    current_step: AtomicU32,
    dropped_events: AtomicU32,
}

impl ControlCell {
    pub fn new(tempo_bpm: u32) -> Self {
        Self {
            requested_tempo: AtomicU32::new(tempo_bpm),
            current_step: AtomicU32::new(0),
            dropped_events: AtomicU32::new(0),
        }
    }

    /// Ask the engine to switch tempo at the start of its next buffer.
    pub fn request_tempo(&self, tempo_bpm: u32) -> Result<(), SequencerError> {
        if tempo_bpm == 0 || tempo_bpm > MAX_TEMPO_BPM {
            return Err(SequencerError::InvalidTempo(tempo_bpm));
        }
        self.requested_tempo.store(tempo_bpm, Ordering::Relaxed);
        Ok(())
    }

    pub fn requested_tempo(&self) -> u32 {
        self.requested_tempo.load(Ordering::Relaxed)
    }

    /// Step cursor as of the last processed buffer.
    pub fn current_step(&self) -> usize {
        self.current_step.load(Ordering::Relaxed) as usize
    }

    /// Outbound events dropped because a per-buffer buffer or the outbound
    /// ring was full.
    pub fn dropped_events(&self) -> u32 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    fn add_dropped(&self, dropped: u32) {
        if dropped > 0 {
            self.dropped_events.fetch_add(dropped, Ordering::Relaxed);
        }
    }

    fn publish(&self, step: usize, dropped: u32) {
        self.current_step.store(step as u32, Ordering::Relaxed);
        self.add_dropped(dropped);
    }
}

/// Result of one audio buffer, mapped onto the host's status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Continue,
    Fault(SequencerError),
}

impl ProcessStatus {
    pub fn code(&self) -> i32 {
        match self {
            ProcessStatus::Continue => 0,
            ProcessStatus::Fault(_) => 1,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, ProcessStatus::Fault(_))
    }
}

/// Something the audio host drives once per buffer.
pub trait Scheduler {
    /// Process one buffer. Must not block, allocate or panic.
    fn on_audio_buffer(
        &mut self,
        nframes: u32,
        inbound: &[InboundMessage],
        outbound: &mut OutboundBuffers,
    ) -> ProcessStatus;

    /// Called by the host before processing starts and whenever its sample
    /// rate changes, never concurrently with `on_audio_buffer`.
    fn on_sample_rate_change(&mut self, sample_rate: u32) -> Result<(), SequencerError>;

    /// Events from the last buffer that the host could not queue for sending.
    fn on_outbound_dropped(&mut self, count: u32);
}

pub struct Engine {
    clock: Clock,
    grid: TriggerGrid,
    sequencer: StepSequencer,
    control: Arc<ControlCell>,
}

impl Engine {
    pub fn new(tempo_bpm: u32, sample_rate: u32) -> Result<Self, SequencerError> {
        Ok(Self {
            clock: Clock::new(tempo_bpm, sample_rate)?,
            grid: TriggerGrid::new(),
            sequencer: StepSequencer::new(),
            control: Arc::new(ControlCell::new(tempo_bpm)),
        })
    }

    pub fn from_config(config: &Config, sample_rate: u32) -> Result<Self, SequencerError> {
        Self::new(config.tempo_bpm, sample_rate)
    }

    /// Handle for other threads: tempo requests in, step cursor out.
    pub fn control(&self) -> Arc<ControlCell> {
        Arc::clone(&self.control)
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn grid(&self) -> &TriggerGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut TriggerGrid {
        &mut self.grid
    }

    pub fn sequencer(&self) -> &StepSequencer {
        &self.sequencer
    }

    fn apply_tempo_request(&mut self) -> Result<(), SequencerError> {
        let requested = self.control.requested_tempo();
        if requested != self.clock.tempo_bpm() {
            self.clock.set_tempo(requested)?;
        }
        Ok(())
    }

    fn handle_inbound(&mut self, message: &InboundMessage, out: &mut OutboundBuffers) {
        if message.port != PortId::ControllerIn {
            return;
        }

        match midi::decode(message.event.bytes()) {
            Some(ControlEvent::ToggleCell { track, step }) => {
                // Pad coordinates always fall inside the grid
                let _ = self.grid.toggle(track, step);
            }
            Some(ControlEvent::RouteNoteOn {
                channel,
                note,
                velocity,
            }) => {
                out.push(
                    PortId::SynthOut,
                    midi::encode_route(channel, note, velocity, message.event.frame_offset()),
                );
            }
            None => {}
        }
    }
}

impl Scheduler for Engine {
    fn on_audio_buffer(
        &mut self,
        nframes: u32,
        inbound: &[InboundMessage],
        outbound: &mut OutboundBuffers,
    ) -> ProcessStatus {
        if let Err(e) = self.apply_tempo_request() {
            return ProcessStatus::Fault(e);
        }

        for message in inbound {
            self.handle_inbound(message, outbound);
        }

        self.sequencer.tick(nframes, &mut self.clock, &self.grid, outbound);

        self.control
            .publish(self.sequencer.current_position(), outbound.dropped());
        ProcessStatus::Continue
    }

    fn on_sample_rate_change(&mut self, sample_rate: u32) -> Result<(), SequencerError> {
        self.clock.on_sample_rate_change(sample_rate)
    }

    fn on_outbound_dropped(&mut self, count: u32) {
        self.control.add_dropped(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MidiEvent;

    fn pad(bytes: [u8; 3]) -> InboundMessage {
        InboundMessage::new(PortId::ControllerIn, MidiEvent::new(bytes[0], bytes[1], bytes[2], 0))
    }

    #[test]
    fn test_pad_press_toggles_cell() {
        let mut engine = Engine::new(120, 48000).unwrap();
        let mut out = OutboundBuffers::new();

        let status = engine.on_audio_buffer(256, &[pad([0x90, 0x23, 0x7F])], &mut out);
        assert_eq!(status, ProcessStatus::Continue);
        assert!(engine.grid().cell(2, 3).unwrap().enabled());

        out.clear();
        engine.on_audio_buffer(256, &[pad([0x90, 0x23, 0x7F])], &mut out);
        assert!(!engine.grid().cell(2, 3).unwrap().enabled());

        // release does nothing
        engine.on_audio_buffer(256, &[pad([0x90, 0x23, 0x00])], &mut out);
        assert!(!engine.grid().cell(2, 3).unwrap().enabled());
    }

    #[test]
    fn test_button_routes_note_to_synth() {
        let mut engine = Engine::new(120, 48000).unwrap();
        let mut out = OutboundBuffers::new();

        engine.on_audio_buffer(256, &[pad([0xB0, 0x6A, 0x64])], &mut out);
        let synth = out.events(PortId::SynthOut);
        assert_eq!(synth.len(), 1);
        assert_eq!(synth[0].bytes(), &[0x92, 0x36, 0x64]);
    }

    #[test]
    fn test_messages_from_other_ports_ignored() {
        let mut engine = Engine::new(120, 48000).unwrap();
        let mut out = OutboundBuffers::new();
        let stray = InboundMessage::new(PortId::SynthOut, MidiEvent::new(0x90, 0x23, 0x7F, 0));

        engine.on_audio_buffer(256, &[stray], &mut out);
        assert_eq!(engine.grid().active_count(), 0);
    }

    #[test]
    fn test_first_buffer_lights_step_zero() {
        let mut engine = Engine::new(120, 48000).unwrap();
        let mut out = OutboundBuffers::new();

        engine.on_audio_buffer(64, &[], &mut out);
        assert_eq!(out.events(PortId::ControllerOut)[0].bytes(), &[0x90, 0, 63]);
        assert!(out.events(PortId::SynthOut).is_empty());
    }

    #[test]
    fn test_toggled_cell_fires_on_its_step() {
        let mut engine = Engine::new(60, 1000).unwrap();
        let mut out = OutboundBuffers::new();

        // track 1, step 2
        engine.on_audio_buffer(0, &[pad([0x90, 0x12, 0x40])], &mut out);
        let mut fired_at = None;
        for buffer in 0..4 {
            out.clear();
            engine.on_audio_buffer(1000, &[], &mut out);
            if !out.events(PortId::SynthOut).is_empty() {
                fired_at.get_or_insert(buffer);
            }
        }
        assert_eq!(fired_at, Some(2));
        assert_eq!(engine.control().current_step(), 4);
    }

    #[test]
    fn test_tempo_request_applied_next_buffer() {
        let mut engine = Engine::new(120, 48000).unwrap();
        let control = engine.control();
        let mut out = OutboundBuffers::new();

        control.request_tempo(60).unwrap();
        assert_eq!(engine.clock().samples_per_beat(), 24000);
        engine.on_audio_buffer(64, &[], &mut out);
        assert_eq!(engine.clock().samples_per_beat(), 48000);

        assert!(control.request_tempo(0).is_err());
        assert_eq!(control.requested_tempo(), 60);
    }

    #[test]
    fn test_unusable_tempo_faults() {
        // 999 BPM has no whole-sample period at 10 Hz
        let mut engine = Engine::new(120, 10).unwrap();
        let mut out = OutboundBuffers::new();

        engine.control().request_tempo(999).unwrap();
        let status = engine.on_audio_buffer(64, &[], &mut out);
        assert_eq!(status, ProcessStatus::Fault(SequencerError::InvalidTempo(999)));
        assert_eq!(status.code(), 1);
        assert!(out.is_empty());
    }

    #[test]
    fn test_sample_rate_change() {
        let mut engine = Engine::new(120, 48000).unwrap();
        engine.on_sample_rate_change(44100).unwrap();
        assert_eq!(engine.clock().samples_per_beat(), 22050);
        assert!(engine.on_sample_rate_change(0).is_err());
    }

    #[test]
    fn test_host_drops_are_counted() {
        let mut engine = Engine::new(120, 48000).unwrap();
        let control = engine.control();

        engine.on_outbound_dropped(0);
        assert_eq!(control.dropped_events(), 0);
        engine.on_outbound_dropped(3);
        engine.on_outbound_dropped(2);
        assert_eq!(control.dropped_events(), 5);
    }

    #[test]
    fn test_from_config() {
        let engine = Engine::from_config(&Config::default(), 48000).unwrap();
        assert_eq!(engine.clock().tempo_bpm(), 120);
        assert_eq!(engine.control().requested_tempo(), 120);
    }
}
