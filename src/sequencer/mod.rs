/// Core sequencer logic - trigger grid state and step management
///
/// All tracks share one step cursor. Nothing in here allocates, so the
/// sequencer can be ticked straight from the audio callback.
use crate::error::SequencerError;
use crate::midi::{self, ports::{OutboundBuffers, PortId}};

pub mod clock;

use clock::Clock;

pub const TRACKS: usize = 8;
pub const STEPS: usize = 64;
/// Velocity given to a cell switched on from the controller.
pub const DEFAULT_VELOCITY: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerCell {
    pub track: usize,
    pub step: usize,
    pub velocity: u8,
}

impl TriggerCell {
    pub fn enabled(&self) -> bool {
        self.velocity > 0
    }
}

/// Fixed 8 x 64 matrix of trigger velocities. A cell is on when its
/// velocity is non-zero.
#[derive(Debug, Clone)]
pub struct TriggerGrid {
    velocities: [[u8; STEPS]; TRACKS],
}

impl TriggerGrid {
    pub fn new() -> Self {
        Self {
            velocities: [[0; STEPS]; TRACKS],
        }
    }

    pub fn tracks(&self) -> usize {
        TRACKS
    }

    pub fn steps(&self) -> usize {
        STEPS
    }

    fn check(track: usize, step: usize) -> Result<(), SequencerError> {
        if track >= TRACKS || step >= STEPS {
            return Err(SequencerError::OutOfRange { track, step });
        }
        Ok(())
    }

    pub fn cell(&self, track: usize, step: usize) -> Result<TriggerCell, SequencerError> {
        Self::check(track, step)?;
        Ok(TriggerCell {
            track,
            step,
            velocity: self.velocities[track][step],
        })
    }

    pub fn toggle(&mut self, track: usize, step: usize) -> Result<(), SequencerError> {
        Self::check(track, step)?;
        let velocity = &mut self.velocities[track][step];
        *velocity = if *velocity > 0 { 0 } else { DEFAULT_VELOCITY };
        Ok(())
    }

    pub fn set_velocity(
        &mut self,
        track: usize,
        step: usize,
        velocity: u8,
    ) -> Result<(), SequencerError> {
        Self::check(track, step)?;
        if velocity > 127 {
            return Err(SequencerError::InvalidVelocity(velocity));
        }
        self.velocities[track][step] = velocity;
        Ok(())
    }

    /// Enabled cells of `step` as `(track, velocity)`, lowest track first.
    /// An out-of-range step has no enabled cells.
    pub fn snapshot(&self, step: usize) -> impl Iterator<Item = (usize, u8)> + '_ {
        self.velocities
            .iter()
            .enumerate()
            .filter_map(move |(track, row)| match row.get(step) {
                Some(&velocity) if velocity > 0 => Some((track, velocity)),
                _ => None,
            })
    }

    pub fn active_count(&self) -> usize {
        self.velocities
            .iter()
            .flat_map(|row| row.iter())
            .filter(|&&velocity| velocity > 0)
            .count()
    }

    pub fn clear(&mut self) {
        for row in &mut self.velocities {
            for velocity in row {
                *velocity = 0;
            }
        }
    }
}

impl Default for TriggerGrid {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// No step has fired yet
    Idle,
    Running,
}

#[derive(Debug, Clone)]
pub struct StepSequencer {
    current_position: usize,
    state: SequencerState,
}

impl StepSequencer {
    pub fn new() -> Self {
        Self {
            current_position: 0,
            state: SequencerState::Idle,
        }
    }

    pub fn current_position(&self) -> usize {
        self.current_position
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn advance_position(&mut self) -> usize {
        self.current_position = (self.current_position + 1) % STEPS;
        self.current_position
    }

    /// Run one audio buffer of `nframes` through the clock. Fired cells go to
    /// the synthesizer port, cursor lights to the controller port.
    ///
    /// Returns the number of steps fired.
    pub fn tick(
        &mut self,
        nframes: u32,
        clock: &mut Clock,
        grid: &TriggerGrid,
        out: &mut OutboundBuffers,
    ) -> usize {
        let mut fired = 0;

        if self.state == SequencerState::Idle {
            // Start sounding right away instead of one beat late
            self.fire_step(self.current_position, 0, grid, out);
            out.push(PortId::ControllerOut, midi::encode_light(self.current_position, 0));
            self.state = SequencerState::Running;
            fired += 1;
        }

        for crossing in clock.advance(nframes) {
            self.fire_step(self.current_position, crossing.frame_offset, grid, out);
            let next = self.advance_position();
            out.push(
                PortId::ControllerOut,
                midi::encode_light(next, crossing.frame_offset),
            );
            fired += 1;
        }

        fired
    }

    fn fire_step(
        &self,
        step: usize,
        frame_offset: u32,
        grid: &TriggerGrid,
        out: &mut OutboundBuffers,
    ) {
        let group = (step / 8) as u8;
        for (track, velocity) in grid.snapshot(step) {
            let (green, red) = midi::pad_colour(velocity);
            out.push(
                PortId::SynthOut,
                midi::encode_trigger(track as u8, group, green, red, frame_offset),
            );
        }
    }
}

impl Default for StepSequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_creation() {
        let grid = TriggerGrid::new();
        assert_eq!(grid.tracks(), 8);
        assert_eq!(grid.steps(), 64);
        assert_eq!(grid.active_count(), 0);
    }

    #[test]
    fn test_grid_toggle() {
        let mut grid = TriggerGrid::new();
        grid.toggle(2, 3).unwrap();
        let cell = grid.cell(2, 3).unwrap();
        assert!(cell.enabled());
        assert_eq!(cell.velocity, DEFAULT_VELOCITY);

        grid.toggle(2, 3).unwrap();
        let cell = grid.cell(2, 3).unwrap();
        assert!(!cell.enabled());
        assert_eq!(cell.velocity, 0);
    }

    #[test]
    fn test_double_toggle_restores_every_cell() {
        let mut grid = TriggerGrid::new();
        grid.toggle(0, 0).unwrap();
        for track in 0..TRACKS {
            for step in 0..STEPS {
                let before = grid.cell(track, step).unwrap();
                grid.toggle(track, step).unwrap();
                grid.toggle(track, step).unwrap();
                assert_eq!(grid.cell(track, step).unwrap(), before);
            }
        }
    }

    #[test]
    fn test_grid_out_of_range() {
        let mut grid = TriggerGrid::new();
        assert_eq!(
            grid.toggle(8, 0),
            Err(SequencerError::OutOfRange { track: 8, step: 0 })
        );
        assert!(grid.toggle(0, 64).is_err());
        assert!(grid.set_velocity(0, 64, 10).is_err());
        assert_eq!(
            grid.set_velocity(0, 0, 128),
            Err(SequencerError::InvalidVelocity(128))
        );
        assert_eq!(
            SequencerError::InvalidVelocity(128).to_string(),
            "Invalid velocity: 128"
        );
        assert!(grid.cell(9, 9).is_err());
        assert_eq!(grid.active_count(), 0);
    }

    #[test]
    fn test_set_velocity_zero_disables() {
        let mut grid = TriggerGrid::new();
        grid.set_velocity(1, 1, 40).unwrap();
        assert!(grid.cell(1, 1).unwrap().enabled());
        grid.set_velocity(1, 1, 0).unwrap();
        assert!(!grid.cell(1, 1).unwrap().enabled());
    }

    #[test]
    fn test_snapshot_ascending_tracks() {
        let mut grid = TriggerGrid::new();
        grid.set_velocity(5, 10, 30).unwrap();
        grid.toggle(1, 10).unwrap();
        grid.toggle(3, 11).unwrap();

        let hits: Vec<_> = grid.snapshot(10).collect();
        assert_eq!(hits, vec![(1, DEFAULT_VELOCITY), (5, 30)]);
        assert_eq!(grid.snapshot(64).count(), 0);

        grid.clear();
        assert_eq!(grid.snapshot(10).count(), 0);
    }

    #[test]
    fn test_sequencer_advance() {
        let mut seq = StepSequencer::new();
        assert_eq!(seq.current_position(), 0);
        seq.advance_position();
        assert_eq!(seq.current_position(), 1);
    }

    #[test]
    fn test_first_tick_fires_step_zero() {
        let mut grid = TriggerGrid::new();
        grid.toggle(4, 0).unwrap();
        let mut clock = Clock::new(120, 48000).unwrap();
        let mut seq = StepSequencer::new();
        let mut out = OutboundBuffers::new();

        assert_eq!(seq.state(), SequencerState::Idle);
        assert_eq!(seq.tick(64, &mut clock, &grid, &mut out), 1);
        assert_eq!(seq.state(), SequencerState::Running);
        assert_eq!(seq.current_position(), 0);

        assert_eq!(out.events(PortId::SynthOut).len(), 1);
        assert_eq!(out.events(PortId::SynthOut)[0].bytes(), &[0x90, 4, 44]);
        assert_eq!(out.events(PortId::ControllerOut)[0].bytes(), &[0x90, 0, 63]);

        out.clear();
        assert_eq!(seq.tick(64, &mut clock, &grid, &mut out), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_crossing_fires_then_lights_next_step() {
        let mut grid = TriggerGrid::new();
        grid.toggle(0, 0).unwrap();
        grid.toggle(7, 9).unwrap();
        let mut clock = Clock::new(60, 16).unwrap();
        let mut seq = StepSequencer::new();
        let mut out = OutboundBuffers::new();

        seq.tick(0, &mut clock, &grid, &mut out);
        out.clear();

        // one crossing at frame 15: step 0 fires, light moves to step 1
        assert_eq!(seq.tick(20, &mut clock, &grid, &mut out), 1);
        assert_eq!(seq.current_position(), 1);
        let synth = out.events(PortId::SynthOut);
        assert_eq!(synth.len(), 1);
        assert_eq!(synth[0].frame_offset(), 15);
        let lights = out.events(PortId::ControllerOut);
        assert_eq!(lights[0].bytes(), &[0x90, 16, 63]);
        assert_eq!(lights[0].frame_offset(), 15);

        // advance to step 9, which sits in the second group of eight
        out.clear();
        for _ in 0..8 {
            seq.tick(16, &mut clock, &grid, &mut out);
        }
        assert_eq!(seq.current_position(), 9);
        out.clear();
        seq.tick(16, &mut clock, &grid, &mut out);
        assert_eq!(out.events(PortId::SynthOut)[0].bytes(), &[0x90, 7 + 16, 44]);
    }

    #[test]
    fn test_cursor_wraps_after_64_crossings() {
        let grid = TriggerGrid::new();
        let mut clock = Clock::new(60, 10).unwrap();
        let mut seq = StepSequencer::new();
        let mut out = OutboundBuffers::new();

        seq.tick(0, &mut clock, &grid, &mut out);
        let start = seq.current_position();
        for _ in 0..64 {
            out.clear();
            assert_eq!(seq.tick(10, &mut clock, &grid, &mut out), 1);
        }
        assert_eq!(seq.current_position(), start);

        out.clear();
        seq.tick(10, &mut clock, &grid, &mut out);
        assert_eq!(seq.current_position(), (start + 1) % STEPS);
    }
}
