/// Sample-accurate beat clock - counts audio frames instead of wall time
use crate::error::SequencerError;

/// One beat boundary inside an audio buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatCrossing {
    /// Index of the frame in the buffer at which the boundary falls
    pub frame_offset: u32,
}

/// Crossings reported by a single [`Clock::advance`] call.
///
/// The clock state is already updated when this is returned, so dropping
/// the iterator early never loses time.
#[derive(Debug, Clone)]
pub struct Crossings {
    carry_before: u64,
    period: u64,
    index: u64,
    count: u64,
}

impl Iterator for Crossings {
    type Item = BeatCrossing;

    fn next(&mut self) -> Option<BeatCrossing> {
        if self.index >= self.count {
            return None;
        }
        self.index += 1;
        // The boundary is reached on the frame that brings the carry up to
        // a whole number of periods.
        let offset = (self.index * self.period).saturating_sub(self.carry_before + 1);
        Some(BeatCrossing {
            frame_offset: offset as u32,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.count - self.index) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Crossings {}

#[derive(Debug, Clone)]
pub struct Clock {
    tempo_bpm: u32,
    sample_rate: u32,
    samples_per_beat: u64,
    sample_carry: u64,
}

fn beat_period(sample_rate: u32, tempo_bpm: u32) -> u64 {
    60 * sample_rate as u64 / tempo_bpm as u64
}

impl Clock {
    pub fn new(tempo_bpm: u32, sample_rate: u32) -> Result<Self, SequencerError> {
        if sample_rate == 0 {
            return Err(SequencerError::InvalidSampleRate(sample_rate));
        }
        if tempo_bpm == 0 || beat_period(sample_rate, tempo_bpm) == 0 {
            return Err(SequencerError::InvalidTempo(tempo_bpm));
        }

        Ok(Self {
            tempo_bpm,
            sample_rate,
            samples_per_beat: beat_period(sample_rate, tempo_bpm),
            sample_carry: 0,
        })
    }

    pub fn tempo_bpm(&self) -> u32 {
        self.tempo_bpm
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples_per_beat(&self) -> u64 {
        self.samples_per_beat
    }

    pub fn sample_carry(&self) -> u64 {
        self.sample_carry
    }

    /// Change the tempo. The carry is kept as is: it counts samples, not beats.
    ///
    /// If the new period is shorter than the current carry, the next
    /// `advance` reports the overdue crossings at frame 0.
    pub fn set_tempo(&mut self, tempo_bpm: u32) -> Result<(), SequencerError> {
        if tempo_bpm == 0 {
            return Err(SequencerError::InvalidTempo(tempo_bpm));
        }
        let period = beat_period(self.sample_rate, tempo_bpm);
        if period == 0 {
            return Err(SequencerError::InvalidTempo(tempo_bpm));
        }

        self.tempo_bpm = tempo_bpm;
        self.samples_per_beat = period;
        Ok(())
    }

    pub fn on_sample_rate_change(&mut self, sample_rate: u32) -> Result<(), SequencerError> {
        if sample_rate == 0 {
            return Err(SequencerError::InvalidSampleRate(sample_rate));
        }
        let period = beat_period(sample_rate, self.tempo_bpm);
        if period == 0 {
            return Err(SequencerError::InvalidSampleRate(sample_rate));
        }

        self.sample_rate = sample_rate;
        self.samples_per_beat = period;
        Ok(())
    }

    /// Advance by one audio buffer and report every beat boundary inside it.
    pub fn advance(&mut self, nframes: u32) -> Crossings {
        let carry_before = self.sample_carry;
        let total = carry_before + nframes as u64;
        let count = total / self.samples_per_beat;

        // Same result as subtracting one period per crossing. Never reset to
        // zero, the remainder belongs to the next beat.
        self.sample_carry = total - count * self.samples_per_beat;

        Crossings {
            carry_before,
            period: self.samples_per_beat,
            index: 0,
            count,
        }
    }
}
