/// Logical ports and the per-callback buffers exchanged with the router.
use arrayvec::ArrayVec;

use super::MidiEvent;

/// Outbound events each output port can take per audio buffer. Extra events
/// are dropped and counted.
pub const OUTBOUND_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

/// The endpoints the engine reads from and writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortId {
    /// Pad presses and buttons from the grid controller
    ControllerIn,
    /// Step lights back to the grid controller
    ControllerOut,
    /// Notes to the percussion synthesizer
    SynthOut,
}

impl PortId {
    pub const ALL: [PortId; 3] = [PortId::ControllerIn, PortId::ControllerOut, PortId::SynthOut];

    pub fn name(self) -> &'static str {
        match self {
            PortId::ControllerIn => "controller-in",
            PortId::ControllerOut => "controller-out",
            PortId::SynthOut => "synth-out",
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            PortId::ControllerIn => Direction::In,
            PortId::ControllerOut | PortId::SynthOut => Direction::Out,
        }
    }
}

/// Predicate over physical device names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMatch {
    /// Device name contains the pattern (case-sensitive). An empty pattern
    /// matches nothing.
    Contains(String),
}

impl DeviceMatch {
    pub fn contains(pattern: impl Into<String>) -> Self {
        DeviceMatch::Contains(pattern.into())
    }

    pub fn matches(&self, device_name: &str) -> bool {
        match self {
            DeviceMatch::Contains(pattern) => {
                !pattern.is_empty() && device_name.contains(pattern.as_str())
            }
        }
    }

    pub fn pattern(&self) -> &str {
        match self {
            DeviceMatch::Contains(pattern) => pattern,
        }
    }
}

/// A named, directional endpoint. Binding it to a device is the router's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalPort {
    pub id: PortId,
    pub matcher: DeviceMatch,
}

impl LogicalPort {
    pub fn new(id: PortId, matcher: DeviceMatch) -> Self {
        Self { id, matcher }
    }

    pub fn name(&self) -> &'static str {
        self.id.name()
    }

    pub fn direction(&self) -> Direction {
        self.id.direction()
    }
}

/// An inbound message tagged with the port it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundMessage {
    pub port: PortId,
    pub event: MidiEvent,
}

impl InboundMessage {
    pub fn new(port: PortId, event: MidiEvent) -> Self {
        Self { port, event }
    }
}

/// Pre-sized outbound buffers, one per output port. Lives on the stack of
/// the audio callback.
#[derive(Debug, Clone, Default)]
pub struct OutboundBuffers {
    controller: ArrayVec<MidiEvent, OUTBOUND_CAPACITY>,
    synth: ArrayVec<MidiEvent, OUTBOUND_CAPACITY>,
    dropped: u32,
}

impl OutboundBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event for `port`. Returns false when the event was dropped
    /// (input port or full buffer).
    pub fn push(&mut self, port: PortId, event: MidiEvent) -> bool {
        let buffer = match port {
            PortId::ControllerOut => &mut self.controller,
            PortId::SynthOut => &mut self.synth,
            PortId::ControllerIn => {
                self.dropped += 1;
                return false;
            }
        };

        if buffer.try_push(event).is_err() {
            self.dropped += 1;
            return false;
        }
        true
    }

    pub fn events(&self, port: PortId) -> &[MidiEvent] {
        match port {
            PortId::ControllerOut => self.controller.as_slice(),
            PortId::SynthOut => self.synth.as_slice(),
            PortId::ControllerIn => &[],
        }
    }

    /// All buffered events, controller lights first.
    pub fn iter(&self) -> impl Iterator<Item = (PortId, MidiEvent)> + '_ {
        self.controller
            .iter()
            .map(|e| (PortId::ControllerOut, *e))
            .chain(self.synth.iter().map(|e| (PortId::SynthOut, *e)))
    }

    pub fn len(&self) -> usize {
        self.controller.len() + self.synth.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.controller.clear();
        self.synth.clear();
        self.dropped = 0;
    }
}
