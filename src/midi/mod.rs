/// MIDI translation between the pad controller, the engine and the synthesizer
///
/// Everything here works on fixed 3-byte messages and never allocates, so it
/// is safe to call from the audio callback.
pub mod ports;
pub mod router;

pub const STATUS_NOTE_OFF: u8 = 0x80;
pub const STATUS_NOTE_ON: u8 = 0x90;
pub const STATUS_CONTROL_CHANGE: u8 = 0xB0;

/// Note sent to the synthesizer when a controller button is pressed.
pub const ROUTED_NOTE: u8 = 0x36;
/// Velocity of the step cursor light on the controller.
pub const LIGHT_VELOCITY: u8 = 63;
/// Controller buttons, in order, mapped to synthesizer channel offsets 0-5.
pub const BUTTON_CHANNELS: [u8; 6] = [0x68, 0x69, 0x6A, 0x6B, 0x6C, 0x6D];

// Copy and clear flags of the pad colour byte
const PAD_FLAGS: u8 = 8 + 4;
const MAX_BRIGHTNESS: u8 = 3;

/// One raw MIDI message plus where it lands in the current audio buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    bytes: [u8; 3],
    len: u8,
    frame_offset: u32,
}

impl MidiEvent {
    pub const fn new(status: u8, data1: u8, data2: u8, frame_offset: u32) -> Self {
        Self {
            bytes: [status, data1, data2],
            len: 3,
            frame_offset,
        }
    }

    /// Copy up to three bytes of an incoming message. Longer messages are
    /// cut short, they never decode to anything anyway.
    pub fn from_bytes(bytes: &[u8], frame_offset: u32) -> Self {
        let len = bytes.len().min(3);
        let mut buf = [0u8; 3];
        buf[..len].copy_from_slice(&bytes[..len]);
        Self {
            bytes: buf,
            len: len as u8,
            frame_offset,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn frame_offset(&self) -> u32 {
        self.frame_offset
    }
}

/// What an inbound message asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Flip a cell of the trigger grid
    ToggleCell { track: usize, step: usize },
    /// Forward a note to the synthesizer on a channel offset
    RouteNoteOn { channel: u8, note: u8, velocity: u8 },
}

fn is_data_byte(byte: u8) -> bool {
    byte < 0x80
}

/// Channel offset for a controller button, if it is one of the routed ones.
pub fn button_channel(controller: u8) -> Option<u8> {
    BUTTON_CHANNELS
        .iter()
        .position(|&button| button == controller)
        .map(|offset| offset as u8)
}

/// Decode an inbound 3-byte message. Anything short, malformed or
/// unrecognized yields `None`.
pub fn decode(bytes: &[u8]) -> Option<ControlEvent> {
    let [status, data1, data2] = match bytes {
        [status, data1, data2, ..] => [*status, *data1, *data2],
        _ => return None,
    };
    if !is_data_byte(data1) || !is_data_byte(data2) {
        return None;
    }

    match status & 0xF0 {
        STATUS_CONTROL_CHANGE => {
            let channel = button_channel(data1)?;
            Some(ControlEvent::RouteNoteOn {
                channel,
                note: ROUTED_NOTE,
                velocity: data2,
            })
        }
        STATUS_NOTE_OFF | STATUS_NOTE_ON if data2 > 0 => Some(ControlEvent::ToggleCell {
            track: (data1 / 16) as usize,
            step: (data1 % 16) as usize,
        }),
        _ => None,
    }
}

/// Controller note that lights up `step` (columns of 8 steps, top to bottom).
pub fn light_note(step: usize) -> u8 {
    let step = step % 64;
    ((step / 8) + 16 * (step % 8)) as u8
}

pub fn encode_light(step: usize, frame_offset: u32) -> MidiEvent {
    MidiEvent::new(STATUS_NOTE_ON, light_note(step), LIGHT_VELOCITY, frame_offset)
}

/// Pad colour for a cell velocity: green brightness 1-3, no red.
pub fn pad_colour(velocity: u8) -> (u8, u8) {
    let green = 1 + (2 * velocity.min(127) as u16 / 127) as u8;
    (green, 0)
}

/// Trigger for pad `(x, y)` in the synthesizer's pad addressing, with green
/// and red brightness in 0-3.
pub fn encode_trigger(x: u8, y: u8, green: u8, red: u8, frame_offset: u32) -> MidiEvent {
    let green = green.min(MAX_BRIGHTNESS);
    let red = red.min(MAX_BRIGHTNESS);
    MidiEvent::new(
        STATUS_NOTE_ON,
        ((x as u16 + 16 * y as u16) & 0x7F) as u8,
        16 * green + red + PAD_FLAGS,
        frame_offset,
    )
}

pub fn encode_route(channel: u8, note: u8, velocity: u8, frame_offset: u32) -> MidiEvent {
    MidiEvent::new(STATUS_NOTE_ON | (channel & 0x0F), note, velocity, frame_offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_pad_press() {
        assert_eq!(
            decode(&[0x90, 0x23, 0x7F]),
            Some(ControlEvent::ToggleCell { track: 2, step: 3 })
        );
        assert_eq!(
            decode(&[0x80, 0x77, 0x10]),
            Some(ControlEvent::ToggleCell { track: 7, step: 7 })
        );
    }

    #[test]
    fn test_decode_pad_release_ignored() {
        assert_eq!(decode(&[0x90, 0x23, 0x00]), None);
        assert_eq!(decode(&[0x80, 0x23, 0x00]), None);
    }

    #[test]
    fn test_decode_button_routes_to_channel() {
        let event = decode(&[0xB0, 0x6A, 0x64]);
        assert_eq!(
            event,
            Some(ControlEvent::RouteNoteOn {
                channel: 2,
                note: ROUTED_NOTE,
                velocity: 0x64
            })
        );

        if let Some(ControlEvent::RouteNoteOn {
            channel,
            note,
            velocity,
        }) = event
        {
            let out = encode_route(channel, note, velocity, 0);
            assert_eq!(out.bytes(), &[0x92, 0x36, 0x64]);
        }
    }

    #[test]
    fn test_button_table() {
        assert_eq!(button_channel(0x68), Some(0));
        assert_eq!(button_channel(0x6D), Some(5));
        assert_eq!(button_channel(0x6E), None);
        assert_eq!(decode(&[0xB0, 0x10, 0x64]), None);
    }

    #[test]
    fn test_decode_ignores_short_and_unknown_messages() {
        assert_eq!(decode(&[]), None);
        assert_eq!(decode(&[0x90, 0x23]), None);
        assert_eq!(decode(&[0xE0, 0x00, 0x40]), None);
        assert_eq!(decode(&[0xF8, 0x00, 0x00]), None);
        assert_eq!(decode(&[0x90, 0xFF, 0x40]), None);
    }

    #[test]
    fn test_light_encoding() {
        assert_eq!(encode_light(5, 0).bytes(), &[0x90, 80, 63]);
        assert_eq!(encode_light(0, 0).bytes(), &[0x90, 0, 63]);
        assert_eq!(encode_light(63, 0).bytes(), &[0x90, 7 + 16 * 7, 63]);
        assert_eq!(encode_light(9, 12).frame_offset(), 12);
    }

    #[test]
    fn test_trigger_encoding() {
        assert_eq!(encode_trigger(2, 1, 3, 0, 0).bytes(), &[0x90, 18, 60]);
        assert_eq!(encode_trigger(0, 0, 0, 3, 0).bytes(), &[0x90, 0, 15]);
        // brightness is capped at 3
        assert_eq!(encode_trigger(0, 0, 9, 9, 0).bytes(), &[0x90, 0, 63]);
    }

    #[test]
    fn test_pad_colour() {
        assert_eq!(pad_colour(1), (1, 0));
        assert_eq!(pad_colour(100), (2, 0));
        assert_eq!(pad_colour(127), (3, 0));
    }

    #[test]
    fn test_event_from_bytes() {
        let event = MidiEvent::from_bytes(&[0x90, 0x10], 4);
        assert_eq!(event.bytes(), &[0x90, 0x10]);
        assert_eq!(decode(event.bytes()), None);

        let event = MidiEvent::from_bytes(&[0xF0, 1, 2, 3, 0xF7], 0);
        assert_eq!(event.bytes().len(), 3);
    }
}
