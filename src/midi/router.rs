/// MIDI port routing using midir
///
/// Binds the logical ports to physical devices once at startup and moves
/// events between the MIDI threads and the audio callback through lock-free
/// ring buffers. Nothing here runs on the audio thread.
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, trace, warn};
use midir::{
    Ignore, MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection,
    MidiOutputPort,
};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::ports::{DeviceMatch, InboundMessage, LogicalPort, PortId};
use super::MidiEvent;
use crate::config::Config;
use crate::error::{DeviceError, RoutingWarning};

pub const INBOUND_RING_CAPACITY: usize = 1024;
pub const OUTBOUND_RING_CAPACITY: usize = 4096;

const SEND_INTERVAL: Duration = Duration::from_millis(1);

/// An encoded event on its way to an output port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundMessage {
    pub port: PortId,
    pub event: MidiEvent,
}

/// The ring buffer ends owned by the audio callback.
pub struct CallbackPorts {
    pub inbound: HeapCons<InboundMessage>,
    pub outbound: HeapProd<OutboundMessage>,
}

/// Somewhere encoded bytes can be written.
pub trait MidiSink {
    fn send(&mut self, bytes: &[u8]) -> Result<(), String>;
}

impl MidiSink for MidiOutputConnection {
    fn send(&mut self, bytes: &[u8]) -> Result<(), String> {
        MidiOutputConnection::send(self, bytes).map_err(|e| e.to_string())
    }
}

/// Write every queued event to the sink bound to its port. Events for
/// unbound ports are dropped. Returns the number of events consumed.
pub fn drain_outbound<C, S>(consumer: &mut C, sinks: &mut [(PortId, S)]) -> usize
where
    C: Consumer<Item = OutboundMessage>,
    S: MidiSink,
{
    let mut count = 0;
    while let Some(message) = consumer.try_pop() {
        count += 1;
        let Some((_, sink)) = sinks.iter_mut().find(|(port, _)| *port == message.port) else {
            continue;
        };
        if let Err(e) = sink.send(message.event.bytes()) {
            warn!("Failed to send to {}: {}", message.port.name(), e);
        }
    }
    count
}

/// Copy an inbound message into the ring, counting it in `dropped` when the
/// ring is full.
pub fn enqueue_inbound<P>(producer: &mut P, dropped: &AtomicU32, port: PortId, bytes: &[u8]) -> bool
where
    P: Producer<Item = InboundMessage>,
{
    let event = MidiEvent::from_bytes(bytes, 0);
    if producer.try_push(InboundMessage::new(port, event)).is_err() {
        dropped.fetch_add(1, Ordering::Relaxed);
        debug!("Inbound ring full, dropping {:02X?}", bytes);
        return false;
    }
    true
}

fn find_input(midi_in: &MidiInput, matcher: &DeviceMatch) -> Option<(MidiInputPort, String)> {
    midi_in.ports().into_iter().find_map(|port| {
        let name = midi_in.port_name(&port).ok()?;
        matcher.matches(&name).then_some((port, name))
    })
}

fn find_output(midi_out: &MidiOutput, matcher: &DeviceMatch) -> Option<(MidiOutputPort, String)> {
    midi_out.ports().into_iter().find_map(|port| {
        let name = midi_out.port_name(&port).ok()?;
        matcher.matches(&name).then_some((port, name))
    })
}

pub struct PortRouter {
    input: Option<MidiInputConnection<()>>,
    sender: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    inbound_dropped: Arc<AtomicU32>,
    bindings: Vec<(PortId, String)>,
    warnings: Vec<RoutingWarning>,
}

impl PortRouter {
    /// Input and output device names currently visible to the MIDI host.
    pub fn available_ports(client_name: &str) -> (Vec<String>, Vec<String>) {
        let inputs = MidiInput::new(client_name)
            .map(|midi_in| {
                midi_in
                    .ports()
                    .iter()
                    .filter_map(|p| midi_in.port_name(p).ok())
                    .collect()
            })
            .unwrap_or_default();
        let outputs = MidiOutput::new(client_name)
            .map(|midi_out| {
                midi_out
                    .ports()
                    .iter()
                    .filter_map(|p| midi_out.port_name(p).ok())
                    .collect()
            })
            .unwrap_or_default();
        (inputs, outputs)
    }

    /// Bind every logical port and start the sender thread.
    ///
    /// A port with no matching device is logged and left unconnected; only a
    /// failing MIDI client or a failing connection is fatal.
    pub fn connect(config: &Config) -> Result<(Self, CallbackPorts), DeviceError> {
        let (inbound_prod, inbound_cons) =
            HeapRb::<InboundMessage>::new(INBOUND_RING_CAPACITY).split();
        let (outbound_prod, mut outbound_cons) =
            HeapRb::<OutboundMessage>::new(OUTBOUND_RING_CAPACITY).split();

        let mut router = Self {
            input: None,
            sender: None,
            running: Arc::new(AtomicBool::new(true)),
            inbound_dropped: Arc::new(AtomicU32::new(0)),
            bindings: Vec::new(),
            warnings: Vec::new(),
        };
        let [controller_in, controller_out, synth_out] = config.logical_ports();
        router.connect_input(&config.client_name, &controller_in, inbound_prod)?;

        let mut outputs: Vec<(PortId, MidiOutputConnection)> = Vec::new();
        for port in [controller_out, synth_out] {
            if let Some(conn) = router.connect_output(&config.client_name, &port)? {
                outputs.push((port.id, conn));
            }
        }

        let running = Arc::clone(&router.running);
        router.sender = Some(thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                drain_outbound(&mut outbound_cons, &mut outputs);
                thread::sleep(SEND_INTERVAL);
            }
            for (port, conn) in outputs {
                debug!("Closing {}", port.name());
                conn.close();
            }
        }));

        Ok((
            router,
            CallbackPorts {
                inbound: inbound_cons,
                outbound: outbound_prod,
            },
        ))
    }

    fn connect_input(
        &mut self,
        client_name: &str,
        port: &LogicalPort,
        mut producer: HeapProd<InboundMessage>,
    ) -> Result<(), DeviceError> {
        let mut midi_in = MidiInput::new(&format!("{} input", client_name))
            .map_err(|e| DeviceError::ClientInit(e.to_string()))?;
        midi_in.ignore(Ignore::Sysex | Ignore::Time);

        let Some((device, name)) = find_input(&midi_in, &port.matcher) else {
            self.warn_unmatched(port);
            return Ok(());
        };

        let id = port.id;
        let dropped = Arc::clone(&self.inbound_dropped);
        let connection = midi_in
            .connect(
                &device,
                &format!("{}-{}", client_name, port.name()),
                move |_stamp, message, _| {
                    trace!("midi event {:02X?}", message);
                    enqueue_inbound(&mut producer, &dropped, id, message);
                },
                (),
            )
            .map_err(|e| DeviceError::PortConnect(format!("{}: {}", name, e)))?;

        info!("Connected {} to '{}'", port.name(), name);
        self.input = Some(connection);
        self.bindings.push((port.id, name));
        Ok(())
    }

    fn connect_output(
        &mut self,
        client_name: &str,
        port: &LogicalPort,
    ) -> Result<Option<MidiOutputConnection>, DeviceError> {
        let midi_out = MidiOutput::new(&format!("{} output", client_name))
            .map_err(|e| DeviceError::ClientInit(e.to_string()))?;

        let Some((device, name)) = find_output(&midi_out, &port.matcher) else {
            self.warn_unmatched(port);
            return Ok(None);
        };

        let connection = midi_out
            .connect(&device, &format!("{}-{}", client_name, port.name()))
            .map_err(|e| DeviceError::PortConnect(format!("{}: {}", name, e)))?;

        info!("Connected {} to '{}'", port.name(), name);
        self.bindings.push((port.id, name));
        Ok(Some(connection))
    }

    fn warn_unmatched(&mut self, port: &LogicalPort) {
        let warning = RoutingWarning {
            port: port.id,
            pattern: port.matcher.pattern().to_string(),
        };
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Device bound to `port`, if any.
    pub fn bound_device(&self, port: PortId) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(id, _)| *id == port)
            .map(|(_, name)| name.as_str())
    }

    /// Inbound messages lost because the audio callback fell behind.
    pub fn inbound_dropped(&self) -> u32 {
        self.inbound_dropped.load(Ordering::Relaxed)
    }

    pub fn warnings(&self) -> &[RoutingWarning] {
        &self.warnings
    }

    /// Stop the sender thread and close every connection.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.sender.take() {
            if handle.join().is_err() {
                warn!("MIDI sender thread panicked");
            }
        }
        if let Some(input) = self.input.take() {
            input.close();
        }
    }
}

impl Drop for PortRouter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
