/// Audio host using cpal
///
/// The output stream carries silence; its callback is the sample clock that
/// drives the engine once per buffer.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arrayvec::ArrayVec;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info};
use ringbuf::traits::{Consumer, Producer};

use crate::engine::{ProcessStatus, Scheduler};
use crate::error::DeviceError;
use crate::midi::ports::{InboundMessage, OutboundBuffers};
use crate::midi::router::{CallbackPorts, OutboundMessage};

/// Inbound messages taken from the ring per buffer; the rest wait for the
/// next buffer.
pub const MAX_INBOUND_PER_BUFFER: usize = 256;

/// One pass of the audio callback: drain inbound MIDI, run the scheduler,
/// queue its output. Events that do not fit in the outbound ring are
/// reported back to the scheduler. Allocation-free.
pub fn process_buffer<S: Scheduler>(
    scheduler: &mut S,
    nframes: u32,
    ports: &mut CallbackPorts,
) -> ProcessStatus {
    let mut inbound: ArrayVec<InboundMessage, MAX_INBOUND_PER_BUFFER> = ArrayVec::new();
    while !inbound.is_full() {
        match ports.inbound.try_pop() {
            Some(message) => inbound.push(message),
            None => break,
        }
    }

    let mut outbound = OutboundBuffers::new();
    let status = scheduler.on_audio_buffer(nframes, &inbound, &mut outbound);

    let mut dropped = 0;
    for (port, event) in outbound.iter() {
        // A full ring means the sender thread is stalled; drop rather than wait
        if ports.outbound.try_push(OutboundMessage { port, event }).is_err() {
            dropped += 1;
        }
    }
    if dropped > 0 {
        scheduler.on_outbound_dropped(dropped);
    }
    status
}

pub struct AudioHost {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    stream: Option<cpal::Stream>,
    faulted: Arc<AtomicBool>,
}

impl AudioHost {
    /// Open the default output device.
    pub fn new() -> Result<Self, DeviceError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(DeviceError::NoAudioDevice)?;
        let supported = device
            .default_output_config()
            .map_err(|e| DeviceError::AudioConfig(e.to_string()))?;

        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        info!(
            "Audio device: {} ({} Hz, {} channels)",
            device.name().unwrap_or_else(|_| "<unknown>".to_string()),
            config.sample_rate.0,
            config.channels
        );

        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
            faulted: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Hand the scheduler to the audio thread and start the stream.
    pub fn start<S>(&mut self, mut scheduler: S, mut ports: CallbackPorts) -> Result<(), DeviceError>
    where
        S: Scheduler + Send + 'static,
    {
        if self.sample_format != cpal::SampleFormat::F32 {
            return Err(DeviceError::AudioConfig(format!(
                "unsupported sample format {:?}",
                self.sample_format
            )));
        }

        scheduler
            .on_sample_rate_change(self.sample_rate())
            .map_err(|e| DeviceError::AudioConfig(e.to_string()))?;

        let channels = self.config.channels.max(1) as usize;
        let faulted = Arc::clone(&self.faulted);

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        *sample = 0.0;
                    }
                    // After a fault the engine is disconnected for good
                    if faulted.load(Ordering::Relaxed) {
                        return;
                    }

                    let nframes = (data.len() / channels) as u32;
                    if process_buffer(&mut scheduler, nframes, &mut ports).is_fault() {
                        faulted.store(true, Ordering::Relaxed);
                    }
                },
                |err| error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| DeviceError::Stream(e.to_string()))?;

        stream.play().map_err(|e| DeviceError::Stream(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    /// True once the engine has reported a real-time fault.
    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                error!("Failed to pause audio stream: {}", e);
            }
        }
    }
}
