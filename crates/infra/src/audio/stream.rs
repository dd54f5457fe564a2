//! CPAL capture and playback streams
//!
//! Streams always run at the fixed routing format (48 kHz, stereo). The host
//! sample type is i16 when the device offers it, otherwise f32, converted at
//! the callback boundary. Audio crosses between the host callback threads
//! and the engine through bounded crossbeam channels; the callbacks never
//! block.

use crate::audio::cpal_backend::{find_host_device, SharedRegistry};
use autoaudio_core::domain::audio::{AudioError, AudioFormat, Device, Direction, Result};
use autoaudio_core::domain::events::EventSender;
use autoaudio_core::domain::stream::{CaptureStream, PlaybackStream, StreamBackend, StreamTag};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use crossbeam::channel::{bounded, Receiver, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Capture chunks buffered between the host callback and the engine
const CAPTURE_QUEUE_CHUNKS: usize = 64;

fn stream_config() -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: AudioFormat::FIXED.channels,
        sample_rate: AudioFormat::FIXED.sample_rate,
        buffer_size: cpal::BufferSize::Default,
    }
}

/// Pick the host sample type for the fixed format
///
/// Each candidate is `(channels, min_rate, max_rate, format)`. i16 wins over
/// f32; anything else is not supported.
pub fn choose_sample_format(
    candidates: impl IntoIterator<Item = (u16, u32, u32, SampleFormat)>,
) -> Option<SampleFormat> {
    let fixed = AudioFormat::FIXED;
    let mut best = None;
    for (channels, min, max, format) in candidates {
        if channels != fixed.channels || !(min..=max).contains(&fixed.sample_rate) {
            continue;
        }
        match format {
            SampleFormat::I16 => return Some(SampleFormat::I16),
            SampleFormat::F32 => best = Some(SampleFormat::F32),
            _ => {}
        }
    }
    best
}

fn sample_format_for(device: &cpal::Device, direction: Direction) -> Result<SampleFormat> {
    let candidates: Vec<(u16, u32, u32, SampleFormat)> = match direction {
        Direction::Input => device
            .supported_input_configs()
            .map_err(|e| AudioError::UnsupportedConfiguration(e.to_string()))?
            .map(|c| (c.channels(), c.min_sample_rate(), c.max_sample_rate(), c.sample_format()))
            .collect(),
        Direction::Output => device
            .supported_output_configs()
            .map_err(|e| AudioError::UnsupportedConfiguration(e.to_string()))?
            .map(|c| (c.channels(), c.min_sample_rate(), c.max_sample_rate(), c.sample_format()))
            .collect(),
    };

    choose_sample_format(candidates).ok_or_else(|| {
        AudioError::UnsupportedConfiguration(format!(
            "no {direction} config for {} Hz, {} channels, i16 or f32",
            AudioFormat::FIXED.sample_rate,
            AudioFormat::FIXED.channels
        ))
    })
}

/// Whether a host stream error means the stream stopped and must be rebuilt
///
/// ALSA reports a lost device as a backend-specific error, so those count
/// too. Underruns are glitches on a stream that keeps running.
pub fn ends_stream(err: &cpal::StreamError) -> bool {
    match err {
        cpal::StreamError::DeviceNotAvailable
        | cpal::StreamError::StreamInvalidated
        | cpal::StreamError::BackendSpecific { .. } => true,
        cpal::StreamError::BufferUnderrun => false,
    }
}

fn report_error(events: &EventSender, tag: StreamTag, err: cpal::StreamError) {
    if ends_stream(&err) {
        warn!(%tag, error = %err, "Stream left the active state");
        events.stream_fault(tag, err.to_string());
    } else {
        trace!(%tag, error = %err, "Stream glitch");
    }
}

/// Queue one captured chunk for the engine without blocking
///
/// A full queue means the engine is behind; the chunk is lost and counted.
fn push_chunk(chunks: &Sender<Vec<i16>>, chunk: Vec<i16>, dropped: &AtomicU64) -> bool {
    match chunks.try_send(chunk) {
        Ok(()) => true,
        Err(_) => {
            let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(dropped = total, "Capture queue full, chunk dropped");
            false
        }
    }
}

/// Convert one host buffer to routing samples
pub fn to_routing_samples<T>(data: &[T]) -> Vec<i16>
where
    T: Sample,
    i16: FromSample<T>,
{
    data.iter().map(|s| s.to_sample::<i16>()).collect()
}

/// Fill a host output buffer from queued blocks, padding with silence
///
/// Returns how many samples came from real audio.
pub fn fill_output<T>(data: &mut [T], leftover: &mut VecDeque<i16>, blocks: &Receiver<Vec<i16>>) -> usize
where
    T: Sample + FromSample<i16>,
{
    let mut filled = 0;
    while filled < data.len() {
        if leftover.is_empty() {
            match blocks.try_recv() {
                Ok(block) => leftover.extend(block),
                Err(_) => break,
            }
        }
        let take = (data.len() - filled).min(leftover.len());
        for (slot, sample) in data[filled..filled + take].iter_mut().zip(leftover.drain(..take)) {
            *slot = T::from_sample(sample);
        }
        filled += take;
    }
    data[filled..].fill(T::EQUILIBRIUM);
    filled
}

fn build_capture<T>(
    device: &cpal::Device,
    tag: StreamTag,
    events: EventSender,
    chunks: Sender<Vec<i16>>,
    signalled: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let err_events = events.clone();
    device
        .build_input_stream(
            &stream_config(),
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                push_chunk(&chunks, to_routing_samples(data), &dropped);
                if !signalled.swap(true, Ordering::AcqRel) {
                    events.input_ready(tag);
                }
            },
            move |err| report_error(&err_events, tag, err),
            None,
        )
        .map_err(|e| AudioError::StreamError(format!("Failed to build stream: {}", e)))
}

fn build_playback<T>(
    device: &cpal::Device,
    tag: StreamTag,
    events: EventSender,
    blocks: Receiver<Vec<i16>>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<i16>,
{
    let mut leftover = VecDeque::new();
    device
        .build_output_stream(
            &stream_config(),
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                fill_output(data, &mut leftover, &blocks);
            },
            move |err| report_error(&events, tag, err),
            None,
        )
        .map_err(|e| AudioError::StreamError(format!("Failed to build stream: {}", e)))
}

fn start(stream: &cpal::Stream) -> Result<()> {
    stream
        .play()
        .map_err(|e| AudioError::StreamError(format!("Failed to start stream: {}", e)))
}

/// Running capture stream on a host device
pub struct CpalCapture {
    stream: cpal::Stream,
    chunks: Receiver<Vec<i16>>,
    signalled: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    tag: StreamTag,
}

impl CpalCapture {
    /// Chunks lost because the engine fell behind
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl CaptureStream for CpalCapture {
    fn drain_into(&mut self, out: &mut Vec<i16>) {
        // Cleared before draining so a chunk arriving meanwhile signals again.
        self.signalled.store(false, Ordering::Release);
        for chunk in self.chunks.try_iter() {
            out.extend_from_slice(&chunk);
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        let dropped = self.dropped_chunks();
        if dropped > 0 {
            debug!(tag = %self.tag, dropped, "Input stream lost chunks");
        }
        if let Err(e) = self.stream.pause() {
            debug!(tag = %self.tag, error = %e, "Failed to pause input stream");
        }
    }
}

/// Running playback stream on a host device
pub struct CpalPlayback {
    stream: cpal::Stream,
    blocks: Sender<Vec<i16>>,
    tag: StreamTag,
}

impl PlaybackStream for CpalPlayback {
    fn try_write(&mut self, block: &[i16]) -> bool {
        self.blocks.try_send(block.to_vec()).is_ok()
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        if let Err(e) = self.stream.pause() {
            debug!(tag = %self.tag, error = %e, "Failed to pause output stream");
        }
    }
}

/// Opens cpal streams for devices listed by a [`CpalCatalog`](crate::audio::CpalCatalog)
#[derive(Debug, Clone)]
pub struct CpalBackend {
    registry: SharedRegistry,
    output_queue_blocks: usize,
}

impl CpalBackend {
    pub(crate) fn new(registry: SharedRegistry, output_queue_blocks: usize) -> Self {
        Self {
            registry,
            output_queue_blocks: output_queue_blocks.max(1),
        }
    }
}

impl StreamBackend for CpalBackend {
    type Capture = CpalCapture;
    type Playback = CpalPlayback;

    fn open_capture(
        &mut self,
        device: &Device,
        tag: StreamTag,
        events: EventSender,
    ) -> Result<CpalCapture> {
        let host_device = find_host_device(&self.registry, device.id)?;
        let format = sample_format_for(&host_device, Direction::Input)?;
        info!(device = %device.description, %tag, ?format, "Creating input stream");

        let (tx, rx) = bounded(CAPTURE_QUEUE_CHUNKS);
        let signalled = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicU64::new(0));
        let stream = match format {
            SampleFormat::I16 => build_capture::<i16>(
                &host_device,
                tag,
                events,
                tx,
                Arc::clone(&signalled),
                Arc::clone(&dropped),
            )?,
            _ => build_capture::<f32>(
                &host_device,
                tag,
                events,
                tx,
                Arc::clone(&signalled),
                Arc::clone(&dropped),
            )?,
        };
        start(&stream)?;

        Ok(CpalCapture {
            stream,
            chunks: rx,
            signalled,
            dropped,
            tag,
        })
    }

    fn open_playback(
        &mut self,
        device: &Device,
        tag: StreamTag,
        events: EventSender,
    ) -> Result<CpalPlayback> {
        let host_device = find_host_device(&self.registry, device.id)?;
        let format = sample_format_for(&host_device, Direction::Output)?;
        info!(device = %device.description, %tag, ?format, "Creating output stream");

        let (tx, rx) = bounded(self.output_queue_blocks);
        let stream = match format {
            SampleFormat::I16 => build_playback::<i16>(&host_device, tag, events, rx)?,
            _ => build_playback::<f32>(&host_device, tag, events, rx)?,
        };
        start(&stream)?;

        Ok(CpalPlayback {
            stream,
            blocks: tx,
            tag,
        })
    }
}
