//! Stream ownership and the audio pump
//!
//! [`StreamManager`] owns at most one capture and one playback stream. Every
//! stream it opens gets a fresh [`StreamTag`]; notifications carrying a tag
//! the manager no longer owns are ignored, so a stream being torn down can
//! never trigger a rebuild of its replacement.

use crate::domain::audio::{AudioFormat, Device, Direction, Result};
use crate::domain::events::EventSender;
use crate::domain::gain::GainProcessor;
use std::fmt;
use tracing::{debug, info, trace};

/// Default pump block: 4096 bytes of the fixed format
pub const DEFAULT_BLOCK_FRAMES: usize = 1024;

/// Identifies one opened stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamTag {
    pub direction: Direction,
    pub generation: u64,
}

impl StreamTag {
    pub fn new(direction: Direction, generation: u64) -> Self {
        Self {
            direction,
            generation,
        }
    }
}

impl fmt::Display for StreamTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.direction, self.generation)
    }
}

/// A running capture stream
///
/// The stream signals [`EngineEvent::InputReady`](crate::domain::events::EngineEvent)
/// with its tag whenever new samples are available.
pub trait CaptureStream {
    /// Move every sample captured since the last call into `out`
    fn drain_into(&mut self, out: &mut Vec<i16>);
}

/// A running playback stream
pub trait PlaybackStream {
    /// Queue one block for playback without blocking.
    ///
    /// Returns `false` when the stream's queue is full and the block was not
    /// accepted.
    fn try_write(&mut self, block: &[i16]) -> bool;
}

/// Opens streams on the host audio subsystem
///
/// Streams are stopped and released when dropped. Implementations report
/// faults and input readiness through `events`, tagged with `tag`.
pub trait StreamBackend {
    type Capture: CaptureStream;
    type Playback: PlaybackStream;

    fn open_capture(
        &mut self,
        device: &Device,
        tag: StreamTag,
        events: EventSender,
    ) -> Result<Self::Capture>;

    fn open_playback(
        &mut self,
        device: &Device,
        tag: StreamTag,
        events: EventSender,
    ) -> Result<Self::Playback>;
}

struct Live<S> {
    stream: S,
    device: Device,
    tag: StreamTag,
}

/// Counters for the pump
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Blocks accepted by the playback stream
    pub written: u64,
    /// Blocks refused because the playback queue was full
    pub dropped: u64,
    /// Blocks read while no playback stream was open
    pub discarded: u64,
}

/// Owner of the live streams and of the gain state
pub struct StreamManager<B: StreamBackend> {
    backend: B,
    events: EventSender,
    input: Option<Live<B::Capture>>,
    output: Option<Live<B::Playback>>,
    next_generation: u64,
    block_samples: usize,
    pending: Vec<i16>,
    block: Vec<i16>,
    gain: GainProcessor,
    stats: PumpStats,
}

impl<B: StreamBackend> StreamManager<B> {
    /// Create a manager pumping blocks of `block_frames` frames
    pub fn new(backend: B, events: EventSender, block_frames: usize) -> Self {
        let block_samples = AudioFormat::FIXED.samples_for_frames(block_frames.max(1));
        Self {
            backend,
            events,
            input: None,
            output: None,
            next_generation: 0,
            block_samples,
            pending: Vec::with_capacity(block_samples * 2),
            block: Vec::with_capacity(block_samples),
            gain: GainProcessor::new(),
            stats: PumpStats::default(),
        }
    }

    fn next_tag(&mut self, direction: Direction) -> StreamTag {
        self.next_generation += 1;
        StreamTag::new(direction, self.next_generation)
    }

    /// Replace the capture stream with one on `device`
    ///
    /// The old stream is released first. On error no capture stream is open.
    pub fn open_input(&mut self, device: &Device) -> Result<()> {
        self.close_input();
        let tag = self.next_tag(Direction::Input);
        let stream = self
            .backend
            .open_capture(device, tag, self.events.clone())?;

        info!(device = %device.description, id = %device.id, %tag, "Input stream opened");
        self.input = Some(Live {
            stream,
            device: device.clone(),
            tag,
        });
        Ok(())
    }

    /// Replace the playback stream with one on `device`
    ///
    /// The old stream is released before the new one is opened, so two
    /// playback streams never run at once. On error no playback stream is
    /// open.
    pub fn open_output(&mut self, device: &Device) -> Result<()> {
        self.close_output();
        let tag = self.next_tag(Direction::Output);
        let stream = self
            .backend
            .open_playback(device, tag, self.events.clone())?;

        info!(device = %device.description, id = %device.id, %tag, "Output stream opened");
        self.output = Some(Live {
            stream,
            device: device.clone(),
            tag,
        });
        Ok(())
    }

    pub fn close_input(&mut self) {
        // Taking the stream out first retires its tag before it is stopped.
        if let Some(old) = self.input.take() {
            debug!(device = %old.device.description, tag = %old.tag, "Closing input stream");
            drop(old);
        }
        self.pending.clear();
    }

    pub fn close_output(&mut self) {
        if let Some(old) = self.output.take() {
            debug!(device = %old.device.description, tag = %old.tag, "Closing output stream");
            drop(old);
        }
    }

    /// Close input, then output
    pub fn shutdown(&mut self) {
        self.close_input();
        self.close_output();
    }

    /// Whether `tag` names a stream this manager still owns
    pub fn is_current(&self, tag: StreamTag) -> bool {
        let live = match tag.direction {
            Direction::Input => self.input.as_ref().map(|l| l.tag),
            Direction::Output => self.output.as_ref().map(|l| l.tag),
        };
        live == Some(tag)
    }

    pub fn input_device(&self) -> Option<&Device> {
        self.input.as_ref().map(|l| &l.device)
    }

    pub fn output_device(&self) -> Option<&Device> {
        self.output.as_ref().map(|l| &l.device)
    }

    pub fn input_tag(&self) -> Option<StreamTag> {
        self.input.as_ref().map(|l| l.tag)
    }

    pub fn output_tag(&self) -> Option<StreamTag> {
        self.output.as_ref().map(|l| l.tag)
    }

    /// Move every complete block from the capture stream to the playback
    /// stream, boosting it first when `boost` is set.
    ///
    /// Returns the number of blocks read. Notifications from retired
    /// streams are ignored.
    pub fn pump(&mut self, tag: StreamTag, boost: bool) -> usize {
        if !self.is_current(tag) {
            trace!(%tag, "Ignoring readiness from retired stream");
            return 0;
        }
        let Some(input) = self.input.as_mut() else {
            return 0;
        };
        input.stream.drain_into(&mut self.pending);

        let mut blocks = 0;
        while self.pending.len() >= self.block_samples {
            self.block.clear();
            self.block.extend(self.pending.drain(..self.block_samples));
            blocks += 1;

            if boost {
                self.gain.process(&mut self.block);
            }

            match self.output.as_mut() {
                Some(output) => {
                    if output.stream.try_write(&self.block) {
                        self.stats.written += 1;
                    } else {
                        self.stats.dropped += 1;
                        trace!(dropped = self.stats.dropped, "Output queue full, block dropped");
                    }
                }
                None => self.stats.discarded += 1,
            }
        }
        blocks
    }

    pub fn gain(&self) -> &GainProcessor {
        &self.gain
    }

    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    pub fn block_samples(&self) -> usize {
        self.block_samples
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
