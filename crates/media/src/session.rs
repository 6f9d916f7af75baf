//! Reader and writer contracts implemented by media toolkits.
//!
//! A reader demultiplexes and decodes an [`Asset`] into one [`TrackOutput`]
//! per attached track; a writer encodes and multiplexes one [`TrackInput`]
//! per track into a container file. Outputs and inputs are handed to
//! per-track workers, while the reader and writer objects stay with the
//! orchestrator, which inspects their [`SessionStatus`] after every worker
//! has joined.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::asset::{Asset, ContainerFormat, MetadataItem};
use crate::error::MediaResult;
use crate::sample::SampleBuffer;
use crate::settings::TrackOutputSettings;
use crate::time::MediaTime;
use crate::track::TrackDescriptor;

/// Lifecycle state of a reader or writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Unknown,
    Reading,
    Writing,
    Finished,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Finished | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Unknown => "unknown",
            SessionStatus::Reading => "reading",
            SessionStatus::Writing => "writing",
            SessionStatus::Finished => "finished",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Status shared between a reader or writer and its per-track handles.
///
/// Terminal states are sticky: once failed, cancelled, or finished, later
/// transitions are ignored so the first cause wins.
#[derive(Debug, Clone)]
pub struct SharedStatus {
    inner: Arc<Mutex<StatusState>>,
}

#[derive(Debug)]
struct StatusState {
    status: SessionStatus,
    error: Option<String>,
}

impl Default for SharedStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStatus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StatusState {
                status: SessionStatus::Unknown,
                error: None,
            })),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, StatusState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self) -> SessionStatus {
        self.state().status
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    /// Move to a new status unless already terminal. Returns whether the
    /// transition happened.
    pub fn transition(&self, status: SessionStatus) -> bool {
        let mut state = self.state();
        if state.status.is_terminal() {
            return false;
        }
        state.status = status;
        true
    }

    pub fn fail(&self, message: impl Into<String>) -> bool {
        let mut state = self.state();
        if state.status.is_terminal() {
            return false;
        }
        state.status = SessionStatus::Failed;
        state.error = Some(message.into());
        true
    }

    pub fn cancel(&self) -> bool {
        self.transition(SessionStatus::Cancelled)
    }

    pub fn is(&self, status: SessionStatus) -> bool {
        self.get() == status
    }
}

/// Decoded sample stream of one source track.
///
/// Video outputs deliver BGRA pixel buffers at the track's native size.
#[async_trait]
pub trait TrackOutput: Send {
    fn track_id(&self) -> u32;

    /// Next sample in decode order. `Ok(None)` means the stream is exhausted
    /// or reading was cancelled.
    async fn next_sample(&mut self) -> MediaResult<Option<SampleBuffer>>;
}

/// Encoder input for one output track.
#[async_trait]
pub trait TrackInput: Send {
    fn track_id(&self) -> u32;

    /// Wait until the input can accept another sample. Returns `false` when
    /// it never will again (the writer failed, finished, or was cancelled).
    async fn ready_for_more_data(&mut self) -> bool;

    /// Append a sample. `false` means the writer rejected it and stopped
    /// accepting data; its status explains why.
    fn append(&mut self, sample: SampleBuffer) -> bool;

    /// Signal that no more samples will be appended.
    fn mark_finished(&mut self);
}

pub trait AssetReader: Send + Sync {
    fn can_add_output(&self, track: &TrackDescriptor) -> bool;

    fn add_output(&mut self, track: &TrackDescriptor) -> MediaResult<Box<dyn TrackOutput>>;

    fn outputs_count(&self) -> usize;

    fn start_reading(&mut self) -> MediaResult<()>;

    fn status(&self) -> SessionStatus;

    fn error(&self) -> Option<String>;

    fn cancel_reading(&self);

    /// Abort reading because a downstream consumer of an output failed.
    fn abort_with_error(&self, message: String);
}

#[async_trait]
pub trait AssetWriter: Send + Sync {
    fn output_path(&self) -> &Path;

    fn container(&self) -> ContainerFormat;

    fn set_metadata(&mut self, items: Vec<MetadataItem>);

    fn can_add_input(&self, settings: &TrackOutputSettings) -> bool;

    fn add_input(
        &mut self,
        track_id: u32,
        settings: TrackOutputSettings,
    ) -> MediaResult<Box<dyn TrackInput>>;

    fn inputs_count(&self) -> usize;

    /// Create the output file and prepare encoders.
    fn start_writing(&mut self) -> MediaResult<()>;

    /// Map source time `at` to the start of the output timeline.
    fn start_session(&mut self, at: MediaTime);

    /// Flush encoders and close the container.
    async fn finish_writing(&mut self) -> MediaResult<()>;

    fn cancel_writing(&self);

    fn status(&self) -> SessionStatus;

    fn error(&self) -> Option<String>;
}

/// Options for opening a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    pub container: ContainerFormat,
    /// Samples each input may buffer before it stops reporting ready.
    pub queue_depth: usize,
}

/// A platform media stack able to probe, read, and write containers.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    fn name(&self) -> &'static str;

    /// Verify the toolkit's runtime prerequisites.
    fn check(&self) -> MediaResult<()>;

    async fn load_asset(&self, path: &Path) -> MediaResult<Asset>;

    fn open_reader(&self, asset: &Asset) -> MediaResult<Box<dyn AssetReader>>;

    fn open_writer(&self, path: &Path, options: WriterOptions) -> MediaResult<Box<dyn AssetWriter>>;
}
