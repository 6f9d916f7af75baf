//! Vidscale Export Pipeline
//!
//! Transcodes a video while upscaling every frame, carrying audio,
//! metadata, color, and stereo layers through unchanged.
//!
//! # Architecture
//!
//! ```text
//!                        ExportSession
//!        ┌──────────────────┼────────────────────┐
//!   AssetReader        FormatPolicy          AssetWriter
//!        │            (size, codec,               │
//!        │             container)                 │
//!        ▼                                        ▼
//!   TrackOutput ─► TrackWorker ─► FrameTransform ─► TrackInput
//!                     (one task per track)
//!                          │
//!                     ProgressNode ─► ProgressTree (polled by caller)
//! ```
//!
//! Workers run concurrently and are joined before the session inspects the
//! reader and writer status. Any failure or cancellation deletes the partial
//! output; only a clean run finalizes the container.

pub mod error;
pub mod metadata;
pub mod policy;
pub mod progress;
pub mod report;
pub mod session;
pub mod transform;
pub mod worker;

pub use error::TrackError;
pub use metadata::{read_creator_tag, write_creator_tag, CREATOR_ATTRIBUTE};
pub use policy::{CodecSelector, ExportSpec, FormatLimits};
pub use progress::{NodeSnapshot, ProgressNode, ProgressSnapshot, ProgressTree, ProgressWeights};
pub use report::{ExportReport, ReportStatus};
pub use session::{
    ExportOptions, ExportOutcome, ExportRequest, ExportSession, SessionDecision, TrackSummary,
};
pub use transform::{FrameTransform, Passthrough, SpatialUpscaleTransform, UpscaleTransform};
pub use worker::{TrackOutcome, TrackWorker};
