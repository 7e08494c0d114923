pub mod composite;
pub mod pattern;
pub mod pipeline;
pub mod recorder;
pub mod track;

#[cfg(test)]
pub(crate) mod testing;

pub use composite::{composite, PipLayout, Rect};
pub use pattern::PatternTrack;
pub use pipeline::{AcquisitionError, CompositeError, MediaCapturePipeline, MediaHandles};
pub use recorder::{ChunkRecorder, Recorder, RecorderError, RecorderState, RecordingBlob};
pub use track::{
    CanvasTrack, MediaStream, MediaTrack, TrackKind, TrackLifecycle, TrackRef, VideoFrame,
};
