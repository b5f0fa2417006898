use crate::shared::frame::{Frame, FrameSize};

/// Passive view of a live video stream.
///
/// The engine polls this every loop iteration; it never drives acquisition.
/// Shared between the host thread (which feeds it) and the loop worker.
pub trait FrameSource: Send + Sync {
    /// Current pixel dimensions of the stream.
    fn dimensions(&self) -> FrameSize;

    /// True once a decoded frame is available for processing.
    fn is_ready(&self) -> bool;

    /// Copy of the latest decoded frame, if any.
    fn snapshot(&self) -> Option<Frame>;
}
