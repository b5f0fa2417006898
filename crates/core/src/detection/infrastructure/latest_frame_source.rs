use std::sync::{Mutex, PoisonError};

use crate::detection::domain::frame_source::FrameSource;
use crate::shared::frame::{Frame, FrameSize};

/// Single-slot frame source fed by the host.
///
/// The host pushes each decoded camera frame; the loop snapshots whichever
/// frame is newest. Older frames are overwritten, never queued.
pub struct LatestFrameSource {
    slot: Mutex<Slot>,
}

struct Slot {
    frame: Option<Frame>,
    size: FrameSize,
}

impl LatestFrameSource {
    /// Empty source reporting `size` until the first frame arrives.
    pub fn new(size: FrameSize) -> Self {
        Self {
            slot: Mutex::new(Slot { frame: None, size }),
        }
    }

    /// Replace the current frame. Dimensions follow the pushed frame.
    pub fn push(&self, frame: Frame) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.size = frame.size();
        slot.frame = Some(frame);
    }

    /// Drop the current frame; the source reports not-ready until the next push.
    pub fn reset(&self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frame = None;
    }
}

impl FrameSource for LatestFrameSource {
    fn dimensions(&self) -> FrameSize {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).size
    }

    fn is_ready(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frame
            .is_some()
    }

    fn snapshot(&self) -> Option<Frame> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frame
            .clone()
    }
}
