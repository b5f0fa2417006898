use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

/// Source of per-frame callbacks for the engine loop.
pub trait FrameScheduler: Send {
    /// Blocks until the next frame callback fires.
    ///
    /// Returns `false` as soon as `stop` receives a message or disconnects,
    /// which cancels the pending callback.
    fn next_frame(&mut self, stop: &Receiver<()>) -> bool;

    /// Drops callbacks fired while the loop was not running.
    fn reset(&mut self) {}
}

/// Paces the loop at a fixed rate.
pub struct IntervalScheduler {
    period: Duration,
    ticker: Receiver<Instant>,
}

impl IntervalScheduler {
    pub fn new(target_fps: u32) -> Self {
        let period = Duration::from_nanos(1_000_000_000 / target_fps.max(1) as u64);
        Self {
            period,
            ticker: crossbeam_channel::tick(period),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl FrameScheduler for IntervalScheduler {
    fn next_frame(&mut self, stop: &Receiver<()>) -> bool {
        crossbeam_channel::select! {
            recv(self.ticker) -> _ => true,
            recv(stop) -> _ => false,
        }
    }

    fn reset(&mut self) {
        self.ticker = crossbeam_channel::tick(self.period);
    }
}

/// Loop driven by the host's own frame clock (e.g. display vsync).
pub struct HostScheduler {
    pending: Receiver<()>,
}

/// Host-side handle requesting the next loop iteration.
#[derive(Clone)]
pub struct FrameTrigger {
    pending: Sender<()>,
}

impl FrameTrigger {
    /// Requests a frame. Requests made while one is already pending coalesce.
    ///
    /// Returns `false` if the request was merged into the pending one.
    pub fn fire(&self) -> bool {
        self.pending.try_send(()).is_ok()
    }
}

/// Creates a scheduler and the trigger that drives it.
pub fn host_scheduler() -> (HostScheduler, FrameTrigger) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (HostScheduler { pending: rx }, FrameTrigger { pending: tx })
}

impl FrameScheduler for HostScheduler {
    fn next_frame(&mut self, stop: &Receiver<()>) -> bool {
        crossbeam_channel::select! {
            recv(self.pending) -> msg => {
                if msg.is_err() {
                    log::debug!("Frame trigger dropped, ending loop");
                }
                msg.is_ok()
            }
            recv(stop) -> _ => false,
        }
    }

    fn reset(&mut self) {
        while self.pending.try_recv().is_ok() {}
    }
}
