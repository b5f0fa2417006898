use std::sync::{Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;

/// Observable engine status. Replaced as a whole on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineState {
    pub is_loading: bool,
    pub is_detecting: bool,
    pub is_model_loaded: bool,
    pub error: Option<String>,
    pub face_detected: bool,
    pub fps: u32,
}

/// Current `EngineState` plus subscribers notified of each new snapshot.
#[derive(Default)]
pub struct StateCell {
    state: Mutex<EngineState>,
    subscribers: Mutex<Vec<Sender<EngineState>>>,
}

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> EngineState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applies `f` to a copy of the state and publishes it if anything changed.
    pub fn update(&self, f: impl FnOnce(&mut EngineState)) {
        let next = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let mut next = state.clone();
            f(&mut next);
            if next == *state {
                return;
            }
            *state = next.clone();
            next
        };

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(next.clone()).is_ok());
    }

    /// Channel yielding the current snapshot immediately, then every change.
    pub fn subscribe(&self) -> Receiver<EngineState> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Sending under the subscriber lock keeps the first snapshot ordered
        // before any update published afterwards.
        if tx.send(self.get()).is_ok() {
            subscribers.push(tx);
        }
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_replaces_state() {
        let cell = StateCell::new();
        cell.update(|s| {
            s.is_loading = true;
            s.error = Some("boom".into());
        });

        let state = cell.get();
        assert!(state.is_loading);
        assert_eq!(state.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_subscriber_gets_snapshot_then_changes() {
        let cell = StateCell::new();
        let rx = cell.subscribe();

        cell.update(|s| s.fps = 30);
        cell.update(|s| s.fps = 30);
        cell.update(|s| s.face_detected = true);

        let received: Vec<EngineState> = rx.try_iter().collect();
        assert_eq!(received.len(), 3);
        assert_eq!(received[0], EngineState::default());
        assert_eq!(received[1].fps, 30);
        assert!(received[2].face_detected);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let cell = StateCell::new();
        drop(cell.subscribe());
        cell.update(|s| s.fps = 1);
        assert!(cell.subscribers.lock().unwrap().is_empty());
    }
}
