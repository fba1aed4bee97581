//! Ready-state tracking and event delivery.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use canopy_core::TreeEnd;

use crate::EVENT_CHANNEL_SIZE;

/// Readiness of a tree build. States only move forward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, strum::Display,
)]
#[repr(u8)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ReadyState {
    /// Root not validated yet.
    Uninitialized = 0b0,
    /// Traversal in progress.
    Busy = 0b1,
    /// Traversal complete, results readable.
    End = 0b10,
}

/// Notification delivered to listeners.
#[derive(Debug, Clone)]
pub enum TreeEvent {
    /// The build moved to a new state.
    ReadyStateChange(ReadyState),
    /// The build finished. Fired exactly once.
    End(Arc<TreeEnd>),
}

/// Event history plus live fan-out for one build.
///
/// Every event is appended to the history and broadcast under the same lock,
/// so a listener subscribing at any time sees each event exactly once.
#[derive(Debug)]
pub(crate) struct EventLog {
    inner: Mutex<LogInner>,
    result: OnceLock<Arc<TreeEnd>>,
}

#[derive(Debug)]
struct LogInner {
    state: ReadyState,
    history: Vec<TreeEvent>,
    sender: Option<broadcast::Sender<TreeEvent>>,
}

impl EventLog {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            inner: Mutex::new(LogInner {
                state: ReadyState::Uninitialized,
                history: vec![TreeEvent::ReadyStateChange(ReadyState::Uninitialized)],
                sender: Some(sender),
            }),
            result: OnceLock::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> ReadyState {
        self.lock().state
    }

    pub(crate) fn result(&self) -> Option<&Arc<TreeEnd>> {
        self.result.get()
    }

    /// Move to `next`. Returns false when `next` is not ahead of the current state.
    pub(crate) fn transition(&self, next: ReadyState) -> bool {
        let mut inner = self.lock();
        if next <= inner.state || inner.state == ReadyState::End {
            return false;
        }
        inner.state = next;
        inner.emit(TreeEvent::ReadyStateChange(next));
        true
    }

    /// Publish the result, move to END and fire the terminal event.
    pub(crate) fn finish(&self, end: Arc<TreeEnd>) {
        let mut inner = self.lock();
        if inner.state == ReadyState::End {
            return;
        }
        inner.state = ReadyState::End;
        let _ = self.result.set(Arc::clone(&end));
        inner.emit(TreeEvent::ReadyStateChange(ReadyState::End));
        inner.emit(TreeEvent::End(end));
        inner.sender = None;
    }

    /// End every listener stream without a terminal event.
    pub(crate) fn close(&self) {
        self.lock().sender = None;
    }

    pub(crate) fn subscribe(&self) -> TreeListener {
        let inner = self.lock();
        TreeListener {
            backlog: inner.history.iter().cloned().collect(),
            live: inner.sender.as_ref().map(broadcast::Sender::subscribe),
        }
    }
}

impl LogInner {
    fn emit(&mut self, event: TreeEvent) {
        self.history.push(event.clone());
        if let Some(sender) = &self.sender {
            // No receivers is fine; the history still has the event.
            let _ = sender.send(event);
        }
    }
}

/// Stream of build events for one listener.
///
/// Replays everything fired before the listener subscribed, then delivers
/// live events. Ends after the terminal event or when the build fails.
#[derive(Debug)]
pub struct TreeListener {
    backlog: VecDeque<TreeEvent>,
    live: Option<broadcast::Receiver<TreeEvent>>,
}

impl TreeListener {
    /// Receive the next event, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<TreeEvent> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        let live = self.live.as_mut()?;
        loop {
            match live.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => {
                    self.live = None;
                    return None;
                }
            }
        }
    }

    /// Skip ahead to the terminal event.
    ///
    /// Returns `None` if the build failed.
    pub async fn wait_for_end(&mut self) -> Option<Arc<TreeEnd>> {
        while let Some(event) = self.recv().await {
            if let TreeEvent::End(end) = event {
                return Some(end);
            }
        }
        None
    }
}
