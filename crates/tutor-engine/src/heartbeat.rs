//! Keep-alive wrapper around a slow event source.
//!
//! The source runs in its own task and forwards every item over a channel.
//! The consumer waits on that channel with a fixed timeout and gets
//! [`Beat::Idle`] whenever the window passes with nothing to show.

use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, warn};

/// One observation from a [`HeartbeatStream`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Beat<T> {
    Event(T),
    Idle,
}

pub struct HeartbeatStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
    task: Option<AbortOnDropHandle<()>>,
    cancel: CancellationToken,
    interval: Duration,
    finished: bool,
}

impl<T: Send + 'static> HeartbeatStream<T> {
    /// Start draining `source` in the background.
    ///
    /// The task stops when the source ends, when `cancel` (or the wrapper's
    /// own child token) fires, or when the wrapper is dropped.
    pub fn spawn<S>(source: S, interval: Duration, cancel: &CancellationToken) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = cancel.child_token();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut source = pin!(source);
            loop {
                let next = tokio::select! {
                    biased;
                    () = task_token.cancelled() => break,
                    next = source.next() => next,
                };
                let Some(event) = next else { break };
                if tx.send(event).is_err() {
                    break;
                }
            }
            // Dropping `tx` here is the end-of-stream signal.
        });

        Self {
            rx,
            task: Some(AbortOnDropHandle::new(handle)),
            cancel: token,
            interval,
            finished: false,
        }
    }

    /// Wrap a single future whose output is the only event.
    pub fn once<F>(future: F, interval: Duration, cancel: &CancellationToken) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self::spawn(futures::stream::once(future), interval, cancel)
    }

    /// Next event, or `Idle` after `interval` of silence. `None` once the source is exhausted.
    pub async fn next(&mut self) -> Option<Beat<T>> {
        if self.finished {
            return None;
        }
        match tokio::time::timeout(self.interval, self.rx.recv()).await {
            Ok(Some(event)) => Some(Beat::Event(event)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(_) => {
                if self.task.as_ref().is_some_and(|t| t.is_finished()) {
                    // The task is gone; whatever it left behind is all there is.
                    return match self.rx.try_recv() {
                        Ok(event) => Some(Beat::Event(event)),
                        Err(TryRecvError::Empty | TryRecvError::Disconnected) => {
                            self.finished = true;
                            None
                        }
                    };
                }
                debug!(interval_ms = self.interval.as_millis() as u64, "source idle");
                Some(Beat::Idle)
            }
        }
    }

    /// Stop the background task and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!("heartbeat source panicked");
                }
            }
        }
    }
}

impl<T> Drop for HeartbeatStream<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
