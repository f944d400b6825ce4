//! Hands background resolution results back to the owning thread.
//!
//! Each dispatched task gets its own typed single-shot channel. The owning
//! thread drains finished tasks with [`ResultChannel::collect_completed`]
//! (non-blocking) or [`ResultChannel::wait_all`] (blocking); a task whose
//! worker died is still delivered, as a null image.

use std::sync::Arc;
use std::thread;

use log::warn;
use tokio::sync::oneshot::{self, error::TryRecvError};

use crate::protocol::{CoverSize, ResolvedImage, TrackId};

/// Which resolver produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMode {
    /// Cover location was unknown and had to be discovered.
    Search,
    /// Cover location was already known.
    Load,
}

/// A finished task, ready for the owning thread.
#[derive(Debug)]
pub struct CompletedResolution {
    pub mode: ResolutionMode,
    pub result: ResolvedImage,
}

/// Invoked on the worker thread right after a result is sent.
pub type CompletionWaker = Arc<dyn Fn() + Send + Sync>;

/// What the owning thread remembers about a dispatched task.
#[derive(Debug, Clone, Copy)]
struct ResolutionTicket {
    track_id: TrackId,
    mode: ResolutionMode,
    target_size: Option<CoverSize>,
    repaint_only: bool,
}

impl ResolutionTicket {
    fn complete(self, result: Option<ResolvedImage>) -> CompletedResolution {
        let result = result.unwrap_or_else(|| {
            warn!(
                "CoverArtCache: resolver for track {} exited without a result",
                self.track_id
            );
            ResolvedImage::not_found(self.track_id, "", self.target_size, self.repaint_only)
        });
        CompletedResolution {
            mode: self.mode,
            result,
        }
    }
}

struct InFlightResolution {
    ticket: ResolutionTicket,
    receiver: oneshot::Receiver<ResolvedImage>,
}

#[derive(Default)]
pub struct ResultChannel {
    in_flight: Vec<InFlightResolution>,
    waker: Option<CompletionWaker>,
}

impl ResultChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_completion_waker(&mut self, waker: Option<CompletionWaker>) {
        self.waker = waker;
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Runs `job` on a new worker thread.
    ///
    /// The job must own everything it touches; it never sees the owning
    /// thread's state.
    pub fn dispatch<F>(
        &mut self,
        track_id: TrackId,
        mode: ResolutionMode,
        target_size: Option<CoverSize>,
        repaint_only: bool,
        job: F,
    ) -> std::io::Result<()>
    where
        F: FnOnce() -> ResolvedImage + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let waker = self.waker.clone();
        thread::Builder::new()
            .name(format!("cover-art-{track_id}"))
            .spawn(move || {
                let _ = sender.send(job());
                if let Some(waker) = waker {
                    waker();
                }
            })?;

        self.in_flight.push(InFlightResolution {
            ticket: ResolutionTicket {
                track_id,
                mode,
                target_size,
                repaint_only,
            },
            receiver,
        });
        Ok(())
    }

    /// Returns every task that has finished since the last call.
    pub fn collect_completed(&mut self) -> Vec<CompletedResolution> {
        let mut completed = Vec::new();
        let mut still_running = Vec::with_capacity(self.in_flight.len());
        for mut task in self.in_flight.drain(..) {
            match task.receiver.try_recv() {
                Ok(result) => completed.push(task.ticket.complete(Some(result))),
                Err(TryRecvError::Closed) => completed.push(task.ticket.complete(None)),
                Err(TryRecvError::Empty) => still_running.push(task),
            }
        }
        self.in_flight = still_running;
        completed
    }

    /// Blocks until every dispatched task has finished.
    pub fn wait_all(&mut self) -> Vec<CompletedResolution> {
        self.in_flight
            .drain(..)
            .map(|task| task.ticket.complete(task.receiver.blocking_recv().ok()))
            .collect()
    }
}
