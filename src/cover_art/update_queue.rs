//! Write-coalescing queue for newly discovered cover associations.
//!
//! SQLite handles one large transaction far better than hundreds of tiny
//! ones, so discoveries are collected here and written in batches.

use std::collections::HashMap;

use log::{info, warn};

use crate::cover_art::cover_store::{CoverArtStore, TrackStore};
use crate::protocol::{CoverLocation, TrackId};

/// A discovered cover awaiting persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCoverUpdate {
    /// `None` records that a search ran and found nothing.
    pub cover_location: Option<CoverLocation>,
    pub hash: String,
}

pub struct UpdateQueue {
    pending: HashMap<TrackId, PendingCoverUpdate>,
    batch_size: usize,
}

impl UpdateQueue {
    pub fn new(batch_size: usize) -> Self {
        Self {
            pending: HashMap::new(),
            batch_size: batch_size.max(1),
        }
    }

    /// Queues a discovery, replacing any older one for the same track.
    pub fn enqueue(
        &mut self,
        track_id: TrackId,
        cover_location: Option<CoverLocation>,
        hash: String,
    ) {
        self.pending.insert(
            track_id,
            PendingCoverUpdate {
                cover_location,
                hash,
            },
        );
    }

    pub fn get(&self, track_id: TrackId) -> Option<&PendingCoverUpdate> {
        self.pending.get(&track_id)
    }

    pub fn remove(&mut self, track_id: TrackId) -> Option<PendingCoverUpdate> {
        self.pending.remove(&track_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Writes every pending update in one batch once enough have piled up.
    ///
    /// `force` skips the batch-size threshold. Returns how many track links
    /// were committed. The queue is emptied whenever a write is attempted;
    /// rows the store drops are not retried.
    pub fn flush(
        &mut self,
        force: bool,
        cover_store: Option<&dyn CoverArtStore>,
        track_store: Option<&dyn TrackStore>,
    ) -> usize {
        let (Some(cover_store), Some(track_store)) = (cover_store, track_store) else {
            return 0;
        };
        if self.pending.is_empty() || (!force && self.pending.len() < self.batch_size) {
            return 0;
        }

        let batch = std::mem::take(&mut self.pending);
        info!("CoverArtCache: updating {} tracks", batch.len());

        let committed = match cover_store.save_covers(&batch) {
            Ok(committed) => committed,
            Err(err) => {
                warn!(
                    "CoverArtCache: dropping {} pending cover updates: {}",
                    batch.len(),
                    err
                );
                return 0;
            }
        };
        if committed.len() < batch.len() {
            warn!(
                "CoverArtCache: store committed {} of {} cover updates",
                committed.len(),
                batch.len()
            );
        }
        if let Err(err) = track_store.set_track_covers(&committed) {
            warn!("CoverArtCache: failed to link covers to tracks: {}", err);
            return 0;
        }
        committed.len()
    }
}
