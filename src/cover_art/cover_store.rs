//! Persistence seams consumed by the cover-art cache.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::cover_art::update_queue::PendingCoverUpdate;
use crate::protocol::{CoverArtInfo, CoverId, CoverLocation, TrackId};

/// Cover records: one row per distinct `(location, hash)`.
pub trait CoverArtStore {
    fn get_cover_info(&self, track_id: TrackId) -> Result<CoverArtInfo, String>;

    /// Returns the id of the stored `(location, hash)` record, creating it if needed.
    fn save_cover(&self, location: Option<&CoverLocation>, hash: &str) -> Result<CoverId, String>;

    /// Batched [`CoverArtStore::save_cover`]. Returns only the pairs that committed.
    fn save_covers(
        &self,
        updates: &HashMap<TrackId, PendingCoverUpdate>,
    ) -> Result<Vec<(TrackId, CoverId)>, String>;
}

/// Track rows and their cover associations.
pub trait TrackStore {
    fn get_track_location(&self, track_id: TrackId) -> Result<PathBuf, String>;

    fn set_track_cover(&self, track_id: TrackId, cover_id: CoverId) -> Result<(), String>;

    fn set_track_covers(&self, covers: &[(TrackId, CoverId)]) -> Result<(), String>;
}
