//! Cover-art request coordinator.
//!
//! `CoverArtCache` lives on one owning thread. It answers pixmap requests from
//! the shared [`PixmapCache`], dispatches misses to background resolvers, and
//! takes their results back through [`CoverArtCache::process_completed`].
//! Newly discovered covers are queued and persisted in batches.

use std::collections::HashSet;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::broadcast::Sender;

use crate::config::CoverArtConfig;
use crate::cover_art::cover_source::CoverImageSource;
use crate::cover_art::cover_store::{CoverArtStore, TrackStore};
use crate::cover_art::image_resolver::ImageResolver;
use crate::cover_art::pixmap_cache::{CacheKey, PixmapCache};
use crate::cover_art::result_channel::{
    CompletedResolution, CompletionWaker, ResolutionMode, ResultChannel,
};
use crate::cover_art::update_queue::UpdateQueue;
use crate::image_pipeline::{content_hash, resize_capped};
use crate::protocol::{
    CoverArtInfo, CoverArtMessage, CoverLocation, CoverRequest, RenderImage, ResolvedImage,
    TrackId, NO_COVER_ID,
};

pub struct CoverArtCache {
    cover_store: Option<Rc<dyn CoverArtStore>>,
    track_store: Option<Rc<dyn TrackStore>>,
    pixmaps: PixmapCache,
    resolver: ImageResolver,
    results: ResultChannel,
    // Tracks with a resolver in flight. Removed only on delivery.
    running_ids: HashSet<TrackId>,
    // In-flight tracks whose cover was reassigned explicitly meanwhile.
    superseded_ids: HashSet<TrackId>,
    update_queue: UpdateQueue,
    bus_producer: Sender<CoverArtMessage>,
}

impl CoverArtCache {
    pub fn new(
        config: &CoverArtConfig,
        pixmaps: PixmapCache,
        source: Arc<dyn CoverImageSource>,
        bus_producer: Sender<CoverArtMessage>,
    ) -> Self {
        Self {
            cover_store: None,
            track_store: None,
            pixmaps,
            resolver: ImageResolver::new(source, config.max_cover_edge_px),
            results: ResultChannel::new(),
            running_ids: HashSet::new(),
            superseded_ids: HashSet::new(),
            update_queue: UpdateQueue::new(config.update_batch_size),
            bus_producer,
        }
    }

    pub fn set_cover_store(&mut self, cover_store: Rc<dyn CoverArtStore>) {
        self.cover_store = Some(cover_store);
    }

    pub fn set_track_store(&mut self, track_store: Rc<dyn TrackStore>) {
        self.track_store = Some(track_store);
    }

    /// Runs on a worker thread each time a resolution finishes.
    pub fn set_completion_waker(&mut self, waker: Option<CompletionWaker>) {
        self.results.set_completion_waker(waker);
    }

    pub fn pixmap_cache(&self) -> &PixmapCache {
        &self.pixmaps
    }

    /// Hash of a discovered cover that has not been persisted yet.
    pub fn pending_hash(&self, track_id: TrackId) -> Option<String> {
        self.update_queue
            .get(track_id)
            .map(|pending| pending.hash.clone())
    }

    pub fn pending_update_count(&self) -> usize {
        self.update_queue.len()
    }

    pub fn is_resolving(&self, track_id: TrackId) -> bool {
        self.running_ids.contains(&track_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.results.in_flight_count()
    }

    fn emit(&self, message: CoverArtMessage) {
        let _ = self.bus_producer.send(message);
    }

    /// Returns the cached pixmap for `request`, or starts resolving it.
    ///
    /// `None` means one of: invalid track, no cover store, resolution already
    /// running, cache-only miss, or resolution started. In the last case a
    /// [`CoverArtMessage`] follows once [`Self::process_completed`] delivers it.
    /// With `repaint_only` the delivery is a `RequestRepaint` and cache hits
    /// are returned without a notification.
    pub fn request_pixmap(
        &mut self,
        request: &CoverRequest,
        cache_only: bool,
        repaint_only: bool,
    ) -> Option<RenderImage> {
        let track_id = request.track_id;
        if track_id < 1 {
            return None;
        }
        let cover_store = self.cover_store.clone()?;
        if self.running_ids.contains(&track_id) {
            return None;
        }

        // A discovery waiting to be persisted is newer than anything the caller knows.
        let (cover_location, hash) = match self.update_queue.get(track_id) {
            Some(pending) => (pending.cover_location.clone(), pending.hash.clone()),
            None => (request.cover_location.clone(), request.hash.clone()),
        };
        let target_size = request.target_size.filter(|size| !size.is_empty());

        let key = CacheKey::new(&hash, target_size);
        if let Some(pixmap) = self.pixmaps.get(&key) {
            debug!("CoverArtCache: cache hit {} for track {}", key, track_id);
            if !repaint_only {
                self.emit(CoverArtMessage::PixmapFound {
                    track_id,
                    image: Some(pixmap.clone()),
                });
            }
            return Some(pixmap);
        }
        if cache_only {
            return None;
        }

        let needs_search = hash.is_empty()
            || !cover_location
                .as_ref()
                .is_some_and(CoverLocation::is_verifiable);
        let resolver = self.resolver.clone();
        let (mode, dispatched) = if needs_search {
            let info = cover_store.get_cover_info(track_id).unwrap_or_else(|err| {
                debug!(
                    "CoverArtCache: no stored cover info for track {}: {}",
                    track_id, err
                );
                CoverArtInfo::from_track_location(track_id, &request.track_location)
            });
            let dispatched = self.results.dispatch(
                track_id,
                ResolutionMode::Search,
                target_size,
                repaint_only,
                move || resolver.search_image(&info, target_size, repaint_only),
            );
            (ResolutionMode::Search, dispatched)
        } else {
            let info = CoverArtInfo {
                cover_location,
                hash,
                ..CoverArtInfo::from_track_location(track_id, &request.track_location)
            };
            let dispatched = self.results.dispatch(
                track_id,
                ResolutionMode::Load,
                target_size,
                repaint_only,
                move || resolver.load_image(&info, target_size, repaint_only),
            );
            (ResolutionMode::Load, dispatched)
        };

        if let Err(err) = dispatched {
            warn!(
                "CoverArtCache: failed to start resolver for track {}: {}",
                track_id, err
            );
            return None;
        }
        debug!("CoverArtCache: resolving track {} ({:?})", track_id, mode);
        self.running_ids.insert(track_id);
        None
    }

    /// Delivers every finished resolution. Returns how many were delivered.
    pub fn process_completed(&mut self) -> usize {
        let completed = self.results.collect_completed();
        let delivered = completed.len();
        for resolution in completed {
            self.deliver(resolution);
        }
        delivered
    }

    fn deliver(&mut self, resolution: CompletedResolution) {
        let CompletedResolution { mode, result } = resolution;
        let ResolvedImage {
            track_id,
            cover_location,
            hash,
            target_size,
            image,
            repaint_only,
        } = result;

        let key = CacheKey::new(&hash, target_size);
        let pixmap = match self.pixmaps.get(&key) {
            Some(cached) => Some(cached),
            None => image.map(|image| {
                let pixmap: RenderImage = Arc::new(image);
                if !self.pixmaps.insert(key.clone(), pixmap.clone()) {
                    debug!("CoverArtCache: {} exceeds the cache budget", key);
                }
                pixmap
            }),
        };

        if repaint_only {
            self.emit(CoverArtMessage::RequestRepaint);
        } else {
            self.emit(CoverArtMessage::PixmapFound {
                track_id,
                image: pixmap,
            });
        }

        let superseded = self.superseded_ids.remove(&track_id);
        if mode == ResolutionMode::Search && !superseded {
            self.update_queue.enqueue(track_id, cover_location, hash);
            self.flush_pending_updates(false);
        }

        self.running_ids.remove(&track_id);
    }

    /// Assigns a cover explicitly and persists it right away.
    ///
    /// `None` records that the track has no cover. Returns `false` for an
    /// invalid track, missing stores, an unreadable image, or a store error.
    pub fn change_cover_art(
        &mut self,
        track_id: TrackId,
        new_location: Option<CoverLocation>,
    ) -> bool {
        if track_id < 1 {
            return false;
        }
        let (Some(cover_store), Some(track_store)) =
            (self.cover_store.clone(), self.track_store.clone())
        else {
            return false;
        };

        self.update_queue.remove(track_id);

        let Some(location) = new_location else {
            if let Err(err) = track_store.set_track_cover(track_id, NO_COVER_ID) {
                warn!(
                    "CoverArtCache: failed to clear cover for track {}: {}",
                    track_id, err
                );
                return false;
            }
            self.supersede_in_flight_search(track_id);
            return true;
        };

        let track_location = match location {
            CoverLocation::Embedded => match track_store.get_track_location(track_id) {
                Ok(track_location) => track_location,
                Err(err) => {
                    warn!(
                        "CoverArtCache: no location for track {}: {}",
                        track_id, err
                    );
                    return false;
                }
            },
            CoverLocation::Path(_) => PathBuf::new(),
        };
        let Some(image) = self.resolver.read_location(&location, &track_location) else {
            debug!("CoverArtCache: {} could not be decoded", location);
            return false;
        };
        let image = resize_capped(image, self.resolver.max_cover_edge_px());
        let hash = content_hash(Some(&image));

        let cover_id = match cover_store.save_cover(Some(&location), &hash) {
            Ok(cover_id) => cover_id,
            Err(err) => {
                warn!("CoverArtCache: failed to save cover {}: {}", location, err);
                return false;
            }
        };
        if let Err(err) = track_store.set_track_cover(track_id, cover_id) {
            warn!(
                "CoverArtCache: failed to link cover {} to track {}: {}",
                cover_id, track_id, err
            );
            return false;
        }
        self.supersede_in_flight_search(track_id);

        let key = CacheKey::full_size(&hash);
        let pixmap = self.pixmaps.get(&key).or_else(|| {
            let pixmap: RenderImage = Arc::new(image.to_rgba8());
            self.pixmaps.insert(key, pixmap.clone()).then_some(pixmap)
        });
        if let Some(pixmap) = pixmap {
            self.emit(CoverArtMessage::PixmapFound {
                track_id,
                image: Some(pixmap),
            });
            self.emit(CoverArtMessage::RequestRepaint);
        }
        true
    }

    // Keeps a search that is still running from queueing over an explicit choice.
    fn supersede_in_flight_search(&mut self, track_id: TrackId) {
        if self.running_ids.contains(&track_id) {
            self.superseded_ids.insert(track_id);
        }
    }

    /// Persists queued discoveries. See [`UpdateQueue::flush`].
    pub fn flush_pending_updates(&mut self, force: bool) -> usize {
        self.update_queue.flush(
            force,
            self.cover_store.as_deref(),
            self.track_store.as_deref(),
        )
    }

    /// Waits for in-flight resolutions, delivers them, then persists everything queued.
    pub fn shutdown(&mut self) -> usize {
        for resolution in self.results.wait_all() {
            self.deliver(resolution);
        }
        self.flush_pending_updates(true)
    }
}

impl Drop for CoverArtCache {
    fn drop(&mut self) {
        if !self.update_queue.is_empty() {
            debug!(
                "CoverArtCache: flushing {} pending updates on drop",
                self.update_queue.len()
            );
        }
        self.flush_pending_updates(true);
    }
}
