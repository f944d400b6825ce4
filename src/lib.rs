//! Asynchronous cover-art resolution, caching, and batched persistence.
//!
//! [`CoverArtCache`] is the entry point. It serves render-ready pixmaps from a
//! shared [`PixmapCache`], resolves misses on worker threads, and reports
//! results as [`CoverArtMessage`]s on a broadcast bus.

pub mod config;
pub mod cover_art;
pub mod db_manager;
pub mod image_pipeline;
pub mod metadata;
pub mod protocol;
pub mod track_discovery;

pub use cover_art::cover_art_cache::CoverArtCache;
pub use cover_art::cover_source::{CoverImageSource, FileSystemCoverSource};
pub use cover_art::cover_store::{CoverArtStore, TrackStore};
pub use cover_art::pixmap_cache::{CacheKey, PixmapCache};
pub use protocol::{CoverArtMessage, CoverLocation, CoverRequest, CoverSize, RenderImage};
