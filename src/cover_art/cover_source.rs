//! Where cover pixels come from: tags, image files, and directory scans.

use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::image_pipeline::{
    decode_image_from_memory_with_fallback, decode_image_from_path_with_fallback,
    search_track_directory,
};
use crate::metadata::metadata_tags::read_embedded_cover_art;

/// Image lookup primitives used by background resolution.
///
/// Implementations run on worker threads and must not touch shared state
/// beyond reading the named files.
pub trait CoverImageSource: Send + Sync {
    fn extract_embedded_cover(&self, track_path: &Path) -> Option<DynamicImage>;

    fn load_cover_file(&self, path: &Path) -> Option<DynamicImage>;

    fn search_directory(&self, directory: &Path, base_name: &str, album: &str) -> Option<PathBuf>;
}

/// Reads covers from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemCoverSource;

impl CoverImageSource for FileSystemCoverSource {
    fn extract_embedded_cover(&self, track_path: &Path) -> Option<DynamicImage> {
        let bytes = read_embedded_cover_art(track_path)?;
        decode_image_from_memory_with_fallback(&bytes)
    }

    fn load_cover_file(&self, path: &Path) -> Option<DynamicImage> {
        decode_image_from_path_with_fallback(path)
    }

    fn search_directory(&self, directory: &Path, base_name: &str, album: &str) -> Option<PathBuf> {
        search_track_directory(directory, base_name, album)
    }
}
