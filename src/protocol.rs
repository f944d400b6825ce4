//! Cover-art payloads shared by the resolution pipeline and its consumers.
//!
//! This module defines the request/result records exchanged between the
//! cache coordinator and its background resolvers, plus the notifications
//! broadcast to display layers.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;

/// Library track identifier. Valid ids are positive.
pub type TrackId = i64;

/// Row id of a persisted cover record.
pub type CoverId = i64;

/// Persisted cover id meaning "this track has no cover".
pub const NO_COVER_ID: CoverId = -1;

/// Stored text for [`CoverLocation::Embedded`].
pub const EMBEDDED_COVER_LOCATION: &str = "embedded";

/// Decoded, render-ready pixels shared by the cache and notification receivers.
pub type RenderImage = Arc<RgbaImage>;

/// Where a track's cover art comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CoverLocation {
    /// Picture stored in the track's own tags.
    Embedded,
    /// Standalone image file.
    Path(PathBuf),
}

impl CoverLocation {
    /// Parses the stored text form. Empty text means "no location".
    pub fn from_stored(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed == EMBEDDED_COVER_LOCATION {
            Some(Self::Embedded)
        } else {
            Some(Self::Path(PathBuf::from(trimmed)))
        }
    }

    pub fn to_stored(&self) -> String {
        match self {
            Self::Embedded => EMBEDDED_COVER_LOCATION.to_string(),
            Self::Path(path) => path.to_string_lossy().into_owned(),
        }
    }

    /// True when the location can be loaded without searching.
    pub fn is_verifiable(&self) -> bool {
        match self {
            Self::Embedded => true,
            Self::Path(path) => path.is_file(),
        }
    }
}

impl fmt::Display for CoverLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedded => f.write_str(EMBEDDED_COVER_LOCATION),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Exact display size for a render-ready variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoverSize {
    pub width: u32,
    pub height: u32,
}

impl CoverSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What a caller wants a pixmap for.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverRequest {
    pub track_id: TrackId,
    /// Known cover location, if any.
    pub cover_location: Option<CoverLocation>,
    /// Content hash of the known cover. Empty when unknown.
    pub hash: String,
    /// Audio file, used for embedded extraction.
    pub track_location: PathBuf,
    /// `None` requests the capped full-size variant.
    pub target_size: Option<CoverSize>,
}

impl CoverRequest {
    pub fn new(track_id: TrackId, track_location: impl Into<PathBuf>) -> Self {
        Self {
            track_id,
            cover_location: None,
            hash: String::new(),
            track_location: track_location.into(),
            target_size: None,
        }
    }

    pub fn with_cover(mut self, cover_location: CoverLocation, hash: impl Into<String>) -> Self {
        self.cover_location = Some(cover_location);
        self.hash = hash.into();
        self
    }

    pub fn with_target_size(mut self, target_size: CoverSize) -> Self {
        self.target_size = Some(target_size);
        self
    }
}

/// Everything the search path needs to know about a track's cover.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoverArtInfo {
    pub track_id: TrackId,
    pub cover_location: Option<CoverLocation>,
    pub hash: String,
    pub track_directory: PathBuf,
    pub track_base_name: String,
    pub album: String,
    pub track_location: PathBuf,
}

impl CoverArtInfo {
    /// Builds search inputs from a track path alone.
    pub fn from_track_location(track_id: TrackId, track_location: &Path) -> Self {
        Self {
            track_id,
            cover_location: None,
            hash: String::new(),
            track_directory: track_location
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            track_base_name: track_location
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("")
                .to_string(),
            album: String::new(),
            track_location: track_location.to_path_buf(),
        }
    }
}

/// Output of one background resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedImage {
    pub track_id: TrackId,
    /// `None` when nothing was found.
    pub cover_location: Option<CoverLocation>,
    pub hash: String,
    pub target_size: Option<CoverSize>,
    /// `None` is the null image: not found or undecodable.
    pub image: Option<RgbaImage>,
    /// Caller only wants a repaint, not the pixmap itself.
    pub repaint_only: bool,
}

impl ResolvedImage {
    pub fn not_found(
        track_id: TrackId,
        hash: impl Into<String>,
        target_size: Option<CoverSize>,
        repaint_only: bool,
    ) -> Self {
        Self {
            track_id,
            cover_location: None,
            hash: hash.into(),
            target_size,
            image: None,
            repaint_only,
        }
    }
}

/// Notifications emitted to display layers.
#[derive(Debug, Clone)]
pub enum CoverArtMessage {
    /// Resolution for a track finished. `None` means no cover exists.
    PixmapFound {
        track_id: TrackId,
        image: Option<RenderImage>,
    },
    /// Covers changed; views should redraw.
    RequestRepaint,
}

#[cfg(test)]
mod tests {
    use super::{CoverArtInfo, CoverLocation, CoverSize};
    use std::path::{Path, PathBuf};

    #[test]
    fn test_cover_location_stored_form_distinguishes_embedded_and_paths() {
        assert_eq!(
            CoverLocation::from_stored("embedded"),
            Some(CoverLocation::Embedded)
        );
        assert_eq!(
            CoverLocation::from_stored("/music/a/cover.jpg"),
            Some(CoverLocation::Path(PathBuf::from("/music/a/cover.jpg")))
        );
        assert_eq!(CoverLocation::from_stored("  "), None);
        assert_eq!(CoverLocation::Embedded.to_stored(), "embedded");
    }

    #[test]
    fn test_missing_path_is_not_verifiable() {
        let location = CoverLocation::Path(PathBuf::from("/definitely/not/here/cover.png"));
        assert!(!location.is_verifiable());
        assert!(CoverLocation::Embedded.is_verifiable());
    }

    #[test]
    fn test_cover_size_with_zero_side_is_empty() {
        assert!(CoverSize::new(0, 0).is_empty());
        assert!(CoverSize::new(64, 0).is_empty());
        assert!(!CoverSize::new(64, 64).is_empty());
    }

    #[test]
    fn test_cover_art_info_from_track_location_splits_directory_and_stem() {
        let info = CoverArtInfo::from_track_location(7, Path::new("/music/album/01 - song.flac"));
        assert_eq!(info.track_directory, PathBuf::from("/music/album"));
        assert_eq!(info.track_base_name, "01 - song");
        assert_eq!(info.track_location, PathBuf::from("/music/album/01 - song.flac"));
    }
}
