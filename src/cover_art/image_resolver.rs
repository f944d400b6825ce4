//! Background cover resolution: find or load an image, then shape it.

use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use log::debug;

use crate::cover_art::cover_source::CoverImageSource;
use crate::image_pipeline::{content_hash, crop_to_size, resize_capped};
use crate::protocol::{CoverArtInfo, CoverLocation, CoverSize, ResolvedImage};

/// Stateless resolver; clones are cheap and safe to move onto workers.
#[derive(Clone)]
pub struct ImageResolver {
    source: Arc<dyn CoverImageSource>,
    max_cover_edge_px: u32,
}

impl ImageResolver {
    pub fn new(source: Arc<dyn CoverImageSource>, max_cover_edge_px: u32) -> Self {
        Self {
            source,
            max_cover_edge_px: max_cover_edge_px.max(1),
        }
    }

    pub fn max_cover_edge_px(&self) -> u32 {
        self.max_cover_edge_px
    }

    /// Reads a cover from the location the caller already knows about.
    pub fn read_location(
        &self,
        location: &CoverLocation,
        track_location: &Path,
    ) -> Option<DynamicImage> {
        match location {
            CoverLocation::Embedded => self.source.extract_embedded_cover(track_location),
            CoverLocation::Path(path) => self.source.load_cover_file(path),
        }
    }

    /// Capped full size when `target_size` is absent, exact crop otherwise.
    fn shape(&self, image: DynamicImage, target_size: Option<CoverSize>) -> DynamicImage {
        match target_size {
            Some(size) => crop_to_size(image, size),
            None => resize_capped(image, self.max_cover_edge_px),
        }
    }

    /// Loads from `info.cover_location`, keeping the declared location and hash.
    ///
    /// A missing or undecodable image yields a null image in the result.
    pub fn load_image(
        &self,
        info: &CoverArtInfo,
        target_size: Option<CoverSize>,
        repaint_only: bool,
    ) -> ResolvedImage {
        let image = info
            .cover_location
            .as_ref()
            .and_then(|location| self.read_location(location, &info.track_location))
            .map(|decoded| self.shape(decoded, target_size).to_rgba8());
        if image.is_none() {
            debug!(
                "CoverArtCache: no decodable cover for track {} at {:?}",
                info.track_id, info.cover_location
            );
        }

        ResolvedImage {
            track_id: info.track_id,
            cover_location: info.cover_location.clone(),
            hash: info.hash.clone(),
            target_size,
            image,
            repaint_only,
        }
    }

    /// Looks for a cover in the track's tags, then in its directory.
    ///
    /// The hash is computed from the capped full-size image so every size
    /// variant of one cover shares it.
    pub fn search_image(
        &self,
        info: &CoverArtInfo,
        target_size: Option<CoverSize>,
        repaint_only: bool,
    ) -> ResolvedImage {
        let embedded = self
            .source
            .extract_embedded_cover(&info.track_location)
            .map(|image| (CoverLocation::Embedded, image));
        let found = embedded.or_else(|| {
            let path = self.source.search_directory(
                &info.track_directory,
                &info.track_base_name,
                &info.album,
            )?;
            let image = self.source.load_cover_file(&path)?;
            Some((CoverLocation::Path(path), image))
        });

        let Some((cover_location, image)) = found else {
            debug!("CoverArtCache: search found no cover for track {}", info.track_id);
            return ResolvedImage::not_found(
                info.track_id,
                content_hash(None),
                target_size,
                repaint_only,
            );
        };

        let capped = resize_capped(image, self.max_cover_edge_px);
        let hash = content_hash(Some(&capped));
        let shaped = match target_size {
            Some(size) => crop_to_size(capped, size),
            None => capped,
        };
        debug!(
            "CoverArtCache: search found {} for track {}",
            cover_location, info.track_id
        );

        ResolvedImage {
            track_id: info.track_id,
            cover_location: Some(cover_location),
            hash,
            target_size,
            image: Some(shaped.to_rgba8()),
            repaint_only,
        }
    }
}
