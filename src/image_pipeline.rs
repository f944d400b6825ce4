//! Cover decoding, capped resizing, cropping, hashing, and directory search.

use std::fs;
use std::path::{Path, PathBuf};

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use zune_core::{colorspace::ColorSpace, options::DecoderOptions};
use zune_jpeg::JpegDecoder;

use crate::protocol::CoverSize;

const COVER_IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "bmp", "webp"];
const PREFERRED_COVER_STEMS: [&str; 4] = ["cover", "front", "album", "folder"];

pub fn mb_to_bytes(value_mb: u32) -> u64 {
    u64::from(value_mb.max(1)) * 1024u64 * 1024u64
}

fn looks_like_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0xff && bytes[1] == 0xd8
}

fn decode_jpeg_non_strict(bytes: &[u8]) -> Option<DynamicImage> {
    if !looks_like_jpeg(bytes) {
        return None;
    }

    let options = DecoderOptions::new_cmd()
        .set_strict_mode(false)
        .jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(bytes, options);
    let pixels = decoder.decode().ok()?;
    let (width, height) = decoder.dimensions()?;
    let image = image::RgbaImage::from_raw(width as u32, height as u32, pixels)?;
    Some(DynamicImage::ImageRgba8(image))
}

/// Decodes encoded image bytes, e.g. an embedded tag picture.
pub fn decode_image_from_memory_with_fallback(bytes: &[u8]) -> Option<DynamicImage> {
    // Tag pictures are often truncated JPEGs; retry those non-strictly.
    image::load_from_memory(bytes)
        .ok()
        .or_else(|| decode_jpeg_non_strict(bytes))
}

/// Decodes an image file. `None` covers both "missing" and "not an image".
pub fn decode_image_from_path_with_fallback(path: &Path) -> Option<DynamicImage> {
    image::open(path).ok().or_else(|| {
        let bytes = fs::read(path).ok()?;
        decode_image_from_memory_with_fallback(&bytes)
    })
}

fn fit_to_max_edge(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }
    let clamped = max_edge.max(1);
    if width.max(height) <= clamped {
        return (width, height);
    }
    if width >= height {
        let scaled_height =
            ((u64::from(height) * u64::from(clamped)) + (u64::from(width) / 2)) / u64::from(width);
        (clamped, scaled_height.max(1) as u32)
    } else {
        let scaled_width =
            ((u64::from(width) * u64::from(clamped)) + (u64::from(height) / 2)) / u64::from(height);
        (scaled_width.max(1) as u32, clamped)
    }
}

fn saturate_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Smallest dimensions that keep the aspect ratio and cover `target` entirely.
fn fill_dimensions(width: u32, height: u32, target: CoverSize) -> (u32, u32) {
    let width = u64::from(width.max(1));
    let height = u64::from(height.max(1));
    let target_w = u64::from(target.width.max(1));
    let target_h = u64::from(target.height.max(1));

    // Compare width/target_w against height/target_h without floats.
    if width * target_h >= height * target_w {
        let scaled_width = (width * target_h).div_ceil(height);
        (saturate_u32(scaled_width.max(target_w)), saturate_u32(target_h))
    } else {
        let scaled_height = (height * target_w).div_ceil(width);
        (saturate_u32(target_w), saturate_u32(scaled_height.max(target_h)))
    }
}

fn downscale_smooth(decoded: DynamicImage, target_width: u32, target_height: u32) -> DynamicImage {
    let mut current = decoded;
    let mut current_dims = current.dimensions();
    let target_w = target_width.max(1);
    let target_h = target_height.max(1);

    // Halve first so large scans do not alias.
    while current_dims.0 > target_w.saturating_mul(2) || current_dims.1 > target_h.saturating_mul(2)
    {
        let next_w = (current_dims.0 / 2).max(target_w);
        let next_h = (current_dims.1 / 2).max(target_h);
        current = current.resize_exact(next_w, next_h, FilterType::Triangle);
        current_dims = current.dimensions();
    }

    if current_dims.0 == target_w && current_dims.1 == target_h {
        return current;
    }
    current.resize_exact(target_w, target_h, FilterType::CatmullRom)
}

/// Scales an image down so its longer side is at most `max_edge` pixels.
///
/// Images already within the limit are returned untouched.
pub fn resize_capped(image: DynamicImage, max_edge: u32) -> DynamicImage {
    let (source_width, source_height) = image.dimensions();
    let (target_width, target_height) = fit_to_max_edge(source_width, source_height, max_edge);
    if target_width == source_width && target_height == source_height {
        return image;
    }
    image.resize_exact(target_width, target_height, FilterType::Lanczos3)
}

/// Scales to fill `size` and crops the centered overflow, yielding exactly `size`.
pub fn crop_to_size(image: DynamicImage, size: CoverSize) -> DynamicImage {
    let target_w = size.width.max(1);
    let target_h = size.height.max(1);
    let (source_width, source_height) = image.dimensions();
    let (fill_width, fill_height) = fill_dimensions(
        source_width,
        source_height,
        CoverSize::new(target_w, target_h),
    );
    let filled = downscale_smooth(image, fill_width, fill_height);
    let x = (fill_width - target_w) / 2;
    let y = (fill_height - target_h) / 2;
    filled.crop_imm(x, y, target_w, target_h)
}

/// Deterministic fingerprint of decoded pixels.
///
/// `None` hashes to [`no_cover_hash`], so "searched and found nothing" is a
/// stable value too.
pub fn content_hash(image: Option<&DynamicImage>) -> String {
    let Some(image) = image else {
        return no_cover_hash();
    };
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut bytes = Vec::with_capacity(8 + rgba.as_raw().len());
    bytes.extend_from_slice(&width.to_le_bytes());
    bytes.extend_from_slice(&height.to_le_bytes());
    bytes.extend_from_slice(rgba.as_raw());
    format!("{:x}", md5::compute(&bytes))
}

pub fn no_cover_hash() -> String {
    format!("{:x}", md5::compute(b""))
}

fn is_cover_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                COVER_IMAGE_EXTENSIONS
                    .iter()
                    .any(|supported| ext.eq_ignore_ascii_case(supported))
            })
            .unwrap_or(false)
}

fn stem_matches(path: &Path, name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty()
        && path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| stem.eq_ignore_ascii_case(trimmed))
}

/// Picks the most likely cover image in a track's directory.
///
/// A lone image wins outright. Otherwise the preference is an image named
/// after the track, then after the album, then a conventional cover name,
/// then the first image in name order.
pub fn search_track_directory(directory: &Path, base_name: &str, album: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(directory).ok()?;
    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| is_cover_image_file(path))
        .collect();
    if candidates.is_empty() {
        return None;
    }
    candidates.sort();
    if candidates.len() == 1 {
        return candidates.pop();
    }

    let preferred_names = [base_name, album]
        .into_iter()
        .chain(PREFERRED_COVER_STEMS.iter().copied());
    for name in preferred_names {
        if let Some(found) = candidates.iter().find(|path| stem_matches(path, name)) {
            return Some(found.clone());
        }
    }
    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::{
        content_hash, crop_to_size, decode_image_from_memory_with_fallback, fill_dimensions,
        fit_to_max_edge, mb_to_bytes, no_cover_hash, resize_capped, search_track_directory,
    };
    use crate::cover_art::image_resolver::tests::unique_temp_dir;
    use crate::protocol::CoverSize;
    use image::{
        codecs::jpeg::JpegEncoder, DynamicImage, GenericImageView, ImageBuffer, Rgb, RgbImage,
        Rgba,
    };
    use std::fs;
    use std::path::PathBuf;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(ImageBuffer::from_pixel(width, height, Rgba(color)))
    }

    fn touch_image(path: &PathBuf) {
        solid(4, 4, [1, 2, 3, 255])
            .save(path)
            .expect("fixture image should be written");
    }

    #[test]
    fn test_mb_to_bytes_never_returns_zero() {
        assert_eq!(mb_to_bytes(0), 1024u64 * 1024u64);
        assert_eq!(mb_to_bytes(5), 5u64 * 1024u64 * 1024u64);
    }

    #[test]
    fn test_fit_to_max_edge_preserves_aspect_ratio() {
        assert_eq!(fit_to_max_edge(2000, 1000, 300), (300, 150));
        assert_eq!(fit_to_max_edge(1000, 2000, 300), (150, 300));
        assert_eq!(fit_to_max_edge(128, 64, 300), (128, 64));
    }

    #[test]
    fn test_fill_dimensions_cover_target_on_both_axes() {
        assert_eq!(fill_dimensions(400, 200, CoverSize::new(50, 50)), (100, 50));
        assert_eq!(fill_dimensions(200, 400, CoverSize::new(50, 50)), (50, 100));
        assert_eq!(fill_dimensions(300, 300, CoverSize::new(60, 30)), (60, 60));
    }

    #[test]
    fn test_fill_dimensions_saturate_instead_of_wrapping() {
        let target = CoverSize::new(1, u32::MAX);
        let (fill_width, fill_height) = fill_dimensions(u32::MAX, 1, target);
        assert_eq!((fill_width, fill_height), (u32::MAX, u32::MAX));
        assert!(fill_width >= target.width && fill_height >= target.height);
    }

    #[test]
    fn test_resize_capped_limits_longer_side_only_when_needed() {
        let large = resize_capped(solid(900, 600, [9, 9, 9, 255]), 300);
        assert_eq!(large.dimensions(), (300, 200));
        let small = resize_capped(solid(120, 80, [9, 9, 9, 255]), 300);
        assert_eq!(small.dimensions(), (120, 80));
    }

    #[test]
    fn test_crop_to_size_produces_exact_dimensions() {
        let source = DynamicImage::ImageRgba8(ImageBuffer::from_fn(1200, 700, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        }));
        let cropped = crop_to_size(source, CoverSize::new(64, 48));
        assert_eq!(cropped.dimensions(), (64, 48));
    }

    #[test]
    fn test_crop_to_size_upscales_small_sources() {
        let cropped = crop_to_size(solid(10, 20, [0, 0, 0, 255]), CoverSize::new(40, 40));
        assert_eq!(cropped.dimensions(), (40, 40));
    }

    #[test]
    fn test_content_hash_depends_on_pixels_not_origin() {
        let first = solid(8, 8, [10, 20, 30, 255]);
        let second = solid(8, 8, [10, 20, 30, 255]);
        let different = solid(8, 8, [10, 20, 31, 255]);
        assert_eq!(content_hash(Some(&first)), content_hash(Some(&second)));
        assert_ne!(content_hash(Some(&first)), content_hash(Some(&different)));
        assert_eq!(content_hash(None), no_cover_hash());
        assert_ne!(content_hash(Some(&first)), no_cover_hash());
    }

    #[test]
    fn test_decode_image_from_memory_with_fallback_decodes_jpeg_bytes() {
        let rgb = RgbImage::from_pixel(12, 9, Rgb([90, 140, 210]));
        let mut encoded = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut encoded, 85);
            encoder
                .encode_image(&DynamicImage::ImageRgb8(rgb))
                .expect("jpeg encoding should succeed");
        }
        // Trailing garbage as seen in malformed tag pictures.
        encoded.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

        let decoded = decode_image_from_memory_with_fallback(&encoded)
            .expect("fallback decoder should decode jpeg bytes");
        assert_eq!(decoded.dimensions(), (12, 9));
    }

    #[test]
    fn test_decode_image_from_memory_with_fallback_rejects_non_image_bytes() {
        assert!(decode_image_from_memory_with_fallback(b"definitely-not-an-image").is_none());
    }

    #[test]
    fn test_search_track_directory_prefers_track_then_album_then_conventional_names() {
        let dir = unique_temp_dir("search_priority");
        for name in ["aaa.png", "folder.png", "Greatest Hits.jpg", "01 intro.png"] {
            touch_image(&dir.join(name));
        }
        fs::write(dir.join("notes.txt"), "not an image").expect("text file should be written");

        assert_eq!(
            search_track_directory(&dir, "01 intro", "Greatest Hits"),
            Some(dir.join("01 intro.png"))
        );
        assert_eq!(
            search_track_directory(&dir, "02 outro", "greatest hits"),
            Some(dir.join("Greatest Hits.jpg"))
        );
        assert_eq!(
            search_track_directory(&dir, "02 outro", "Other"),
            Some(dir.join("folder.png"))
        );

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_search_track_directory_single_image_or_none() {
        let dir = unique_temp_dir("search_single");
        assert_eq!(search_track_directory(&dir, "track", "album"), None);

        touch_image(&dir.join("scan.png"));
        assert_eq!(
            search_track_directory(&dir, "track", "album"),
            Some(dir.join("scan.png"))
        );

        touch_image(&dir.join("back.png"));
        assert_eq!(
            search_track_directory(&dir, "track", "album"),
            Some(dir.join("back.png"))
        );

        let _ = fs::remove_dir_all(dir);
    }
}
