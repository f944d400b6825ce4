//! Tag readers backed by `lofty`, with a `symphonia` fallback for covers.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use lofty::config::{ParseOptions, ParsingMode};
use lofty::file::TaggedFile;
use lofty::file::TaggedFileExt;
use lofty::prelude::Accessor;
use lofty::probe::Probe;
use lofty::tag::Tag;
use log::debug;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardVisualKey};
use symphonia::core::probe::Hint;

fn first_non_empty_value<F>(primary_tag: Option<&Tag>, tags: &[Tag], mut extractor: F) -> String
where
    F: FnMut(&Tag) -> Option<String>,
{
    primary_tag
        .into_iter()
        .chain(tags.iter())
        .filter_map(|tag| extractor(tag))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

fn tag_parse_options(
    read_cover_art: bool,
    parsing_mode: ParsingMode,
    max_junk_bytes: usize,
) -> ParseOptions {
    ParseOptions::new()
        .read_properties(false)
        .read_cover_art(read_cover_art)
        .parsing_mode(parsing_mode)
        .max_junk_bytes(max_junk_bytes)
}

fn read_tagged_file(path: &Path, read_cover_art: bool) -> Option<TaggedFile> {
    let primary_options = tag_parse_options(read_cover_art, ParsingMode::BestAttempt, 1024);
    let relaxed_options = tag_parse_options(read_cover_art, ParsingMode::Relaxed, 64 * 1024);

    match Probe::open(path) {
        Ok(probe) => match probe.options(primary_options).read() {
            Ok(tagged_file) => return Some(tagged_file),
            Err(primary_error) => {
                debug!(
                    "Tag read primary parse failed for {}: {}",
                    path.display(),
                    primary_error
                );
            }
        },
        Err(open_error) => {
            debug!(
                "Tag read could not open {} with extension-based probe: {}",
                path.display(),
                open_error
            );
        }
    }

    let file = File::open(path).ok()?;
    let guessed_probe = match Probe::new(BufReader::new(file))
        .options(relaxed_options)
        .guess_file_type()
    {
        Ok(probe) => probe,
        Err(error) => {
            debug!(
                "Tag read failed for {} while guessing file type from content: {}",
                path.display(),
                error
            );
            return None;
        }
    };

    match guessed_probe.read() {
        Ok(tagged_file) => Some(tagged_file),
        Err(error) => {
            debug!(
                "Tag read failed for {} after relaxed parsing: {}",
                path.display(),
                error
            );
            None
        }
    }
}

fn read_embedded_cover_art_with_lofty(path: &Path) -> Option<Vec<u8>> {
    let tagged_file = read_tagged_file(path, true)?;
    tagged_file
        .primary_tag()
        .into_iter()
        .chain(tagged_file.tags().iter())
        .find_map(|tag| tag.pictures().first())
        .map(|picture| picture.data().to_vec())
}

fn open_symphonia_probe(path: &Path) -> Option<symphonia::core::probe::ProbeResult> {
    let file = File::open(path).ok()?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .ok()
}

fn front_cover_or_first_visual(revision: &MetadataRevision) -> Option<Vec<u8>> {
    revision
        .visuals()
        .iter()
        .find(|visual| {
            matches!(visual.usage, Some(StandardVisualKey::FrontCover)) && !visual.data.is_empty()
        })
        .or_else(|| {
            revision
                .visuals()
                .iter()
                .find(|visual| !visual.data.is_empty())
        })
        .map(|visual| visual.data.to_vec())
}

fn read_embedded_cover_art_with_symphonia(path: &Path) -> Option<Vec<u8>> {
    let mut probed = open_symphonia_probe(path)?;

    if let Some(probe_meta) = probed.metadata.get() {
        if let Some(cover_data) = probe_meta
            .current()
            .and_then(front_cover_or_first_visual)
        {
            return Some(cover_data);
        }
    }

    while !probed.format.metadata().is_latest() {
        let _ = probed.format.metadata().pop();
    }
    if let Some(revision) = probed.format.metadata().current() {
        return front_cover_or_first_visual(revision);
    }

    None
}

/// Reads embedded cover-art bytes from a media file, if present.
pub fn read_embedded_cover_art(path: &Path) -> Option<Vec<u8>> {
    if let Some(lofty_cover) = read_embedded_cover_art_with_lofty(path) {
        return Some(lofty_cover);
    }

    let symphonia_cover = read_embedded_cover_art_with_symphonia(path);
    if symphonia_cover.is_some() {
        debug!(
            "Embedded cover-art read recovered via symphonia fallback for {}",
            path.display()
        );
    }
    symphonia_cover
}

/// Reads the album title used by the directory cover search.
pub fn read_album_title(path: &Path) -> String {
    let Some(tagged_file) = read_tagged_file(path, false) else {
        return String::new();
    };
    first_non_empty_value(tagged_file.primary_tag(), tagged_file.tags(), |tag| {
        tag.album().map(|value| value.into_owned())
    })
}
