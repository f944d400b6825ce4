//! Finds audio files to register from command-line paths.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::debug;

pub const TRACK_EXTENSIONS: [&str; 7] = ["mp3", "wav", "ogg", "flac", "aac", "m4a", "mp4"];

pub fn is_track_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            TRACK_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

fn walk_directory(root: &Path, tracks: &mut BTreeSet<PathBuf>) {
    let mut pending_directories = vec![root.to_path_buf()];
    while let Some(directory) = pending_directories.pop() {
        let entries = match std::fs::read_dir(&directory) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("Skipping unreadable directory {}: {}", directory.display(), err);
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            match entry.file_type() {
                Ok(file_type) if file_type.is_dir() => pending_directories.push(path),
                Ok(file_type) if file_type.is_file() && is_track_file(&path) => {
                    tracks.insert(path);
                }
                Ok(_) => {}
                Err(err) => debug!("Skipping {}: {}", path.display(), err),
            }
        }
    }
}

/// Expands files and directories into a sorted, duplicate-free track list.
pub fn collect_tracks(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut tracks = BTreeSet::new();
    for path in paths {
        if path.is_dir() {
            walk_directory(path, &mut tracks);
        } else if path.is_file() && is_track_file(path) {
            tracks.insert(path.clone());
        } else {
            debug!("Ignoring {}", path.display());
        }
    }
    tracks.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::{collect_tracks, is_track_file};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn test_track_extensions_match_case_insensitively() {
        assert!(is_track_file(Path::new("/m/a.FLAC")));
        assert!(is_track_file(Path::new("/m/b.m4a")));
        assert!(!is_track_file(Path::new("/m/cover.jpg")));
        assert!(!is_track_file(Path::new("/m/no_extension")));
    }

    #[test]
    fn test_collect_tracks_walks_directories_and_deduplicates() {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be valid")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("coverart_discovery_{nonce}"));
        let nested = root.join("disc 2");
        fs::create_dir_all(&nested).expect("fixture dirs should be created");
        for file in ["01.mp3", "cover.jpg"] {
            fs::write(root.join(file), b"x").expect("fixture file should be written");
        }
        fs::write(nested.join("02.flac"), b"x").expect("fixture file should be written");

        let tracks = collect_tracks(&[root.clone(), root.join("01.mp3"), PathBuf::from("/nope")]);
        assert_eq!(tracks, vec![root.join("01.mp3"), nested.join("02.flac")]);

        let _ = fs::remove_dir_all(root);
    }
}
