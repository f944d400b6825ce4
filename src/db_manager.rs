use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::warn;
use rusqlite::{params, Connection, OptionalExtension};

use crate::cover_art::cover_store::{CoverArtStore, TrackStore};
use crate::cover_art::update_queue::PendingCoverUpdate;
use crate::protocol::{CoverArtInfo, CoverId, CoverLocation, TrackId};

pub struct DbManager {
    conn: Connection,
}

impl DbManager {
    pub fn open(db_path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(db_path)?;
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    pub fn new_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    fn initialize_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS cover_art (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                location TEXT,
                hash TEXT NOT NULL
            )",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS cover_art_location_hash ON cover_art(location, hash)",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS library_tracks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                album TEXT NOT NULL DEFAULT '',
                cover_art_id INTEGER
            )",
            [],
        )?;
        Ok(())
    }

    /// Registers a track (or refreshes its album) and returns its id.
    pub fn upsert_library_track(
        &self,
        path: &Path,
        album: &str,
    ) -> Result<TrackId, rusqlite::Error> {
        let path_text = path.to_string_lossy().into_owned();
        self.conn.execute(
            "INSERT INTO library_tracks (path, album) VALUES (?1, ?2)
             ON CONFLICT(path) DO UPDATE SET album = excluded.album",
            params![path_text, album],
        )?;
        self.conn.query_row(
            "SELECT id FROM library_tracks WHERE path = ?1",
            params![path_text],
            |row| row.get(0),
        )
    }

    pub fn get_cover_info(&self, track_id: TrackId) -> Result<CoverArtInfo, rusqlite::Error> {
        let (path, album, location, hash) = self.conn.query_row(
            "SELECT t.path, t.album, c.location, c.hash
             FROM library_tracks t
             LEFT JOIN cover_art c ON c.id = t.cover_art_id
             WHERE t.id = ?1",
            params![track_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )?;

        let track_location = PathBuf::from(path);
        let mut info = CoverArtInfo::from_track_location(track_id, &track_location);
        info.album = album;
        info.cover_location = location.as_deref().and_then(CoverLocation::from_stored);
        info.hash = hash.unwrap_or_default();
        Ok(info)
    }

    fn find_cover_id(
        &self,
        location: Option<&str>,
        hash: &str,
    ) -> Result<Option<CoverId>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id FROM cover_art WHERE location IS ?1 AND hash = ?2",
                params![location, hash],
                |row| row.get(0),
            )
            .optional()
    }

    pub fn save_cover(
        &self,
        location: Option<&CoverLocation>,
        hash: &str,
    ) -> Result<CoverId, rusqlite::Error> {
        let stored_location = location.map(CoverLocation::to_stored);
        if let Some(existing) = self.find_cover_id(stored_location.as_deref(), hash)? {
            return Ok(existing);
        }
        self.conn.execute(
            "INSERT INTO cover_art (location, hash) VALUES (?1, ?2)",
            params![stored_location, hash],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Saves every update in one transaction, skipping rows that fail.
    pub fn save_covers(
        &self,
        updates: &HashMap<TrackId, PendingCoverUpdate>,
    ) -> Result<Vec<(TrackId, CoverId)>, rusqlite::Error> {
        let tx = self.conn.unchecked_transaction()?;
        let mut committed = Vec::with_capacity(updates.len());
        for (track_id, update) in updates {
            match self.save_cover(update.cover_location.as_ref(), &update.hash) {
                Ok(cover_id) => committed.push((*track_id, cover_id)),
                Err(err) => {
                    warn!(
                        "DbManager: skipping cover for track {} ({}): {}",
                        track_id,
                        update.hash,
                        err
                    );
                }
            }
        }
        tx.commit()?;
        Ok(committed)
    }

    pub fn get_track_location(&self, track_id: TrackId) -> Result<PathBuf, rusqlite::Error> {
        self.conn.query_row(
            "SELECT path FROM library_tracks WHERE id = ?1",
            params![track_id],
            |row| Ok(PathBuf::from(row.get::<_, String>(0)?)),
        )
    }

    pub fn get_track_cover_id(
        &self,
        track_id: TrackId,
    ) -> Result<Option<CoverId>, rusqlite::Error> {
        self.conn.query_row(
            "SELECT cover_art_id FROM library_tracks WHERE id = ?1",
            params![track_id],
            |row| row.get(0),
        )
    }

    pub fn set_track_cover(
        &self,
        track_id: TrackId,
        cover_id: CoverId,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE library_tracks SET cover_art_id = ?1 WHERE id = ?2",
            params![cover_id, track_id],
        )?;
        Ok(())
    }

    pub fn set_track_covers(&self, covers: &[(TrackId, CoverId)]) -> Result<(), rusqlite::Error> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = self
                .conn
                .prepare("UPDATE library_tracks SET cover_art_id = ?1 WHERE id = ?2")?;
            for (track_id, cover_id) in covers {
                stmt.execute(params![cover_id, track_id])?;
            }
        }
        tx.commit()
    }
}

impl CoverArtStore for DbManager {
    fn get_cover_info(&self, track_id: TrackId) -> Result<CoverArtInfo, String> {
        DbManager::get_cover_info(self, track_id)
            .map_err(|err| format!("Failed to load cover info for track {}: {}", track_id, err))
    }

    fn save_cover(&self, location: Option<&CoverLocation>, hash: &str) -> Result<CoverId, String> {
        DbManager::save_cover(self, location, hash)
            .map_err(|err| format!("Failed to save cover {}: {}", hash, err))
    }

    fn save_covers(
        &self,
        updates: &HashMap<TrackId, PendingCoverUpdate>,
    ) -> Result<Vec<(TrackId, CoverId)>, String> {
        DbManager::save_covers(self, updates)
            .map_err(|err| format!("Failed to save {} covers: {}", updates.len(), err))
    }
}

impl TrackStore for DbManager {
    fn get_track_location(&self, track_id: TrackId) -> Result<PathBuf, String> {
        DbManager::get_track_location(self, track_id)
            .map_err(|err| format!("Failed to load location for track {}: {}", track_id, err))
    }

    fn set_track_cover(&self, track_id: TrackId, cover_id: CoverId) -> Result<(), String> {
        DbManager::set_track_cover(self, track_id, cover_id)
            .map_err(|err| format!("Failed to set cover for track {}: {}", track_id, err))
    }

    fn set_track_covers(&self, covers: &[(TrackId, CoverId)]) -> Result<(), String> {
        DbManager::set_track_covers(self, covers)
            .map_err(|err| format!("Failed to set {} track covers: {}", covers.len(), err))
    }
}

#[cfg(test)]
mod tests {
    use super::DbManager;
    use crate::cover_art::update_queue::PendingCoverUpdate;
    use crate::protocol::{CoverLocation, NO_COVER_ID};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_upsert_library_track_is_idempotent_per_path() {
        let db = DbManager::new_in_memory().expect("failed to create in-memory db");
        let first = db
            .upsert_library_track(Path::new("/music/a/01.flac"), "A")
            .expect("insert should succeed");
        let again = db
            .upsert_library_track(Path::new("/music/a/01.flac"), "A (Deluxe)")
            .expect("upsert should succeed");
        assert_eq!(first, again);
        assert_eq!(
            db.get_cover_info(first).expect("info should load").album,
            "A (Deluxe)"
        );
    }

    #[test]
    fn test_get_cover_info_without_cover_reports_search_inputs() {
        let db = DbManager::new_in_memory().expect("failed to create in-memory db");
        let track_id = db
            .upsert_library_track(Path::new("/music/album/02 song.mp3"), "Album")
            .expect("insert should succeed");

        let info = db.get_cover_info(track_id).expect("info should load");
        assert_eq!(info.track_id, track_id);
        assert_eq!(info.cover_location, None);
        assert_eq!(info.hash, "");
        assert_eq!(info.track_directory, PathBuf::from("/music/album"));
        assert_eq!(info.track_base_name, "02 song");
        assert_eq!(info.album, "Album");
        assert!(db.get_cover_info(track_id + 100).is_err());
    }

    #[test]
    fn test_save_cover_reuses_identical_records() {
        let db = DbManager::new_in_memory().expect("failed to create in-memory db");
        let location = CoverLocation::Path(PathBuf::from("/music/album/cover.jpg"));
        let first = db.save_cover(Some(&location), "abc").expect("save should succeed");
        let second = db.save_cover(Some(&location), "abc").expect("save should succeed");
        let embedded = db
            .save_cover(Some(&CoverLocation::Embedded), "abc")
            .expect("save should succeed");
        let missing = db.save_cover(None, "empty").expect("save should succeed");
        let missing_again = db.save_cover(None, "empty").expect("save should succeed");
        assert_eq!(first, second);
        assert_ne!(first, embedded);
        assert_eq!(missing, missing_again);
    }

    #[test]
    fn test_batched_saves_link_tracks_to_covers() {
        let db = DbManager::new_in_memory().expect("failed to create in-memory db");
        let first = db
            .upsert_library_track(Path::new("/music/a/01.flac"), "A")
            .expect("insert should succeed");
        let second = db
            .upsert_library_track(Path::new("/music/b/01.flac"), "B")
            .expect("insert should succeed");

        let mut updates = HashMap::new();
        updates.insert(
            first,
            PendingCoverUpdate {
                cover_location: Some(CoverLocation::Embedded),
                hash: "hash-a".to_string(),
            },
        );
        updates.insert(
            second,
            PendingCoverUpdate {
                cover_location: Some(CoverLocation::Path(PathBuf::from("/music/b/cover.png"))),
                hash: "hash-b".to_string(),
            },
        );

        let committed = db.save_covers(&updates).expect("batch save should succeed");
        assert_eq!(committed.len(), 2);
        db.set_track_covers(&committed)
            .expect("batch link should succeed");

        let info = db.get_cover_info(second).expect("info should load");
        assert_eq!(
            info.cover_location,
            Some(CoverLocation::Path(PathBuf::from("/music/b/cover.png")))
        );
        assert_eq!(info.hash, "hash-b");
        assert_eq!(
            db.get_cover_info(first).expect("info should load").cover_location,
            Some(CoverLocation::Embedded)
        );
    }

    #[test]
    fn test_no_cover_sentinel_clears_cover_info() {
        let db = DbManager::new_in_memory().expect("failed to create in-memory db");
        let track_id = db
            .upsert_library_track(Path::new("/music/a/01.flac"), "A")
            .expect("insert should succeed");
        let cover_id = db
            .save_cover(Some(&CoverLocation::Embedded), "abc")
            .expect("save should succeed");
        db.set_track_cover(track_id, cover_id)
            .expect("link should succeed");
        db.set_track_cover(track_id, NO_COVER_ID)
            .expect("clear should succeed");

        assert_eq!(
            db.get_track_cover_id(track_id).expect("cover id should load"),
            Some(NO_COVER_ID)
        );
        let info = db.get_cover_info(track_id).expect("info should load");
        assert_eq!(info.cover_location, None);
        assert_eq!(info.hash, "");
        assert_eq!(
            db.get_track_location(track_id).expect("location should load"),
            PathBuf::from("/music/a/01.flac")
        );
    }
}
