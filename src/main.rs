use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use coverart::config::load_or_create_config;
use coverart::db_manager::DbManager;
use coverart::metadata::metadata_tags::read_album_title;
use coverart::protocol::TrackId;
use coverart::track_discovery::collect_tracks;
use coverart::{
    CoverArtCache, CoverArtMessage, CoverRequest, FileSystemCoverSource, PixmapCache,
};
use log::{debug, info, warn};
use tokio::sync::broadcast::{self, error::TryRecvError, Receiver};

const MAX_IN_FLIGHT: usize = 16;

#[derive(Default)]
struct Report {
    found: usize,
    missing: usize,
}

fn drain_bus(
    bus_consumer: &mut Receiver<CoverArtMessage>,
    tracks: &HashMap<TrackId, PathBuf>,
    report: &mut Report,
) {
    loop {
        match bus_consumer.try_recv() {
            Ok(CoverArtMessage::PixmapFound { track_id, image }) => {
                let path = tracks
                    .get(&track_id)
                    .map(|path| path.display().to_string())
                    .unwrap_or_default();
                match image {
                    Some(image) => {
                        report.found += 1;
                        info!("{}: cover {}x{}", path, image.width(), image.height());
                    }
                    None => {
                        report.missing += 1;
                        info!("{}: no cover", path);
                    }
                }
            }
            Ok(CoverArtMessage::RequestRepaint) => {}
            Err(TryRecvError::Lagged(skipped)) => {
                warn!("Cover-art bus lagged, skipped {} messages", skipped);
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Debug);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let paths: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if paths.is_empty() {
        warn!("Usage: coverart <files-or-directories>...");
        return Ok(());
    }

    let config_dir = dirs::config_dir()
        .ok_or("No config directory available")?
        .join("coverart");
    let config = load_or_create_config(&config_dir.join("config.toml"));

    let data_dir = dirs::data_dir()
        .ok_or("No data directory available")?
        .join("coverart");
    std::fs::create_dir_all(&data_dir)?;
    let db = Rc::new(DbManager::open(&data_dir.join("library.db"))?);

    let (bus_producer, mut bus_consumer) = broadcast::channel(1024);
    let mut cover_art_cache = CoverArtCache::new(
        &config.cover_art,
        PixmapCache::new(config.cover_art.memory_cache_budget_bytes()),
        Arc::new(FileSystemCoverSource),
        bus_producer,
    );
    cover_art_cache.set_cover_store(db.clone());
    cover_art_cache.set_track_store(db.clone());

    let (wake_sender, wake_receiver) = mpsc::channel::<()>();
    cover_art_cache.set_completion_waker(Some(Arc::new(move || {
        let _ = wake_sender.send(());
    })));

    let track_paths = collect_tracks(&paths);
    info!("Resolving covers for {} tracks", track_paths.len());

    let mut tracks = HashMap::new();
    let mut report = Report::default();
    for track_path in track_paths {
        let album = read_album_title(&track_path);
        let track_id = match db.upsert_library_track(&track_path, &album) {
            Ok(track_id) => track_id,
            Err(err) => {
                warn!("Failed to register {}: {}", track_path.display(), err);
                continue;
            }
        };

        let mut request = CoverRequest::new(track_id, &track_path);
        match db.get_cover_info(track_id) {
            Ok(info) => {
                if let Some(location) = info.cover_location {
                    request = request.with_cover(location, info.hash);
                }
            }
            Err(err) => debug!("No stored cover for {}: {}", track_path.display(), err),
        }
        tracks.insert(track_id, track_path);

        while cover_art_cache.in_flight_count() >= MAX_IN_FLIGHT {
            let _ = wake_receiver.recv_timeout(Duration::from_millis(100));
            cover_art_cache.process_completed();
            drain_bus(&mut bus_consumer, &tracks, &mut report);
        }
        cover_art_cache.request_pixmap(&request, false, false);
        drain_bus(&mut bus_consumer, &tracks, &mut report);
    }

    let persisted = cover_art_cache.shutdown();
    drain_bus(&mut bus_consumer, &tracks, &mut report);
    info!(
        "Done: {} covers found, {} tracks without cover, {} cover links saved on shutdown",
        report.found, report.missing, persisted
    );
    Ok(())
}
