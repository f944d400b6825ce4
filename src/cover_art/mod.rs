pub mod cover_art_cache;
pub mod cover_source;
pub mod cover_store;
pub mod image_resolver;
pub mod pixmap_cache;
pub mod result_channel;
pub mod update_queue;
