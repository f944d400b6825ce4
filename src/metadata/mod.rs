pub mod metadata_tags;
