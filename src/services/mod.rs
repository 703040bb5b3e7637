pub mod batch_tracker;
pub mod catalog;
pub mod chunk_assembler;
pub mod clock;
pub mod content_store;
pub mod deletion_service;
pub mod error;
pub mod local_storage;
pub mod s3_storage;
pub mod sweeper;
pub mod upload_registry;
pub mod upload_service;
pub mod url_cache;
