pub mod delete_handlers;
pub mod health_handlers;
pub mod identity;
pub mod media_handlers;
pub mod upload_handlers;
