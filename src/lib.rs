pub mod attachments;
pub mod auth;
pub mod config;
pub mod error;
pub mod html;
pub mod models;
pub mod multipart;
pub mod openapi;
pub mod pagination;
pub mod repo;
pub mod routes;
pub mod search;
pub mod security;
pub mod sidebar;
pub mod storage;
pub mod validation;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
