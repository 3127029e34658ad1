//! Google Drive → Notion change relay.
//!
//! Watches a shared drive through Drive's change-notification channels and
//! mirrors every new file as a page in a Notion database, routed by the
//! file's parent (or grandparent) folder name.

pub mod config;
pub mod db;
pub mod drive;
pub mod model;
pub mod notion;
pub mod resolver;
pub mod sync;
