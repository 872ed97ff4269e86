mod connection;
mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use helpers::timestamp_key;
pub use models::{Reading, SessionInfo};
