mod connection;
mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use helpers::parse_datetime;
pub use repositories::LocalWrite;
