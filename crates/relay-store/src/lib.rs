pub mod database;
pub mod error;
pub mod jobs;
pub mod locations;
pub mod rejections;
pub mod row_helpers;
pub mod schema;
pub mod vendors;

pub use database::Database;
pub use error::StoreError;
