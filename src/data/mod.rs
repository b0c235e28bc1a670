pub mod database;
pub mod model;
pub mod password;
pub mod repository;

pub use database::Database;
pub use model::*;
pub use repository::*;
