pub mod db;
pub mod postgres;
pub mod rows;
pub mod session;
pub mod sqlite;
