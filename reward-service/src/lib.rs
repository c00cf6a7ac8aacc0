pub mod config;
pub mod db;
pub mod error;
pub mod flow;
pub mod memory;
pub mod rewards;
pub mod routes;
pub mod store;
