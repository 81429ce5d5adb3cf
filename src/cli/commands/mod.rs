pub mod config;
pub mod ping;
pub mod routes;
