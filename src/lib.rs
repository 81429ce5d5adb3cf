pub mod cli;
pub mod config;
pub mod context;
pub mod controllers;
pub mod database;
pub mod error;
pub mod orchestrator;
pub mod render;
pub mod response;
pub mod routes;
pub mod session;
pub mod supervisor;
