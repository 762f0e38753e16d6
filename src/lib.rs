pub mod catalog;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod http_server;
pub mod memory;
pub mod models;
pub mod resources;
pub mod schema;
pub mod service;
pub mod storage;

pub use config::AppConfig;
pub use engine::ContentEngine;
pub use error::ContentError;
pub use http_server::HttpServer;
