mod routes;

pub mod app;
pub mod client;
pub mod config;
pub mod image_utils;
pub mod models;
pub mod navigation;
pub mod server;
pub mod telemetry;
pub mod views;
pub mod workflow;

pub use app::start_app;
