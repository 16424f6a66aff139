pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod images;
pub mod logging;
pub mod probe;
pub mod utils;
