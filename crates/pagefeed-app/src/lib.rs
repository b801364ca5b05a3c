pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod paths;
pub mod pipeline;
pub mod raster;
pub mod server;
pub mod services;
