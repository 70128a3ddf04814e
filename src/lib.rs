#[macro_use]
extern crate tracing;

pub mod auth;
pub mod carve;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod gzip;
pub mod manifest;
pub mod orchestrator;
pub mod peek;
pub mod range_reader;
pub mod reference;
pub mod tar_header;

pub type Result<T> = std::result::Result<T, error::Error>;
