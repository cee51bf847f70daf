pub mod cache;
pub mod companion;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod job;
pub mod progress;
pub mod render;
pub mod runner;

pub use error::{RenderError, Result};
