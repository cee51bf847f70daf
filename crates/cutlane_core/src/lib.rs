pub mod collision;
pub mod document;
pub mod editing;
pub mod error;
pub mod groups;
pub mod history;
pub mod snapping;
pub mod types;

pub use error::{CoreError, Result};
