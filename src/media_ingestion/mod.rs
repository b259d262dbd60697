//! PDF uploads for the main backend.

pub mod upload;
pub mod validation;

pub use upload::{handle_file_upload, list_files};
