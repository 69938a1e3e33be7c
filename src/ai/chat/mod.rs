pub mod core;
pub mod models;

pub use core::{Chat, ServiceUnavailable};
pub use models::Transcript;
