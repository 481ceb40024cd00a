//! Types shared by the Docker Hub rate-limit exporter crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
