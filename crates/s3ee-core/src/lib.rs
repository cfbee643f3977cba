pub mod config;
pub mod error;

pub use config::{EnvelopeLocation, S3eeConfig, DEFAULT_INSTRUCTION_SUFFIX};
pub use error::{S3eeError, S3eeResult};
