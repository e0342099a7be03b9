pub mod context;
pub mod detector;
pub mod error;
pub mod message;
pub mod reader;

pub use context::{ProbeContext, TimeoutOrCancel};
pub use detector::{detect, Detector, PostgresProbe};
pub use error::ProbeError;
pub use message::{ProbeMessage, ProbeShape, StartupParams};
