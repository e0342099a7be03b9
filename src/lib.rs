pub mod engine;
pub mod input;
pub mod model;
pub mod output;
pub mod probe;
pub mod util;

pub use model::{ProbeReport, ProbeTarget, Verdict};
pub use probe::{detect, Detector, PostgresProbe, ProbeContext, ProbeError};
