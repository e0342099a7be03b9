use crate::probe::context::TimeoutOrCancel;
use crate::probe::message::{ProbeShape, StartupParams};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
}

impl ProbeTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// How a single probe attempt ended when it did not fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Matched,
    Mismatched,
    /// The peer closed or reset before the full signature arrived.
    Incomplete,
    Unreachable,
    Cancelled(TimeoutOrCancel),
}

impl Verdict {
    pub fn is_detected(&self) -> bool {
        matches!(self, Verdict::Matched)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Matched => write!(f, "matched"),
            Verdict::Mismatched => write!(f, "mismatched"),
            Verdict::Incomplete => write!(f, "incomplete"),
            Verdict::Unreachable => write!(f, "unreachable"),
            Verdict::Cancelled(reason) => write!(f, "cancelled ({reason})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub verdict: Verdict,
    /// Response prefix actually read, never longer than the signature.
    pub received: Vec<u8>,
}

impl ProbeReport {
    pub fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            received: Vec::new(),
        }
    }

    pub fn with_received(verdict: Verdict, received: Vec<u8>) -> Self {
        Self { verdict, received }
    }

    pub fn detected(&self) -> bool {
        self.verdict.is_detected()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub target: Option<ProbeTarget>,
    pub input: Option<String>,
    pub concurrency: usize,
    pub rate: u32,
    pub timeout: Duration,
    pub shape: ProbeShape,
    pub startup: StartupParams,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum OutputFormat {
    Jsonl,
    Pretty,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jsonl => write!(f, "jsonl"),
            OutputFormat::Pretty => write!(f, "pretty"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub target: ProbeTarget,
    pub detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    pub shape: ProbeShape,
    pub received_hex: String,
    pub received_text: String,
    pub elapsed_ms: u128,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanOutcome {
    pub fn from_report(
        target: ProbeTarget,
        shape: ProbeShape,
        report: &ProbeReport,
        elapsed: Duration,
    ) -> Self {
        ScanOutcome {
            target,
            detected: report.detected(),
            verdict: Some(report.verdict),
            shape,
            received_hex: crate::util::hex::to_hex(&report.received),
            received_text: crate::util::sanitize_text(&report.received),
            elapsed_ms: elapsed.as_millis(),
            timestamp: crate::util::now_iso8601(),
            error: None,
        }
    }

    pub fn from_error(
        target: ProbeTarget,
        shape: ProbeShape,
        error: String,
        elapsed: Duration,
    ) -> Self {
        ScanOutcome {
            target,
            detected: false,
            verdict: None,
            shape,
            received_hex: String::new(),
            received_text: String::new(),
            elapsed_ms: elapsed.as_millis(),
            timestamp: crate::util::now_iso8601(),
            error: Some(error),
        }
    }

    pub fn status_text(&self) -> String {
        match (&self.verdict, &self.error) {
            (_, Some(_)) => "error".into(),
            (Some(verdict), None) => verdict.to_string(),
            (None, None) => "unknown".into(),
        }
    }
}
