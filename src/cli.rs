use clap::{ArgAction, Parser};
use pg_probe::input::is_ipv6_literal;
use pg_probe::model::{Config, OutputConfig, OutputFormat, ProbeTarget};
use pg_probe::probe::{ProbeShape, StartupParams};
use std::time::Duration;

const MAX_RATE: u32 = 1_000_000;

#[derive(Debug, Parser)]
#[command(author, version, about = "Detect PostgreSQL wire protocol endpoints", long_about = None)]
pub struct Cli {
    /// Single host to probe
    #[arg(short = 'H', long = "host", value_name = "HOST")]
    pub host: Option<String>,

    /// Port of the single host
    #[arg(
        short = 'p',
        long = "port",
        value_name = "PORT",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub port: Option<u16>,

    /// File containing host:port targets (one per line)
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: Option<String>,

    /// Maximum probes in flight
    #[arg(long = "concurrency", default_value_t = 64)]
    pub concurrency: usize,

    /// New connections per second
    #[arg(long = "rate", default_value_t = 64)]
    pub rate: u32,

    /// Per-target deadline in milliseconds (connect, write and read together)
    #[arg(long = "timeout", default_value_t = 3000)]
    pub timeout_ms: u64,

    /// Startup-phase request to send
    #[arg(long = "shape", value_enum, default_value_t = ProbeShape::Startup)]
    pub shape: ProbeShape,

    /// Value of the `user` startup parameter
    #[arg(long = "user", default_value = "postgres")]
    pub user: String,

    /// Value of the `database` startup parameter
    #[arg(long = "database", default_value = "postgres")]
    pub database: String,

    /// Output format
    #[arg(long = "output", value_enum, default_value_t = OutputFormat::Jsonl)]
    pub output: OutputFormat,

    /// Shorthand for --output pretty
    #[arg(long = "pretty", action = ArgAction::SetTrue)]
    pub pretty: bool,
}

impl Cli {
    pub fn into_config(self) -> anyhow::Result<Config> {
        if self.host.is_none() && self.input.is_none() {
            anyhow::bail!("either --host/--port or --input is required");
        }

        if self.host.is_some() && self.input.is_some() {
            anyhow::bail!("--host/--port and --input are mutually exclusive");
        }

        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be greater than zero");
        }

        if self.rate == 0 {
            anyhow::bail!("rate must be greater than zero");
        }

        if self.rate > MAX_RATE {
            anyhow::bail!("rate must be at most {MAX_RATE} connections per second");
        }

        if self.timeout_ms == 0 {
            anyhow::bail!("timeout must be greater than zero");
        }

        let target = match (self.host, self.port) {
            (Some(host), _) if is_ipv6_literal(&host) => {
                anyhow::bail!("IPv6 host {host} is not supported; only IPv4 is probed")
            }
            (Some(host), Some(port)) => Some(ProbeTarget::new(host, port)),
            (None, None) => None,
            _ => anyhow::bail!("--host and --port must be used together"),
        };

        Ok(Config {
            target,
            input: self.input,
            concurrency: self.concurrency,
            rate: self.rate,
            timeout: Duration::from_millis(self.timeout_ms),
            shape: self.shape,
            startup: StartupParams {
                user: self.user,
                database: self.database,
            },
            output: OutputConfig {
                format: if self.pretty {
                    OutputFormat::Pretty
                } else {
                    self.output
                },
            },
        })
    }
}
