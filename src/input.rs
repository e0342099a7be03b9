use crate::model::{Config, ProbeTarget};
use anyhow::Context;
use std::net::Ipv6Addr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub fn stream_targets(cfg: &Config) -> anyhow::Result<ReceiverStream<ProbeTarget>> {
    let (tx, rx) = mpsc::channel(256);

    if let Some(target) = cfg.target.clone() {
        let tx = tx.clone();
        tokio::spawn(async move {
            tx.send(target).await.ok();
        });
    }

    if let Some(path) = cfg.input.clone() {
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(err) = read_file(path, tx).await {
                tracing::error!(error = %err, "failed to read input file");
            }
        });
    }

    drop(tx);
    Ok(ReceiverStream::new(rx))
}

async fn read_file(path: String, tx: mpsc::Sender<ProbeTarget>) -> anyhow::Result<()> {
    let file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("cannot open input {}", path))?;
    let mut reader = BufReader::new(file).lines();
    while let Some(line) = reader.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_target(trimmed) {
            Some(target) if is_ipv6_literal(&target.host) => {
                tracing::warn!(line = %trimmed, "skipping IPv6 target; only IPv4 is probed")
            }
            Some(target) => {
                if tx.send(target).await.is_err() {
                    break;
                }
            }
            None => tracing::warn!(line = %trimmed, "skipping invalid target"),
        }
    }
    Ok(())
}

/// True for `::1` and `[::1]` style hosts, which the IPv4-only probe can
/// never reach.
pub fn is_ipv6_literal(host: &str) -> bool {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<Ipv6Addr>()
        .is_ok()
}

pub fn parse_target(line: &str) -> Option<ProbeTarget> {
    let (host_part, port_part) = line.rsplit_once(':')?;
    let host = host_part
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    let port: u16 = port_part.trim().parse().ok()?;
    if port == 0 {
        return None;
    }
    Some(ProbeTarget::new(host, port))
}
