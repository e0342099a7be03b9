use crate::model::{OutputConfig, OutputFormat, ScanOutcome};
use std::io::{BufWriter, Write};
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct OutputChannel {
    inner: std::sync::Arc<OutputInner>,
}

struct OutputInner {
    tx: tokio::sync::Mutex<Option<mpsc::Sender<ScanOutcome>>>,
    handle: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl OutputChannel {
    pub fn new(cfg: OutputConfig) -> anyhow::Result<Self> {
        Self::with_writer(cfg, std::io::stdout())
    }

    /// Same as [`OutputChannel::new`] but writes to `out` instead of stdout.
    pub fn with_writer<W>(cfg: OutputConfig, out: W) -> anyhow::Result<Self>
    where
        W: Write + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<ScanOutcome>(1024);
        let handle = tokio::task::spawn_blocking(move || {
            let mut writer = BufWriter::new(out);
            while let Some(outcome) = rx.blocking_recv() {
                if let Err(err) = write_outcome(&cfg, &mut writer, &outcome) {
                    tracing::error!(
                        error = %err,
                        target = %outcome.target,
                        "failed to write scan outcome"
                    );
                }
            }
            let _ = writer.flush();
        });

        Ok(Self {
            inner: std::sync::Arc::new(OutputInner {
                tx: tokio::sync::Mutex::new(Some(tx)),
                handle: tokio::sync::Mutex::new(Some(handle)),
            }),
        })
    }

    pub async fn emit(&self, outcome: ScanOutcome) -> anyhow::Result<()> {
        let guard = self.inner.tx.lock().await;
        if let Some(tx) = guard.as_ref() {
            tx.send(outcome)
                .await
                .map_err(|err| anyhow::anyhow!("output worker not available: {err}"))?
        } else {
            anyhow::bail!("output worker not available; dropping scan outcome");
        }
        Ok(())
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.inner.tx.lock().await.take();

        if let Some(handle) = self.inner.handle.lock().await.take() {
            handle
                .await
                .map_err(|err| anyhow::anyhow!("failed to join output worker: {err}"))?;
        }

        Ok(())
    }
}

fn write_outcome<W: Write>(
    cfg: &OutputConfig,
    writer: &mut W,
    outcome: &ScanOutcome,
) -> anyhow::Result<()> {
    match cfg.format {
        OutputFormat::Jsonl => {
            let line = serde_json::to_string(outcome)?;
            writeln!(writer, "{line}")?;
        }
        OutputFormat::Pretty => {
            let label = if outcome.detected {
                "postgres"
            } else {
                "not postgres"
            };
            writeln!(
                writer,
                "{} -> {} [{}] {}ms",
                outcome.target,
                label,
                outcome.status_text(),
                outcome.elapsed_ms
            )?;
            if !outcome.received_hex.is_empty() {
                writeln!(
                    writer,
                    "  received: {} ({})",
                    outcome.received_hex, outcome.received_text
                )?;
            }
            if let Some(error) = &outcome.error {
                writeln!(writer, "  error: {error}")?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}
