pub mod rate;

use crate::input::stream_targets;
use crate::model::{Config, ProbeTarget, ScanOutcome};
use crate::output::OutputChannel;
use crate::probe::{Detector, PostgresProbe, ProbeContext, ProbeShape};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use rate::ConnectPacer;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub scanned: usize,
    pub detected: usize,
    pub errors: usize,
}

/// Drives one probe per target with bounded concurrency and paced connects.
pub struct Engine {
    cfg: Arc<Config>,
    sink: OutputChannel,
    pacer: ConnectPacer,
    sem: Arc<Semaphore>,
    detector: Arc<dyn Detector>,
    ctx: ProbeContext,
}

impl Engine {
    pub fn new(cfg: Config, sink: OutputChannel) -> anyhow::Result<Self> {
        let detector = Arc::new(PostgresProbe::with_shape(cfg.shape, &cfg.startup));
        Self::with_detector(cfg, sink, detector)
    }

    pub fn with_detector(
        cfg: Config,
        sink: OutputChannel,
        detector: Arc<dyn Detector>,
    ) -> anyhow::Result<Self> {
        if cfg.concurrency == 0 {
            anyhow::bail!("concurrency must be greater than zero");
        }
        Ok(Self {
            pacer: ConnectPacer::new(cfg.rate),
            sem: Arc::new(Semaphore::new(cfg.concurrency)),
            cfg: Arc::new(cfg),
            sink,
            detector,
            ctx: ProbeContext::new(),
        })
    }

    /// Root context of the scan; cancelling it stops new probes and resolves
    /// in-flight ones as cancelled.
    pub fn context(&self) -> &ProbeContext {
        &self.ctx
    }

    #[instrument(skip(self), fields(detector = self.detector.name()))]
    pub async fn run(&mut self) -> anyhow::Result<ScanSummary> {
        let mut targets = stream_targets(&self.cfg)?;
        let mut tasks = FuturesUnordered::new();

        while let Some(target) = targets.next().await {
            if self.ctx.is_done() {
                debug!("scan cancelled; not launching remaining targets");
                break;
            }
            self.pacer.acquire().await;
            let permit = self.sem.clone().acquire_owned().await?;
            if self.ctx.is_done() {
                debug!("scan cancelled while waiting for a slot");
                break;
            }
            let ctx = self.ctx.child().with_timeout(self.cfg.timeout);
            let detector = self.detector.clone();
            let sink = self.sink.clone();
            let shape = self.cfg.shape;
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                let outcome = probe_one(detector.as_ref(), &ctx, target, shape).await;
                let tally = (outcome.detected, outcome.error.is_some());
                if let Err(err) = sink.emit(outcome).await {
                    warn!(error = %err, "dropping scan outcome");
                }
                tally
            }));

            self.pacer.sleep_jitter().await;
        }

        let mut summary = ScanSummary::default();
        while let Some(res) = tasks.next().await {
            summary.scanned += 1;
            match res {
                Ok((detected, errored)) => {
                    summary.detected += detected as usize;
                    summary.errors += errored as usize;
                }
                Err(err) => {
                    warn!(error = %err, "probe task failed");
                    summary.errors += 1;
                }
            }
        }

        self.sink.shutdown().await?;
        Ok(summary)
    }
}

async fn probe_one(
    detector: &dyn Detector,
    ctx: &ProbeContext,
    target: ProbeTarget,
    shape: ProbeShape,
) -> ScanOutcome {
    let start = Instant::now();
    match detector.probe(ctx, &target).await {
        Ok(report) => {
            debug!(target = %target, verdict = %report.verdict, "processed target");
            ScanOutcome::from_report(target, shape, &report, start.elapsed())
        }
        Err(err) => {
            warn!(
                target = %target,
                error = %err,
                transient = err.is_transient(),
                "probe attempt faulted"
            );
            ScanOutcome::from_error(target, shape, err.to_string(), start.elapsed())
        }
    }
}
