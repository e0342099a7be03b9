use super::context::{ProbeContext, TimeoutOrCancel};
use super::error::{is_disconnect, ProbeError};
use super::message::{ProbeMessage, ProbeShape, StartupParams};
use super::reader::SignatureReader;
use crate::model::{ProbeReport, ProbeTarget, Verdict};
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, instrument, trace};

#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    async fn probe(
        &self,
        ctx: &ProbeContext,
        target: &ProbeTarget,
    ) -> Result<ProbeReport, ProbeError>;

    async fn detect(&self, ctx: &ProbeContext, target: &ProbeTarget) -> Result<bool, ProbeError> {
        Ok(self.probe(ctx, target).await?.detected())
    }
}

/// Decides whether an endpoint speaks the PostgreSQL wire protocol by sending
/// one startup-phase request and comparing the reply prefix byte for byte.
///
/// The probe holds no per-call state; one instance can be shared by any number
/// of concurrent calls.
#[derive(Clone, Debug)]
pub struct PostgresProbe {
    message: ProbeMessage,
}

impl Default for PostgresProbe {
    fn default() -> Self {
        Self::new(ProbeMessage::startup(&StartupParams::default()))
    }
}

impl PostgresProbe {
    pub fn new(message: ProbeMessage) -> Self {
        Self { message }
    }

    pub fn with_shape(shape: ProbeShape, params: &StartupParams) -> Self {
        Self::new(ProbeMessage::for_shape(shape, params))
    }

    pub fn message(&self) -> &ProbeMessage {
        &self.message
    }

    #[instrument(skip_all, fields(addr = %target, shape = %self.message.shape()))]
    async fn probe_target(
        &self,
        ctx: &ProbeContext,
        target: &ProbeTarget,
    ) -> Result<ProbeReport, ProbeError> {
        if target.port == 0 {
            return Ok(ProbeReport::new(Verdict::Unreachable));
        }

        let mut stream = match ctx.run(connect_v4(target)).await {
            Err(reason) => return Ok(cancelled(reason)),
            Ok(None) => return Ok(ProbeReport::new(Verdict::Unreachable)),
            Ok(Some(stream)) => stream,
        };

        let res = self.exchange(ctx, &mut stream).await;
        drop(stream);
        match &res {
            Ok(report) => debug!(
                verdict = %report.verdict,
                bytes = report.received.len(),
                "probe finished"
            ),
            Err(err) => debug!(error = %err, "probe faulted"),
        }
        res
    }

    /// Runs the send/await/compare steps over an already connected transport.
    pub async fn exchange<S>(
        &self,
        ctx: &ProbeContext,
        stream: &mut S,
    ) -> Result<ProbeReport, ProbeError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let request = self.message.as_bytes();
        let written = match ctx.run(write_fully(stream, request)).await {
            Err(reason) => return Ok(cancelled(reason)),
            Ok(Err(err)) if is_disconnect(&err) => {
                trace!(error = %err, "peer dropped during write");
                return Ok(ProbeReport::new(Verdict::Incomplete));
            }
            Ok(Err(err)) => return Err(ProbeError::Write(err)),
            Ok(Ok(written)) => written,
        };
        if written != request.len() {
            return Err(ProbeError::ShortWrite {
                written,
                expected: request.len(),
            });
        }

        let mut reader = SignatureReader::new(self.message.signature().len());
        let read = match ctx.run(reader.read(stream)).await {
            Err(reason) => return Ok(cancelled(reason)),
            Ok(Err(err)) if is_disconnect(&err) => {
                trace!(error = %err, "peer dropped during read");
                return Ok(ProbeReport::new(Verdict::Incomplete));
            }
            Ok(Err(err)) => return Err(ProbeError::Read(err)),
            Ok(Ok(read)) => read,
        };

        if !read.is_complete() {
            return Ok(ProbeReport::with_received(Verdict::Incomplete, read.bytes));
        }

        let verdict = if self.message.matches(&read.bytes) {
            Verdict::Matched
        } else {
            Verdict::Mismatched
        };
        Ok(ProbeReport::with_received(verdict, read.bytes))
    }
}

#[async_trait]
impl Detector for PostgresProbe {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn probe(
        &self,
        ctx: &ProbeContext,
        target: &ProbeTarget,
    ) -> Result<ProbeReport, ProbeError> {
        self.probe_target(ctx, target).await
    }
}

/// Probes `host:port` with the default startup request.
pub async fn detect(ctx: &ProbeContext, host: &str, port: u16) -> Result<bool, ProbeError> {
    PostgresProbe::default()
        .detect(ctx, &ProbeTarget::new(host, port))
        .await
}

fn cancelled(reason: TimeoutOrCancel) -> ProbeReport {
    trace!(%reason, "context finished before the probe resolved");
    ProbeReport::new(Verdict::Cancelled(reason))
}

/// Tries every IPv4 address `target` resolves to, in order. Any failure,
/// including resolution, means there is nothing to probe.
async fn connect_v4(target: &ProbeTarget) -> Option<TcpStream> {
    let addrs = match lookup_host((target.host.as_str(), target.port)).await {
        Ok(addrs) => addrs,
        Err(err) => {
            trace!(error = %err, "resolution failed");
            return None;
        }
    };

    for addr in addrs.filter(SocketAddr::is_ipv4) {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Some(stream),
            Err(err) => trace!(%addr, error = %err, "connect failed"),
        }
    }
    None
}

/// Like `write_all`, but reports how far it got when the transport stops
/// accepting bytes instead of turning that into an error.
async fn write_fully<S: AsyncWrite + Unpin>(stream: &mut S, bytes: &[u8]) -> io::Result<usize> {
    let mut written = 0;
    while written < bytes.len() {
        match stream.write(&bytes[written..]).await? {
            0 => break,
            n => written += n,
        }
    }
    stream.flush().await?;
    Ok(written)
}
