use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStopReason {
    Complete,
    ConnectionClosed,
}

#[derive(Debug, Clone)]
pub struct ReadResult {
    pub bytes: Vec<u8>,
    pub reason: ReadStopReason,
}

impl ReadResult {
    pub fn is_complete(&self) -> bool {
        self.reason == ReadStopReason::Complete
    }
}

/// Reads exactly as many bytes as a signature needs, stopping early only when
/// the peer closes the stream.
pub struct SignatureReader {
    want: usize,
}

impl SignatureReader {
    pub fn new(want: usize) -> Self {
        Self { want }
    }

    pub async fn read<T: AsyncRead + Unpin>(
        &mut self,
        stream: &mut T,
    ) -> std::io::Result<ReadResult> {
        let mut buf = vec![0u8; self.want];
        let mut total = 0usize;
        let mut reason = ReadStopReason::Complete;
        while total < self.want {
            let n = stream.read(&mut buf[total..]).await?;
            if n == 0 {
                reason = ReadStopReason::ConnectionClosed;
                break;
            }
            total += n;
        }
        buf.truncate(total);
        Ok(ReadResult { bytes: buf, reason })
    }
}
