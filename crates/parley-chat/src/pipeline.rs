//! Streaming response pipeline.
//!
//! Opens the upstream generation stream, forwards every raw chunk to the
//! caller untouched, decodes a parallel best-effort reading of the same
//! bytes, and writes exactly one exchange record when the stream ends.
//!
//! Lifecycle:
//! Connecting -> Streaming -> Stopping -> Finalizing -> Closed
//! Connecting -> Failed
//! Streaming -> Finalizing (end of stream, transport error, idle timeout, abandonment)

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio::runtime::RuntimeFlavor;
use tracing::{debug, error, info, warn};

use parley_core::types::{ExchangeLogRecord, GenerationRequest, PendingExchange};

use crate::decoder::TokenDecoder;
use crate::error::{ConnectionError, LogWriteError, StreamError};
use crate::generation::{ChunkStream, GenerationBackend};
use crate::log_writer::ExchangeSink;

/// Default bound on the wait for response headers and between chunks.
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(60);

/// Lifecycle state of one pipeline instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Connecting,
    Streaming,
    Stopping,
    Finalizing,
    Closed,
    Failed,
}

/// Why streaming ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishReason {
    EndOfStream,
    StopSignal,
    TransportError,
    IdleTimeout,
    Abandoned,
}

/// Whether `from -> to` is a legal lifecycle step.
pub fn is_valid_transition(from: PipelineState, to: PipelineState) -> bool {
    use PipelineState::*;
    matches!(
        (from, to),
        (Connecting, Streaming)
            | (Connecting, Failed)
            | (Streaming, Stopping)
            | (Streaming, Finalizing)
            | (Stopping, Finalizing)
            | (Finalizing, Closed)
    )
}

/// State owned by one exchange: decoder, accumulated reply and the pending
/// log record. Finalization runs at most once; if a streaming exchange is
/// dropped before that, `Drop` finalizes with whatever was accumulated. A
/// failed exchange never finalizes.
struct Exchange {
    state: PipelineState,
    decoder: TokenDecoder,
    response_text: String,
    chunks: u64,
    pending: Option<PendingExchange>,
    sink: Arc<dyn ExchangeSink>,
}

impl Exchange {
    /// An exchange waiting for its upstream connection.
    fn connecting(pending: PendingExchange, sink: Arc<dyn ExchangeSink>) -> Self {
        Self {
            state: PipelineState::Connecting,
            decoder: TokenDecoder::new(),
            response_text: String::new(),
            chunks: 0,
            pending: Some(pending),
            sink,
        }
    }

    /// An exchange whose upstream connection is already open.
    #[cfg(test)]
    fn open(pending: PendingExchange, sink: Arc<dyn ExchangeSink>) -> Self {
        let mut exchange = Self::connecting(pending, sink);
        exchange.transition(PipelineState::Streaming);
        exchange
    }

    /// The upstream could not be opened. Discards the pending record.
    fn fail(&mut self) {
        self.pending = None;
        self.transition(PipelineState::Failed);
    }

    fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, to: PipelineState) {
        debug_assert!(
            is_valid_transition(self.state, to),
            "invalid pipeline transition {:?} -> {:?}",
            self.state,
            to
        );
        debug!(from = ?self.state, to = ?to, "Pipeline transition");
        self.state = to;
    }

    /// Decode a forwarded chunk into the running reply. Moves to `Stopping`
    /// when the chunk carries a stop signal.
    fn absorb(&mut self, chunk: &[u8]) {
        self.chunks += 1;
        let mut stop = false;
        for event in self.decoder.decode(chunk) {
            self.response_text.push_str(&event.text);
            stop |= event.is_stop_signal;
        }
        if stop && self.state == PipelineState::Streaming {
            self.transition(PipelineState::Stopping);
        }
    }

    /// Seal the record and hand it to the sink. No-op after the first call.
    fn finalize(&mut self, reason: FinishReason) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        self.transition(PipelineState::Finalizing);

        let session_id = pending.session_id.clone();
        let record = pending.complete(std::mem::take(&mut self.response_text));
        info!(
            session_id = %session_id,
            reason = ?reason,
            chunks = self.chunks,
            skipped_lines = self.decoder.skipped_lines(),
            response_len = record.response_text.len(),
            "Exchange finished"
        );

        if let Err(e) = write_record(self.sink.as_ref(), &record) {
            error!(session_id = %session_id, error = %e, "Failed to write exchange log record");
        }
        self.transition(PipelineState::Closed);
    }
}

/// Hand a record to the sink without stalling other tasks on a multi-thread
/// runtime while the write syncs to disk.
fn write_record(sink: &dyn ExchangeSink, record: &ExchangeLogRecord) -> Result<(), LogWriteError> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| sink.append(record))
        }
        _ => sink.append(record),
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        if self.pending.is_none() {
            return;
        }
        match self.state {
            // Cancelled while opening: nothing was streamed, nothing is logged.
            PipelineState::Connecting => self.fail(),
            PipelineState::Stopping => self.finalize(FinishReason::StopSignal),
            _ => self.finalize(FinishReason::Abandoned),
        }
    }
}

/// Opens exchanges against a generation backend and logs them to a sink.
#[derive(Clone)]
pub struct StreamingPipeline {
    backend: Arc<dyn GenerationBackend>,
    sink: Arc<dyn ExchangeSink>,
    chunk_timeout: Duration,
}

impl StreamingPipeline {
    pub fn new(backend: Arc<dyn GenerationBackend>, sink: Arc<dyn ExchangeSink>) -> Self {
        Self {
            backend,
            sink,
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
        }
    }

    /// Bound the wait for response headers and for each subsequent chunk.
    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    /// Connect upstream and return the caller's chunk stream.
    ///
    /// A connection failure is returned here: nothing is streamed and no
    /// record is written. Once this returns `Ok`, exactly one record is
    /// written for the exchange, however the stream ends.
    pub async fn start(
        &self,
        request: GenerationRequest,
        pending: PendingExchange,
    ) -> Result<ResponseStream, ConnectionError> {
        let session_id = pending.session_id.clone();
        let mut exchange = Exchange::connecting(pending, Arc::clone(&self.sink));

        let upstream = match tokio::time::timeout(self.chunk_timeout, self.backend.open(&request))
            .await
        {
            Ok(Ok(upstream)) => upstream,
            Ok(Err(e)) => {
                warn!(session_id = %session_id, error = %e, "Failed to open generation stream");
                exchange.fail();
                return Err(e);
            }
            Err(_) => {
                warn!(
                    session_id = %session_id,
                    timeout = ?self.chunk_timeout,
                    "Timed out opening generation stream"
                );
                exchange.fail();
                return Err(ConnectionError::Timeout(self.chunk_timeout));
            }
        };

        debug!(session_id = %session_id, "Generation stream open");
        exchange.transition(PipelineState::Streaming);
        Ok(ResponseStream::new(upstream, exchange, self.chunk_timeout))
    }
}

impl std::fmt::Debug for StreamingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingPipeline")
            .field("chunk_timeout", &self.chunk_timeout)
            .finish()
    }
}

/// The caller's view of an exchange: raw upstream chunks, in order, ending
/// with the chunk that carried the stop signal.
///
/// Finite and not restartable. Dropping it early still writes the record.
pub struct ResponseStream {
    inner: BoxStream<'static, Bytes>,
}

impl ResponseStream {
    fn new(upstream: ChunkStream, exchange: Exchange, chunk_timeout: Duration) -> Self {
        let inner = futures::stream::unfold(Some((upstream, exchange)), move |slot| async move {
            let (mut upstream, mut exchange) = slot?;

            match tokio::time::timeout(chunk_timeout, upstream.next()).await {
                Ok(Some(Ok(chunk))) => {
                    exchange.absorb(&chunk);
                    if exchange.state() == PipelineState::Stopping {
                        // The stop chunk is still delivered; upstream is never pulled again.
                        exchange.finalize(FinishReason::StopSignal);
                        return Some((chunk, None));
                    }
                    Some((chunk, Some((upstream, exchange))))
                }
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "Generation stream broke; finishing exchange");
                    exchange.finalize(FinishReason::TransportError);
                    None
                }
                Ok(None) => {
                    exchange.finalize(FinishReason::EndOfStream);
                    None
                }
                Err(_) => {
                    let e = StreamError::IdleTimeout(chunk_timeout);
                    warn!(error = %e, "Generation stream stalled; finishing exchange");
                    exchange.finalize(FinishReason::IdleTimeout);
                    None
                }
            }
        })
        .fuse()
        .boxed();

        Self { inner }
    }
}

impl Stream for ResponseStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream").finish_non_exhaustive()
    }
}
