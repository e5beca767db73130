//! 流式事件模块：有界、可取消的事件流及其累积器。
//!
//! # Event Stream
//!
//! A streaming call hands the caller an [`EventStream`] while a provider-side
//! producer pushes events through a [`StreamProducer`]. Both halves share two
//! bounded queues (events and terminal errors), a close-once guard and an
//! [`Accumulator`] that folds delivered events into a running response.
//!
//! - A full event queue blocks the producer; that is the backpressure path.
//!   Blocked sends still observe cancellation and closure.
//! - The stream closes exactly once: on [`StreamProducer::close`], on an
//!   error (either [`StreamProducer::send_error`] or an error-tagged event),
//!   on cancellation of the call context, or when the last producer handle
//!   is dropped. Sends after closure are silently discarded.
//! - The accumulator lock is never held while waiting on a queue.

mod accumulate;

pub use accumulate::Accumulator;

use crate::context::CallContext;
use crate::telemetry::Telemetry;
use crate::types::{ChatResponse, StreamEvent};
use crate::{BoxStream, Error, Result};
use futures::{Stream, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_EVENT_CAPACITY: usize = 100;
pub const DEFAULT_ERROR_CAPACITY: usize = 10;

/// Records every delivered event against a provider/model pair.
#[derive(Debug, Clone)]
pub struct StreamObserver {
    pub provider: String,
    pub model: String,
    pub telemetry: Telemetry,
}

impl StreamObserver {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, telemetry: Telemetry) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            telemetry,
        }
    }
}

struct Shared {
    events_tx: Mutex<Option<mpsc::Sender<StreamEvent>>>,
    errors_tx: Mutex<Option<mpsc::Sender<Error>>>,
    closed: AtomicBool,
    close_signal: CancellationToken,
    producers: AtomicUsize,
    acc: Mutex<Accumulator>,
    observer: Option<StreamObserver>,
}

impl Shared {
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.events_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.errors_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.close_signal.cancel();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn accumulated(&self) -> ChatResponse {
        self.acc.lock().unwrap_or_else(|e| e.into_inner()).response()
    }
}

/// Sending half. Cloneable; the stream closes when the last clone is dropped.
pub struct StreamProducer {
    shared: Arc<Shared>,
    ctx: CallContext,
}

impl StreamProducer {
    /// Push one event, waiting for queue space.
    ///
    /// Returns `Ok(())` once delivered or if the stream is already closed.
    /// Returns the context's cause if the call is cancelled while waiting; the
    /// stream is closed in that case. An error-tagged event closes the stream
    /// after it is queued.
    pub async fn send(&self, event: StreamEvent) -> Result<()> {
        if self.shared.is_closed() {
            return Ok(());
        }
        let tx = match self
            .shared
            .events_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            Some(tx) => tx,
            None => return Ok(()),
        };

        let terminal = event.is_error();
        let delivered = event.clone();
        tokio::select! {
            biased;
            _ = self.shared.close_signal.cancelled() => return Ok(()),
            cause = self.ctx.done() => {
                self.shared.close();
                return Err(cause);
            }
            res = tx.send(event) => {
                drop(tx);
                if res.is_err() {
                    // Consumer went away.
                    self.shared.close();
                    return Ok(());
                }
            }
        }

        self.shared
            .acc
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .apply(&delivered);
        if let Some(obs) = &self.shared.observer {
            obs.telemetry
                .record_stream_event(&obs.provider, &obs.model, delivered.event_type());
        }
        if terminal {
            self.shared.close();
        }
        Ok(())
    }

    /// Deliver a terminal error and close the stream. Never blocks.
    pub fn send_error(&self, err: Error) {
        if self.shared.is_closed() {
            return;
        }
        let tx = self
            .shared
            .errors_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(tx) = tx {
            if let Err(e) = tx.try_send(err) {
                tracing::warn!(error = %e, "stream error queue full, dropping error");
            }
        }
        self.shared.close();
    }

    /// Idempotent; safe to call from any number of tasks.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn context(&self) -> &CallContext {
        &self.ctx
    }
}

impl Clone for StreamProducer {
    fn clone(&self) -> Self {
        self.shared.producers.fetch_add(1, Ordering::AcqRel);
        Self {
            shared: self.shared.clone(),
            ctx: self.ctx.clone(),
        }
    }
}

impl Drop for StreamProducer {
    fn drop(&mut self) {
        if self.shared.producers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.close();
        }
    }
}

/// Receiving half.
pub struct EventStream {
    shared: Arc<Shared>,
    events_rx: mpsc::Receiver<StreamEvent>,
    errors_rx: mpsc::Receiver<Error>,
    ctx: CallContext,
    done: bool,
}

impl EventStream {
    pub fn new(ctx: CallContext) -> (StreamProducer, EventStream) {
        Self::build(ctx, DEFAULT_EVENT_CAPACITY, DEFAULT_ERROR_CAPACITY, None)
    }

    pub fn with_capacity(
        ctx: CallContext,
        events: usize,
        errors: usize,
    ) -> (StreamProducer, EventStream) {
        Self::build(ctx, events, errors, None)
    }

    pub fn with_observer(
        ctx: CallContext,
        observer: StreamObserver,
    ) -> (StreamProducer, EventStream) {
        Self::build(
            ctx,
            DEFAULT_EVENT_CAPACITY,
            DEFAULT_ERROR_CAPACITY,
            Some(observer),
        )
    }

    fn build(
        ctx: CallContext,
        events: usize,
        errors: usize,
        observer: Option<StreamObserver>,
    ) -> (StreamProducer, EventStream) {
        let (events_tx, events_rx) = mpsc::channel(events.max(1));
        let (errors_tx, errors_rx) = mpsc::channel(errors.max(1));
        let shared = Arc::new(Shared {
            events_tx: Mutex::new(Some(events_tx)),
            errors_tx: Mutex::new(Some(errors_tx)),
            closed: AtomicBool::new(false),
            close_signal: CancellationToken::new(),
            producers: AtomicUsize::new(1),
            acc: Mutex::new(Accumulator::new()),
            observer,
        });
        let producer = StreamProducer {
            shared: shared.clone(),
            ctx: ctx.clone(),
        };
        let stream = EventStream {
            shared,
            events_rx,
            errors_rx,
            ctx,
            done: false,
        };
        (producer, stream)
    }

    /// Spawn exactly one task that forwards `source` into a new stream.
    ///
    /// The task stops when the source ends or yields an error, when the
    /// consumer goes away, or when `ctx` is cancelled.
    pub fn from_source<S>(ctx: CallContext, source: S) -> EventStream
    where
        S: Stream<Item = Result<StreamEvent>> + Send + 'static,
    {
        Self::spawn_source(EventStream::new(ctx), source)
    }

    pub fn from_source_observed<S>(ctx: CallContext, observer: StreamObserver, source: S) -> EventStream
    where
        S: Stream<Item = Result<StreamEvent>> + Send + 'static,
    {
        Self::spawn_source(EventStream::with_observer(ctx, observer), source)
    }

    fn spawn_source<S>(pair: (StreamProducer, EventStream), source: S) -> EventStream
    where
        S: Stream<Item = Result<StreamEvent>> + Send + 'static,
    {
        let (producer, stream) = pair;
        tokio::spawn(async move {
            let mut source = Box::pin(source);
            loop {
                let item = tokio::select! {
                    biased;
                    _ = producer.shared.close_signal.cancelled() => break,
                    cause = producer.ctx.done() => {
                        producer.send_error(cause);
                        break;
                    }
                    item = source.next() => item,
                };
                match item {
                    Some(Ok(event)) => {
                        if let Err(cause) = producer.send(event).await {
                            tracing::debug!(error = %cause, "stream producer stopped");
                            break;
                        }
                        if producer.is_closed() {
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        producer.send_error(err);
                        break;
                    }
                    None => break,
                }
            }
            producer.close();
        });
        stream
    }

    /// Next event, a terminal error, or `None` once the stream is exhausted.
    ///
    /// Queued events are delivered before a queued error. Cancellation of the
    /// call context closes the stream and is reported as an error.
    pub async fn next(&mut self) -> Option<Result<StreamEvent>> {
        if self.done {
            return None;
        }
        if let Some(cause) = self.ctx.err() {
            return Some(Err(self.finish_with(cause)));
        }
        tokio::select! {
            biased;
            ev = self.events_rx.recv() => match ev {
                Some(ev) => Some(Ok(ev)),
                None => {
                    self.done = true;
                    self.errors_rx.try_recv().ok().map(Err)
                }
            },
            Some(err) = self.errors_rx.recv() => {
                self.done = true;
                Some(Err(err))
            }
            cause = self.ctx.done() => Some(Err(self.finish_with(cause))),
        }
    }

    fn finish_with(&mut self, cause: Error) -> Error {
        self.shared.close();
        self.done = true;
        cause
    }

    /// Drain the stream and return the folded response, or the first error.
    pub async fn accumulate(mut self) -> Result<ChatResponse> {
        while let Some(item) = self.next().await {
            if let StreamEvent::Error { message } = item? {
                return Err(Error::internal(message));
            }
        }
        Ok(self.shared.accumulated())
    }

    /// Response folded from the events delivered so far.
    pub fn accumulated(&self) -> ChatResponse {
        self.shared.accumulated()
    }

    /// Stop consuming; pending and future producer sends are discarded.
    pub fn close(&mut self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Consume as a boxed `futures::Stream`.
    pub fn into_stream(self) -> BoxStream<'static, StreamEvent> {
        Box::pin(futures::stream::unfold(self, |mut s| async move {
            let item = s.next().await?;
            Some((item, s))
        }))
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.shared.close();
    }
}
