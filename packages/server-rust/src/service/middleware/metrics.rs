//! Per-command timing for the operation pipeline.
//!
//! Every command runs inside a `command` span carrying its kind. When it
//! finishes, the elapsed time and outcome are written onto the span and one
//! event is logged. Storage failures log at `error` and commands over the
//! slow threshold at `warn`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tower::{Layer, Service};
use tracing::{field, info_span, Instrument, Span};

use crate::service::operation::{OperationCommand, OperationError, OperationReply};

/// Commands taking longer than this are logged at `warn` by default.
const DEFAULT_SLOW_COMMAND: Duration = Duration::from_millis(500);

/// What one finished command looked like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CommandRecord {
    kind: &'static str,
    outcome: &'static str,
    elapsed: Duration,
}

impl CommandRecord {
    fn new(
        kind: &'static str,
        result: &Result<OperationReply, OperationError>,
        elapsed: Duration,
    ) -> Self {
        let outcome = result.as_ref().map_or_else(OperationError::outcome, |_| "ok");
        Self { kind, outcome, elapsed }
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }

    fn is_slow(&self, threshold: Duration) -> bool {
        self.elapsed > threshold
    }

    fn emit(&self, span: &Span, slow_after: Duration) {
        let duration_ms = self.elapsed_ms();
        span.record("duration_ms", duration_ms);
        span.record("outcome", self.outcome);

        let (kind, outcome) = (self.kind, self.outcome);
        if outcome == "error" {
            tracing::error!(kind, outcome, duration_ms, "command failed");
        } else if self.is_slow(slow_after) {
            tracing::warn!(kind, outcome, duration_ms, "slow command");
        } else {
            tracing::info!(kind, outcome, duration_ms, "command complete");
        }
    }
}

/// Wraps a command service so each call is timed and logged.
#[derive(Debug, Clone, Copy)]
pub struct MetricsLayer {
    slow_after: Duration,
}

impl MetricsLayer {
    #[must_use]
    pub fn new(slow_after: Duration) -> Self {
        Self { slow_after }
    }
}

impl Default for MetricsLayer {
    fn default() -> Self {
        Self::new(DEFAULT_SLOW_COMMAND)
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            slow_after: self.slow_after,
        }
    }
}

/// See [`MetricsLayer`].
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
    slow_after: Duration,
}

impl<S> Service<OperationCommand> for MetricsService<S>
where
    S: Service<OperationCommand, Response = OperationReply, Error = OperationError>,
    S::Future: Send + 'static,
{
    type Response = OperationReply;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationReply, OperationError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, command: OperationCommand) -> Self::Future {
        let kind = command.kind();
        let slow_after = self.slow_after;
        let span = info_span!(
            "command",
            kind,
            duration_ms = field::Empty,
            outcome = field::Empty,
        );
        let pending = self.inner.call(command);

        let timed = async move {
            let started = Instant::now();
            let result = pending.await;
            CommandRecord::new(kind, &result, started.elapsed()).emit(&Span::current(), slow_after);
            result
        };
        Box::pin(timed.instrument(span))
    }
}
