use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// A scheduled timeout. Cancelling after it fired is a no-op.
pub trait TimerHandle: Send + Sync {
    fn cancel(&self);
}

/// Runs timeout tasks independently of the I/O path.
pub trait TimeoutScheduler: Send + Sync + 'static {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> Box<dyn TimerHandle>;
}

/// Timer backed by the Tokio timer wheel.
///
/// Timers run on the given runtime handle, or on the caller's runtime when
/// none was given.
#[derive(Debug, Clone, Default)]
pub struct TokioTimeoutScheduler {
    handle: Option<Handle>,
}

impl TokioTimeoutScheduler {
    pub fn new() -> Self {
        Self { handle: None }
    }

    pub fn on(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }
}

struct TokenHandle(CancellationToken);

impl TimerHandle for TokenHandle {
    fn cancel(&self) {
        self.0.cancel();
    }
}

impl TimeoutScheduler for TokioTimeoutScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> Box<dyn TimerHandle> {
        let token = CancellationToken::new();
        let child = token.clone();
        let fut = async move {
            tokio::select! {
                biased;
                () = child.cancelled() => {}
                () = tokio::time::sleep(delay) => task(),
            }
        };
        match &self.handle {
            Some(h) => drop(h.spawn(fut)),
            None => drop(tokio::spawn(fut)),
        }
        Box::new(TokenHandle(token))
    }
}
