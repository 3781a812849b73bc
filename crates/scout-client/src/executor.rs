use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use scout_common::{ClientSettings, Deadline, TimeoutError};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::error::{ClientError, TransportError};
use crate::log::{log_completion, RequestTrace};
use crate::request::Request;
use crate::response::Response;
use crate::stats::ExecutorStats;
use crate::timer::{TimeoutScheduler, TimerHandle, TokioTimeoutScheduler};
use crate::transport::{Entity, ReqwestTransport, Transport, TransportRequest, JSON, NDJSON};

type CallResult = Result<Response, ClientError>;

/// Sends [`Request`]s to the search nodes without blocking the caller.
///
/// Each call races the transport against an optional timer. Whichever
/// finishes first completes the call; the timer is cancelled on every path.
#[derive(Clone)]
pub struct AsyncRequestExecutor {
    inner: Arc<Inner>,
}

struct Inner {
    settings: ClientSettings,
    transport: Arc<dyn Transport>,
    scheduler: Arc<dyn TimeoutScheduler>,
    next_host: AtomicUsize,
    stats: ExecutorStats,
}

impl std::fmt::Debug for AsyncRequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncRequestExecutor")
            .field("hosts", &self.inner.settings.hosts)
            .finish()
    }
}

impl AsyncRequestExecutor {
    pub fn new(settings: ClientSettings) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new(&settings)
            .map_err(|e| ClientError::Configuration(e.to_string()))?;
        Self::with_parts(
            settings,
            Arc::new(transport),
            Arc::new(TokioTimeoutScheduler::new()),
        )
    }

    pub fn with_parts(
        settings: ClientSettings,
        transport: Arc<dyn Transport>,
        scheduler: Arc<dyn TimeoutScheduler>,
    ) -> Result<Self, ClientError> {
        if settings.hosts.is_empty() {
            return Err(ClientError::Configuration(
                "no search node host configured".to_string(),
            ));
        }
        tracing::info!(hosts=?settings.hosts, request_timeout_ms=?settings.request_timeout_ms, "request executor initialized");
        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                transport,
                scheduler,
                next_host: AtomicUsize::new(0),
                stats: ExecutorStats::default(),
            }),
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.inner.settings
    }

    pub fn stats(&self) -> &ExecutorStats {
        &self.inner.stats
    }

    /// Start executing `request` and return immediately.
    ///
    /// Must be called from within a Tokio runtime. Any complete HTTP reply
    /// resolves the returned future, whatever its status code.
    pub fn submit(&self, request: Request) -> PendingResponse {
        let (tx, rx) = oneshot::channel();
        let host = self.inner.next_host();
        self.inner.stats.on_submit(&host);

        let trace = self
            .inner
            .settings
            .log_requests
            .then(|| RequestTrace::new(&request, &host, self.inner.settings.log_body_limit));
        let call = Arc::new(Call {
            inner: self.inner.clone(),
            started: Instant::now(),
            trace,
            state: Mutex::new(CallState {
                sender: Some(tx),
                timer: None,
                io: None,
                done: false,
            }),
        });

        let entity = match encode_entity(request.body_parts(), request.is_ndjson()) {
            Ok(e) => e,
            Err(e) => {
                call.complete(Err(e));
                return PendingResponse { rx };
            }
        };

        let deadline = request.deadline().copied();
        if let Some(d) = deadline.filter(Deadline::is_expired) {
            let err = d.force_timeout_and_create_error("deadline expired before the request was sent");
            call.complete(Err(ClientError::Timeout(err)));
            return PendingResponse { rx };
        }
        if let Some(delay) = effective_timeout(deadline.as_ref(), self.inner.settings.request_timeout()) {
            let on_fire = call.clone();
            let timer = self.inner.scheduler.schedule(
                delay,
                Box::new(move || {
                    let err = match deadline {
                        Some(d) => d.force_timeout_and_create_error(
                            "request did not complete before its deadline",
                        ),
                        None => TimeoutError::attempt(
                            delay,
                            on_fire.started.elapsed(),
                            "request did not complete within the request timeout",
                        ),
                    };
                    on_fire.complete(Err(ClientError::Timeout(err)));
                }),
            );
            call.attach_timer(timer);
        }

        let transport_request = TransportRequest {
            method: request.method(),
            host: host.clone(),
            path: request.path().to_string(),
            parameters: request.parameters().to_vec(),
            entity,
            socket_timeout: socket_timeout(deadline.as_ref()),
        };
        let transport = self.inner.transport.clone();
        let on_reply = call.clone();
        let io = tokio::spawn(async move {
            let limit = transport_timeout_limit(
                transport_request.socket_timeout,
                on_reply.inner.settings.connect_timeout(),
            );
            let result = match transport.send(transport_request).await {
                Ok(raw) => Response::from_raw(raw),
                Err(TransportError::Rejected(raw)) => Response::from_raw(*raw),
                Err(TransportError::Http(e)) if e.is_timeout() => {
                    // With a deadline the read timeout is the deadline's remainder.
                    let err = match deadline {
                        Some(d) => d.force_timeout_and_create_error(e.to_string()),
                        None => TimeoutError::attempt(limit, on_reply.started.elapsed(), e.to_string()),
                    };
                    Err(ClientError::Timeout(err))
                }
                Err(source) => Err(ClientError::Transport { host, source }),
            };
            on_reply.complete(result);
        });
        call.attach_io(io.abort_handle());

        PendingResponse { rx }
    }
}

impl Inner {
    fn next_host(&self) -> String {
        let i = self.next_host.fetch_add(1, Ordering::Relaxed) % self.settings.hosts.len();
        self.settings.hosts[i].clone()
    }
}

/// One in-flight call. Completed exactly once, by the reply, a failure or the timer.
struct Call {
    inner: Arc<Inner>,
    started: Instant,
    trace: Option<RequestTrace>,
    state: Mutex<CallState>,
}

struct CallState {
    sender: Option<oneshot::Sender<CallResult>>,
    timer: Option<Box<dyn TimerHandle>>,
    io: Option<AbortHandle>,
    done: bool,
}

impl Call {
    /// Returns false when another path already completed the call.
    fn complete(&self, result: CallResult) -> bool {
        let (sender, timer, io) = {
            let mut st = self.state.lock();
            if st.done {
                return false;
            }
            st.done = true;
            (st.sender.take(), st.timer.take(), st.io.take())
        };

        if let Some(timer) = timer {
            timer.cancel();
        }
        let timed_out = result.as_ref().err().is_some_and(ClientError::is_timeout);
        if timed_out {
            if let Some(io) = io {
                io.abort();
            }
        }

        match &result {
            Ok(_) => self.inner.stats.on_success(),
            Err(_) => self.inner.stats.on_failure(timed_out),
        }
        if let Some(trace) = &self.trace {
            log_completion(
                trace,
                &result,
                self.started.elapsed(),
                self.inner.settings.slow_request_threshold(),
                self.inner.settings.log_body_limit,
            );
        }

        if let Some(tx) = sender {
            // The caller may have dropped the future; nothing left to notify.
            let _ = tx.send(result);
        }
        true
    }

    fn attach_timer(&self, timer: Box<dyn TimerHandle>) {
        let mut st = self.state.lock();
        if st.done {
            drop(st);
            timer.cancel();
        } else {
            st.timer = Some(timer);
        }
    }

    fn attach_io(&self, io: AbortHandle) {
        let mut st = self.state.lock();
        if !st.done {
            st.io = Some(io);
        }
    }
}

/// Result of [`AsyncRequestExecutor::submit`].
#[derive(Debug)]
pub struct PendingResponse {
    rx: oneshot::Receiver<CallResult>,
}

impl Future for PendingResponse {
    type Output = CallResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ClientError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// One part is sent as JSON, several (or any number when `ndjson` is set)
/// as NDJSON with one newline-terminated object per line.
pub(crate) fn encode_entity(parts: &[Value], ndjson: bool) -> Result<Option<Entity>, ClientError> {
    if parts.is_empty() {
        return Ok(None);
    }
    if let Some(i) = parts.iter().position(|p| !p.is_object()) {
        return Err(ClientError::Serialization(format!(
            "body part {i} is not a JSON object"
        )));
    }

    if let (false, [single]) = (ndjson, parts) {
        let bytes =
            serde_json::to_vec(single).map_err(|e| ClientError::Serialization(e.to_string()))?;
        return Ok(Some(Entity {
            content_type: JSON,
            bytes: bytes.into(),
        }));
    }

    let mut out = Vec::new();
    for part in parts {
        serde_json::to_writer(&mut out, part)
            .map_err(|e| ClientError::Serialization(e.to_string()))?;
        out.push(b'\n');
    }
    Ok(Some(Entity {
        content_type: NDJSON,
        bytes: out.into(),
    }))
}

/// Deadline first, then the global request timeout, else no timer at all.
fn effective_timeout(deadline: Option<&Deadline>, global: Option<Duration>) -> Option<Duration> {
    match deadline {
        Some(d) => Some(d.remaining()),
        None => global,
    }
}

/// Limit reported when the transport itself times out. Without a read
/// timeout only the connect timeout can have fired.
fn transport_timeout_limit(socket_timeout: Option<Duration>, connect_timeout: Duration) -> Duration {
    socket_timeout.unwrap_or(connect_timeout)
}

/// Remaining deadline as a read timeout; beyond the `i32` millisecond range
/// there is no read timeout at all.
pub(crate) fn socket_timeout(deadline: Option<&Deadline>) -> Option<Duration> {
    let ms = deadline?.remaining_millis();
    if ms > i32::MAX as u64 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::RawResponse;
    use async_trait::async_trait;
    use scout_common::TimeoutKind;
    use serde_json::json;

    enum Reply {
        Never,
        Raw(RawResponse),
        Rejected(RawResponse),
        Fail(&'static str),
    }

    struct MockTransport {
        reply: Reply,
        calls: AtomicUsize,
        seen: Mutex<Vec<TransportRequest>>,
    }

    impl MockTransport {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push(request);
            match &self.reply {
                Reply::Never => std::future::pending().await,
                Reply::Raw(r) => Ok(r.clone()),
                Reply::Rejected(r) => Err(TransportError::Rejected(Box::new(r.clone()))),
                Reply::Fail(msg) => Err(TransportError::Io(msg.to_string())),
            }
        }
    }

    #[derive(Default)]
    struct CountingScheduler {
        scheduled: Arc<AtomicUsize>,
        cancelled: Arc<AtomicUsize>,
    }

    struct CountingHandle {
        inner: Box<dyn TimerHandle>,
        cancelled: Arc<AtomicUsize>,
    }

    impl TimerHandle for CountingHandle {
        fn cancel(&self) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
            self.inner.cancel();
        }
    }

    impl TimeoutScheduler for CountingScheduler {
        fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> Box<dyn TimerHandle> {
            self.scheduled.fetch_add(1, Ordering::SeqCst);
            Box::new(CountingHandle {
                inner: TokioTimeoutScheduler::new().schedule(delay, task),
                cancelled: self.cancelled.clone(),
            })
        }
    }

    fn settings() -> ClientSettings {
        ClientSettings {
            hosts: vec!["http://node-1:9200".to_string()],
            ..ClientSettings::default()
        }
    }

    fn executor(
        settings: ClientSettings,
        transport: Arc<MockTransport>,
        scheduler: Arc<CountingScheduler>,
    ) -> AsyncRequestExecutor {
        AsyncRequestExecutor::with_parts(settings, transport, scheduler).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_timer_without_deadline_or_global_timeout() {
        let scheduler = Arc::new(CountingScheduler::default());
        let exec = executor(settings(), MockTransport::new(Reply::Never), scheduler.clone());

        let pending = exec.submit(Request::get().path_component("_cluster").build());
        let waited = tokio::time::timeout(Duration::from_secs(3600), pending).await;

        assert!(waited.is_err(), "call must still be pending after an hour");
        assert_eq!(scheduler.scheduled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fails_hanging_call_with_budget_timeout() {
        let scheduler = Arc::new(CountingScheduler::default());
        let exec = executor(settings(), MockTransport::new(Reply::Never), scheduler.clone());

        let started = Instant::now();
        let req = Request::get()
            .path_component("books")
            .path_component("_search")
            .deadline(Deadline::for_duration(Duration::from_millis(500)))
            .build();
        let err = exec.submit(req).await.unwrap_err();

        let timeout = err.timeout().expect("timeout error");
        assert_eq!(timeout.kind, TimeoutKind::Budget);
        assert_eq!(timeout.limit_ms, 500);
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(started.elapsed() < Duration::from_millis(600));
        assert_eq!(scheduler.scheduled.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(exec.stats().snapshot().timed_out_total, 1);
        assert_eq!(exec.stats().snapshot().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_timeout_is_attempt_level() {
        let scheduler = Arc::new(CountingScheduler::default());
        let mut s = settings();
        s.request_timeout_ms = Some(200);
        let exec = executor(s, MockTransport::new(Reply::Never), scheduler.clone());

        let err = exec.submit(Request::get().build()).await.unwrap_err();
        let timeout = err.timeout().expect("timeout error");
        assert_eq!(timeout.kind, TimeoutKind::Attempt);
        assert_eq!(timeout.limit_ms, 200);
        assert_eq!(scheduler.cancelled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_call_cancels_timer_once() {
        let scheduler = Arc::new(CountingScheduler::default());
        let reply = RawResponse::new("http://node-1:9200", 200, "OK")
            .with_body("application/json", r#"{"acknowledged":true}"#);
        let exec = executor(settings(), MockTransport::new(Reply::Raw(reply)), scheduler.clone());

        let req = Request::put()
            .path_component("books")
            .deadline(Deadline::for_duration(Duration::from_secs(5)))
            .build();
        let resp = exec.submit(req).await.unwrap();
        assert_eq!(resp.body(), Some(&json!({"acknowledged": true})));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(scheduler.scheduled.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(exec.stats().snapshot().timed_out_total, 0);
    }

    #[tokio::test]
    async fn test_not_found_without_entity_resolves() {
        let scheduler = Arc::new(CountingScheduler::default());
        let reply = RawResponse::new("http://node-1:9200", 404, "Not Found");
        let exec = executor(settings(), MockTransport::new(Reply::Raw(reply)), scheduler);

        let req = Request::delete()
            .path_component("books")
            .path_component("_doc")
            .path_component("42")
            .build();
        let resp = exec.submit(req).await.unwrap();
        assert_eq!(resp.status_code(), 404);
        assert_eq!(resp.body(), None);
        assert_eq!(resp.host(), "http://node-1:9200");
    }

    #[tokio::test]
    async fn test_rejected_reply_still_resolves() {
        let scheduler = Arc::new(CountingScheduler::default());
        let reply = RawResponse::new("http://node-1:9200", 409, "Conflict")
            .with_body("application/json", r#"{"error":"version_conflict"}"#);
        let exec = executor(settings(), MockTransport::new(Reply::Rejected(reply)), scheduler);

        let resp = exec.submit(Request::put().build()).await.unwrap();
        assert_eq!(resp.status_code(), 409);
        assert_eq!(resp.body(), Some(&json!({"error": "version_conflict"})));
    }

    #[tokio::test]
    async fn test_io_failure_fails_the_call() {
        let scheduler = Arc::new(CountingScheduler::default());
        let exec = executor(
            settings(),
            MockTransport::new(Reply::Fail("connection reset by peer")),
            scheduler,
        );

        match exec.submit(Request::get().build()).await {
            Err(ClientError::Transport { host, source }) => {
                assert_eq!(host, "http://node-1:9200");
                assert!(source.to_string().contains("connection reset"));
            }
            other => panic!("expected transport error, got {other:?}"),
        }
        assert_eq!(exec.stats().snapshot().failed_total, 1);
    }

    #[tokio::test]
    async fn test_serialization_failure_skips_network() {
        let scheduler = Arc::new(CountingScheduler::default());
        let transport = MockTransport::new(Reply::Never);
        let exec = executor(settings(), transport.clone(), scheduler.clone());

        let req = Request::post()
            .body(json!([1, 2, 3]))
            .deadline(Deadline::for_duration(Duration::from_secs(1)))
            .build();
        let err = exec.submit(req).await.unwrap_err();

        assert!(matches!(err, ClientError::Serialization(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.scheduled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_multiple_parts_sent_as_ndjson() {
        let scheduler = Arc::new(CountingScheduler::default());
        let reply = RawResponse::new("http://node-1:9200", 200, "OK");
        let transport = MockTransport::new(Reply::Raw(reply));
        let exec = executor(settings(), transport.clone(), scheduler);

        let req = Request::post()
            .path_component("_bulk")
            .body(json!({"index": {"_id": "1"}}))
            .body(json!({"title": "Dune"}))
            .build();
        exec.submit(req).await.unwrap();

        let seen = transport.seen.lock();
        let entity = seen[0].entity.as_ref().unwrap();
        assert_eq!(entity.content_type, NDJSON);
        assert_eq!(
            entity.bytes.as_ref(),
            b"{\"index\":{\"_id\":\"1\"}}\n{\"title\":\"Dune\"}\n"
        );
    }

    #[tokio::test]
    async fn test_single_part_bulk_is_newline_terminated() {
        let scheduler = Arc::new(CountingScheduler::default());
        let reply = RawResponse::new("http://node-1:9200", 200, "OK");
        let transport = MockTransport::new(Reply::Raw(reply));
        let exec = executor(settings(), transport.clone(), scheduler);

        let req = Request::post()
            .path_component("_bulk")
            .ndjson()
            .body(json!({"delete": {"_index": "books", "_id": "1"}}))
            .build();
        exec.submit(req).await.unwrap();

        let seen = transport.seen.lock();
        let entity = seen[0].entity.as_ref().unwrap();
        assert_eq!(entity.content_type, NDJSON);
        assert!(entity.bytes.ends_with(b"\n"));
        let line: Value = serde_json::from_slice(&entity.bytes).unwrap();
        assert_eq!(line, json!({"delete": {"_index": "books", "_id": "1"}}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_fails_without_sending() {
        let scheduler = Arc::new(CountingScheduler::default());
        let transport = MockTransport::new(Reply::Never);
        let exec = executor(settings(), transport.clone(), scheduler.clone());

        let deadline = Deadline::for_duration(Duration::from_millis(10));
        tokio::time::advance(Duration::from_millis(20)).await;
        let req = Request::get().path_component("_search").deadline(deadline).build();
        let err = exec.submit(req).await.unwrap_err();

        let timeout = err.timeout().expect("timeout error");
        assert_eq!(timeout.kind, TimeoutKind::Budget);
        assert_eq!(timeout.limit_ms, 10);
        tokio::task::yield_now().await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.scheduled.load(Ordering::SeqCst), 0);
        assert_eq!(exec.stats().snapshot().timed_out_total, 1);
    }

    #[test]
    fn test_transport_timeout_limit_falls_back_to_connect_timeout() {
        let connect = settings().connect_timeout();
        assert_eq!(transport_timeout_limit(None, connect), Duration::from_secs(1));
        assert_eq!(
            transport_timeout_limit(Some(Duration::from_millis(250)), connect),
            Duration::from_millis(250)
        );
    }

    #[tokio::test]
    async fn test_hosts_are_rotated() {
        let scheduler = Arc::new(CountingScheduler::default());
        let reply = RawResponse::new("any", 200, "OK");
        let mut s = settings();
        s.hosts = vec!["http://a:9200".to_string(), "http://b:9200".to_string()];
        let exec = executor(s, MockTransport::new(Reply::Raw(reply)), scheduler);

        for _ in 0..3 {
            exec.submit(Request::get().build()).await.unwrap();
        }
        assert_eq!(exec.stats().requests_to("http://a:9200"), 2);
        assert_eq!(exec.stats().requests_to("http://b:9200"), 1);
    }

    #[test]
    fn test_empty_hosts_rejected() {
        let s = ClientSettings {
            hosts: vec![],
            ..ClientSettings::default()
        };
        let err = AsyncRequestExecutor::with_parts(
            s,
            MockTransport::new(Reply::Never),
            Arc::new(CountingScheduler::default()),
        )
        .unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_socket_timeout_follows_deadline() {
        assert_eq!(socket_timeout(None), None);

        let short = Deadline::for_duration(Duration::from_millis(750));
        assert_eq!(socket_timeout(Some(&short)), Some(Duration::from_millis(750)));

        let huge = Deadline::for_duration(Duration::from_millis(i32::MAX as u64 + 10));
        assert_eq!(socket_timeout(Some(&huge)), None);
    }
}
