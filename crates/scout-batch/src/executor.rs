//! Single-consumer batching pipeline.
//!
//! Producers on any thread submit work. One task drains the queue in batches
//! of at most `max_batch_size` and hands each batch to the processor.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::RwLock;
use scout_common::BatchSettings;
use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::BatchError;
use crate::queue::{self, QueueReceiver, QueueSender};
use crate::work::{BatchFuture, BatchedWork, BatchedWorkProcessor};

type Item<P> = Box<dyn BatchedWork<P>>;
type Queue<P> = Arc<Mutex<QueueReceiver<Item<P>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Stopped,
    Started,
    Draining,
}

struct Intake<P> {
    state: ExecutorState,
    /// Cleared by `pre_stop`, set again by `start`.
    accepting: bool,
    /// `None` once the processor is lost to a panic.
    sender: Option<QueueSender<Item<P>>>,
}

struct Shared<P> {
    intake: RwLock<Intake<P>>,
    /// Items submitted but not yet settled.
    pending: watch::Sender<usize>,
}

impl<P> Shared<P> {
    fn settle(&self, count: usize) {
        if count > 0 {
            self.pending.send_modify(|n| *n = n.saturating_sub(count));
        }
    }
}

struct Worker<P> {
    cancel: CancellationToken,
    /// `None` when the loop died and its processor is gone.
    handle: JoinHandle<Option<P>>,
}

struct Lifecycle<P> {
    /// The processor while no worker owns it.
    idle: Option<P>,
    worker: Option<Worker<P>>,
}

pub struct BatchingExecutor<P: BatchedWorkProcessor> {
    name: String,
    settings: BatchSettings,
    shared: Arc<Shared<P>>,
    /// Receiving end, held by the loop while it runs.
    queue: Queue<P>,
    lifecycle: Mutex<Lifecycle<P>>,
}

impl<P: BatchedWorkProcessor> fmt::Debug for BatchingExecutor<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchingExecutor")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}

impl<P: BatchedWorkProcessor> BatchingExecutor<P> {
    pub fn new(name: impl Into<String>, processor: P, settings: BatchSettings) -> Self {
        let (tx, rx) = queue::channel(settings.queue_capacity);
        let (pending, _) = watch::channel(0);
        Self {
            name: name.into(),
            settings,
            shared: Arc::new(Shared {
                intake: RwLock::new(Intake {
                    state: ExecutorState::Stopped,
                    accepting: true,
                    sender: Some(tx),
                }),
                pending,
            }),
            queue: Arc::new(Mutex::new(rx)),
            lifecycle: Mutex::new(Lifecycle {
                idle: Some(processor),
                worker: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ExecutorState {
        self.shared.intake.read().state
    }

    /// Submitted items not yet processed or failed.
    pub fn pending(&self) -> usize {
        *self.shared.pending.borrow()
    }

    /// Start processing on the current runtime.
    pub async fn start(&self) -> Result<(), BatchError> {
        self.start_on(&Handle::current()).await
    }

    /// Start processing with the loop spawned on `runtime`.
    pub async fn start_on(&self, runtime: &Handle) -> Result<(), BatchError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.worker.is_some() {
            return Err(BatchError::AlreadyStarted(self.name.clone()));
        }
        let Some(processor) = lifecycle.idle.take() else {
            return Err(BatchError::Stopped(self.name.clone()));
        };

        let cancel = CancellationToken::new();
        let run = process_loop(
            self.name.clone(),
            self.settings.clone(),
            processor,
            self.queue.clone(),
            self.shared.clone(),
            cancel.clone(),
        );
        let name = self.name.clone();
        let shared = self.shared.clone();
        let queue = self.queue.clone();
        let handle = runtime.spawn(async move {
            match AssertUnwindSafe(run).catch_unwind().await {
                Ok(processor) => Some(processor),
                Err(panic) => {
                    warn!(executor = %name, panic = %panic_message(&*panic), "batching executor loop panicked");
                    abandon(&shared, &queue, &name);
                    None
                }
            }
        });
        lifecycle.worker = Some(Worker { cancel, handle });
        {
            let mut intake = self.shared.intake.write();
            intake.state = ExecutorState::Started;
            intake.accepting = true;
        }

        info!(
            executor = %self.name,
            max_batch_size = self.settings.max_batch_size,
            preserve_order = self.settings.preserve_order,
            "batching executor started"
        );
        Ok(())
    }

    /// Enqueue one item. Items submitted before `start` wait for it.
    ///
    /// From `pre_stop` until the next `start` the item is rejected and its
    /// `mark_as_failed` is called with the same error that is returned.
    pub async fn submit<W: BatchedWork<P>>(&self, work: W) -> Result<(), BatchError> {
        let mut item: Item<P> = Box::new(work);
        let sender = {
            let intake = self.shared.intake.read();
            if intake.accepting {
                intake.sender.clone()
            } else {
                None
            }
        };
        let Some(sender) = sender else {
            let err = BatchError::Rejected(self.name.clone());
            item.mark_as_failed(err.clone());
            return Err(err);
        };

        self.shared.pending.send_modify(|n| *n += 1);
        if let Err(mut item) = sender.send(item).await {
            self.shared.settle(1);
            let err = BatchError::Rejected(self.name.clone());
            item.mark_as_failed(err.clone());
            return Err(err);
        }
        Ok(())
    }

    /// Resolves once every item submitted so far has been processed or failed.
    pub fn completion(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut pending = self.shared.pending.subscribe();
        async move {
            let _ = pending.wait_for(|n| *n == 0).await;
        }
    }

    /// Stop accepting work and resolve once the queue has drained.
    pub fn pre_stop(&self) -> impl Future<Output = ()> + Send + 'static {
        {
            let mut intake = self.shared.intake.write();
            intake.accepting = false;
            if intake.state == ExecutorState::Started {
                intake.state = ExecutorState::Draining;
            }
        }
        debug!(executor = %self.name, "batching executor draining");
        self.completion()
    }

    /// Stop the processing loop after the batch in progress.
    ///
    /// Items still queued are failed with [`BatchError::Stopped`]. The
    /// executor can be started again afterwards unless its loop died.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(worker) = lifecycle.worker.take() else {
            return;
        };
        worker.cancel.cancel();

        match worker.handle.await {
            Ok(Some(processor)) => {
                let mut abandoned = 0;
                {
                    let mut receiver = self.queue.lock().await;
                    while let Some(mut item) = receiver.try_recv() {
                        fail(&self.name, &mut item, BatchError::Stopped(self.name.clone()));
                        abandoned += 1;
                    }
                }
                self.shared.settle(abandoned);
                lifecycle.idle = Some(processor);
                self.shared.intake.write().state = ExecutorState::Stopped;
                info!(executor = %self.name, abandoned, "batching executor stopped");
            }
            Ok(None) => {
                info!(executor = %self.name, "batching executor stopped after its loop failed");
            }
            Err(e) => {
                warn!(executor = %self.name, error = %e, "batching executor task failed");
                abandon(&self.shared, &self.queue, &self.name);
            }
        }
    }
}

/// Shut the intake for good, fail everything still queued and release
/// `completion()` waiters. Used once the processor is lost.
fn abandon<P: 'static>(shared: &Shared<P>, queue: &Mutex<QueueReceiver<Item<P>>>, name: &str) {
    {
        let mut intake = shared.intake.write();
        intake.state = ExecutorState::Stopped;
        intake.accepting = false;
        intake.sender = None;
    }
    match queue.try_lock() {
        Ok(mut receiver) => {
            while let Some(mut item) = receiver.try_recv() {
                fail(name, &mut item, BatchError::Stopped(name.to_string()));
            }
        }
        Err(_) => warn!(executor = %name, "queue still locked, queued work dropped"),
    }
    // Work dispatched to the lost processor can no longer settle.
    shared.pending.send_replace(0);
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn fail<P: 'static>(name: &str, item: &mut Item<P>, cause: BatchError) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| item.mark_as_failed(cause))) {
        warn!(executor = %name, panic = %panic_message(&*panic), "mark_as_failed panicked");
    }
}

/// Run a processor callback, logging instead of unwinding on panic.
fn guarded<R>(name: &str, what: &str, f: impl FnOnce() -> R) -> Result<R, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|panic| {
        let message = panic_message(&*panic);
        warn!(executor = %name, callback = what, panic = %message, "processor panicked");
        message
    })
}

/// Completes even if the batch future panics.
async fn finish_batch(name: String, done: BatchFuture) {
    if let Err(panic) = AssertUnwindSafe(done).catch_unwind().await {
        warn!(executor = %name, panic = %panic_message(&*panic), "batch future panicked");
    }
}

fn joined_size(name: &str, joined: Result<usize, JoinError>) -> usize {
    joined.unwrap_or_else(|e| {
        warn!(executor = %name, error = %e, "batch task failed");
        0
    })
}

async fn process_loop<P: BatchedWorkProcessor>(
    name: String,
    settings: BatchSettings,
    mut processor: P,
    queue: Queue<P>,
    shared: Arc<Shared<P>>,
    cancel: CancellationToken,
) -> P {
    let mut receiver = queue.lock().await;
    let max_batch_size = settings.max_batch_size.max(1);
    let mut batch: Vec<Item<P>> = Vec::with_capacity(max_batch_size);
    // Spawned batches yield their size once finished.
    let mut in_flight: JoinSet<usize> = JoinSet::new();

    loop {
        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                let size = joined_size(&name, joined);
                if in_flight.is_empty() && receiver.is_empty() {
                    let _ = guarded(&name, "complete", || processor.complete());
                }
                shared.settle(size);
                continue;
            }
            item = receiver.recv() => item,
        };
        let Some(first) = first else {
            break;
        };
        batch.push(first);
        while batch.len() < max_batch_size {
            match receiver.try_recv() {
                Some(item) => batch.push(item),
                None => break,
            }
        }

        let size = batch.len();
        if let Err(panic) = guarded(&name, "begin_batch", || processor.begin_batch()) {
            let cause = Arc::new(anyhow::anyhow!("begin_batch panicked: {panic}"));
            for mut item in batch.drain(..) {
                fail(&name, &mut item, BatchError::Dispatch(cause.clone()));
            }
            if receiver.is_empty() && in_flight.is_empty() {
                let _ = guarded(&name, "complete", || processor.complete());
            }
            shared.settle(size);
            continue;
        }

        for mut item in batch.drain(..) {
            let cause = match catch_unwind(AssertUnwindSafe(|| item.submit_to(&mut processor))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(panic) => anyhow::anyhow!("work panicked: {}", panic_message(&*panic)),
            };
            debug!(executor = %name, error = %cause, "work rejected by processor");
            fail(&name, &mut item, BatchError::Dispatch(Arc::new(cause)));
        }

        let done = guarded(&name, "end_batch", || processor.end_batch())
            .unwrap_or_else(|_| -> BatchFuture { Box::pin(async {}) });
        let done = finish_batch(name.clone(), done);

        if settings.preserve_order {
            done.await;
            if receiver.is_empty() {
                let _ = guarded(&name, "complete", || processor.complete());
            }
            shared.settle(size);
        } else {
            in_flight.spawn(async move {
                done.await;
                size
            });
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        shared.settle(joined_size(&name, joined));
    }
    drop(receiver);
    processor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::BatchFuture;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Begin,
        Item(usize, usize),
        End,
        Complete,
    }

    #[derive(Default)]
    struct Recorder {
        events: Arc<parking_lot::Mutex<Vec<Event>>>,
        ended: Arc<parking_lot::Mutex<usize>>,
        /// Batches already ended each time `complete` ran.
        completed_after: Arc<parking_lot::Mutex<Vec<usize>>>,
        gate: Option<oneshot::Receiver<()>>,
        end_delay: Option<Duration>,
        panic_on_begin: bool,
        panic_in_end: bool,
    }

    impl BatchedWorkProcessor for Recorder {
        fn begin_batch(&mut self) {
            if std::mem::take(&mut self.panic_on_begin) {
                panic!("begin_batch blew up");
            }
            self.events.lock().push(Event::Begin);
        }

        fn end_batch(&mut self) -> BatchFuture {
            self.events.lock().push(Event::End);
            let gate = self.gate.take();
            let delay = self.end_delay;
            let ended = self.ended.clone();
            let panics = std::mem::take(&mut self.panic_in_end);
            Box::pin(async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if panics {
                    panic!("flush blew up");
                }
                *ended.lock() += 1;
            })
        }

        fn complete(&mut self) {
            self.events.lock().push(Event::Complete);
            let ended = *self.ended.lock();
            self.completed_after.lock().push(ended);
        }
    }

    type Failures = Arc<parking_lot::Mutex<Vec<(usize, BatchError)>>>;

    struct TestWork {
        producer: usize,
        seq: usize,
        refuse: bool,
        panic: bool,
        failures: Failures,
    }

    impl TestWork {
        fn new(producer: usize, seq: usize, failures: &Failures) -> Self {
            Self {
                producer,
                seq,
                refuse: false,
                panic: false,
                failures: failures.clone(),
            }
        }
    }

    impl BatchedWork<Recorder> for TestWork {
        fn submit_to(&mut self, processor: &mut Recorder) -> anyhow::Result<()> {
            if self.refuse {
                anyhow::bail!("item {} refused", self.seq);
            }
            if self.panic {
                panic!("item {} blew up", self.seq);
            }
            processor.events.lock().push(Event::Item(self.producer, self.seq));
            Ok(())
        }

        fn mark_as_failed(&mut self, cause: BatchError) {
            self.failures.lock().push((self.seq, cause));
        }
    }

    fn settings(max_batch_size: usize) -> BatchSettings {
        BatchSettings {
            max_batch_size,
            ..BatchSettings::default()
        }
    }

    fn batch_sizes(events: &[Event]) -> Vec<usize> {
        let mut sizes = Vec::new();
        for e in events {
            match e {
                Event::Begin => sizes.push(0),
                Event::Item(..) => *sizes.last_mut().unwrap() += 1,
                _ => {}
            }
        }
        sizes
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_per_producer_order_is_kept() {
        let processor = Recorder::default();
        let events = processor.events.clone();
        let failures = Failures::default();
        let exec = Arc::new(BatchingExecutor::new("order", processor, settings(7)));
        exec.start().await.unwrap();

        let mut producers = Vec::new();
        for producer in 0..3 {
            let exec = exec.clone();
            let failures = Arc::clone(&failures);
            producers.push(tokio::spawn(async move {
                for seq in 0..50 {
                    exec.submit(TestWork::new(producer, seq, &failures)).await.unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for p in producers {
            p.await.unwrap();
        }
        exec.completion().await;

        let events = events.lock().clone();
        for producer in 0..3 {
            let seqs: Vec<usize> = events
                .iter()
                .filter_map(|e| match e {
                    Event::Item(p, s) if *p == producer => Some(*s),
                    _ => None,
                })
                .collect();
            assert_eq!(seqs, (0..50).collect::<Vec<_>>());
        }
        assert!(batch_sizes(&events).iter().all(|n| *n <= 7));
        assert!(failures.lock().is_empty());
    }

    #[tokio::test]
    async fn test_batches_are_bounded_and_complete_when_empty() {
        let processor = Recorder::default();
        let events = processor.events.clone();
        let failures = Failures::default();
        let exec = BatchingExecutor::new("bounded", processor, settings(10));
        for seq in 0..25 {
            exec.submit(TestWork::new(0, seq, &failures)).await.unwrap();
        }
        assert_eq!(exec.pending(), 25);

        exec.start().await.unwrap();
        exec.completion().await;

        let events = events.lock().clone();
        assert_eq!(batch_sizes(&events), vec![10, 10, 5]);
        assert_eq!(events.iter().filter(|e| **e == Event::End).count(), 3);
        assert_eq!(events.last(), Some(&Event::Complete));
        assert_eq!(events.iter().filter(|e| **e == Event::Complete).count(), 1);
        assert_eq!(exec.pending(), 0);
    }

    #[tokio::test]
    async fn test_refused_item_fails_alone() {
        let processor = Recorder::default();
        let events = processor.events.clone();
        let failures = Failures::default();
        let exec = BatchingExecutor::new("isolation", processor, settings(10));

        exec.submit(TestWork::new(0, 0, &failures)).await.unwrap();
        let mut bad = TestWork::new(0, 1, &failures);
        bad.refuse = true;
        exec.submit(bad).await.unwrap();
        exec.submit(TestWork::new(0, 2, &failures)).await.unwrap();

        exec.start().await.unwrap();
        exec.completion().await;

        let events = events.lock().clone();
        assert_eq!(
            events,
            vec![
                Event::Begin,
                Event::Item(0, 0),
                Event::Item(0, 2),
                Event::End,
                Event::Complete
            ]
        );
        let failures = failures.lock();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 1);
        assert!(matches!(failures[0].1, BatchError::Dispatch(_)));
    }

    #[tokio::test]
    async fn test_start_twice_is_an_error() {
        let exec = BatchingExecutor::new("twice", Recorder::default(), settings(1));
        exec.start().await.unwrap();
        assert!(matches!(exec.start().await, Err(BatchError::AlreadyStarted(_))));
        exec.stop().await;
        assert_eq!(exec.state(), ExecutorState::Stopped);
    }

    #[tokio::test]
    async fn test_draining_rejects_new_work() {
        let failures = Failures::default();
        let exec = BatchingExecutor::new("drain", Recorder::default(), settings(4));
        exec.start().await.unwrap();
        exec.submit(TestWork::new(0, 0, &failures)).await.unwrap();

        exec.pre_stop().await;
        assert_eq!(exec.state(), ExecutorState::Draining);

        let err = exec.submit(TestWork::new(0, 1, &failures)).await.unwrap_err();
        assert!(matches!(err, BatchError::Rejected(_)));

        exec.stop().await;
        assert!(exec.submit(TestWork::new(0, 2, &failures)).await.is_err());
        let failed: Vec<usize> = failures.lock().iter().map(|(seq, _)| *seq).collect();
        assert_eq!(failed, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_stop_fails_queued_items_and_allows_restart() {
        let (open_gate, gate) = oneshot::channel();
        let processor = Recorder {
            gate: Some(gate),
            ..Recorder::default()
        };
        let events = processor.events.clone();
        let failures = Failures::default();
        let exec = Arc::new(BatchingExecutor::new("stop", processor, settings(1)));
        for seq in 0..3 {
            exec.submit(TestWork::new(0, seq, &failures)).await.unwrap();
        }
        exec.start().await.unwrap();

        // The first batch holds in end_batch until the gate opens.
        let stopping = {
            let exec = exec.clone();
            tokio::spawn(async move { exec.stop().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        open_gate.send(()).unwrap();
        stopping.await.unwrap();

        assert_eq!(exec.state(), ExecutorState::Stopped);
        {
            let failures = failures.lock();
            let failed: Vec<usize> = failures.iter().map(|(seq, _)| *seq).collect();
            assert_eq!(failed, vec![1, 2]);
            assert!(failures.iter().all(|(_, e)| matches!(e, BatchError::Stopped(_))));
        }
        assert_eq!(exec.pending(), 0);

        exec.start().await.unwrap();
        exec.submit(TestWork::new(0, 3, &failures)).await.unwrap();
        exec.completion().await;
        assert!(events.lock().contains(&Event::Item(0, 3)));
    }

    #[tokio::test]
    async fn test_unordered_completion_waits_for_in_flight_batches() {
        let processor = Recorder {
            end_delay: Some(Duration::from_millis(30)),
            ..Recorder::default()
        };
        let ended = processor.ended.clone();
        let completed_after = processor.completed_after.clone();
        let failures = Failures::default();
        let exec = BatchingExecutor::new(
            "unordered",
            processor,
            BatchSettings {
                max_batch_size: 1,
                preserve_order: false,
                queue_capacity: Some(8),
            },
        );
        for seq in 0..3 {
            exec.submit(TestWork::new(0, seq, &failures)).await.unwrap();
        }
        exec.start().await.unwrap();
        exec.completion().await;
        assert_eq!(*ended.lock(), 3);
        // complete() runs once, after every spawned batch has finished.
        assert_eq!(*completed_after.lock(), vec![3]);
        exec.stop().await;
    }

    async fn settle_within(exec: &BatchingExecutor<Recorder>) {
        tokio::time::timeout(Duration::from_secs(2), exec.completion())
            .await
            .expect("completion should resolve");
        assert_eq!(exec.pending(), 0);
    }

    #[tokio::test]
    async fn test_panicking_work_fails_alone() {
        let processor = Recorder::default();
        let events = processor.events.clone();
        let failures = Failures::default();
        let exec = BatchingExecutor::new("panicking-work", processor, settings(1));

        let mut bad = TestWork::new(0, 0, &failures);
        bad.panic = true;
        exec.submit(bad).await.unwrap();
        exec.submit(TestWork::new(0, 1, &failures)).await.unwrap();
        exec.start().await.unwrap();
        settle_within(&exec).await;

        assert!(events.lock().contains(&Event::Item(0, 1)));
        {
            let failures = failures.lock();
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, 0);
            assert!(matches!(&failures[0].1, BatchError::Dispatch(e) if e.to_string().contains("blew up")));
        }

        // The loop survived and still takes work.
        exec.submit(TestWork::new(0, 2, &failures)).await.unwrap();
        settle_within(&exec).await;
        assert!(events.lock().contains(&Event::Item(0, 2)));
        exec.stop().await;
        assert_eq!(exec.state(), ExecutorState::Stopped);
    }

    #[tokio::test]
    async fn test_panicking_begin_batch_fails_that_batch() {
        let processor = Recorder {
            panic_on_begin: true,
            ..Recorder::default()
        };
        let events = processor.events.clone();
        let failures = Failures::default();
        let exec = BatchingExecutor::new("panicking-begin", processor, settings(1));
        exec.submit(TestWork::new(0, 0, &failures)).await.unwrap();
        exec.submit(TestWork::new(0, 1, &failures)).await.unwrap();
        exec.start().await.unwrap();
        settle_within(&exec).await;

        let failed: Vec<usize> = failures.lock().iter().map(|(seq, _)| *seq).collect();
        assert_eq!(failed, vec![0]);
        let events = events.lock().clone();
        assert!(!events.contains(&Event::Item(0, 0)));
        assert!(events.contains(&Event::Item(0, 1)));
        exec.stop().await;
    }

    #[tokio::test]
    async fn test_panicking_flush_still_settles() {
        for preserve_order in [true, false] {
            let processor = Recorder {
                panic_in_end: true,
                ..Recorder::default()
            };
            let events = processor.events.clone();
            let failures = Failures::default();
            let exec = BatchingExecutor::new(
                "panicking-flush",
                processor,
                BatchSettings {
                    max_batch_size: 1,
                    preserve_order,
                    queue_capacity: None,
                },
            );
            exec.submit(TestWork::new(0, 0, &failures)).await.unwrap();
            exec.submit(TestWork::new(0, 1, &failures)).await.unwrap();
            exec.start().await.unwrap();
            settle_within(&exec).await;

            assert!(events.lock().contains(&Event::Item(0, 1)));
            assert!(events.lock().contains(&Event::Complete));
            tokio::time::timeout(Duration::from_secs(2), exec.stop())
                .await
                .expect("stop should return");
            assert_eq!(exec.state(), ExecutorState::Stopped);
        }
    }
}
