//! Work queue that is bounded or unbounded depending on settings.

use tokio::sync::mpsc;

pub(crate) enum QueueSender<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

pub(crate) enum QueueReceiver<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded(mpsc::UnboundedReceiver<T>),
}

pub(crate) fn channel<T>(capacity: Option<usize>) -> (QueueSender<T>, QueueReceiver<T>) {
    match capacity {
        Some(cap) => {
            let (tx, rx) = mpsc::channel(cap.max(1));
            (QueueSender::Bounded(tx), QueueReceiver::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (QueueSender::Unbounded(tx), QueueReceiver::Unbounded(rx))
        }
    }
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Bounded(tx) => Self::Bounded(tx.clone()),
            Self::Unbounded(tx) => Self::Unbounded(tx.clone()),
        }
    }
}

impl<T> QueueSender<T> {
    /// Waits for room on a bounded queue. Gives the value back if the queue is closed.
    pub async fn send(&self, value: T) -> Result<(), T> {
        match self {
            Self::Bounded(tx) => tx.send(value).await.map_err(|e| e.0),
            Self::Unbounded(tx) => tx.send(value).map_err(|e| e.0),
        }
    }
}

impl<T> QueueReceiver<T> {
    pub async fn recv(&mut self) -> Option<T> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }

    pub fn try_recv(&mut self) -> Option<T> {
        match self {
            Self::Bounded(rx) => rx.try_recv().ok(),
            Self::Unbounded(rx) => rx.try_recv().ok(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bounded(rx) => rx.is_empty(),
            Self::Unbounded(rx) => rx.is_empty(),
        }
    }
}
