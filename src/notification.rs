use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::Stream;
use log::trace;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    Mutex,
};

use crate::constants::PUBLISH_GRACE;
use crate::hop::Hop;

/// Delivers hops to one subscriber.
#[derive(Debug)]
pub(crate) struct HopNotifier {
    sender: Mutex<Option<mpsc::Sender<Arc<Hop>>>>,
}

impl HopNotifier {
    pub(crate) fn new(capacity: usize) -> (Self, HopStream) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Mutex::new(Some(sender)),
            },
            HopStream { receiver },
        )
    }

    /// Hands `hop` to the subscriber, giving up after a short grace period if
    /// its buffer stays full. Does nothing once closed.
    pub(crate) async fn publish(&self, hop: Arc<Hop>) {
        let sender = self.sender.lock().await;
        let Some(sender) = sender.as_ref() else {
            return;
        };
        match sender.try_send(hop) {
            Ok(()) => {}
            Err(TrySendError::Full(hop)) => {
                if sender.send_timeout(hop, PUBLISH_GRACE).await.is_err() {
                    trace!("subscriber too slow, hop dropped");
                }
            }
            Err(TrySendError::Closed(_)) => {
                trace!("subscriber gone, hop dropped");
            }
        }
    }

    /// Ends the subscriber's stream. Safe to call more than once.
    pub(crate) async fn close(&self) {
        self.sender.lock().await.take();
    }

    #[cfg(test)]
    pub(crate) async fn is_closed(&self) -> bool {
        self.sender.lock().await.is_none()
    }
}

/// Live hops of a trace, in the order they were discovered.
///
/// The stream ends shortly after the trace finishes.
#[derive(Debug)]
pub struct HopStream {
    receiver: mpsc::Receiver<Arc<Hop>>,
}

impl HopStream {
    /// Waits for the next hop, `None` once the trace is over.
    pub async fn next_hop(&mut self) -> Option<Arc<Hop>> {
        self.receiver.recv().await
    }
}

impl Stream for HopStream {
    type Item = Arc<Hop>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
