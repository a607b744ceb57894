//! Outbound half of a call-control connection

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use call_agent_core::{FrameSink, MessageId, OutboundFrame, TransportError};

/// Frames queued for the connection writer, one `Vec` per flushed batch
pub type FrameReceiver = mpsc::UnboundedReceiver<Vec<OutboundFrame>>;

/// Single ordered outbound stream of one connection
///
/// Cloned between the reader side (acks, termination) and the session
/// worker (command batches). The terminated flag is checked and the batch
/// enqueued under one lock, so nothing can slip past a concurrent
/// `terminate`.
#[derive(Clone)]
pub struct CallLink {
    tx: mpsc::UnboundedSender<Vec<OutboundFrame>>,
    terminated: Arc<Mutex<bool>>,
}

impl CallLink {
    pub fn channel() -> (Self, FrameReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Self {
            tx,
            terminated: Arc::new(Mutex::new(false)),
        };
        (link, rx)
    }
}

impl FrameSink for CallLink {
    fn send(&self, frames: Vec<OutboundFrame>) -> Result<(), TransportError> {
        let terminated = self.terminated.lock();
        if *terminated {
            return Err(TransportError::Terminated);
        }
        self.tx.send(frames).map_err(|_| TransportError::Closed)
    }

    fn acknowledge(&self, msgid: MessageId) -> Result<(), TransportError> {
        self.tx
            .send(vec![OutboundFrame::ack(msgid)])
            .map_err(|_| TransportError::Closed)
    }

    fn terminate(&self) {
        *self.terminated.lock() = true;
    }

    fn is_terminated(&self) -> bool {
        *self.terminated.lock()
    }
}
