//! Cancellation tokens for outstanding sends
//!
//! A [`SendToken`] pairs a monotonic generation number with a transport
//! cancellation handle. The generation decides whether a settled call may
//! still mutate the conversation; the handle lets the coordinator abort the
//! underlying HTTP request as soon as the send is superseded or abandoned.

use tokio_util::sync::CancellationToken;

/// Marker identifying one logical send
#[derive(Debug, Clone)]
pub struct SendToken {
    generation: u64,
    cancellation: CancellationToken,
}

impl SendToken {
    pub(crate) fn new(generation: u64) -> Self {
        Self {
            generation,
            cancellation: CancellationToken::new(),
        }
    }

    /// Generation number; strictly increasing per conversation store
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Requests cancellation of the transport carrying this send
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the send has been cancelled
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }
}

/// Bookkeeping for the send currently allowed to mutate the conversation
#[derive(Debug, Clone)]
pub struct InFlightSend {
    /// Token minted for the send
    pub token: SendToken,
    /// Identifier of the user message the send appended
    pub user_message_id: String,
    /// Identifier of the assistant placeholder awaiting the answer
    pub placeholder_id: String,
}
