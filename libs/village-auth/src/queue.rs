use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use village_http::{RequestTarget, TransportResponse};

use crate::error::ClientError;

pub(crate) type Responder = oneshot::Sender<Result<TransportResponse, ClientError>>;
pub(crate) type Waiter = oneshot::Receiver<Result<TransportResponse, ClientError>>;

/// A request parked while a re-authentication is in flight.
pub(crate) struct QueuedRequest {
    pub(crate) target: RequestTarget,
    pub(crate) responder: Responder,
    pub(crate) cancel: CancellationToken,
}

impl QueuedRequest {
    /// Cancelled entries and entries whose caller went away are not replayed.
    pub(crate) fn is_abandoned(&self) -> bool {
        self.cancel.is_cancelled() || self.responder.is_closed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum ReAuthState {
    #[default]
    Idle,
    InProgress,
}

/// Re-authentication state and the requests waiting on it.
///
/// Both live behind one lock so that "check state, then enqueue" and
/// "drain, then go back to idle" are single steps.
#[derive(Default)]
pub(crate) struct RequestQueue {
    state: ReAuthState,
    entries: Vec<QueuedRequest>,
}

impl RequestQueue {
    pub(crate) fn is_in_progress(&self) -> bool {
        self.state == ReAuthState::InProgress
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn enqueue(&mut self, entry: QueuedRequest) {
        self.entries.push(entry);
    }

    /// Move `Idle -> InProgress`. Returns `true` only for the caller that
    /// made the transition; that caller owns the re-authentication.
    pub(crate) fn begin(&mut self) -> bool {
        match self.state {
            ReAuthState::Idle => {
                self.state = ReAuthState::InProgress;
                true
            }
            ReAuthState::InProgress => false,
        }
    }

    /// Take every queued entry in FIFO order and go back to `Idle`.
    pub(crate) fn drain(&mut self) -> Vec<QueuedRequest> {
        self.state = ReAuthState::Idle;
        std::mem::take(&mut self.entries)
    }
}
