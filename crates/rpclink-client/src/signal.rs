use std::sync::Arc;

use rpclink_common::{Result, RpcError};
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkState {
    Open,
    Closed,
    Failed(String),
}

/// Termination notifier for a connection.
///
/// Starts open and moves to closed or failed exactly once; any later
/// `close`/`fail` call is ignored. Clones share the same state, so a reader
/// task can fire the signal while any number of observers await
/// [`closed`](Self::closed).
#[derive(Debug, Clone)]
pub struct CloseSignal {
    state: Arc<watch::Sender<LinkState>>,
}

impl CloseSignal {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LinkState::Open);
        Self {
            state: Arc::new(state),
        }
    }

    /// Marks an orderly close. Returns false if the signal had already fired.
    pub fn close(&self) -> bool {
        self.transition(LinkState::Closed)
    }

    /// Marks a transport failure. Returns false if the signal had already fired.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.transition(LinkState::Failed(reason.into()))
    }

    pub fn is_open(&self) -> bool {
        *self.state.borrow() == LinkState::Open
    }

    /// Waits for the signal to fire.
    pub async fn closed(&self) -> Result<()> {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(|state| *state != LinkState::Open).await {
            Ok(state) => state.clone(),
            // The sender lives as long as `self`, so this cannot happen.
            Err(_) => LinkState::Closed,
        };

        match state {
            LinkState::Failed(reason) => Err(RpcError::Connection(reason)),
            _ => Ok(()),
        }
    }

    fn transition(&self, next: LinkState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == LinkState::Open {
                *state = next;
                true
            } else {
                false
            }
        })
    }
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}
