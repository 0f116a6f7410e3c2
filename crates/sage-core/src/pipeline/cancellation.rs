//! Cancellation handle for generation runs
//!
//! Wraps a `CancellationToken`. Cloning shares the token; child handles are
//! cancelled with their parent but can be cancelled on their own.

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    token: CancellationToken,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every run holding this handle
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Handle cancelled together with this one
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
