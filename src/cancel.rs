//! Cooperative cancellation for enumerator and prefetch operations.
//!
//! Every fetch boundary in the crate takes a [`CancellationToken`] and
//! checks it before starting new work. In-flight operations are not
//! force-aborted; once cancellation is observed no new work is scheduled,
//! and the caller gets [`Error::Cancelled`](crate::error::Error::Cancelled)
//! rather than a failure.
//!
//! Cancelling mid-drain is safe: the last captured
//! [`CrossFeedRangeState`](crate::feed::CrossFeedRangeState) stays
//! consistent and resumable.

use tokio::sync::watch;

use crate::error::{Error, Result};

/// Clonable cancellation signal.
///
/// All clones observe the same signal; [`cancel`](CancellationToken::cancel)
/// from any clone is visible to every holder. The token never "un-cancels".
#[derive(Debug, Clone)]
pub struct CancellationToken {
    sender: watch::Sender<bool>,
    receiver: watch::Receiver<bool>,
}

impl CancellationToken {
    /// A fresh, un-cancelled token.
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self { sender, receiver }
    }

    /// Signal cancellation to every clone of this token.
    pub fn cancel(&self) {
        // Send only fails when every receiver is gone, which is harmless.
        let _ = self.sender.send(true);
    }

    /// Whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Error out if cancellation has been signalled.
    ///
    /// Called at the start of every fetch; keeps the check one line at the
    /// call sites.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
