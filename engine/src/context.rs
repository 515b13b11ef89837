//! Per-call context: deadline, cancellation and correlation id.
//!
//! Every store call a driver makes is raced against the context. When the
//! deadline passes or the host cancels, the call fails at once and nothing
//! is compensated; the next read finds whatever state was left behind.

use crate::error::Result;
use crate::store::StoreResult;
use crate::Error;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

/// Context propagated from the host into one lifecycle call.
#[derive(Debug, Clone)]
pub struct CallContext {
    call_id: Uuid,
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Cancels the calls of the contexts it was created with.
#[derive(Debug)]
pub struct Canceller(watch::Sender<bool>);

impl Canceller {
    pub fn cancel(&self) {
        // receivers may already be gone, which is fine
        let _ = self.0.send(true);
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CallContext {
    /// A context with no deadline and no cancellation.
    pub fn new() -> Self {
        Self {
            call_id: Uuid::new_v4(),
            deadline: None,
            cancel: None,
        }
    }

    /// A context plus the handle that cancels it.
    pub fn cancellable() -> (Self, Canceller) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            cancel: Some(rx),
            ..Self::new()
        };
        (ctx, Canceller(tx))
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Fail fast if the call is already over.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Run a store call under this context, wrapping store failures with
    /// the operation name.
    pub async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        self.call(operation, fut)
            .await?
            .map_err(|e| Error::store(operation, e))
    }

    /// Run a store call under this context, handing the store's own result
    /// back so the caller can classify it.
    pub async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<StoreResult<T>>
    where
        F: Future<Output = StoreResult<T>>,
    {
        self.check()?;
        tracing::debug!(call_id = %self.call_id, operation, "store call");

        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .map_err(|_| Error::DeadlineExceeded),
                None => Ok(fut.await),
            }
        };

        match self.cancel.clone() {
            Some(mut rx) => tokio::select! {
                biased;
                _ = cancelled(&mut rx) => Err(Error::Cancelled),
                result = bounded => result,
            },
            None => bounded.await,
        }
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // sender dropped without cancelling
            std::future::pending::<()>().await;
        }
    }
}
