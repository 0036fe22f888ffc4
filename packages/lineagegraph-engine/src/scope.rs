//! Request scoping: cancellation and wall-clock bounds
//!
//! Every gateway call a request issues goes through `RequestScope::call`, so
//! a fired token stops the traversal before the next call and abandons the
//! one in flight. Nothing partial escapes: the error short-circuits up to
//! the facade.

use std::future::Future;
use std::time::Duration;

use lineagegraph_store::StorageError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{LineageError, Result};

#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    token: CancellationToken,
}

impl RequestScope {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail fast when the request has been cancelled
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(LineageError::cancelled("request cancelled"));
        }
        Ok(())
    }

    /// Run one gateway call, racing it against cancellation
    pub async fn call<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, StorageError>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                debug!("Gateway call abandoned on cancellation");
                Err(LineageError::cancelled("request cancelled"))
            }
            result = fut => result.map_err(LineageError::from),
        }
    }

    /// Run a whole request under an optional wall-clock bound
    ///
    /// On expiry the token is cancelled too, so anything sharing it stops.
    pub async fn bounded<T, F>(&self, timeout: Option<Duration>, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let Some(limit) = timeout else {
            return fut.await;
        };
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Lineage request timed out after {:?}", limit);
                self.token.cancel();
                Err(LineageError::cancelled(format!("timed out after {:?}", limit)))
            }
        }
    }
}
