//! Failure injection and latency shared by the mock generators.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::generator::GeneratorError;

#[derive(Debug, Clone, Default)]
pub(super) struct Control {
    /// Errors returned by the next calls, oldest first.
    errors: Arc<RwLock<VecDeque<GeneratorError>>>,
    /// Every call fails with a rejection while set.
    always_fail: Arc<RwLock<Option<String>>>,
    /// Simulated latency in milliseconds.
    delay_ms: Arc<RwLock<u64>>,
}

impl Control {
    pub async fn push_error(&self, error: GeneratorError) {
        self.errors.write().await.push_back(error);
    }

    pub async fn set_always_fail(&self, reason: Option<String>) {
        *self.always_fail.write().await = reason;
    }

    pub async fn set_delay(&self, delay: Duration) {
        *self.delay_ms.write().await = delay.as_millis() as u64;
    }

    /// Sleep for the configured delay, then return the injected failure if any.
    pub async fn before_call(&self) -> Result<(), GeneratorError> {
        let delay_ms = *self.delay_ms.read().await;
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        if let Some(err) = self.errors.write().await.pop_front() {
            return Err(err);
        }
        if let Some(ref reason) = *self.always_fail.read().await {
            return Err(GeneratorError::rejected(reason.clone()));
        }
        Ok(())
    }
}
