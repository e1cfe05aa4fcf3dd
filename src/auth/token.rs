//! Token acquisition bounded by the connection timeout.

use tokio_util::sync::CancellationToken;

use super::{AuthParameters, AuthProvider, AuthToken};
use crate::error::{Result, TdsError};

/// Ask `provider` for a token, giving up after `params.connection_timeout`.
///
/// The provider gets a cancellation token that fires when the time is up.
/// The call then fails with [`TdsError::Timeout`] whether or not the
/// provider reacts.
pub async fn acquire_token_with_timeout(
    provider: &dyn AuthProvider,
    params: &AuthParameters,
) -> Result<AuthToken> {
    let timeout = params.connection_timeout;
    let cancel = CancellationToken::new();
    // Fires on every exit path, including the caller dropping this future
    let _cancel_on_exit = cancel.clone().drop_guard();

    match tokio::time::timeout(timeout, provider.acquire_token(params, cancel.clone())).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                method = %params.method,
                provider = provider.name(),
                connection_id = %params.connection_id,
                "Token acquisition timed out after {:?}",
                timeout
            );
            Err(TdsError::Timeout(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthenticationMethod;
    use async_trait::async_trait;
    use std::time::{Duration, SystemTime};
    use tokio::sync::oneshot;

    struct Slow {
        observed: parking_lot::Mutex<Option<oneshot::Sender<()>>>,
    }

    #[async_trait]
    impl AuthProvider for Slow {
        fn is_supported(&self, _method: AuthenticationMethod) -> bool {
            true
        }

        async fn acquire_token(
            &self,
            _params: &AuthParameters,
            cancel: CancellationToken,
        ) -> Result<AuthToken> {
            let observed = self.observed.lock().take();
            tokio::spawn(async move {
                cancel.cancelled().await;
                if let Some(tx) = observed {
                    let _ = tx.send(());
                }
            });
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(AuthToken::new("late", SystemTime::now()))
        }
    }

    struct Fast;

    #[async_trait]
    impl AuthProvider for Fast {
        fn is_supported(&self, _method: AuthenticationMethod) -> bool {
            true
        }

        async fn acquire_token(
            &self,
            _params: &AuthParameters,
            _cancel: CancellationToken,
        ) -> Result<AuthToken> {
            Ok(AuthToken::new("fast", SystemTime::now()))
        }
    }

    fn params(timeout: Duration) -> AuthParameters {
        let mut params = AuthParameters::new(
            AuthenticationMethod::ActiveDirectoryPassword,
            "srv",
            "res",
            "auth",
        );
        params.connection_timeout = timeout;
        params
    }

    #[tokio::test]
    async fn test_returns_token_within_timeout() {
        let token = acquire_token_with_timeout(&Fast, &params(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(token.access_token(), "fast");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_provider() {
        let (tx, rx) = oneshot::channel();
        let provider = Slow {
            observed: parking_lot::Mutex::new(Some(tx)),
        };

        let result = acquire_token_with_timeout(&provider, &params(Duration::from_millis(50))).await;
        assert!(matches!(result, Err(TdsError::Timeout(d)) if d == Duration::from_millis(50)));

        rx.await.expect("provider should observe cancellation");
    }
}
