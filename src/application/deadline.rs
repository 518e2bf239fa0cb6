//! Operations with a deadline

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::CycleError;

/// Run `operation` but give up after `after`, reporting which step timed out.
///
/// The inner future is dropped on timeout. Blocking work it spawned keeps
/// running until its own bound.
pub async fn with_deadline<T, E, F>(operation: &str, after: Duration, fut: F) -> Result<T, CycleError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<CycleError>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(CycleError::timeout(operation, after)),
    }
}

/// Sleep unless cancelled first; `false` means the token fired
pub async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        () = token.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DriverError;

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_names_the_operation() {
        let result: Result<(), CycleError> = with_deadline("login", Duration::from_secs(60), async {
            tokio::time::sleep(Duration::from_secs(61)).await;
            Ok::<_, CycleError>(())
        })
        .await;

        match result {
            Err(CycleError::Timeout { operation, after }) => {
                assert_eq!(operation, "login");
                assert_eq!(after, Duration::from_secs(60));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn inner_errors_are_converted() {
        let result: Result<(), CycleError> =
            with_deadline("close", Duration::from_secs(1), async { Err(DriverError::PageClosed) }).await;
        assert!(matches!(result, Err(CycleError::Driver(DriverError::PageClosed))));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_sleep_returns_early() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(!sleep_or_cancel(&token, Duration::from_secs(3600)).await);
        assert!(sleep_or_cancel(&CancellationToken::new(), Duration::from_secs(1)).await);
    }
}
