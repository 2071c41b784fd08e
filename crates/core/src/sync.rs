//! Network-correlated action synchronization
//!
//! UI automation fails most often because an assertion runs before the
//! backend call triggered by a click has resolved. Instead of sleeping a
//! fixed delay or waiting for a DOM mutation that may lag the response,
//! [`perform_and_await_response`] correlates the action with the actual
//! network contract: a predicate over the response URL and status code.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::driver::{PageHandle, ResponseEvent};
use crate::error::{DriverError, DriverResult, HarnessError, HarnessResult};

/// Perform a page mutation and block the calling task until a network
/// response satisfying `predicate` is observed, or `timeout` elapses.
///
/// The response stream is subscribed *before* the action runs, so a
/// response that arrives while the action is still in flight is buffered
/// and cannot be missed. If several concurrent responses match, the first
/// to arrive wins and later matches are ignored for this call.
///
/// On timeout this returns [`HarnessError::SyncTimeout`]; the UI action is
/// not rolled back and not retried.
pub async fn perform_and_await_response<F, Fut, P>(
    page: &dyn PageHandle,
    action_name: &str,
    timeout: Duration,
    predicate: P,
    action: F,
) -> HarnessResult<ResponseEvent>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = DriverResult<()>>,
    P: Fn(&str, u16) -> bool,
{
    // Subscribe first: events sent after this point are buffered even
    // while the action future is still pending.
    let mut responses = page.responses();

    action().await?;

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, responses.recv()).await {
            Err(_) => {
                return Err(HarnessError::SyncTimeout {
                    action: action_name.to_string(),
                    timeout,
                })
            }
            Ok(Ok(event)) => {
                if predicate(&event.url, event.status) {
                    debug!("'{}' correlated with {} {}", action_name, event.status, event.url);
                    return Ok(event);
                }
            }
            Ok(Err(RecvError::Lagged(missed))) => {
                // Keep waiting; only old events were dropped.
                warn!("response stream lagged, {} event(s) missed", missed);
            }
            Ok(Err(RecvError::Closed)) => {
                return Err(HarnessError::Driver(DriverError::Engine(
                    "response stream closed before a matching response".into(),
                )))
            }
        }
    }
}

/// The correlation used throughout the storefront flows: URL contains
/// `fragment` and the status is 200.
pub fn body_of(fragment: &str) -> impl Fn(&str, u16) -> bool + '_ {
    move |url, status| url.contains(fragment) && status == 200
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{FakePage, FakeState};
    use std::sync::Arc;
    use std::time::Instant;

    #[tokio::test]
    async fn completes_when_action_triggers_matching_response() {
        let state = FakeState::shared();
        state.respond_on_click(
            "[data-test='filter']",
            ResponseEvent {
                url: "https://api.example.test/products?by_category=1".into(),
                status: 200,
            },
        );
        let page = FakePage::new(Arc::clone(&state));

        let event = perform_and_await_response(
            &page,
            "filter",
            Duration::from_secs(1),
            body_of("products?"),
            || page.click("[data-test='filter']"),
        )
        .await
        .unwrap();
        assert_eq!(event.status, 200);
    }

    #[tokio::test]
    async fn response_arriving_before_first_poll_is_not_missed() {
        let state = FakeState::shared();
        let page = FakePage::new(Arc::clone(&state));

        // Emitted synchronously inside the action, before the await loop
        // ever polls the receiver.
        let event = perform_and_await_response(
            &page,
            "inline",
            Duration::from_secs(1),
            body_of("/cart"),
            || {
                page.emit_response(ResponseEvent {
                    url: "https://api.example.test/cart".into(),
                    status: 200,
                });
                async { Ok(()) }
            },
        )
        .await
        .unwrap();
        assert!(event.url.contains("/cart"));
    }

    #[tokio::test]
    async fn times_out_no_earlier_than_the_deadline() {
        let state = FakeState::shared();
        let page = FakePage::new(Arc::clone(&state));
        let timeout = Duration::from_millis(80);

        let start = Instant::now();
        let err = perform_and_await_response(
            &page,
            "never",
            timeout,
            body_of("/nothing"),
            || async { Ok(()) },
        )
        .await
        .unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, HarnessError::SyncTimeout { .. }));
        assert!(elapsed >= timeout, "timed out early: {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2), "took too long: {:?}", elapsed);
    }

    #[tokio::test]
    async fn non_matching_responses_are_skipped() {
        let state = FakeState::shared();
        let page = FakePage::new(Arc::clone(&state));

        let event = perform_and_await_response(
            &page,
            "mixed",
            Duration::from_secs(1),
            body_of("/messages"),
            || {
                page.emit_response(ResponseEvent {
                    url: "https://api.example.test/products".into(),
                    status: 200,
                });
                page.emit_response(ResponseEvent {
                    url: "https://api.example.test/messages".into(),
                    status: 500,
                });
                page.emit_response(ResponseEvent {
                    url: "https://api.example.test/messages".into(),
                    status: 200,
                });
                async { Ok(()) }
            },
        )
        .await
        .unwrap();
        assert_eq!(event.status, 200);
        assert!(event.url.contains("/messages"));
    }

    #[tokio::test]
    async fn first_of_several_matches_wins() {
        let state = FakeState::shared();
        let page = FakePage::new(Arc::clone(&state));

        let event = perform_and_await_response(
            &page,
            "double",
            Duration::from_secs(1),
            body_of("products"),
            || {
                page.emit_response(ResponseEvent {
                    url: "https://api.example.test/products?page=1".into(),
                    status: 200,
                });
                page.emit_response(ResponseEvent {
                    url: "https://api.example.test/products?page=2".into(),
                    status: 200,
                });
                async { Ok(()) }
            },
        )
        .await
        .unwrap();
        assert!(event.url.contains("page=1"));
    }

    #[tokio::test]
    async fn action_error_propagates_without_waiting() {
        let state = FakeState::shared();
        state.fail_clicks();
        let page = FakePage::new(Arc::clone(&state));

        let err = perform_and_await_response(
            &page,
            "broken",
            Duration::from_secs(5),
            body_of("anything"),
            || page.click("[data-test='missing']"),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Driver(DriverError::ElementAbsent { .. })
        ));
    }
}
