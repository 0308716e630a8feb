//! Shared setup for the end-to-end tests: a session over a faked HMC.

use std::sync::Arc;
use std::time::Duration;

use zhmc::{Session, SessionConfig};
use zhmc_core::Secret;
use zhmc_mock::MockHmc;

pub fn mock_hmc() -> MockHmc {
    MockHmc::new("mock1", "2.16.0", (4, 10))
}

pub fn session_for(hmc: &MockHmc) -> Arc<Session> {
    Session::with_connection(
        hmc.connection(),
        hmc.notification_backend(),
        SessionConfig::new(hmc.name(), "testuser", Secret::new("test-pw")),
    )
}

/// Poll `predicate` until it holds, or panic after one second. Used to
/// wait for the auto-update engine to apply a notification.
pub async fn eventually(what: &str, mut predicate: impl FnMut() -> bool) {
    for _ in 0..50 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 1s: {what}");
}
