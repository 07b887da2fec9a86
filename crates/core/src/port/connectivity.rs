// Connectivity Signal Port

use tokio::sync::watch;

/// Readable side of the connectivity signal.
///
/// "Online" is a hint, not a correctness guarantee: reachability probes
/// reflect the local network, not the backend, so delivery failures at
/// call time still feed the retry state machine.
#[derive(Clone)]
pub struct ConnectivitySignal {
    rx: watch::Receiver<bool>,
}

impl ConnectivitySignal {
    /// Current reported state
    pub fn is_online(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for the next transition to online.
    ///
    /// A transition that happens while the caller is busy is latched by
    /// the underlying channel, so the next call returns immediately;
    /// repeated transitions during that window coalesce into one wakeup.
    /// If the publisher is gone this parks forever and callers degrade
    /// to their remaining triggers (startup flush, poll).
    pub async fn wait_for_online(&mut self) {
        loop {
            if self.rx.changed().await.is_err() {
                tracing::warn!("Connectivity publisher dropped; transition events unavailable");
                std::future::pending::<()>().await;
            }
            if *self.rx.borrow() {
                return;
            }
        }
    }
}

/// Writable side of the connectivity signal, owned by the platform
/// monitor (or a test driving transitions by hand)
pub struct ConnectivityPublisher {
    tx: watch::Sender<bool>,
}

impl ConnectivityPublisher {
    /// Publish the current state. Redundant updates are dropped so
    /// subscribers only wake on actual transitions.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|state| {
            let changed = *state != online;
            *state = online;
            changed
        });
    }
}

/// Create a connectivity signal pair with the given initial state
pub fn connectivity_channel(initial_online: bool) -> (ConnectivityPublisher, ConnectivitySignal) {
    let (tx, rx) = watch::channel(initial_online);
    (ConnectivityPublisher { tx }, ConnectivitySignal { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_initial_state() {
        let (_publisher, signal) = connectivity_channel(false);
        assert!(!signal.is_online());

        let (_publisher, signal) = connectivity_channel(true);
        assert!(signal.is_online());
    }

    #[tokio::test]
    async fn test_wait_resolves_on_transition_to_online() {
        let (publisher, mut signal) = connectivity_channel(false);

        let waiter = tokio::spawn(async move {
            signal.wait_for_online().await;
        });

        publisher.set_online(true);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_ignores_transition_to_offline() {
        let (publisher, mut signal) = connectivity_channel(true);

        let waiter = tokio::spawn(async move {
            signal.wait_for_online().await;
        });

        // Going offline must not wake the waiter
        publisher.set_online(false);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        publisher.set_online(true);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should resolve after coming online")
            .unwrap();
    }

    #[tokio::test]
    async fn test_transition_is_latched_while_busy() {
        let (publisher, mut signal) = connectivity_channel(false);

        // Transition fires while nobody is waiting
        publisher.set_online(true);

        // The latched transition is observed on the next wait
        tokio::time::timeout(Duration::from_secs(1), signal.wait_for_online())
            .await
            .expect("latched transition should resolve immediately");
    }

    #[tokio::test]
    async fn test_redundant_updates_do_not_wake() {
        let (publisher, mut signal) = connectivity_channel(true);

        // Same-value publish is dropped
        publisher.set_online(true);

        let wait = signal.wait_for_online();
        tokio::pin!(wait);
        assert!(
            tokio::time::timeout(Duration::from_millis(50), &mut wait)
                .await
                .is_err(),
            "redundant online publish must not count as a transition"
        );
    }
}
