use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, warn};

/// Buffered notifications per subscriber before the oldest are dropped
pub const NOTIFICATION_CAPACITY: usize = 32;

/// User-facing classification of a failed controller call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    /// The session was rejected and could not be renewed
    Unauthorized,
    /// The endpoint does not exist on the controller
    NotFound,
    /// The controller did not answer in time
    Timeout,
    /// Any other non-success status
    ServerError {
        /// HTTP status code returned by the controller
        status: u16,
    },
    /// The controller host could not be reached
    NetworkUnreachable,
}

impl Notification {
    /// HTTP-style status code for this classification
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::NotFound => Some(404),
            Self::Timeout => Some(408),
            Self::ServerError { status } => Some(*status),
            Self::NetworkUnreachable => None,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "Unauthorized access"),
            Self::NotFound => write!(f, "404 Page does not exist"),
            Self::Timeout => write!(f, "408 Request timed out"),
            Self::ServerError { status } => write!(f, "{status} unknown error code"),
            Self::NetworkUnreachable => write!(f, "No such host is known"),
        }
    }
}

/// Fan-out of failure notifications to any number of subscribers
///
/// Cloning a `Notifier` yields another handle onto the same channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    /// Create a notifier with the default buffer capacity
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self { sender }
    }

    /// Publish a notification to every current subscriber
    pub fn notify(&self, notification: Notification) {
        warn!(code = ?notification.code(), "{}", notification);
        if self.sender.send(notification).is_err() {
            debug!("No notification subscribers");
        }
    }

    /// Receive every notification published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Invoke `callback` for every notification published from now on
    ///
    /// The forwarding task ends once every `Notifier` handle has been dropped.
    pub fn on_notification<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: Fn(Notification) + Send + 'static,
    {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(notification) => callback(notification),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Notification subscriber lagged, skipped {}", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
