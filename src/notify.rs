use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

/// The name hosts use when they re-dispatch a notification as an event.
pub const EVENT_NAME: &str = "recycleMaterialsUpdated";

/// Which write path changed the cached list.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeSource {
    Save,
    Delete,
    Sync,
    #[serde(rename = "restore-backup")]
    RestoreFromBackup,
    Fallback,
}

impl ChangeSource {
    /// Whether observers should refetch from the remote API. Internal
    /// restores must not, or every restore would set off a refetch storm.
    pub fn triggers_refetch(self) -> bool {
        match self {
            ChangeSource::Save | ChangeSource::Delete | ChangeSource::Sync => true,
            ChangeSource::RestoreFromBackup | ChangeSource::Fallback => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeSource::Save => "save",
            ChangeSource::Delete => "delete",
            ChangeSource::Sync => "sync",
            ChangeSource::RestoreFromBackup => "restore-backup",
            ChangeSource::Fallback => "fallback",
        }
    }
}

/// Announces that the cached material list changed.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ChangeNotification {
    /// When the change was written, in milliseconds since the epoch.
    pub timestamp: i64,

    /// How many materials the list holds now.
    pub count: usize,

    pub source: ChangeSource,
}

/// Broadcasts change notifications to every subscriber.
pub struct Notifier {
    sender: broadcast::Sender<ChangeNotification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Notifier { sender }
    }

    /// Publishes `notification` and returns how many subscribers it
    /// reached.
    pub fn publish(&self, notification: ChangeNotification) -> usize {
        // no subscribers is not an error
        self.sender.send(notification).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.sender.subscribe()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Filters a subscription down to the notifications that should make a
/// screen refetch from the remote API.
pub struct RefetchObserver {
    receiver: broadcast::Receiver<ChangeNotification>,
    last_seen: Option<i64>,
}

impl RefetchObserver {
    pub fn new(receiver: broadcast::Receiver<ChangeNotification>) -> Self {
        RefetchObserver {
            receiver,
            last_seen: None,
        }
    }

    /// Waits for the next notification that calls for a refetch. Returns
    /// `None` once the notifier is gone.
    pub async fn next_refetch(&mut self) -> Option<ChangeNotification> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) => {
                    if let Some(notification) = self.accept(notification) {
                        return Some(notification);
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Like `next_refetch`, but only looks at notifications that have
    /// already arrived.
    pub fn try_next_refetch(&mut self) -> Option<ChangeNotification> {
        loop {
            match self.receiver.try_recv() {
                Ok(notification) => {
                    if let Some(notification) = self.accept(notification) {
                        return Some(notification);
                    }
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    fn accept(&mut self, notification: ChangeNotification) -> Option<ChangeNotification> {
        // the same change may arrive more than once when a host bridges
        // it onto several channels
        if self.last_seen == Some(notification.timestamp) {
            return None;
        }

        self.last_seen = Some(notification.timestamp);

        Some(notification).filter(|n| n.source.triggers_refetch())
    }
}
