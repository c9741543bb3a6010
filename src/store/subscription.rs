use tokio::sync::watch;

/// Change feed over the store.
///
/// Each call to [`Subscription::changed`] resolves once at least one write
/// has been committed since the previous call. Bursts of writes coalesce
/// into a single wake-up carrying the latest revision.
#[derive(Debug)]
pub struct Subscription {
    rx: Option<watch::Receiver<u64>>,
}

impl Subscription {
    pub(crate) fn new(rx: watch::Receiver<u64>) -> Self {
        Self { rx: Some(rx) }
    }

    /// Wait for the next committed revision.
    ///
    /// Returns `None` once unsubscribed or when the store is gone.
    pub async fn changed(&mut self) -> Option<u64> {
        let rx = self.rx.as_mut()?;
        if rx.changed().await.is_err() {
            self.rx = None;
            return None;
        }
        let revision = *rx.borrow_and_update();
        Some(revision)
    }

    /// Latest revision published by the store.
    pub fn revision(&self) -> Option<u64> {
        self.rx.as_ref().map(|rx| *rx.borrow())
    }

    pub fn unsubscribe(&mut self) {
        self.rx = None;
    }

    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }
}
