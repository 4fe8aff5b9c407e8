// Filter store - versioned publish/subscribe holder of the URL filter state
use crate::domain::filter::{FilterParams, FilterSnapshot, FilterValue};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct FilterStore {
    tx: Arc<watch::Sender<FilterSnapshot>>,
}

impl FilterStore {
    pub fn new(initial: FilterParams) -> Self {
        let (tx, _) = watch::channel(FilterSnapshot {
            version: 0,
            params: initial,
        });
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> FilterSnapshot {
        self.tx.borrow().clone()
    }

    /// Receiver that observes every later published version.
    pub fn subscribe(&self) -> watch::Receiver<FilterSnapshot> {
        self.tx.subscribe()
    }

    /// Replace all parameters and publish a new version.
    pub fn replace(&self, params: FilterParams) -> FilterSnapshot {
        self.publish(|current| *current = params)
    }

    /// Set (or with `None`, remove) one parameter and publish a new version.
    pub fn set(&self, key: &str, value: Option<FilterValue>) -> FilterSnapshot {
        self.publish(|current| match value {
            Some(value) => current.insert(key, value),
            None => current.remove(key),
        })
    }

    fn publish(&self, change: impl FnOnce(&mut FilterParams)) -> FilterSnapshot {
        let mut published = None;
        self.tx.send_modify(|snapshot| {
            change(&mut snapshot.params);
            snapshot.version += 1;
            published = Some(snapshot.clone());
        });
        let snapshot = published.unwrap_or_else(|| self.snapshot());
        tracing::debug!(version = snapshot.version, "filter state published");
        snapshot
    }
}

impl Default for FilterStore {
    fn default() -> Self {
        Self::new(FilterParams::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_versions_increase_and_subscribers_observe() {
        let store = FilterStore::default();
        let mut rx = store.subscribe();
        assert_eq!(store.snapshot().version, 0);

        let published = store.replace(FilterParams::from_query_string("node=n1"));
        assert_eq!(published.version, 1);

        rx.changed().await.unwrap();
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.version, 1);
        assert_eq!(seen.params.get("node").unwrap().joined(), "n1");

        store.set("node", None);
        let snapshot = store.set("role", Some(FilterValue::Single("broker".to_string())));
        assert_eq!(snapshot.version, 3);
        assert!(snapshot.params.get("node").is_none());
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_get_their_own_version() {
        let store = FilterStore::default();
        let writers: Vec<_> = (0..64)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let value = format!("n{}", i);
                    let snapshot = store.set("node", Some(FilterValue::Single(value.clone())));
                    (snapshot.version, value, snapshot.params.get("node").unwrap().joined())
                })
            })
            .collect();

        let mut versions = Vec::new();
        for writer in writers {
            let (version, written, seen) = writer.await.unwrap();
            assert_eq!(written, seen);
            versions.push(version);
        }
        versions.sort_unstable();
        assert_eq!(versions, (1..=64).collect::<Vec<u64>>());
    }
}
