use std::collections::HashSet;
use std::sync::Mutex;

/// Per-request record of which `(full_name, ref)` pairs were already fetched.
///
/// Built fresh for every webhook; never shared across requests.
#[derive(Debug, Default)]
pub struct FetchCache {
    fetched: Mutex<HashSet<(String, String)>>,
}

impl FetchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time `(full_name, reference)` is seen; later calls return false.
    pub fn should_fetch(&self, full_name: &str, reference: &str) -> bool {
        let mut fetched = self
            .fetched
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        fetched.insert((full_name.to_string(), reference.to_string()))
    }

    pub fn len(&self) -> usize {
        self.fetched
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::FetchCache;

    #[test]
    fn functional_fetch_cache_replay_within_one_request() {
        let cache = FetchCache::new();
        assert!(cache.should_fetch("o/r", "main"));
        assert!(!cache.should_fetch("o/r", "main"));
        assert!(cache.should_fetch("o/r", "a1234"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn integration_concurrent_callers_see_exactly_one_true() {
        let cache = Arc::new(FetchCache::new());
        let winners = Arc::new(AtomicUsize::new(0));
        let handles = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let winners = Arc::clone(&winners);
                std::thread::spawn(move || {
                    if cache.should_fetch("org/repo", "refs/heads/main") {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().expect("thread");
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    proptest! {
        #[test]
        fn unit_should_fetch_true_once_per_key(keys in proptest::collection::vec(("[a-c]/[a-c]", "[a-c0-9]{1,3}"), 1..40)) {
            let cache = FetchCache::new();
            let mut seen = std::collections::HashSet::new();
            for (repo, reference) in keys {
                let expected = seen.insert((repo.clone(), reference.clone()));
                prop_assert_eq!(cache.should_fetch(&repo, &reference), expected);
            }
        }
    }
}
