use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::VecDeque;

/// Hard cap on stored ids per key for a given dedup window
pub fn history_cap(window: usize) -> usize {
    (window * 3).max(window + 10)
}

/// Recently served ids for one dedup key, oldest first.
///
/// Fixed-capacity ring: pushing onto a full history drops the oldest id.
#[derive(Debug, Clone)]
pub struct DedupHistory {
    ids: VecDeque<String>,
    cap: usize,
}

impl DedupHistory {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            ids: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, id: impl Into<String>) {
        if self.ids.len() == self.cap {
            self.ids.pop_front();
        }
        self.ids.push_back(id.into());
    }

    /// The last `n` ids (fewer if less are stored), oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &str> {
        let skip = self.ids.len().saturating_sub(n);
        self.ids.iter().skip(skip).map(String::as_str)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.cap
    }
}

/// Per-key dedup ledger.
///
/// Keys live in a [`DashMap`], so readers and writers of one key are
/// serialised by that key's shard lock.
#[derive(Debug)]
pub struct DedupStore {
    entries: DashMap<String, DedupHistory>,
    cap: usize,
}

impl DedupStore {
    pub fn new(window: usize) -> Self {
        Self {
            entries: DashMap::new(),
            cap: history_cap(window),
        }
    }

    /// Run `pick` against the key's history and append the id it returns.
    ///
    /// The shard lock is held from the read to the append. A key is only
    /// created once an id is recorded for it. `pick` must not touch the store.
    pub fn pick_and_record<T, F>(&self, key: &str, pick: F) -> T
    where
        F: FnOnce(Option<&DedupHistory>) -> (T, Option<String>),
    {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let (out, id) = pick(Some(entry.get()));
                if let Some(id) = id {
                    entry.get_mut().push(id);
                }
                out
            }
            Entry::Vacant(entry) => {
                let (out, id) = pick(None);
                if let Some(id) = id {
                    let mut history = DedupHistory::new(self.cap);
                    history.push(id);
                    entry.insert(history);
                }
                out
            }
        }
    }

    #[cfg(test)]
    pub fn record(&self, key: &str, id: &str) {
        self.pick_and_record(key, |_| ((), Some(id.to_string())));
    }

    #[cfg(test)]
    pub fn recent_ids(&self, key: &str, n: usize) -> Vec<String> {
        self.entries
            .get(key)
            .map(|h| h.recent(n).map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Number of dedup keys currently tracked
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }
}
