// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::{BTreeMap, VecDeque},
    sync::RwLock,
    time::Instant,
};

use tracing::debug;

use crate::{
    cfg::enums::ChildSelector,
    models::{data::Data, interest::Interest, name::Name},
    store::entry::Entry,
};

struct Inner {
    index: BTreeMap<Name, Entry>,
    // insertion order; entries are checked against their seq on eviction so
    // a replaced name does not evict its successor early
    fifo: VecDeque<(Name, u64)>,
    limit: usize,
    next_seq: u64,
}

/// The send-side content store: a bounded, name-indexed map of produced
/// packets that answers repeated requests without re-invoking the
/// application.
///
/// Freshness tracking is coarse: stale entries are dropped when a lookup
/// walks over them, not on a timer. Readers run concurrently; writers are
/// exclusive.
pub struct ContentStore {
    inner: RwLock<Inner>,
}

impl ContentStore {
    pub fn new(limit: usize) -> Self {
        ContentStore {
            inner: RwLock::new(Inner {
                index: BTreeMap::new(),
                fifo: VecDeque::new(),
                limit,
                next_seq: 0,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn limit(&self) -> usize {
        self.inner.read().expect("lock poisoned").limit
    }

    /// Stores `data` under its name, replacing any previous packet of the
    /// same name. Returns the packets evicted to satisfy the size limit.
    pub fn insert(&self, data: Data) -> Vec<Data> {
        let now = Instant::now();
        let mut inner = self.inner.write().expect("lock poisoned");

        let seq = inner.next_seq;
        inner.next_seq += 1;

        let name = data.name.clone();
        inner.index.insert(name.clone(), Entry::new(data, now, seq));
        inner.fifo.push_back((name, seq));

        let mut evicted = Vec::new();
        while inner.index.len() > inner.limit {
            let Some((victim, victim_seq)) = inner.fifo.pop_front() else {
                break;
            };
            let live = inner
                .index
                .get(&victim)
                .is_some_and(|entry| entry.seq() == victim_seq);
            if live && let Some(entry) = inner.index.remove(&victim) {
                debug!("content store evicted {victim}");
                evicted.push(entry.data().clone());
            }
        }
        evicted
    }

    /// The entry most specifically matching `interest` under its selectors,
    /// or `None`. Stale entries encountered on the way are dropped.
    pub fn find(&self, interest: &Interest) -> Option<Data> {
        let now = Instant::now();
        let prefix = interest.data_name();

        let (found, stale) = {
            let inner = self.inner.read().expect("lock poisoned");
            Self::search(&inner, interest, &prefix, now)
        };

        if !stale.is_empty() {
            let mut inner = self.inner.write().expect("lock poisoned");
            for name in stale {
                inner.index.remove(&name);
            }
        }

        found
    }

    fn search(
        inner: &Inner,
        interest: &Interest,
        prefix: &Name,
        now: Instant,
    ) -> (Option<Data>, Vec<Name>) {
        let mut stale = Vec::new();
        let mut chosen: Option<&Entry> = None;

        for (name, entry) in inner.index.range(prefix.clone()..) {
            if !prefix.is_prefix_of(name) {
                break;
            }
            if interest.must_be_fresh && entry.is_stale(now) {
                stale.push(name.clone());
                continue;
            }
            if !Self::admits(interest, prefix, entry) {
                continue;
            }

            match interest.child_selector.unwrap_or_default() {
                // the index is in canonical order, so the first admitted
                // entry is the leftmost child
                ChildSelector::Leftmost => {
                    chosen = Some(entry);
                    break;
                },
                ChildSelector::Rightmost => chosen = Some(entry),
            }
        }

        (chosen.map(|entry| entry.data().clone()), stale)
    }

    fn admits(interest: &Interest, prefix: &Name, entry: &Entry) -> bool {
        let name = &entry.data().name;

        if let Some(pinned) = interest.pinned_digest() {
            return entry.digest() == pinned;
        }

        // the implicit digest counts as one trailing component
        let suffix_len = (name.len() - prefix.len() + 1) as u32;
        if interest
            .min_suffix_components
            .is_some_and(|min| suffix_len < min)
        {
            return false;
        }
        if interest
            .max_suffix_components
            .is_some_and(|max| suffix_len > max)
        {
            return false;
        }

        if !interest.exclude.is_empty() {
            if name.len() == prefix.len() {
                if interest.excludes_digest(entry.digest()) {
                    return false;
                }
            } else if let Some(next) = name.get(prefix.len())
                && interest.exclude.contains(next)
            {
                return false;
            }
        }

        true
    }
}
