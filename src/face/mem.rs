// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicU64, Ordering},
};

use anyhow::{Result, bail};
use dashmap::DashMap;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    face::{EventSender, Face, FaceEvent, InterestSender, PendingId, interest_matches},
    models::{data::Data, interest::Interest, name::Name},
};

/// Verdict of a link hook for one packet in flight.
pub type InterestHook = dyn Fn(&Interest) -> bool + Send + Sync;
pub type DataHook = dyn Fn(Data) -> Option<Data> + Send + Sync;

#[derive(Debug)]
struct PendingEntry {
    interest: Interest,
    reply: EventSender,
    owner: u64,
}

/// An in-process forwarder connecting consumer and producer contexts running
/// in the same process.
///
/// One [`MemLink`] is the shared "wire"; [`MemLink::face`] hands out face
/// endpoints. Requests are routed to the longest registered prefix; each
/// expression carries its own lifetime timer. Test hooks can drop or rewrite
/// packets in flight.
pub struct MemLink {
    pending: DashMap<PendingId, PendingEntry>,
    filters: RwLock<Vec<(Name, InterestSender)>>,
    next_id: AtomicU64,
    next_owner: AtomicU64,
    cancel: CancellationToken,
    refuse_registrations: RwLock<bool>,
    interest_hook: RwLock<Option<Box<InterestHook>>>,
    data_hook: RwLock<Option<Box<DataHook>>>,
}

impl Default for MemLink {
    fn default() -> Self {
        MemLink::new()
    }
}

impl MemLink {
    pub fn new() -> Self {
        MemLink {
            pending: DashMap::new(),
            filters: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            next_owner: AtomicU64::new(1),
            cancel: CancellationToken::new(),
            refuse_registrations: RwLock::new(false),
            interest_hook: RwLock::new(None),
            data_hook: RwLock::new(None),
        }
    }

    /// A new face endpoint on this link.
    pub fn face(self: &Arc<Self>) -> MemFace {
        MemFace {
            link: Arc::clone(self),
            owner: self.next_owner.fetch_add(1, Ordering::SeqCst),
        }
    }

    /// Drops every pending request and stops all timers.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.pending.clear();
    }

    /// Makes subsequent prefix registrations fail (test hook).
    pub fn refuse_registrations(&self, refuse: bool) {
        *self.refuse_registrations.write().expect("lock poisoned") = refuse;
    }

    /// Installs a hook deciding whether each forwarded request is delivered.
    pub fn set_interest_hook(
        &self,
        hook: impl Fn(&Interest) -> bool + Send + Sync + 'static,
    ) {
        *self.interest_hook.write().expect("lock poisoned") = Some(Box::new(hook));
    }

    /// Installs a hook that may drop or rewrite each response in flight.
    pub fn set_data_hook(
        &self,
        hook: impl Fn(Data) -> Option<Data> + Send + Sync + 'static,
    ) {
        *self.data_hook.write().expect("lock poisoned") = Some(Box::new(hook));
    }

    fn route_interest(&self, interest: &Interest) {
        let delivered = {
            let hook = self.interest_hook.read().expect("lock poisoned");
            hook.as_ref().is_none_or(|hook| hook(interest))
        };
        if !delivered {
            debug!("link dropped interest {}", interest.name);
            return;
        }

        let filters = self.filters.read().expect("lock poisoned");
        let target = filters
            .iter()
            .filter(|(prefix, _)| prefix.is_prefix_of(&interest.data_name()))
            .max_by_key(|(prefix, _)| prefix.len());

        match target {
            Some((prefix, tx)) => {
                if tx.send(interest.clone()).is_err() {
                    warn!("filter for {prefix} is gone, dropping {}", interest.name);
                }
            },
            None => debug!("no filter for {}", interest.name),
        }
    }

    fn deliver(&self, data: Data) {
        let data = {
            let hook = self.data_hook.read().expect("lock poisoned");
            match hook.as_ref() {
                Some(hook) => match hook(data) {
                    Some(data) => data,
                    None => return,
                },
                None => data,
            }
        };

        let matching: Vec<PendingId> = self
            .pending
            .iter()
            .filter(|entry| interest_matches(&entry.interest, &data))
            .map(|entry| *entry.key())
            .collect();

        for id in matching {
            if let Some((_, entry)) = self.pending.remove(&id) {
                let event = FaceEvent::Data {
                    interest: entry.interest,
                    data: data.clone(),
                };
                let _ = entry.reply.send(event);
            }
        }
    }
}

/// One endpoint of a [`MemLink`].
#[derive(Clone)]
pub struct MemFace {
    link: Arc<MemLink>,
    owner: u64,
}

impl Face for MemFace {
    fn express_interest(
        &self,
        interest: Interest,
        reply: EventSender,
    ) -> Result<PendingId> {
        if self.link.cancel.is_cancelled() {
            bail!("link is shut down");
        }

        let id = self.link.next_id.fetch_add(1, Ordering::SeqCst);
        let lifetime = interest.lifetime;
        self.link.pending.insert(
            id,
            PendingEntry {
                interest: interest.clone(),
                reply,
                owner: self.owner,
            },
        );

        // lifetime timer: fires only if the entry is still pending
        let link = Arc::clone(&self.link);
        let cancel = self.link.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {},
                _ = sleep(lifetime) => {
                    if let Some((_, entry)) = link.pending.remove(&id) {
                        debug!("interest {} timed out", entry.interest.name);
                        let _ = entry.reply.send(FaceEvent::Timeout {
                            interest: entry.interest,
                        });
                    }
                },
            }
        });

        self.link.route_interest(&interest);
        Ok(id)
    }

    fn remove_pending_interest(&self, id: PendingId) {
        self.link.pending.remove(&id);
    }

    fn remove_all_pending_interests(&self) {
        self.link
            .pending
            .retain(|_, entry| entry.owner != self.owner);
    }

    fn register_prefix(&self, prefix: Name, incoming: InterestSender) -> Result<()> {
        if *self.link.refuse_registrations.read().expect("lock poisoned") {
            bail!("registration refused for {prefix}");
        }
        let mut filters = self.link.filters.write().expect("lock poisoned");
        if filters.iter().any(|(existing, _)| *existing == prefix) {
            bail!("prefix {prefix} is already registered");
        }
        filters.push((prefix, incoming));
        Ok(())
    }

    fn put(&self, data: Data) -> Result<()> {
        if self.link.cancel.is_cancelled() {
            bail!("link is shut down");
        }
        self.link.deliver(data);
        Ok(())
    }
}
