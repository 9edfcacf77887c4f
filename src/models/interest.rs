// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use rand::RngExt;

use crate::{
    cfg::enums::ChildSelector,
    models::name::{Component, Name},
};

/// Exclude filter: an ordered set of components a response's next name
/// component must not equal.
///
/// The set is kept sorted in canonical component order at all times so the
/// on-wire rendering is order-stable regardless of insertion order.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Exclude {
    components: Vec<Component>,
}

impl Exclude {
    pub fn new() -> Self {
        Exclude::default()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Inserts keeping canonical order; duplicate inserts are no-ops.
    pub fn insert(&mut self, component: Component) -> bool {
        match self.components.binary_search(&component) {
            Ok(_) => false,
            Err(pos) => {
                self.components.insert(pos, component);
                true
            },
        }
    }

    pub fn contains(&self, component: &Component) -> bool {
        self.components.binary_search(component).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }

    /// Inserts every entry of `other` (exclude-set inheritance across
    /// retransmissions).
    pub fn extend_from(&mut self, other: &Exclude) {
        for component in other.iter() {
            self.insert(component.clone());
        }
    }
}

/// A request packet.
///
/// Constructed fresh for every expression from a snapshot of the caller's
/// configuration; nothing here is shared mutable state.
#[derive(Clone, Debug)]
pub struct Interest {
    pub name: Name,
    pub lifetime: Duration,
    pub must_be_fresh: bool,
    pub min_suffix_components: Option<u32>,
    pub max_suffix_components: Option<u32>,
    pub child_selector: Option<ChildSelector>,
    pub exclude: Exclude,
    pub publisher_key_locator: Option<Name>,
    pub nonce: u32,
}

impl Interest {
    pub fn new(name: Name) -> Self {
        Interest {
            name,
            lifetime: Duration::from_millis(0),
            must_be_fresh: false,
            min_suffix_components: None,
            max_suffix_components: None,
            child_selector: None,
            exclude: Exclude::new(),
            publisher_key_locator: None,
            nonce: rand::rng().random(),
        }
    }

    /// Same name and selectors, fresh nonce.
    #[must_use]
    pub fn refreshed(&self) -> Self {
        let mut interest = self.clone();
        interest.nonce = rand::rng().random();
        interest
    }

    pub fn trailing_segment(&self) -> Option<u64> {
        self.name.trailing_segment()
    }

    /// Whether a response with `name || digest` is rejected by the exclude
    /// set or pinned digest suffix of this request.
    pub fn excludes_digest(&self, digest: &[u8; 32]) -> bool {
        self.exclude.contains(&Component::implicit_digest(*digest))
    }

    /// Digest component appended to the name, if this request is
    /// digest-pinned.
    pub fn pinned_digest(&self) -> Option<&[u8; 32]> {
        self.name.last().and_then(Component::as_implicit_digest)
    }

    /// Name without a trailing pinned digest component.
    pub fn data_name(&self) -> Name {
        if self.pinned_digest().is_some() {
            self.name.parent()
        } else {
            self.name.clone()
        }
    }
}
