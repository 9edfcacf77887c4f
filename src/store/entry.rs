// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Instant;

use once_cell::sync::OnceCell;

use crate::models::{data::Data, name::DIGEST_SIZE};

/// One stored response.
///
/// The implicit digest is computed on first use: most cache hits are exact
/// name matches and never need it.
#[derive(Debug)]
pub struct Entry {
    data: Data,
    arrived_at: Instant,
    stale_at: Instant,
    seq: u64,
    digest: OnceCell<[u8; DIGEST_SIZE]>,
}

impl Entry {
    pub fn new(data: Data, now: Instant, seq: u64) -> Self {
        let stale_at = now + data.freshness;
        Entry {
            data,
            arrived_at: now,
            stale_at,
            seq,
            digest: OnceCell::new(),
        }
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn arrived_at(&self) -> Instant {
        self.arrived_at
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        now >= self.stale_at
    }

    pub fn digest(&self) -> &[u8; DIGEST_SIZE] {
        self.digest.get_or_init(|| self.data.wire_digest())
    }
}
