// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{cfg::config::ConsumerConfig, models::interest::Interest};

/// Copies the caller's request-side constraints onto a freshly built
/// request.
///
/// Selectors are applied from a snapshot of the configuration; the request
/// owns its exclude set, so nothing here is shared between expressions.
pub fn apply_selectors(interest: &mut Interest, cfg: &ConsumerConfig) {
    if let Some(min) = cfg.min_suffix_components {
        interest.min_suffix_components = Some(min);
    }
    if let Some(max) = cfg.max_suffix_components {
        interest.max_suffix_components = Some(max);
    }
    if cfg.must_be_fresh {
        interest.must_be_fresh = true;
    }
    if let Some(child) = cfg.child_selector {
        interest.child_selector = Some(child);
    }
    if let Some(locator) = &cfg.publisher_key_locator {
        interest.publisher_key_locator = Some(locator.clone());
    }
}
