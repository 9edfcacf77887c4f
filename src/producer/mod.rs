// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod context;
pub mod segmenter;

use std::sync::Arc;

use thiserror::Error;

use crate::models::{data::Data, interest::Interest, name::Name};

/// Producer-side failures surfaced to the application.
#[derive(Debug, Error)]
pub enum ProduceError {
    #[error("prefix registration failed")]
    Registration(#[source] anyhow::Error),
    #[error("name {name} is outside the registered prefix")]
    NameOutsidePrefix { name: Name },
    #[error("packet size budget leaves no room for content (cap would be {cap})")]
    PacketTooSmall { cap: isize },
    #[error("signing failed")]
    Signing(#[source] anyhow::Error),
    #[error("segment emission failed")]
    Emit(#[source] anyhow::Error),
    #[error(transparent)]
    Face(anyhow::Error),
}

pub type ProducerInterestCallback = Box<dyn FnMut(&Interest) + Send>;
pub type ProducerDataCallback = Box<dyn FnMut(&Data) + Send>;
/// Replacement signing routine; fires instead of the built-in signer for
/// packets that are not bound to a manifest. Shared so the producer can
/// call it without holding the callback table lock.
pub type SecureCallback = Arc<dyn Fn(&mut Data) -> anyhow::Result<()> + Send + Sync>;

/// Producer event surface. Slots are optional; the worker task and the
/// producing caller both fire them, so the table lives behind a lock.
#[derive(Default)]
pub struct ProducerCallbacks {
    /// A request arrived from the transport.
    pub interest_enter_cntx: Option<ProducerInterestCallback>,
    /// A request was dropped because the receive buffer was full.
    pub interest_drop_rcv_buf: Option<ProducerInterestCallback>,
    /// A request was dequeued by the worker.
    pub interest_pass_rcv_buf: Option<ProducerInterestCallback>,
    /// A request was answered straight from the content store.
    pub cache_hit: Option<ProducerInterestCallback>,
    /// A request missed the store; the application should produce or nack.
    pub cache_miss: Option<ProducerInterestCallback>,
    /// A fresh segment exists, not yet signed.
    pub new_segment: Option<ProducerDataCallback>,
    /// Application-provided signing (see [`SecureCallback`]).
    pub data_to_secure: Option<SecureCallback>,
    /// A packet is about to enter the content store.
    pub data_in_snd_buf: Option<ProducerDataCallback>,
    /// A packet is leaving toward the transport.
    pub data_leave_cntx: Option<ProducerDataCallback>,
    /// A packet was evicted from the content store.
    pub data_evict_snd_buf: Option<ProducerDataCallback>,
}

impl ProducerCallbacks {
    pub(crate) fn fire_interest(
        slot: &mut Option<ProducerInterestCallback>,
        interest: &Interest,
    ) {
        if let Some(callback) = slot.as_mut() {
            callback(interest);
        }
    }

    pub(crate) fn fire_data(slot: &mut Option<ProducerDataCallback>, data: &Data) {
        if let Some(callback) = slot.as_mut() {
            callback(data);
        }
    }
}
