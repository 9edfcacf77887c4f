// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod context;
pub mod reliable;
pub mod rtt;
pub mod selectors;
pub mod simple;
pub mod unreliable;

use thiserror::Error;

use crate::models::{
    data::Data, interest::Interest, manifest::Manifest, nack::ApplicationNack,
};

/// Why a retrieval ended without the full ADU.
///
/// Transient conditions (timeouts within the retry budget, NONE and
/// PRODUCER_DELAY NACKs) are recovered internally and never surface here.
#[derive(Debug, Error)]
pub enum RetrieveError {
    /// DATA_NOT_AVAILABLE NACK or the retry ceiling was hit. Whatever
    /// contiguous prefix was assembled is carried along.
    #[error("content not available ({reason}); {} bytes assembled", partial.len())]
    NotAvailable {
        reason: &'static str,
        partial: Vec<u8>,
    },
    /// Verification kept failing past the exclusion budget.
    #[error("content poisoned at segment {segment}")]
    ContentPoisoned { segment: u64 },
    /// The producer refused to answer an unverified request.
    #[error("request not verified by the producer")]
    InterestNotVerified,
    /// The caller stopped the context mid-retrieval.
    #[error("retrieval stopped; {} bytes assembled", partial.len())]
    Stopped { partial: Vec<u8> },
    /// Another retrieval is still running on this context.
    #[error("consumer context is busy")]
    Busy,
    #[error(transparent)]
    Face(#[from] anyhow::Error),
}

pub type InterestCallback = Box<dyn FnMut(&Interest) + Send>;
pub type DataCallback = Box<dyn FnMut(&Data) + Send>;
pub type NackCallback = Box<dyn FnMut(&ApplicationNack) + Send>;
pub type ManifestCallback = Box<dyn FnMut(&Manifest) + Send>;
pub type VerifyCallback = Box<dyn Fn(&Data) -> bool + Send + Sync>;
pub type ContentCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Optional observation and verification hooks fired by the retrieval
/// protocols.
///
/// The protocols hold a handle to this table, never to the context that
/// owns them. Callbacks run on the retrieval's own task; a blocking
/// callback blocks the loop.
#[derive(Default)]
pub struct ConsumerCallbacks {
    /// A request is about to be handed to the face.
    pub interest_leave_cntx: Option<InterestCallback>,
    /// A request is being re-expressed (any retransmission flavor).
    pub interest_retransmit: Option<InterestCallback>,
    /// A request expired without a response.
    pub interest_expired: Option<InterestCallback>,
    /// A request was satisfied by a response.
    pub interest_satisfied: Option<InterestCallback>,
    /// A response entered the context (before verification).
    pub data_enter_cntx: Option<DataCallback>,
    /// A verified NACK entered the context.
    pub nack_enter_cntx: Option<NackCallback>,
    /// A verified manifest entered the context.
    pub manifest_enter_cntx: Option<ManifestCallback>,
    /// Application-side verification routine; `None` falls back to the
    /// packet's self digest where present.
    pub data_to_verify: Option<VerifyCallback>,
    /// Terminal delivery of the assembled byte buffer. Fires at most once
    /// per retrieval.
    pub content_retrieved: Option<ContentCallback>,
}

impl ConsumerCallbacks {
    pub(crate) fn on_interest_leave(&mut self, interest: &Interest) {
        if let Some(callback) = self.interest_leave_cntx.as_mut() {
            callback(interest);
        }
    }

    pub(crate) fn on_interest_retransmit(&mut self, interest: &Interest) {
        if let Some(callback) = self.interest_retransmit.as_mut() {
            callback(interest);
        }
    }

    pub(crate) fn on_interest_expired(&mut self, interest: &Interest) {
        if let Some(callback) = self.interest_expired.as_mut() {
            callback(interest);
        }
    }

    pub(crate) fn on_interest_satisfied(&mut self, interest: &Interest) {
        if let Some(callback) = self.interest_satisfied.as_mut() {
            callback(interest);
        }
    }

    pub(crate) fn on_data_enter(&mut self, data: &Data) {
        if let Some(callback) = self.data_enter_cntx.as_mut() {
            callback(data);
        }
    }

    pub(crate) fn on_nack_enter(&mut self, nack: &ApplicationNack) {
        if let Some(callback) = self.nack_enter_cntx.as_mut() {
            callback(nack);
        }
    }

    pub(crate) fn on_manifest_enter(&mut self, manifest: &Manifest) {
        if let Some(callback) = self.manifest_enter_cntx.as_mut() {
            callback(manifest);
        }
    }

    pub(crate) fn on_content_retrieved(&mut self, content: &[u8]) {
        if let Some(callback) = self.content_retrieved.as_mut() {
            callback(content);
        }
    }
}
