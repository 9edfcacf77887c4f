// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod mem;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::models::{data::Data, interest::Interest, name::Name};

/// Identifies one expressed, not-yet-satisfied request at the face.
pub type PendingId = u64;

/// Outcome of one expressed request, delivered on the reply channel that was
/// handed to [`Face::express_interest`].
///
/// Exactly one event is delivered per expression: the matching response or a
/// lifetime expiry. Removal via [`Face::remove_pending_interest`] delivers
/// nothing.
#[derive(Debug)]
pub enum FaceEvent {
    Data { interest: Interest, data: Data },
    Timeout { interest: Interest },
}

/// Channel on which a consumer-side loop receives its [`FaceEvent`]s.
pub type EventSender = mpsc::UnboundedSender<FaceEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<FaceEvent>;

/// Channel on which a producer-side listener receives incoming requests.
pub type InterestSender = mpsc::UnboundedSender<Interest>;
pub type InterestReceiver = mpsc::UnboundedReceiver<Interest>;

/// The packet transport underneath both contexts.
///
/// The core never reaches for a process-global face; whoever constructs a
/// context passes one in. All event delivery is channel-based so state
/// machine transitions stay on their owning task.
pub trait Face: Send + Sync + 'static {
    /// Forwards a request. The matching response or a timeout is delivered
    /// to `reply` exactly once.
    fn express_interest(&self, interest: Interest, reply: EventSender)
    -> Result<PendingId>;

    /// Withdraws one pending request; its reply channel sees no event.
    fn remove_pending_interest(&self, id: PendingId);

    /// Withdraws every pending request of this face handle.
    fn remove_all_pending_interests(&self);

    /// Registers a prefix filter; incoming requests under `prefix` are
    /// forwarded to `incoming`. Errors surface registration failure
    /// synchronously.
    fn register_prefix(&self, prefix: Name, incoming: InterestSender) -> Result<()>;

    /// Emits a response packet toward whoever requested it.
    fn put(&self, data: Data) -> Result<()>;
}

/// Whether `data` satisfies `interest` at the transport level: name match
/// (digest-pinned names compare the wire digest), plus the exclude filter
/// applied to the first component past the request name (the implicit
/// digest when the names are equal).
pub fn interest_matches(interest: &Interest, data: &Data) -> bool {
    let data_name = interest.data_name();
    if !data_name.is_prefix_of(&data.name) {
        return false;
    }

    if let Some(pinned) = interest.pinned_digest() {
        return data.wire_digest() == *pinned;
    }

    if !interest.exclude.is_empty() {
        if data.name.len() == data_name.len() {
            if interest.excludes_digest(&data.wire_digest()) {
                return false;
            }
        } else if let Some(next) = data.name.get(data_name.len())
            && interest.exclude.contains(next)
        {
            return false;
        }
    }

    true
}
