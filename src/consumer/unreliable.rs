// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    cfg::config::{ConsumerConfig, DEFAULT_FAST_RETX_CONDITION},
    consumer::{ConsumerCallbacks, RetrieveError, selectors::apply_selectors},
    face::{EventSender, Face, FaceEvent, PendingId},
    models::{
        data::{ContentType, Data},
        interest::Interest,
        nack::ApplicationNack,
        name::Name,
    },
};

/// Consecutive timeouts tolerated before the final block is known. Without
/// this, a fully lost first window would keep requesting segments of an ADU
/// whose length was never learned.
const MAX_TIMEOUTS_BEFORE_DISCOVERY: u32 = 2;

/// The unreliable retrieval variant: windowed pipeline and fast
/// retransmission, but no timeout-driven retransmission, no verification
/// recovery and no manifest handling. Verified payloads are delivered in
/// arrival order, chunk by chunk.
pub struct UnreliableRetrieval<'a, F: Face> {
    cfg: &'a ConsumerConfig,
    callbacks: &'a mut ConsumerCallbacks,
    face: &'a F,
    suffix: Name,
    events_tx: EventSender,

    next_seg: u64,
    final_seg: Option<u64>,
    window: u32,
    in_flight: u32,
    timeouts_before_discovery: u32,

    pending: HashMap<u64, PendingId>,
    received_set: BTreeSet<u64>,
    fast_retx_set: BTreeSet<u64>,

    content: Vec<u8>,
    running: bool,
    failure: Option<RetrieveError>,
}

impl<'a, F: Face> UnreliableRetrieval<'a, F> {
    pub fn new(
        cfg: &'a ConsumerConfig,
        callbacks: &'a mut ConsumerCallbacks,
        face: &'a F,
        suffix: Name,
        events_tx: EventSender,
    ) -> Self {
        UnreliableRetrieval {
            cfg,
            callbacks,
            face,
            suffix,
            events_tx,
            next_seg: 0,
            final_seg: None,
            window: 1,
            in_flight: 0,
            timeouts_before_discovery: 0,
            pending: HashMap::new(),
            received_set: BTreeSet::new(),
            fast_retx_set: BTreeSet::new(),
            content: Vec::new(),
            running: false,
            failure: None,
        }
    }

    pub async fn run(
        mut self,
        events_rx: &mut mpsc::UnboundedReceiver<FaceEvent>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, RetrieveError> {
        self.running = true;

        if let Err(err) = self.send_next_interest() {
            return Err(RetrieveError::Face(err));
        }

        while self.running {
            tokio::select! {
                event = events_rx.recv() => match event {
                    Some(FaceEvent::Data { interest, data }) => {
                        self.on_data(interest, data);
                    },
                    Some(FaceEvent::Timeout { interest }) => {
                        self.on_timeout(interest);
                    },
                    None => {
                        warn!("face event channel closed mid-retrieval");
                        self.running = false;
                        self.failure = Some(RetrieveError::NotAvailable {
                            reason: "transport gone",
                            partial: self.content.clone(),
                        });
                    },
                },
                _ = cancel.cancelled() => {
                    self.running = false;
                    self.failure = Some(RetrieveError::Stopped {
                        partial: self.content.clone(),
                    });
                },
            }
        }

        for (_, id) in self.pending.drain() {
            self.face.remove_pending_interest(id);
        }

        match self.failure.take() {
            Some(failure) => Err(failure),
            None => Ok(self.content),
        }
    }

    fn request_name(&self, seg: u64) -> Name {
        let mut name = self.cfg.prefix.clone();
        name.append(&self.suffix);
        name.append_segment(seg);
        name
    }

    fn build_interest(&self, name: Name) -> Interest {
        let mut interest = Interest::new(name);
        interest.lifetime = self.cfg.base_lifetime();
        apply_selectors(&mut interest, self.cfg);
        interest
    }

    fn send_next_interest(&mut self) -> Result<()> {
        let seg = self.next_seg;
        let interest = self.build_interest(self.request_name(seg));
        self.callbacks.on_interest_leave(&interest);

        let id = self
            .face
            .express_interest(interest, self.events_tx.clone())?;
        self.pending.insert(seg, id);
        self.in_flight += 1;
        self.next_seg += 1;
        Ok(())
    }

    fn pipeline(&mut self) {
        while self.running
            && self.in_flight < self.window
            && self.final_seg.is_none_or(|final_seg| self.next_seg <= final_seg)
        {
            if let Err(err) = self.send_next_interest() {
                warn!("pipelining stalled: {err}");
                break;
            }
        }
    }

    fn on_data(&mut self, interest: Interest, data: Data) {
        if !self.running {
            return;
        }
        let Some(seg) = interest.data_name().trailing_segment() else {
            return;
        };

        self.in_flight = self.in_flight.saturating_sub(1);
        self.pending.remove(&seg);

        self.callbacks.on_data_enter(&data);
        self.callbacks.on_interest_satisfied(&interest);

        let verified = match self.callbacks.data_to_verify.as_ref() {
            Some(verify) => verify(&data),
            None => true,
        };

        if verified {
            self.note_received(seg);

            match data.content_type {
                ContentType::Blob => {
                    self.window = (self.window + 1).min(self.cfg.max_window);
                    if let Some(final_seg) = data.final_block_segment() {
                        self.final_seg = Some(final_seg);
                    }
                    self.callbacks.on_content_retrieved(&data.content);
                    self.content.extend_from_slice(&data.content);
                },
                ContentType::Nack => {
                    self.window = (self.window / 2).max(self.cfg.min_window);
                    match ApplicationNack::from_data(&data) {
                        Ok(nack) => self.callbacks.on_nack_enter(&nack),
                        Err(err) => debug!("malformed NACK dropped: {err}"),
                    }
                },
                ContentType::Manifest => {
                    debug!("manifest {} ignored by unreliable retrieval", data.name);
                },
            }
        }

        if self
            .final_seg
            .is_some_and(|final_seg| seg >= final_seg)
        {
            self.running = false;
            return;
        }

        self.pipeline();
    }

    /// No recovery: the window shrinks and the pipeline moves on. Losing
    /// every response before the final block is discovered aborts.
    fn on_timeout(&mut self, interest: Interest) {
        if !self.running {
            return;
        }
        let Some(seg) = interest.data_name().trailing_segment() else {
            return;
        };

        self.in_flight = self.in_flight.saturating_sub(1);
        self.pending.remove(&seg);
        self.window = (self.window / 2).max(self.cfg.min_window);
        self.callbacks.on_interest_expired(&interest);

        if self.final_seg.is_none() {
            self.timeouts_before_discovery += 1;
            if self.timeouts_before_discovery > MAX_TIMEOUTS_BEFORE_DISCOVERY {
                self.running = false;
                self.failure = Some(RetrieveError::NotAvailable {
                    reason: "no response while probing for the final block",
                    partial: self.content.clone(),
                });
                return;
            }
        }

        self.pipeline();
    }

    fn note_received(&mut self, seg: u64) {
        self.received_set.insert(seg);
        self.fast_retx_set.remove(&seg);

        let Some(&highest) = self.received_set.iter().next_back() else {
            return;
        };
        let mut to_retransmit = Vec::new();
        for gap in 0..highest {
            if self.received_set.contains(&gap) || self.fast_retx_set.contains(&gap) {
                continue;
            }
            if self.received_set.range(gap..).count() as u32
                >= DEFAULT_FAST_RETX_CONDITION
            {
                to_retransmit.push(gap);
            }
        }

        for seg in to_retransmit {
            debug!("fast retransmitting segment {seg}");
            self.fast_retx_set.insert(seg);
            let interest = self.build_interest(self.request_name(seg));
            self.callbacks.on_interest_retransmit(&interest);
            self.callbacks.on_interest_leave(&interest);
            if let Some(old) = self.pending.remove(&seg) {
                self.face.remove_pending_interest(old);
            } else {
                self.in_flight += 1;
            }
            match self.face.express_interest(interest, self.events_tx.clone()) {
                Ok(id) => {
                    self.pending.insert(seg, id);
                },
                Err(err) => warn!("fast retransmit failed: {err}"),
            }
        }
    }
}
