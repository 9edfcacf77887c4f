// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    future::poll_fn,
    time::Duration,
};

use anyhow::Result;
use tokio::{sync::mpsc, time::Instant};
use tokio_util::{
    sync::CancellationToken,
    time::{DelayQueue, delay_queue},
};
use tracing::{debug, warn};

use crate::{
    cfg::config::{ConsumerConfig, DEFAULT_FAST_RETX_CONDITION},
    consumer::{
        ConsumerCallbacks, RetrieveError, rtt::RttEstimator, selectors::apply_selectors,
    },
    face::{EventSender, Face, FaceEvent, PendingId},
    models::{
        data::{ContentType, Data, SignatureType},
        interest::Interest,
        manifest::Manifest,
        nack::{ApplicationNack, NackStatus},
        name::{Component, Name},
    },
    security::signer::verify_self_digest,
};

/// How many unverified segments may sit waiting for their manifest, as a
/// multiple of the current window.
const UNVERIFIED_WINDOW_MULTIPLE: u32 = 4;

enum LoopEvent {
    Face(FaceEvent),
    RetryDue(Interest),
    ChannelClosed,
    Cancelled,
}

/// Timers for scheduled retransmissions (NACK retry-after delays).
struct RetxTimers {
    queue: DelayQueue<Interest>,
    keys: HashMap<u64, delay_queue::Key>,
}

impl RetxTimers {
    fn new() -> Self {
        RetxTimers {
            queue: DelayQueue::new(),
            keys: HashMap::new(),
        }
    }

    fn schedule(&mut self, seg: u64, interest: Interest, delay: Duration) {
        self.cancel(seg);
        let key = self.queue.insert(interest, delay);
        self.keys.insert(seg, key);
    }

    fn cancel(&mut self, seg: u64) {
        if let Some(key) = self.keys.remove(&seg) {
            self.queue.try_remove(&key);
        }
    }

    fn cancel_all(&mut self) {
        for (_, key) in self.keys.drain() {
            self.queue.try_remove(&key);
        }
    }

    fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    async fn next_expired(&mut self) -> Option<Interest> {
        let expired = poll_fn(|cx| self.queue.poll_expired(cx)).await?;
        let interest = expired.into_inner();
        if let Some(seg) = interest.data_name().trailing_segment() {
            self.keys.remove(&seg);
        }
        Some(interest)
    }
}

/// The reliable retrieval state machine: a windowed, self-clocked request
/// pipeline with RTT-driven timeouts, fast retransmission, NACK recovery,
/// poisoning recovery and manifest-driven verification.
///
/// One instance retrieves one ADU and is then discarded.
pub struct ReliableRetrieval<'a, F: Face> {
    cfg: &'a ConsumerConfig,
    callbacks: &'a mut ConsumerCallbacks,
    face: &'a F,
    suffix: Name,
    events_tx: EventSender,

    next_seg: u64,
    final_seg: Option<u64>,
    last_reassembled: u64,
    window: u32,
    in_flight: u32,
    lifetime: Duration,

    retx_count: HashMap<u64, u32>,
    pending: HashMap<u64, PendingId>,
    send_time: HashMap<u64, Instant>,
    rx_verified: BTreeMap<u64, Data>,
    rx_unverified: BTreeMap<u64, Data>,
    verified_manifests: HashMap<u64, Manifest>,
    received_set: BTreeSet<u64>,
    fast_retx_set: HashSet<u64>,

    content: Vec<u8>,
    rtt: RttEstimator,
    running: bool,
    delivered: bool,
    failure: Option<RetrieveError>,
}

impl<'a, F: Face> ReliableRetrieval<'a, F> {
    pub fn new(
        cfg: &'a ConsumerConfig,
        callbacks: &'a mut ConsumerCallbacks,
        face: &'a F,
        suffix: Name,
        events_tx: EventSender,
    ) -> Self {
        let lifetime = cfg.base_lifetime();
        ReliableRetrieval {
            cfg,
            callbacks,
            face,
            suffix,
            events_tx,
            next_seg: 0,
            final_seg: None,
            last_reassembled: 0,
            // discovery round: exactly one request until segment 0 reveals
            // the final block marker
            window: 1,
            in_flight: 0,
            lifetime,
            retx_count: HashMap::new(),
            pending: HashMap::new(),
            send_time: HashMap::new(),
            rx_verified: BTreeMap::new(),
            rx_unverified: BTreeMap::new(),
            verified_manifests: HashMap::new(),
            received_set: BTreeSet::new(),
            fast_retx_set: HashSet::new(),
            content: Vec::new(),
            rtt: RttEstimator::new(),
            running: false,
            delivered: false,
            failure: None,
        }
    }

    /// Drives the retrieval to completion. Returns the assembled buffer and
    /// the final window size (for inheritance damping by the caller).
    pub async fn run(
        mut self,
        events_rx: &mut mpsc::UnboundedReceiver<FaceEvent>,
        cancel: &CancellationToken,
    ) -> (Result<Vec<u8>, RetrieveError>, u32) {
        self.running = true;
        let mut timers = RetxTimers::new();

        if let Err(err) = self.send_next_interest() {
            return (Err(RetrieveError::Face(err)), self.window);
        }

        while self.running {
            // resolve the next event first; handlers below need the timer
            // queue mutably as well
            let event = tokio::select! {
                event = events_rx.recv() => match event {
                    Some(event) => LoopEvent::Face(event),
                    None => LoopEvent::ChannelClosed,
                },
                Some(interest) = timers.next_expired(), if !timers.is_empty() => {
                    LoopEvent::RetryDue(interest)
                },
                _ = cancel.cancelled() => LoopEvent::Cancelled,
            };

            match event {
                LoopEvent::Face(FaceEvent::Data { interest, data }) => {
                    self.on_data(interest, data, &mut timers);
                },
                LoopEvent::Face(FaceEvent::Timeout { interest }) => {
                    self.on_timeout(interest, &mut timers);
                },
                LoopEvent::RetryDue(interest) => self.retransmit_fresh(interest),
                LoopEvent::ChannelClosed => {
                    warn!("face event channel closed mid-retrieval");
                    self.running = false;
                    self.failure = Some(RetrieveError::NotAvailable {
                        reason: "transport gone",
                        partial: self.content.clone(),
                    });
                },
                LoopEvent::Cancelled => {
                    debug!("retrieval of {} stopped by caller", self.suffix);
                    self.running = false;
                    self.failure = Some(RetrieveError::Stopped {
                        partial: self.content.clone(),
                    });
                },
            }
        }

        self.cleanup(&mut timers);

        let window = self.window;
        if self.delivered && self.failure.is_none() {
            (Ok(std::mem::take(&mut self.content)), window)
        } else {
            let failure = self.failure.take().unwrap_or(RetrieveError::Stopped {
                partial: std::mem::take(&mut self.content),
            });
            (Err(failure), window)
        }
    }

    fn cleanup(&mut self, timers: &mut RetxTimers) {
        for (_, id) in self.pending.drain() {
            self.face.remove_pending_interest(id);
        }
        timers.cancel_all();
        self.in_flight = 0;
    }

    // ── transmission ───────────────────────────────────────────────────────

    fn request_name(&self, seg: u64) -> Name {
        let mut name = self.cfg.prefix.clone();
        name.append(&self.suffix);
        name.append_segment(seg);
        name
    }

    fn build_interest(&self, name: Name) -> Interest {
        let mut interest = Interest::new(name);
        interest.lifetime = self.lifetime;
        apply_selectors(&mut interest, self.cfg);
        interest
    }

    /// First transmission of the next pipeline segment.
    fn send_next_interest(&mut self) -> Result<()> {
        let seg = self.next_seg;
        let interest = self.build_interest(self.request_name(seg));

        self.callbacks.on_interest_leave(&interest);
        self.retx_count.insert(seg, 0);
        self.send_time.insert(seg, Instant::now());

        let id = self
            .face
            .express_interest(interest, self.events_tx.clone())?;
        self.pending.insert(seg, id);
        self.in_flight += 1;
        self.next_seg += 1;
        Ok(())
    }

    /// Re-expression of a request for `seg`. Replaces any pending request
    /// for the same segment; samples from it are discarded (Karn's rule).
    fn express_retransmit(&mut self, seg: u64, interest: Interest) {
        let replaced = match self.pending.remove(&seg) {
            Some(old) => {
                self.face.remove_pending_interest(old);
                true
            },
            None => {
                self.in_flight += 1;
                false
            },
        };
        *self.retx_count.entry(seg).or_insert(0) += 1;
        self.send_time.remove(&seg);

        self.callbacks.on_interest_retransmit(&interest);
        self.callbacks.on_interest_leave(&interest);

        match self.face.express_interest(interest, self.events_tx.clone()) {
            Ok(id) => {
                self.pending.insert(seg, id);
            },
            Err(err) => {
                warn!("retransmit of segment {seg} failed: {err}");
                if !replaced {
                    self.in_flight = self.in_flight.saturating_sub(1);
                }
            },
        }
    }

    /// Fills the pipeline while the window has room and segments remain.
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

    // ── window discipline ──────────────────────────────────────────────────

    fn grow_window(&mut self) {
        self.window = (self.window + 1).min(self.cfg.max_window);
    }

    fn shrink_window(&mut self) {
        self.window = (self.window / 2).max(self.cfg.min_window);
    }

    fn open_window_after_discovery(&mut self) {
        match self.final_seg {
            Some(final_seg) => {
                let target =
                    final_seg.min(u64::from(self.cfg.max_window)).max(1) as u32;
                self.window = self.window.max(target);
            },
            // segment 0 carried no final-block marker: fall back to the
            // window a previous retrieval on this context left behind
            None => {
                if self.cfg.current_window > 0 {
                    self.window = self
                        .window
                        .max(self.cfg.current_window.min(self.cfg.max_window));
                }
            },
        }
    }

    // ── response handling ──────────────────────────────────────────────────

    fn on_data(&mut self, interest: Interest, data: Data, timers: &mut RetxTimers) {
        if !self.running {
            return;
        }

        let Some(seg) = interest.data_name().trailing_segment() else {
            warn!("response for non-segment request {}", interest.name);
            return;
        };

        self.in_flight = self.in_flight.saturating_sub(1);
        self.pending.remove(&seg);
        timers.cancel(seg);

        if let Some(sent_at) = self.send_time.remove(&seg) {
            self.rtt.add_measurement(sent_at.elapsed());
            if self.cfg.tracks_rtt() {
                self.lifetime = self.rtt.rto();
            }
        }

        self.callbacks.on_data_enter(&data);
        self.callbacks.on_interest_satisfied(&interest);

        match data.content_type {
            ContentType::Manifest => self.on_manifest(interest, data),
            ContentType::Nack => self.on_nack(interest, data, timers),
            ContentType::Blob => self.on_content(interest, data),
        }

        if seg == 0 {
            self.open_window_after_discovery();
        }
        self.pipeline();
    }

    /// Application verification when configured, self digest otherwise.
    /// Packets without a checkable signature pass as insecure-but-valid.
    fn verify_plain(&mut self, data: &Data) -> bool {
        if let Some(verify) = self.callbacks.data_to_verify.as_ref() {
            return verify(data);
        }
        match data.signature_info.typ {
            SignatureType::DigestSha256 => verify_self_digest(data),
            SignatureType::Sha256WithRsa => true,
        }
    }

    fn on_manifest(&mut self, interest: Interest, data: Data) {
        let seg = data.trailing_segment().unwrap_or_default();

        if !self.verify_plain(&data) {
            self.retransmit_with_exclude(&interest, &data);
            return;
        }

        let manifest = match Manifest::from_data(&data) {
            Ok(manifest) => manifest,
            Err(err) => {
                debug!("dropping malformed manifest {}: {err}", data.name);
                return;
            },
        };

        self.note_received(seg);
        self.grow_window();
        self.update_final(data.final_block_segment());
        self.callbacks.on_manifest_enter(&manifest);
        self.verified_manifests.insert(seg, manifest);
        self.rx_verified.insert(seg, data);

        // drain whatever was parked waiting for this manifest
        let parked: Vec<u64> = self.rx_unverified.keys().copied().collect();
        for useg in parked {
            if !self.running {
                return;
            }
            let Some(udata) = self.rx_unverified.get(&useg) else {
                continue;
            };
            let Some(locator_seg) = udata
                .signature_info
                .key_locator
                .as_ref()
                .and_then(Name::trailing_segment)
            else {
                continue;
            };
            let Some(manifest) = self.verified_manifests.get(&locator_seg) else {
                continue;
            };

            match manifest.digest_for_segment(useg) {
                Some(expected) => {
                    let udata = self
                        .rx_unverified
                        .remove(&useg)
                        .expect("key collected above");
                    if expected == udata.wire_digest() {
                        self.accept_verified(udata);
                    } else {
                        let retx =
                            self.build_interest(self.request_name(useg));
                        self.retransmit_with_digest(&retx, expected);
                    }
                },
                // not dominated by this manifest, keep waiting
                None => {},
            }
        }

        self.reassemble();
    }

    fn on_nack(&mut self, interest: Interest, data: Data, timers: &mut RetxTimers) {
        let Some(seg) = interest.data_name().trailing_segment() else {
            return;
        };
        if self.final_seg.is_some_and(|final_seg| seg > final_seg) {
            debug!("NACK beyond final block ({seg}), dropped");
            return;
        }

        if !self.verify_plain(&data) {
            self.retransmit_with_exclude(&interest, &data);
            return;
        }

        self.note_received(seg);
        self.shrink_window();

        let nack = match ApplicationNack::from_data(&data) {
            Ok(nack) => nack,
            Err(err) => {
                debug!("dropping malformed NACK {}: {err}", data.name);
                return;
            },
        };
        self.callbacks.on_nack_enter(&nack);

        match nack.status() {
            NackStatus::ProducerDelay => {
                debug!(
                    "producer delay for segment {seg}, retrying in {:?}",
                    nack.retry_after()
                );
                timers.schedule(seg, interest, nack.retry_after());
            },
            NackStatus::DataNotAvailable => {
                self.terminate_not_available("producer has no such data");
            },
            NackStatus::InterestNotVerified => {
                self.running = false;
                self.failure = Some(RetrieveError::InterestNotVerified);
            },
            NackStatus::None => {},
        }
    }

    fn on_content(&mut self, interest: Interest, data: Data) {
        if self.references_manifest(&data) {
            let locator_seg = data
                .signature_info
                .key_locator
                .as_ref()
                .and_then(Name::trailing_segment)
                .unwrap_or_default();
            match self.verified_manifests.get(&locator_seg) {
                None => self.park_unverified(data),
                Some(manifest) => match manifest
                    .digest_for_segment(data.trailing_segment().unwrap_or_default())
                {
                    Some(expected) if expected == data.wire_digest() => {
                        self.accept_verified(data);
                    },
                    Some(expected) => {
                        self.retransmit_with_digest(&interest, expected);
                    },
                    None => {
                        // locator lied: the manifest does not dominate this
                        // segment
                        self.retransmit_with_exclude(&interest, &data);
                    },
                },
            }
            return;
        }

        if self.verify_plain(&data) {
            self.accept_verified(data);
        } else {
            self.retransmit_with_exclude(&interest, &data);
        }
    }

    /// A data segment whose key locator differs from its own name only in
    /// the trailing component points at an in-stream manifest.
    fn references_manifest(&self, data: &Data) -> bool {
        data.signature_info.key_locator.as_ref().is_some_and(|locator| {
            locator.trailing_segment().is_some()
                && locator.parent() == data.name.parent()
        })
    }

    fn park_unverified(&mut self, data: Data) {
        let Some(seg) = data.trailing_segment() else {
            return;
        };
        let bound = (self.window.max(1) * UNVERIFIED_WINDOW_MULTIPLE) as usize;
        while self.rx_unverified.len() >= bound {
            if let Some((&oldest, _)) = self.rx_unverified.iter().next() {
                warn!("unverified buffer full, evicting segment {oldest}");
                self.rx_unverified.remove(&oldest);
            }
        }
        self.rx_unverified.insert(seg, data);
    }

    fn accept_verified(&mut self, data: Data) {
        let Some(seg) = data.trailing_segment() else {
            return;
        };
        self.note_received(seg);
        self.grow_window();
        self.update_final(data.final_block_segment());

        self.rx_verified.insert(seg, data);
        self.reassemble();
    }

    /// Final-block projections from a chained stream grow as manifests are
    /// interleaved, so the largest marker seen so far wins.
    fn update_final(&mut self, marker: Option<u64>) {
        if let Some(marker) = marker {
            self.final_seg =
                Some(self.final_seg.map_or(marker, |current| current.max(marker)));
        }
    }

    // ── retransmission flavors ─────────────────────────────────────────────

    /// Re-request after a producer-delay NACK: fresh nonce, must-be-fresh to
    /// bypass the cached NACK, inherited exclusions.
    fn retransmit_fresh(&mut self, interest: Interest) {
        let Some(seg) = interest.data_name().trailing_segment() else {
            return;
        };
        if self.exhausted(seg) {
            self.terminate_not_available("retry ceiling hit");
            return;
        }

        let mut retx = self.build_interest(interest.data_name());
        retx.must_be_fresh = true;
        retx.exclude.extend_from(&interest.exclude);
        self.express_retransmit(seg, retx);
    }

    /// Re-request excluding a response that failed verification.
    fn retransmit_with_exclude(&mut self, interest: &Interest, poisoned: &Data) {
        let Some(seg) = interest.data_name().trailing_segment() else {
            return;
        };
        self.rx_unverified.remove(&seg);

        if self.exhausted(seg) || interest.exclude.len() >= self.cfg.max_excluded_digests
        {
            warn!("segment {seg} still unverifiable, giving up");
            self.running = false;
            self.failure = Some(RetrieveError::ContentPoisoned { segment: seg });
            return;
        }

        let mut retx = self.build_interest(interest.data_name());
        retx.exclude.extend_from(&interest.exclude);
        retx.exclude
            .insert(Component::implicit_digest(poisoned.wire_digest()));
        self.express_retransmit(seg, retx);
    }

    /// Re-request pinned to the digest a verified manifest promised.
    fn retransmit_with_digest(&mut self, interest: &Interest, expected: [u8; 32]) {
        let Some(seg) = interest.data_name().trailing_segment() else {
            return;
        };
        self.rx_unverified.remove(&seg);

        if self.exhausted(seg) {
            self.running = false;
            self.failure = Some(RetrieveError::ContentPoisoned { segment: seg });
            return;
        }

        let name = interest
            .data_name()
            .appended(Component::implicit_digest(expected));
        let retx = self.build_interest(name);
        self.express_retransmit(seg, retx);
    }

    fn exhausted(&self, seg: u64) -> bool {
        self.retx_count.get(&seg).copied().unwrap_or(0) >= self.cfg.interest_retx
    }

    // ── timeouts ───────────────────────────────────────────────────────────

    fn on_timeout(&mut self, interest: Interest, timers: &mut RetxTimers) {
        if !self.running {
            return;
        }
        let Some(seg) = interest.data_name().trailing_segment() else {
            return;
        };

        self.in_flight = self.in_flight.saturating_sub(1);
        self.pending.remove(&seg);
        timers.cancel(seg);
        self.callbacks.on_interest_expired(&interest);

        if self.final_seg.is_some_and(|final_seg| seg > final_seg) {
            return;
        }

        self.shrink_window();

        if self.exhausted(seg) {
            debug!("segment {seg} timed out past the retry budget");
            self.terminate_not_available("retry ceiling hit");
            return;
        }

        let mut retx = self.build_interest(interest.data_name());
        retx.exclude.extend_from(&interest.exclude);
        self.express_retransmit(seg, retx);
        self.pipeline();
    }

    // ── fast retransmission ────────────────────────────────────────────────

    fn note_received(&mut self, seg: u64) {
        self.received_set.insert(seg);
        self.fast_retx_set.remove(&seg);
        self.check_fast_retransmission();
    }

    fn check_fast_retransmission(&mut self) {
        let Some(&highest) = self.received_set.iter().next_back() else {
            return;
        };

        let mut to_retransmit = Vec::new();
        for gap in 0..highest {
            if self.received_set.contains(&gap) || self.fast_retx_set.contains(&gap) {
                continue;
            }
            let later_arrivals =
                self.received_set.range(gap..).count() as u32;
            if later_arrivals >= DEFAULT_FAST_RETX_CONDITION {
                to_retransmit.push(gap);
            }
        }

        for seg in to_retransmit {
            if self.exhausted(seg) {
                continue;
            }
            debug!("fast retransmitting segment {seg}");
            self.fast_retx_set.insert(seg);
            let retx = self.build_interest(self.request_name(seg));
            self.express_retransmit(seg, retx);
        }
    }

    // ── reassembly ─────────────────────────────────────────────────────────

    fn reassemble(&mut self) {
        while let Some(data) = self.rx_verified.remove(&self.last_reassembled) {
            if data.content_type == ContentType::Blob {
                self.content.extend_from_slice(&data.content);
            }
            let seg = self.last_reassembled;
            self.last_reassembled += 1;

            if self.final_seg == Some(seg) {
                self.finish();
                return;
            }
        }
    }

    fn finish(&mut self) {
        self.running = false;
        // damp window inheritance: back-to-back consume calls must not
        // start from a window grown past this ADU's actual length
        if let Some(final_seg) = self.final_seg {
            self.window = u64::from(self.window).min(final_seg.max(1)) as u32;
        }
        self.deliver();
    }

    fn deliver(&mut self) {
        if !self.delivered {
            self.delivered = true;
            let content = std::mem::take(&mut self.content);
            self.callbacks.on_content_retrieved(&content);
            self.content = content;
        }
    }

    /// Unavailability: deliver whatever contiguous prefix exists, then stop.
    fn terminate_not_available(&mut self, reason: &'static str) {
        self.running = false;
        if !self.content.is_empty() {
            self.deliver();
        }
        self.failure = Some(RetrieveError::NotAvailable {
            reason,
            partial: self.content.clone(),
        });
    }
}
