// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    cfg::config::ConsumerConfig,
    consumer::{
        ConsumerCallbacks, RetrieveError, reliable::ReliableRetrieval,
        simple::SimpleRetrieval, unreliable::UnreliableRetrieval,
    },
    face::Face,
    models::name::Name,
};

/// Which retrieval protocol a consumer context drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetrievalMode {
    /// One-shot, single request (SDR).
    Simple,
    /// Windowed but loss-tolerant (UDR).
    Unreliable,
    /// Windowed, verified, fully recovered (RDR).
    #[default]
    Reliable,
}

/// Cloneable handle for steering a context from a callback or another task.
#[derive(Clone)]
pub struct ConsumerHandle {
    cancel: Arc<Mutex<CancellationToken>>,
    busy: Arc<AtomicBool>,
    deferred: Arc<Mutex<VecDeque<Name>>>,
}

impl ConsumerHandle {
    /// Cancels the retrieval currently in flight, if any, and discards
    /// queued deferred retrievals. Safe to call from within a callback.
    pub fn stop(&self) {
        self.deferred.lock().expect("lock poisoned").clear();
        self.cancel.lock().expect("lock poisoned").cancel();
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Queues a retrieval to run as soon as the context is free. The
    /// assembled bytes surface through the `content_retrieved` callback.
    pub fn consume_later(&self, suffix: Name) {
        self.deferred.lock().expect("lock poisoned").push_back(suffix);
    }
}

/// A consumer context: one name prefix, one retrieval protocol, one ADU in
/// flight at a time.
///
/// The face and the configuration are injected at construction; the context
/// never reaches for process-global state. The retrieval protocols receive
/// a handle to the configuration and callback table, not to this context.
pub struct Consumer<F: Face> {
    cfg: ConsumerConfig,
    callbacks: ConsumerCallbacks,
    face: Arc<F>,
    mode: RetrievalMode,
    cancel: Arc<Mutex<CancellationToken>>,
    busy: Arc<AtomicBool>,
    deferred: Arc<Mutex<VecDeque<Name>>>,
}

impl<F: Face> Consumer<F> {
    pub fn new(cfg: ConsumerConfig, face: Arc<F>, mode: RetrievalMode) -> Self {
        Consumer {
            cfg,
            callbacks: ConsumerCallbacks::default(),
            face,
            mode,
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            busy: Arc::new(AtomicBool::new(false)),
            deferred: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.cfg
    }

    pub fn config_mut(&mut self) -> &mut ConsumerConfig {
        &mut self.cfg
    }

    /// Callback table; assign slots before calling [`Consumer::consume`].
    pub fn callbacks_mut(&mut self) -> &mut ConsumerCallbacks {
        &mut self.callbacks
    }

    pub fn handle(&self) -> ConsumerHandle {
        ConsumerHandle {
            cancel: Arc::clone(&self.cancel),
            busy: Arc::clone(&self.busy),
            deferred: Arc::clone(&self.deferred),
        }
    }

    /// Queues a retrieval for when the context is next free; see
    /// [`ConsumerHandle::consume_later`].
    pub fn consume_later(&self, suffix: Name) {
        self.handle().consume_later(suffix);
    }

    /// Retrieves one ADU published under `prefix || suffix` and returns the
    /// reassembled bytes; `content_retrieved` also fires (at most once per
    /// retrieval) when a protocol delivers.
    ///
    /// One ADU at a time: on a busy context the suffix is queued and
    /// `Busy` is returned; the queued retrieval runs once the current one
    /// finishes, delivering through the callback. Deferred retrievals
    /// queued via [`Consumer::consume_later`] are drained the same way
    /// before this call returns.
    pub async fn consume(&mut self, suffix: Name) -> Result<Vec<u8>, RetrieveError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            // honored once the running retrieval finishes
            self.deferred.lock().expect("lock poisoned").push_back(suffix);
            return Err(RetrieveError::Busy);
        }

        let result = self.retrieve(suffix).await;

        // reposted calls run now, still one ADU at a time; their payloads
        // surface through content_retrieved only
        loop {
            let next = self.deferred.lock().expect("lock poisoned").pop_front();
            let Some(next) = next else {
                break;
            };
            if let Err(err) = self.retrieve(next.clone()).await {
                warn!("deferred retrieval of {next} failed: {err}");
            }
        }

        self.busy.store(false, Ordering::SeqCst);
        result
    }

    async fn retrieve(&mut self, suffix: Name) -> Result<Vec<u8>, RetrieveError> {
        let cancel = {
            let mut slot = self.cancel.lock().expect("lock poisoned");
            if slot.is_cancelled() {
                *slot = CancellationToken::new();
            }
            slot.clone()
        };

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        debug!("consuming {}{} ({:?})", self.cfg.prefix, suffix, self.mode);

        match self.mode {
            RetrievalMode::Simple => {
                SimpleRetrieval::new(
                    &self.cfg,
                    &mut self.callbacks,
                    self.face.as_ref(),
                    suffix,
                    events_tx,
                )
                .run(&mut events_rx, &cancel)
                .await
            },
            RetrievalMode::Unreliable => {
                UnreliableRetrieval::new(
                    &self.cfg,
                    &mut self.callbacks,
                    self.face.as_ref(),
                    suffix,
                    events_tx,
                )
                .run(&mut events_rx, &cancel)
                .await
            },
            RetrievalMode::Reliable => {
                let retrieval = ReliableRetrieval::new(
                    &self.cfg,
                    &mut self.callbacks,
                    self.face.as_ref(),
                    suffix,
                    events_tx,
                );
                let (result, window) = retrieval.run(&mut events_rx, &cancel).await;
                // window inheritance between consume calls: the state
                // machine clamps its window to the final segment at
                // completion, so a short ADU does not bequeath a
                // speculatively grown window to the next retrieval
                self.cfg.current_window = window;
                result
            },
        }
    }

    /// Stops the retrieval currently in flight, if any, and discards
    /// queued deferred retrievals.
    pub fn stop(&self) {
        self.handle().stop();
    }
}
