// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cfg::{
        config::ProducerConfig,
        enums::{RegistrationStatus, SignatureKind},
    },
    face::Face,
    models::{
        data::Data,
        interest::Interest,
        nack::{ApplicationNack, NackStatus},
        name::Name,
    },
    producer::{
        ProduceError, ProducerCallbacks,
        segmenter::{SegmentBinding, Segmenter},
    },
    security::signer::Signer,
    store::content_store::ContentStore,
};

struct ProducerInner<F: Face> {
    cfg: ProducerConfig,
    face: Arc<F>,
    store: ContentStore,
    signer: Box<dyn Signer>,
    callbacks: Mutex<ProducerCallbacks>,
    registration: Mutex<RegistrationStatus>,
}

/// A producer context: registers one prefix, segments application buffers
/// into authenticated packets, and answers repeated requests from its
/// send-side content store without re-invoking the application.
///
/// [`Producer::attach`] spawns a listener (transport → bounded receive
/// queue) and one worker draining that queue. Everything else runs on the
/// caller's task.
pub struct Producer<F: Face> {
    inner: Arc<ProducerInner<F>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Cloneable handle for producing from inside callbacks (typically
/// `cache_miss`) or other tasks.
pub struct ProducerHandle<F: Face> {
    inner: Arc<ProducerInner<F>>,
}

impl<F: Face> Clone for ProducerHandle<F> {
    fn clone(&self) -> Self {
        ProducerHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: Face> Producer<F> {
    pub fn new(cfg: ProducerConfig, face: Arc<F>, signer: Box<dyn Signer>) -> Self {
        let store = ContentStore::new(cfg.snd_buf_size);
        Producer {
            inner: Arc::new(ProducerInner {
                cfg,
                face,
                store,
                signer,
                callbacks: Mutex::new(ProducerCallbacks::default()),
                registration: Mutex::new(RegistrationStatus::NotAttempted),
            }),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.inner.cfg
    }

    pub fn registration_status(&self) -> RegistrationStatus {
        *self.inner.registration.lock().expect("lock poisoned")
    }

    pub fn handle(&self) -> ProducerHandle<F> {
        ProducerHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Replaces callback slots. Call before [`Producer::attach`]; slots set
    /// later still take effect, the table lives behind a lock.
    pub fn set_callbacks(&self, update: impl FnOnce(&mut ProducerCallbacks)) {
        let mut callbacks = self.inner.callbacks.lock().expect("lock poisoned");
        update(&mut callbacks);
    }

    /// Registers the prefix and starts the listener and worker tasks.
    /// Registration failure surfaces synchronously.
    pub fn attach(&mut self) -> Result<(), ProduceError> {
        {
            let mut status = self.inner.registration.lock().expect("lock poisoned");
            *status = RegistrationStatus::InProgress;
        }

        let (filter_tx, filter_rx) = mpsc::unbounded_channel();
        if let Err(err) = self
            .inner
            .face
            .register_prefix(self.inner.cfg.prefix.clone(), filter_tx)
        {
            *self.inner.registration.lock().expect("lock poisoned") =
                RegistrationStatus::Failure;
            return Err(ProduceError::Registration(err));
        }
        *self.inner.registration.lock().expect("lock poisoned") =
            RegistrationStatus::Success;
        info!("registered prefix {}", self.inner.cfg.prefix);

        let (queue_tx, queue_rx) = mpsc::channel(self.inner.cfg.rcv_buf_size);
        self.tasks.push(tokio::spawn(Self::listen(
            Arc::clone(&self.inner),
            filter_rx,
            queue_tx,
            self.cancel.clone(),
        )));
        self.tasks.push(tokio::spawn(Self::process_requests(
            Arc::clone(&self.inner),
            queue_rx,
            self.cancel.clone(),
        )));
        Ok(())
    }

    /// Stops the listener and worker. Pending queue contents are dropped.
    pub fn detach(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    /// Listener half: moves requests from the transport into the bounded
    /// receive queue, dropping (with a callback) when the queue is full.
    async fn listen(
        inner: Arc<ProducerInner<F>>,
        mut filter_rx: mpsc::UnboundedReceiver<Interest>,
        queue_tx: mpsc::Sender<Interest>,
        cancel: CancellationToken,
    ) {
        loop {
            let interest = tokio::select! {
                _ = cancel.cancelled() => break,
                interest = filter_rx.recv() => match interest {
                    Some(interest) => interest,
                    None => break,
                },
            };

            {
                let mut callbacks = inner.callbacks.lock().expect("lock poisoned");
                ProducerCallbacks::fire_interest(
                    &mut callbacks.interest_enter_cntx,
                    &interest,
                );
            }

            if let Err(mpsc::error::TrySendError::Full(interest)) =
                queue_tx.try_send(interest)
            {
                warn!("receive buffer full, dropping {}", interest.name);
                let mut callbacks = inner.callbacks.lock().expect("lock poisoned");
                ProducerCallbacks::fire_interest(
                    &mut callbacks.interest_drop_rcv_buf,
                    &interest,
                );
            }
        }
    }

    /// Worker half: serves from the content store, falls through to the
    /// application's cache-miss callback otherwise. FIFO.
    async fn process_requests(
        inner: Arc<ProducerInner<F>>,
        mut queue_rx: mpsc::Receiver<Interest>,
        cancel: CancellationToken,
    ) {
        loop {
            let interest = tokio::select! {
                _ = cancel.cancelled() => break,
                interest = queue_rx.recv() => match interest {
                    Some(interest) => interest,
                    None => break,
                },
            };

            {
                let mut callbacks = inner.callbacks.lock().expect("lock poisoned");
                ProducerCallbacks::fire_interest(
                    &mut callbacks.interest_pass_rcv_buf,
                    &interest,
                );
            }

            match inner.store.find(&interest) {
                Some(data) => {
                    debug!("cache hit for {}", interest.name);
                    {
                        let mut callbacks =
                            inner.callbacks.lock().expect("lock poisoned");
                        ProducerCallbacks::fire_interest(
                            &mut callbacks.cache_hit,
                            &interest,
                        );
                        ProducerCallbacks::fire_data(
                            &mut callbacks.data_leave_cntx,
                            &data,
                        );
                    }
                    if let Err(err) = inner.face.put(data) {
                        warn!("failed to emit cached response: {err}");
                    }
                },
                None => {
                    debug!("cache miss for {}", interest.name);
                    // the callback is taken out of the table so the
                    // application may call produce()/nack() from inside it
                    let callback = {
                        let mut callbacks =
                            inner.callbacks.lock().expect("lock poisoned");
                        callbacks.cache_miss.take()
                    };
                    if let Some(mut callback) = callback {
                        callback(&interest);
                        let mut callbacks =
                            inner.callbacks.lock().expect("lock poisoned");
                        callbacks.cache_miss.get_or_insert(callback);
                    }
                },
            }
        }
    }

    /// Segments `bytes` under `prefix || suffix` and emits every packet.
    /// Returns the number of packets emitted. An empty buffer emits nothing
    /// and returns immediately.
    pub fn produce(&self, suffix: &Name, bytes: &[u8]) -> Result<u64, ProduceError> {
        self.inner.produce(suffix, bytes)
    }

    /// Emits a single prepackaged (already signed) packet through the
    /// store/transport pipeline.
    pub fn produce_data(&self, data: Data) -> Result<(), ProduceError> {
        self.inner.produce_data(data)
    }

    /// Reposts a produce call onto the runtime and returns immediately.
    pub fn produce_later(&self, suffix: Name, bytes: Vec<u8>) {
        self.handle().produce_later(suffix, bytes);
    }

    /// Answers `interest` with a negative acknowledgement.
    pub fn nack(
        &self,
        interest: &Interest,
        status: NackStatus,
        retry_after: Option<Duration>,
    ) -> Result<(), ProduceError> {
        self.inner.nack(interest, status, retry_after)
    }
}

impl<F: Face> Drop for Producer<F> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<F: Face> ProducerHandle<F> {
    pub fn produce(&self, suffix: &Name, bytes: &[u8]) -> Result<u64, ProduceError> {
        self.inner.produce(suffix, bytes)
    }

    pub fn produce_data(&self, data: Data) -> Result<(), ProduceError> {
        self.inner.produce_data(data)
    }

    pub fn produce_later(&self, suffix: Name, bytes: Vec<u8>) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(err) = inner.produce(&suffix, &bytes) {
                warn!("deferred produce under {suffix} failed: {err}");
            }
        });
    }

    pub fn nack(
        &self,
        interest: &Interest,
        status: NackStatus,
        retry_after: Option<Duration>,
    ) -> Result<(), ProduceError> {
        self.inner.nack(interest, status, retry_after)
    }
}

impl<F: Face> ProducerInner<F> {
    fn produce(&self, suffix: &Name, bytes: &[u8]) -> Result<u64, ProduceError> {
        let segmenter = Segmenter::new(&self.cfg);
        let count = segmenter.segment(suffix, bytes, &mut |data, binding| {
            self.process_segment(data, binding)
        })?;
        debug!("produced {count} packets under {}{suffix}", self.cfg.prefix);
        Ok(count)
    }

    /// Sign → store → emit, firing the callback surface along the way.
    fn process_segment(
        &self,
        data: &mut Data,
        binding: SegmentBinding<'_>,
    ) -> anyhow::Result<()> {
        {
            let mut callbacks = self.callbacks.lock().expect("lock poisoned");
            ProducerCallbacks::fire_data(&mut callbacks.new_segment, data);
        }

        match binding {
            SegmentBinding::Manifest(locator) => {
                // manifest-bound segments always carry the locator self
                // digest, regardless of the configured signature type
                data.signature_info.key_locator = Some(locator.clone());
                self.signer.sign_sha256(data)?;
            },
            SegmentBinding::Standalone => self.sign_standalone(data)?,
        }

        self.store_and_put(data.clone())
    }

    fn sign_standalone(&self, data: &mut Data) -> anyhow::Result<()> {
        let secure = {
            let callbacks = self.callbacks.lock().expect("lock poisoned");
            callbacks.data_to_secure.clone()
        };
        if let Some(secure) = secure {
            return secure(data);
        }
        match self.cfg.signature_type {
            SignatureKind::Sha256 => self.signer.sign_sha256(data),
            SignatureKind::Rsa256 => {
                let identity = self
                    .cfg
                    .signing_identity
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("no signing identity configured"))?;
                self.signer.sign_by_identity(data, identity)
            },
        }
    }

    fn store_and_put(&self, data: Data) -> anyhow::Result<()> {
        {
            let mut callbacks = self.callbacks.lock().expect("lock poisoned");
            ProducerCallbacks::fire_data(&mut callbacks.data_in_snd_buf, &data);
        }

        let evicted = self.store.insert(data.clone());
        {
            let mut callbacks = self.callbacks.lock().expect("lock poisoned");
            for victim in &evicted {
                ProducerCallbacks::fire_data(&mut callbacks.data_evict_snd_buf, victim);
            }
            ProducerCallbacks::fire_data(&mut callbacks.data_leave_cntx, &data);
        }

        self.face.put(data)
    }

    fn produce_data(&self, data: Data) -> Result<(), ProduceError> {
        if !self.cfg.prefix.is_prefix_of(&data.name) {
            return Err(ProduceError::NameOutsidePrefix {
                name: data.name.clone(),
            });
        }
        self.store_and_put(data).map_err(ProduceError::Face)
    }

    fn nack(
        &self,
        interest: &Interest,
        status: NackStatus,
        retry_after: Option<Duration>,
    ) -> Result<(), ProduceError> {
        let mut nack = ApplicationNack::for_interest(interest, status);
        if let Some(delay) = retry_after {
            nack.set_retry_after(delay);
        }

        // nacks expire much faster than regular packets so a transient
        // condition cannot poison caches for long
        let mut data = nack.into_data(self.cfg.nack_freshness());

        let secure = {
            let callbacks = self.callbacks.lock().expect("lock poisoned");
            callbacks.data_to_secure.clone()
        };
        match secure {
            Some(secure) => secure(&mut data).map_err(ProduceError::Signing)?,
            None => self
                .signer
                .sign_sha256(&mut data)
                .map_err(ProduceError::Signing)?,
        }

        {
            let mut callbacks = self.callbacks.lock().expect("lock poisoned");
            ProducerCallbacks::fire_data(&mut callbacks.data_leave_cntx, &data);
        }
        debug!("nacking {} ({status:?})", interest.name);
        self.face.put(data).map_err(ProduceError::Face)
    }
}
