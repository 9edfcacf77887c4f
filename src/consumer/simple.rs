// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    cfg::config::ConsumerConfig,
    consumer::{ConsumerCallbacks, RetrieveError, selectors::apply_selectors},
    face::{EventSender, Face, FaceEvent},
    models::{
        data::{ContentType, Data},
        interest::Interest,
        name::Name,
    },
};

/// The one-shot retrieval variant: a single request for the bare name, the
/// first response wins. No windowing, no retransmission, no verification
/// beyond the optional application callback.
pub struct SimpleRetrieval<'a, F: Face> {
    cfg: &'a ConsumerConfig,
    callbacks: &'a mut ConsumerCallbacks,
    face: &'a F,
    suffix: Name,
    events_tx: EventSender,
}

impl<'a, F: Face> SimpleRetrieval<'a, F> {
    pub fn new(
        cfg: &'a ConsumerConfig,
        callbacks: &'a mut ConsumerCallbacks,
        face: &'a F,
        suffix: Name,
        events_tx: EventSender,
    ) -> Self {
        SimpleRetrieval {
            cfg,
            callbacks,
            face,
            suffix,
            events_tx,
        }
    }

    pub async fn run(
        mut self,
        events_rx: &mut mpsc::UnboundedReceiver<FaceEvent>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, RetrieveError> {
        let mut name = self.cfg.prefix.clone();
        name.append(&self.suffix);

        let mut interest = Interest::new(name);
        interest.lifetime = self.cfg.base_lifetime();
        apply_selectors(&mut interest, self.cfg);
        self.callbacks.on_interest_leave(&interest);

        let id = self
            .face
            .express_interest(interest, self.events_tx.clone())
            .map_err(RetrieveError::Face)?;

        let event = tokio::select! {
            event = events_rx.recv() => event,
            _ = cancel.cancelled() => {
                self.face.remove_pending_interest(id);
                return Err(RetrieveError::Stopped { partial: Vec::new() });
            },
        };

        match event {
            Some(FaceEvent::Data { interest, data }) => {
                self.callbacks.on_data_enter(&data);
                self.callbacks.on_interest_satisfied(&interest);
                self.deliver(data)
            },
            Some(FaceEvent::Timeout { interest }) => {
                self.callbacks.on_interest_expired(&interest);
                Err(RetrieveError::NotAvailable {
                    reason: "request expired",
                    partial: Vec::new(),
                })
            },
            None => Err(RetrieveError::NotAvailable {
                reason: "transport gone",
                partial: Vec::new(),
            }),
        }
    }

    fn deliver(&mut self, data: Data) -> Result<Vec<u8>, RetrieveError> {
        if let Some(verify) = self.callbacks.data_to_verify.as_ref()
            && !verify(&data)
        {
            return Err(RetrieveError::ContentPoisoned {
                segment: data.trailing_segment().unwrap_or_default(),
            });
        }

        if data.content_type != ContentType::Blob {
            debug!("one-shot retrieval got {:?}", data.content_type);
            return Err(RetrieveError::NotAvailable {
                reason: "producer answered without content",
                partial: Vec::new(),
            });
        }

        self.callbacks.on_content_retrieved(&data.content);
        Ok(data.content.to_vec())
    }
}
