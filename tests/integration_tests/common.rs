// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{str::FromStr, sync::Arc};

use anyhow::Result;
use ndn_transfer_rs::{
    cfg::config::{ConsumerConfig, ProducerConfig},
    consumer::context::{Consumer, RetrievalMode},
    face::mem::{MemFace, MemLink},
    models::name::Name,
    producer::context::Producer,
    security::signer::Sha256Signer,
};

pub fn link() -> Arc<MemLink> {
    Arc::new(MemLink::new())
}

pub fn producer_config(prefix: &str) -> Result<ProducerConfig> {
    let mut cfg = ProducerConfig::new(Name::from_str(prefix)?);
    cfg.validate_and_normalize()?;
    Ok(cfg)
}

pub fn consumer_config(prefix: &str) -> Result<ConsumerConfig> {
    let mut cfg = ConsumerConfig::new(Name::from_str(prefix)?);
    cfg.validate_and_normalize()?;
    Ok(cfg)
}

pub fn producer_on(link: &Arc<MemLink>, cfg: ProducerConfig) -> Producer<MemFace> {
    Producer::new(cfg, Arc::new(link.face()), Box::new(Sha256Signer))
}

pub fn consumer_on(
    link: &Arc<MemLink>,
    cfg: ConsumerConfig,
    mode: RetrievalMode,
) -> Consumer<MemFace> {
    Consumer::new(cfg, Arc::new(link.face()), mode)
}

/// Deterministic pseudo-random payload.
pub fn payload(len: usize) -> Vec<u8> {
    let mut state = 0x9e3779b97f4a7c15u64;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 29) as u8
        })
        .collect()
}
