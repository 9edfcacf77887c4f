// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::Result;
use ndn_transfer_rs::{consumer::context::RetrievalMode, models::name::Name};

use super::common::{consumer_config, consumer_on, link, producer_config, producer_on};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_segment_roundtrip() -> Result<()> {
    let link = link();

    let mut cfg = producer_config("/demo")?;
    cfg.data_packet_size = 8096;
    let mut producer = producer_on(&link, cfg);
    producer.attach()?;

    let suffix = Name::from_str("/greeting")?;
    let emitted = producer.produce(&suffix, b"hello")?;
    assert_eq!(emitted, 1, "one packet for a 5-byte buffer");

    let mut consumer =
        consumer_on(&link, consumer_config("/demo")?, RetrievalMode::Reliable);

    let delivered = Arc::new(AtomicUsize::new(0));
    let delivered_len = Arc::new(AtomicUsize::new(0));
    {
        let delivered = Arc::clone(&delivered);
        let delivered_len = Arc::clone(&delivered_len);
        consumer.callbacks_mut().content_retrieved = Some(Box::new(move |content| {
            delivered.fetch_add(1, Ordering::SeqCst);
            delivered_len.store(content.len(), Ordering::SeqCst);
        }));
    }

    let content = consumer.consume(suffix).await?;
    assert_eq!(content, b"hello");
    assert_eq!(delivered.load(Ordering::SeqCst), 1, "terminal callback once");
    assert_eq!(delivered_len.load(Ordering::SeqCst), 5);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cache_hit_serves_without_application() -> Result<()> {
    let link = link();
    let mut producer = producer_on(&link, producer_config("/demo")?);
    producer.attach()?;

    let misses = Arc::new(AtomicUsize::new(0));
    let hits = Arc::new(AtomicUsize::new(0));
    {
        let misses = Arc::clone(&misses);
        let hits = Arc::clone(&hits);
        producer.set_callbacks(move |callbacks| {
            callbacks.cache_miss = Some(Box::new({
                let misses = Arc::clone(&misses);
                move |_| {
                    misses.fetch_add(1, Ordering::SeqCst);
                }
            }));
            callbacks.cache_hit = Some(Box::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        });
    }

    let suffix = Name::from_str("/file")?;
    producer.produce(&suffix, b"cached bytes")?;

    let mut consumer =
        consumer_on(&link, consumer_config("/demo")?, RetrievalMode::Reliable);
    for _ in 0..3 {
        let content = consumer.consume(suffix.clone()).await?;
        assert_eq!(content, b"cached bytes");
    }

    assert_eq!(misses.load(Ordering::SeqCst), 0, "store served every request");
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    Ok(())
}
