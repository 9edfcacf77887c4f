// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use anyhow::Result;
use ndn_transfer_rs::{
    consumer::context::RetrievalMode,
    models::{nack::NackStatus, name::Name},
};

use super::common::{consumer_config, consumer_on, link, producer_config, producer_on};

const RETRY_AFTER: Duration = Duration::from_millis(300);

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_producer_delay_nack_then_content() -> Result<()> {
    let link = link();
    let mut producer = producer_on(&link, producer_config("/slow")?);

    // first request is answered with a retry-after NACK; the producer has
    // the content ready by the time the fresh retransmit arrives
    let handle = producer.handle();
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let calls = Arc::clone(&calls);
        producer.set_callbacks(move |callbacks| {
            let handle = handle.clone();
            let calls = Arc::clone(&calls);
            callbacks.cache_miss = Some(Box::new(move |interest| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    handle
                        .nack(interest, NackStatus::ProducerDelay, Some(RETRY_AFTER))
                        .expect("nack");
                } else {
                    handle
                        .produce(&Name::from_str("/item").expect("name"), b"worth the wait")
                        .expect("produce");
                }
            }));
        });
    }
    producer.attach()?;

    let mut consumer =
        consumer_on(&link, consumer_config("/slow")?, RetrievalMode::Reliable);

    let nacks = Arc::new(AtomicUsize::new(0));
    {
        let nacks = Arc::clone(&nacks);
        consumer.callbacks_mut().nack_enter_cntx = Some(Box::new(move |nack| {
            assert_eq!(nack.status(), NackStatus::ProducerDelay);
            nacks.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let started = Instant::now();
    let content = consumer.consume(Name::from_str("/item")?).await?;
    let elapsed = started.elapsed();

    assert_eq!(content, b"worth the wait");
    assert!(nacks.load(Ordering::SeqCst) >= 1, "the NACK reached the context");
    assert!(
        elapsed >= RETRY_AFTER,
        "retransmit fired after {elapsed:?}, before the producer's retry-after"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_nack_expires_before_regular_data() -> Result<()> {
    // freshness invariant across the producer surface
    let cfg = producer_config("/slow")?;
    assert!(cfg.nack_freshness() < cfg.data_freshness);
    assert!(cfg.nack_freshness() >= Duration::from_millis(1));
    Ok(())
}
