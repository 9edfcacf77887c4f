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

use super::common::{
    consumer_config, consumer_on, link, payload, producer_config, producer_on,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_windowed_retrieval_of_200kib() -> Result<()> {
    let link = link();

    let mut cfg = producer_config("/bulk")?;
    cfg.data_packet_size = 8096;
    let mut producer = producer_on(&link, cfg);
    producer.attach()?;

    let input = payload(200 * 1024);
    let suffix = Name::from_str("/archive")?;
    let segments = producer.produce(&suffix, &input)?;
    assert!(segments >= 26, "expected a multi-window pipeline, got {segments}");

    let mut consumer =
        consumer_on(&link, consumer_config("/bulk")?, RetrievalMode::Reliable);

    let responses = Arc::new(AtomicUsize::new(0));
    {
        let responses = Arc::clone(&responses);
        consumer.callbacks_mut().data_enter_cntx = Some(Box::new(move |_| {
            responses.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let content = consumer.consume(suffix).await?;
    assert_eq!(content.len(), input.len());
    assert_eq!(content, input, "reassembly must equal the produced buffer");
    assert_eq!(responses.load(Ordering::SeqCst) as u64, segments);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_interests_stay_within_window_bounds() -> Result<()> {
    let link = link();
    let mut cfg = producer_config("/bulk")?;
    cfg.data_packet_size = 1024;
    let mut producer = producer_on(&link, cfg);
    producer.attach()?;

    let input = payload(30_000);
    let suffix = Name::from_str("/capped")?;
    let segments = producer.produce(&suffix, &input)?;

    let mut ccfg = consumer_config("/bulk")?;
    ccfg.max_window = 4;
    ccfg.validate_and_normalize()?;
    let mut consumer = consumer_on(&link, ccfg, RetrievalMode::Reliable);

    // every segment is requested exactly once when nothing is lost
    let expressed = Arc::new(AtomicUsize::new(0));
    {
        let expressed = Arc::clone(&expressed);
        consumer.callbacks_mut().interest_leave_cntx = Some(Box::new(move |_| {
            expressed.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let content = consumer.consume(suffix).await?;
    assert_eq!(content, input);
    assert_eq!(expressed.load(Ordering::SeqCst) as u64, segments);
    Ok(())
}
