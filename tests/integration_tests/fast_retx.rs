// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::HashMap,
    str::FromStr,
    sync::{Arc, Mutex},
};

use anyhow::Result;
use ndn_transfer_rs::{consumer::context::RetrievalMode, models::name::Name};

use super::common::{
    consumer_config, consumer_on, link, payload, producer_config, producer_on,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_gap_is_fast_retransmitted_exactly_once() -> Result<()> {
    let link = link();
    let mut cfg = producer_config("/stream")?;
    cfg.data_packet_size = 2048;
    let mut producer = producer_on(&link, cfg);
    producer.attach()?;

    // roughly ten segments so the window opens wide enough for three
    // out-of-order arrivals past the gap
    let input = payload(17_000);
    let suffix = Name::from_str("/frames")?;
    let segments = producer.produce(&suffix, &input)?;
    assert!(segments >= 8, "need a pipeline, got {segments}");

    // swallow the first request for segment 3; later copies go through
    let seen: Arc<Mutex<HashMap<u64, u32>>> = Arc::new(Mutex::new(HashMap::new()));
    {
        let seen = Arc::clone(&seen);
        link.set_interest_hook(move |interest| {
            let Some(seg) = interest.data_name().trailing_segment() else {
                return true;
            };
            let mut seen = seen.lock().expect("lock");
            let count = seen.entry(seg).or_insert(0);
            *count += 1;
            !(seg == 3 && *count == 1)
        });
    }

    let mut consumer =
        consumer_on(&link, consumer_config("/stream")?, RetrievalMode::Reliable);
    let content = consumer.consume(suffix).await?;
    assert_eq!(content, input);

    let seen = seen.lock().expect("lock");
    assert_eq!(
        seen.get(&3).copied(),
        Some(2),
        "lost segment requested again exactly once"
    );
    for (seg, count) in seen.iter() {
        if *seg != 3 {
            assert_eq!(*count, 1, "segment {seg} must not be retransmitted");
        }
    }
    Ok(())
}
