// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::HashMap,
    str::FromStr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::Result;
use ndn_transfer_rs::{consumer::context::RetrievalMode, models::name::Name};

use super::common::{
    consumer_config, consumer_on, link, payload, producer_config, producer_on,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_manifest_bound_stream_verifies_without_extra_traffic() -> Result<()> {
    let link = link();

    let mut cfg = producer_config("/video")?;
    cfg.data_packet_size = 1024;
    cfg.fast_signing = true;
    cfg.validate_and_normalize()?;
    let mut producer = producer_on(&link, cfg);
    producer.attach()?;

    // on the order of a hundred data segments, several manifests
    let input = payload(70_000);
    let suffix = Name::from_str("/clip")?;
    let emitted = producer.produce(&suffix, &input)?;
    assert!(emitted >= 100, "expected a long manifest-chained stream");

    let requests: Arc<Mutex<HashMap<u64, u32>>> = Arc::new(Mutex::new(HashMap::new()));
    {
        let requests = Arc::clone(&requests);
        link.set_interest_hook(move |interest| {
            if let Some(seg) = interest.data_name().trailing_segment() {
                *requests.lock().expect("lock").entry(seg).or_insert(0) += 1;
            }
            true
        });
    }

    let mut consumer =
        consumer_on(&link, consumer_config("/video")?, RetrievalMode::Reliable);

    let manifests_seen = Arc::new(AtomicUsize::new(0));
    {
        let manifests_seen = Arc::clone(&manifests_seen);
        consumer.callbacks_mut().manifest_enter_cntx = Some(Box::new(move |manifest| {
            assert!(!manifest.is_empty(), "manifests carry catalogue entries");
            manifests_seen.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let content = consumer.consume(suffix).await?;
    assert_eq!(content, input);
    assert!(
        manifests_seen.load(Ordering::SeqCst) >= 2,
        "the chain holds several manifests"
    );

    // manifest verification consumed no extra network traffic: every
    // segment (manifest or data) crossed the link exactly once
    let requests = requests.lock().expect("lock");
    assert_eq!(requests.len() as u64, emitted);
    for (seg, count) in requests.iter() {
        assert_eq!(*count, 1, "segment {seg} requested more than once");
    }
    Ok(())
}
