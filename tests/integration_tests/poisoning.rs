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
use bytes::Bytes;
use ndn_transfer_rs::{
    consumer::{RetrieveError, context::RetrievalMode},
    models::name::Name,
};

use super::common::{
    consumer_config, consumer_on, link, payload, producer_config, producer_on,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_forged_segment_recovered_by_exclusion() -> Result<()> {
    let link = link();
    let mut cfg = producer_config("/secure")?;
    cfg.data_packet_size = 1024;
    let mut producer = producer_on(&link, cfg);
    producer.attach()?;

    let input = payload(4000);
    let suffix = Name::from_str("/doc")?;
    producer.produce(&suffix, &input)?;

    // forge the first copy of segment 3 in flight; the signature stays, so
    // the self digest no longer matches
    let tampered = Arc::new(AtomicUsize::new(0));
    {
        let tampered = Arc::clone(&tampered);
        link.set_data_hook(move |mut data| {
            if data.trailing_segment() == Some(3)
                && tampered.fetch_add(1, Ordering::SeqCst) == 0
            {
                data.content = Bytes::from_static(b"forged payload");
            }
            Some(data)
        });
    }

    let mut consumer =
        consumer_on(&link, consumer_config("/secure")?, RetrievalMode::Reliable);

    let retransmits = Arc::new(AtomicUsize::new(0));
    {
        let retransmits = Arc::clone(&retransmits);
        consumer.callbacks_mut().interest_retransmit = Some(Box::new(move |interest| {
            if interest.data_name().trailing_segment() == Some(3) {
                // the poisoned response's digest rides in the exclude set
                assert!(!interest.exclude.is_empty());
                retransmits.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }

    let content = consumer.consume(suffix).await?;
    assert_eq!(content, input, "delivered bytes equal the produced buffer");
    assert_eq!(retransmits.load(Ordering::SeqCst), 1);
    assert!(tampered.load(Ordering::SeqCst) >= 2, "segment 3 traveled twice");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_persistent_poisoning_terminates() -> Result<()> {
    let link = link();
    let mut cfg = producer_config("/secure")?;
    cfg.data_packet_size = 8096;
    let mut producer = producer_on(&link, cfg);
    producer.attach()?;

    let suffix = Name::from_str("/doc")?;
    producer.produce(&suffix, b"short adu")?;

    // every copy of segment 0 is forged, each with distinct bytes so the
    // exclude filter never screens the forgeries out
    let forgeries = Arc::new(AtomicUsize::new(0));
    {
        let forgeries = Arc::clone(&forgeries);
        link.set_data_hook(move |mut data| {
            if data.trailing_segment() == Some(0) {
                let n = forgeries.fetch_add(1, Ordering::SeqCst);
                data.content = Bytes::from(format!("forged payload {n}").into_bytes());
            }
            Some(data)
        });
    }

    let mut ccfg = consumer_config("/secure")?;
    ccfg.max_excluded_digests = 3;
    ccfg.validate_and_normalize()?;
    let mut consumer = consumer_on(&link, ccfg, RetrievalMode::Reliable);

    let err = consumer
        .consume(suffix)
        .await
        .expect_err("retrieval must give up");
    match err {
        RetrieveError::ContentPoisoned { segment } => assert_eq!(segment, 0),
        other => panic!("expected poisoning error, got {other:?}"),
    }
    Ok(())
}
