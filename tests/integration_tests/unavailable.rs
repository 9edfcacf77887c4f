// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::Result;
use ndn_transfer_rs::{
    consumer::{RetrieveError, context::RetrievalMode},
    models::{nack::NackStatus, name::Name},
    producer::ProduceError,
};

use super::common::{consumer_config, consumer_on, link, producer_config, producer_on};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_data_not_available_nack_terminates() -> Result<()> {
    let link = link();
    let mut producer = producer_on(&link, producer_config("/empty")?);

    let handle = producer.handle();
    producer.set_callbacks(move |callbacks| {
        let handle = handle.clone();
        callbacks.cache_miss = Some(Box::new(move |interest| {
            handle
                .nack(interest, NackStatus::DataNotAvailable, None)
                .expect("nack");
        }));
    });
    producer.attach()?;

    let mut consumer =
        consumer_on(&link, consumer_config("/empty")?, RetrievalMode::Reliable);
    let err = consumer
        .consume(Name::from_str("/nothing")?)
        .await
        .expect_err("nothing to retrieve");
    assert!(matches!(err, RetrieveError::NotAvailable { .. }));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_silent_network_hits_retry_ceiling() -> Result<()> {
    // nobody registered the prefix: every request expires
    let link = link();

    let mut cfg = consumer_config("/void")?;
    cfg.interest_lifetime = Some(Duration::from_millis(60));
    cfg.interest_retx = 1;
    cfg.validate_and_normalize()?;
    let retx_budget = cfg.interest_retx;
    let mut consumer = consumer_on(&link, cfg, RetrievalMode::Reliable);

    let seg_zero = Arc::new(AtomicUsize::new(0));
    {
        let seg_zero = Arc::clone(&seg_zero);
        consumer.callbacks_mut().interest_leave_cntx = Some(Box::new(move |interest| {
            if interest.data_name().trailing_segment() == Some(0) {
                seg_zero.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }

    let err = consumer
        .consume(Name::from_str("/hole")?)
        .await
        .expect_err("nothing answers");
    match err {
        RetrieveError::NotAvailable { partial, .. } => assert!(partial.is_empty()),
        other => panic!("expected unavailability, got {other:?}"),
    }
    // retry ceiling: the original expression plus at most `interest_retx`
    // retransmissions
    assert!(seg_zero.load(Ordering::SeqCst) as u32 <= retx_budget + 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_aborts_retrieval() -> Result<()> {
    let link = link();

    let mut cfg = consumer_config("/void")?;
    cfg.interest_lifetime = Some(Duration::from_secs(5));
    cfg.validate_and_normalize()?;
    let mut consumer = consumer_on(&link, cfg, RetrievalMode::Reliable);

    let handle = consumer.handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop();
    });

    let err = consumer
        .consume(Name::from_str("/forever")?)
        .await
        .expect_err("stopped by the handle");
    assert!(matches!(err, RetrieveError::Stopped { .. }));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_registration_failure_is_synchronous() -> Result<()> {
    let link = link();
    link.refuse_registrations(true);

    let mut producer = producer_on(&link, producer_config("/denied")?);
    let err = producer.attach().expect_err("registration refused");
    assert!(matches!(err, ProduceError::Registration(_)));
    assert!(!producer.registration_status().is_success());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_duplicate_registration_is_rejected() -> Result<()> {
    let link = link();
    let mut first = producer_on(&link, producer_config("/dup")?);
    first.attach()?;

    let mut second = producer_on(&link, producer_config("/dup")?);
    assert!(matches!(
        second.attach(),
        Err(ProduceError::Registration(_))
    ));
    Ok(())
}
