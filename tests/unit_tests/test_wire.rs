// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use ndn_transfer_rs::models::{
    data::{ContentType, Data},
    manifest::Manifest,
    nack::{ApplicationNack, NackStatus},
};

use super::load_fixture;

#[test]
fn test_nack_fixture_decode() -> Result<()> {
    let bytes = load_fixture("tests/unit_tests/fixtures/nack_producer_delay.hex")?;
    let data = Data::decode(&bytes)?;

    assert_eq!(data.content_type, ContentType::Nack);
    assert_eq!(data.freshness, Duration::from_millis(11));
    assert_eq!(data.name.len(), 3);
    assert_eq!(format!("{}", data.name.prefix(2)), "/doc/nack");

    let nack = ApplicationNack::from_data(&data)?;
    assert_eq!(nack.status(), NackStatus::ProducerDelay);
    assert_eq!(nack.retry_after(), Duration::from_millis(450));
    Ok(())
}

#[test]
fn test_nack_fixture_reencode() -> Result<()> {
    let bytes = load_fixture("tests/unit_tests/fixtures/nack_producer_delay.hex")?;
    let data = Data::decode(&bytes)?;
    // the encoding is canonical: decode then re-encode is byte identical
    assert_eq!(data.wire_encode().as_ref(), bytes.as_slice());
    Ok(())
}

#[test]
fn test_manifest_fixture_decode() -> Result<()> {
    let bytes = load_fixture("tests/unit_tests/fixtures/manifest_single_entry.hex")?;
    let data = Data::decode(&bytes)?;

    assert_eq!(data.content_type, ContentType::Manifest);
    assert_eq!(data.name.trailing_segment(), Some(0));
    assert_eq!(data.final_block_segment(), Some(2));

    let manifest = Manifest::from_data(&data)?;
    assert_eq!(manifest.len(), 1);
    assert_eq!(manifest.digest_for_segment(1), Some([0xAA; 32]));
    assert_eq!(manifest.digest_for_segment(2), None);
    assert_eq!(manifest.value_by_key("codec"), Some("h264"));
    Ok(())
}

#[test]
fn test_manifest_fixture_reencode() -> Result<()> {
    let bytes = load_fixture("tests/unit_tests/fixtures/manifest_single_entry.hex")?;
    let data = Data::decode(&bytes)?;
    assert_eq!(data.wire_encode().as_ref(), bytes.as_slice());

    // rebuilding the same manifest content reproduces the fixture payload
    let manifest = Manifest::from_data(&data)?;
    assert_eq!(manifest.encode_content().as_ref(), data.content.as_ref());
    Ok(())
}
