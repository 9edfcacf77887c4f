// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::str::FromStr;

use anyhow::Result;
use ndn_transfer_rs::{
    cfg::config::ProducerConfig,
    models::{
        data::{ContentType, Data},
        manifest::Manifest,
        name::Name,
    },
    producer::segmenter::{SegmentBinding, Segmenter},
    security::signer::{Sha256Signer, Signer, verify_self_digest},
};

fn config(packet_size: usize, fast_signing: bool) -> Result<ProducerConfig> {
    let mut cfg = ProducerConfig::new(Name::from_str("/bulk")?);
    cfg.data_packet_size = packet_size;
    cfg.fast_signing = fast_signing;
    cfg.validate_and_normalize()?;
    Ok(cfg)
}

fn produce_all(cfg: &ProducerConfig, suffix: &Name, bytes: &[u8]) -> Result<Vec<Data>> {
    let mut out = Vec::new();
    Segmenter::new(cfg).segment(suffix, bytes, &mut |data, binding| {
        if let SegmentBinding::Manifest(locator) = binding {
            data.signature_info.key_locator = Some(locator.clone());
        }
        Sha256Signer.sign_sha256(data)?;
        out.push(data.clone());
        Ok(())
    })?;
    Ok(out)
}

/// Pseudo-random but deterministic payload.
fn payload(len: usize) -> Vec<u8> {
    let mut state = 0x2545f491u64;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}

#[test]
fn test_two_mebibyte_roundtrip_at_max_packet() -> Result<()> {
    let cfg = config(8096, false)?;
    let input = payload(2 * 1024 * 1024);
    let suffix = Name::from_str("/file")?;
    let out = produce_all(&cfg, &suffix, &input)?;

    let final_seg = out.len() as u64 - 1;
    let mut assembled = Vec::with_capacity(input.len());
    for (index, data) in out.iter().enumerate() {
        assert!(data.wire_encode().len() <= 8096, "oversized packet {index}");
        assert_eq!(data.trailing_segment(), Some(index as u64));
        assert_eq!(data.final_block_segment(), Some(final_seg));
        assert!(verify_self_digest(data));
        assembled.extend_from_slice(&data.content);
    }
    assert_eq!(assembled, input);
    Ok(())
}

#[test]
fn test_small_packet_roundtrip() -> Result<()> {
    let cfg = config(512, false)?;
    let input = payload(30_000);
    let out = produce_all(&cfg, &Name::from_str("/f")?, &input)?;

    let assembled: Vec<u8> = out.iter().flat_map(|d| d.content.to_vec()).collect();
    assert_eq!(assembled, input);
    for data in &out {
        assert!(data.wire_encode().len() <= 512);
    }
    Ok(())
}

#[test]
fn test_manifest_chain_consumer_view() -> Result<()> {
    // what a consumer does with a chained stream: verify every data
    // segment against its dominating manifest, no signer involved
    let cfg = config(1024, true)?;
    let input = payload(40_000);
    let out = produce_all(&cfg, &Name::from_str("/f")?, &input)?;

    let mut assembled = Vec::new();
    for data in &out {
        match data.content_type {
            ContentType::Manifest => {
                assert!(verify_self_digest(data));
            },
            ContentType::Blob => {
                let locator = data
                    .signature_info
                    .key_locator
                    .clone()
                    .expect("manifest binding");
                let manifest_packet = out
                    .iter()
                    .find(|d| d.name == locator)
                    .expect("dominating manifest");
                let manifest = Manifest::from_data(manifest_packet)?;
                assert!(manifest.verifies(data), "segment {:?}", data.name);
                assembled.extend_from_slice(&data.content);
            },
            ContentType::Nack => panic!("segmenter must never emit a NACK"),
        }
    }
    assert_eq!(assembled, input);

    // a manifest always precedes the segments it dominates
    let first = &out[0];
    assert_eq!(first.content_type, ContentType::Manifest);
    Ok(())
}

#[test]
fn test_manifest_final_block_converges() -> Result<()> {
    let cfg = config(1024, true)?;
    let input = payload(25_000);
    let out = produce_all(&cfg, &Name::from_str("/f")?, &input)?;

    let highest = out
        .iter()
        .filter_map(Data::trailing_segment)
        .max()
        .expect("segments");
    // the largest final-block marker across the stream names the true
    // terminal segment, and that segment is a data segment
    let converged = out
        .iter()
        .filter_map(Data::final_block_segment)
        .max()
        .expect("markers");
    assert_eq!(converged, highest);

    let terminal = out
        .iter()
        .find(|d| d.trailing_segment() == Some(highest))
        .expect("terminal segment");
    assert_eq!(terminal.content_type, ContentType::Blob);
    assert!(terminal.is_terminal());
    Ok(())
}
