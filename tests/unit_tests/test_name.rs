// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::str::FromStr;

use anyhow::Result;
use ndn_transfer_rs::models::{
    name::{Component, Name},
    tlv::{read_element, typ},
};

#[test]
fn test_segment_value_boundaries() -> Result<()> {
    // minimum-length big-endian: 1, 2, 4 and 8 value bytes
    for (seg, value_len) in [
        (0u64, 1usize),
        (255, 1),
        (256, 2),
        (65535, 2),
        (65536, 4),
        (u64::from(u32::MAX), 4),
        (u64::from(u32::MAX) + 1, 8),
    ] {
        let name = Name::new().with_segment(seg);
        let wire = name.to_wire();

        let mut input: &[u8] = &wire;
        let name_value = {
            let (t, v) = read_element(&mut input)?;
            assert_eq!(t, typ::NAME);
            v
        };
        let mut inner = name_value;
        let (t, v) = read_element(&mut inner)?;
        assert_eq!(t, typ::SEGMENT_COMPONENT);
        assert_eq!(v.len(), value_len, "segment {seg}");

        let decoded = Name::decode(&mut { &wire[..] })?;
        assert_eq!(decoded.trailing_segment(), Some(seg));
    }
    Ok(())
}

#[test]
fn test_digest_component_roundtrip() -> Result<()> {
    let digest = [0xC3u8; 32];
    let name = Name::from_str("/a/b")?
        .with_segment(9)
        .appended(Component::implicit_digest(digest));
    let decoded = Name::decode(&mut name.to_wire().as_ref())?;
    assert_eq!(decoded, name);
    assert_eq!(decoded.last().and_then(Component::as_implicit_digest), Some(&digest));
    // the digest is not a segment
    assert_eq!(decoded.trailing_segment(), None);
    Ok(())
}

#[test]
fn test_canonical_name_ordering() -> Result<()> {
    let mut names = vec![
        Name::from_str("/b")?,
        Name::from_str("/a/c")?,
        Name::from_str("/a")?.with_segment(1),
        Name::from_str("/a")?,
        Name::from_str("/a/b")?,
    ];
    names.sort();

    let rendered: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    // prefix first; generic components (type 8) before segments (type 50)
    assert_eq!(
        rendered,
        vec!["/a", "/a/b", "/a/c", "/a/seg=1", "/b"]
    );
    Ok(())
}

#[test]
fn test_prefix_slicing() -> Result<()> {
    let name = Name::from_str("/video/clip")?.with_segment(12);
    assert_eq!(name.len(), 3);
    assert!(Name::from_str("/video")?.is_prefix_of(&name));
    assert_eq!(name.parent(), Name::from_str("/video/clip")?);
    assert_eq!(name.prefix(17), name);
    assert!(Name::new().is_prefix_of(&name));
    Ok(())
}
