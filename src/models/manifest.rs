// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::BTreeMap, time::Duration};

use bytes::BytesMut;

use crate::models::{
    data::{ContentType, Data},
    name::{Component, DIGEST_SIZE, Name},
    tlv::{DecodeError, read_element, typ, write_tlv},
};

/// On-wire estimate reserved for the key locator of a signed manifest.
pub const KEY_LOCATOR_SIZE_ESTIMATE: usize = 256;

/// A manifest: catalogue of `(segment, implicit digest)` pairs plus
/// free-form key/value headers, carried as the content of a Data packet
/// with `ContentType::Manifest`.
///
/// Wire layout of the content:
///
/// ```text
/// Catalogue?  TLV { Name* }        each name: segment component || digest component
/// KeyValuePair* TLV { "key=value" }  emitted in sorted key order
/// ```
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Manifest {
    name: Name,
    final_block: Option<Component>,
    catalogue: Vec<Name>,
    key_values: BTreeMap<String, String>,
}

impl Manifest {
    pub fn new(name: Name) -> Self {
        Manifest {
            name,
            final_block: None,
            catalogue: Vec::new(),
            key_values: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn final_block(&self) -> Option<&Component> {
        self.final_block.as_ref()
    }

    pub fn set_final_block(&mut self, component: Component) {
        self.final_block = Some(component);
    }

    /// Number of catalogued segments.
    pub fn len(&self) -> usize {
        self.catalogue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalogue.is_empty()
    }

    pub fn catalogue(&self) -> impl Iterator<Item = &Name> {
        self.catalogue.iter()
    }

    /// Appends one `(segment, digest)` entry.
    pub fn push_entry(&mut self, segment: u64, digest: [u8; DIGEST_SIZE]) {
        let entry = Name::new()
            .with_segment(segment)
            .appended(Component::implicit_digest(digest));
        self.catalogue.push(entry);
    }

    /// Catalogued digest for a segment number, if present.
    pub fn digest_for_segment(&self, segment: u64) -> Option<[u8; DIGEST_SIZE]> {
        self.catalogue.iter().find_map(|entry| {
            let len = entry.len();
            if len < 2 || entry.get(len - 2)?.as_segment()? != segment {
                return None;
            }
            entry.get(len - 1)?.as_implicit_digest().copied()
        })
    }

    /// Whether a data packet's trailing segment and wire digest both match a
    /// catalogue entry.
    pub fn verifies(&self, data: &Data) -> bool {
        let Some(segment) = data.trailing_segment() else {
            return false;
        };
        match self.digest_for_segment(segment) {
            Some(digest) => digest == data.wire_digest(),
            None => false,
        }
    }

    pub fn insert_key_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.key_values.insert(key.into(), value.into());
    }

    pub fn value_by_key(&self, key: &str) -> Option<&str> {
        self.key_values.get(key).map(String::as_str)
    }

    pub fn remove_key(&mut self, key: &str) -> Option<String> {
        self.key_values.remove(key)
    }

    /// Rough wire footprint used by the producer to decide when to start a
    /// new manifest: own name, catalogue entries, reserved key locator.
    pub fn estimated_size(&self) -> usize {
        let catalogue: usize = self.catalogue.iter().map(Name::encoded_len).sum();
        self.name.encoded_len() + catalogue + KEY_LOCATOR_SIZE_ESTIMATE
    }

    pub fn encode_content(&self) -> BytesMut {
        let mut content = BytesMut::new();
        if !self.catalogue.is_empty() {
            let mut inner = BytesMut::new();
            for entry in &self.catalogue {
                entry.encode(&mut inner);
            }
            write_tlv(&mut content, typ::MANIFEST_CATALOGUE, &inner);
        }
        for (key, value) in &self.key_values {
            let pair = format!("{key}={value}");
            write_tlv(&mut content, typ::KEY_VALUE_PAIR, pair.as_bytes());
        }
        content
    }

    /// Renders this manifest as an unsigned Data packet.
    pub fn into_data(self, freshness: Duration) -> Data {
        let content = self.encode_content().freeze();
        let mut data = Data::new(self.name);
        data.content_type = ContentType::Manifest;
        data.freshness = freshness;
        data.final_block = self.final_block;
        data.content = content;
        data
    }

    /// Reads the catalogue and key/value headers back out of a Data packet.
    ///
    /// Unknown elements are skipped; key/value entries without a `=` or with
    /// an empty side are skipped.
    pub fn from_data(data: &Data) -> Result<Self, DecodeError> {
        if data.content_type != ContentType::Manifest {
            return Err(DecodeError::Invalid("content type is not Manifest"));
        }

        let mut manifest = Manifest::new(data.name.clone());
        manifest.final_block = data.final_block.clone();

        let mut content: &[u8] = &data.content;
        while !content.is_empty() {
            let (element_type, value) = read_element(&mut content)?;
            match element_type {
                typ::MANIFEST_CATALOGUE => {
                    let mut inner = value;
                    while !inner.is_empty() {
                        manifest.catalogue.push(Name::decode(&mut inner)?);
                    }
                },
                typ::KEY_VALUE_PAIR => {
                    if let Some((key, value)) = parse_key_value(value) {
                        manifest.key_values.insert(key, value);
                    }
                },
                _ => {},
            }
        }
        Ok(manifest)
    }
}

pub(crate) fn parse_key_value(raw: &[u8]) -> Option<(String, String)> {
    let text = std::str::from_utf8(raw).ok()?;
    let (key, value) = text.split_once('=')?;
    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}
