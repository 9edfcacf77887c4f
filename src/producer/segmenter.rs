// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use bytes::Bytes;
use tracing::debug;

use crate::{
    cfg::config::{DEFAULT_SAFETY_OFFSET, ProducerConfig},
    models::{
        data::Data,
        manifest::Manifest,
        name::{Component, Name},
    },
    producer::ProduceError,
};

/// How an emitted segment gets its signature.
pub enum SegmentBinding<'m> {
    /// Signed by the producer's signer (or the application's
    /// `data_to_secure` override).
    Standalone,
    /// Bound to the in-stream manifest at this locator: the signature is a
    /// self digest and the key locator points at the manifest.
    Manifest(&'m Name),
}

/// Receives every segment in production order. The callee signs the packet
/// according to the binding, stores it and emits it; the segmenter reads
/// the signed wire image afterwards for manifest digests.
pub type EmitFn<'e> = dyn FnMut(&mut Data, SegmentBinding<'_>) -> Result<()> + 'e;

/// Cuts a flat buffer into named, size-bounded segments, optionally
/// interleaving manifests that catalogue the digests of the data segments
/// they dominate.
pub struct Segmenter<'a> {
    cfg: &'a ProducerConfig,
}

impl<'a> Segmenter<'a> {
    pub fn new(cfg: &'a ProducerConfig) -> Self {
        Segmenter { cfg }
    }

    /// Bytes of one packet available for content once the name, signature
    /// estimate, key locator estimate and safety margin are accounted for.
    pub fn payload_cap(&self, name: &Name) -> Result<usize, ProduceError> {
        let cap = self.cfg.data_packet_size as isize
            - name.encoded_len() as isize
            - self.cfg.signature_type.signature_size() as isize
            - self.cfg.key_locator_size as isize
            - DEFAULT_SAFETY_OFFSET as isize;
        if cap <= 0 {
            return Err(ProduceError::PacketTooSmall { cap });
        }
        Ok(cap as usize)
    }

    /// Segments `bytes` under `prefix || suffix`, handing each packet to
    /// `emit` in production order. Returns the number of packets emitted
    /// (data plus manifests). An empty buffer emits nothing.
    pub fn segment(
        &self,
        suffix: &Name,
        bytes: &[u8],
        emit: &mut EmitFn<'_>,
    ) -> Result<u64, ProduceError> {
        if bytes.is_empty() {
            return Ok(0);
        }

        let mut base = self.cfg.prefix.clone();
        base.append(suffix);
        let cap = self.payload_cap(&base)?;
        let segments = bytes.len().div_ceil(cap) as u64;
        debug!(
            "segmenting {} bytes under {base}: {segments} segments of <= {cap} bytes",
            bytes.len()
        );

        if self.cfg.fast_signing {
            self.segment_with_manifests(&base, bytes, cap, segments, emit)
        } else {
            self.segment_plain(&base, bytes, cap, segments, emit)
        }
    }

    fn segment_plain(
        &self,
        base: &Name,
        bytes: &[u8],
        cap: usize,
        segments: u64,
        emit: &mut EmitFn<'_>,
    ) -> Result<u64, ProduceError> {
        for index in 0..segments {
            let mut data = Data::new(base.clone().with_segment(index));
            data.freshness = self.cfg.data_freshness;
            data.final_block = Some(Component::segment(segments - 1));
            data.content = slice_at(bytes, index as usize, cap);

            emit(&mut data, SegmentBinding::Standalone)
                .map_err(ProduceError::Emit)?;
        }
        Ok(segments)
    }

    /// Rolling-manifest segmentation. Manifests occupy segment numbers in
    /// the same sequence as the data they dominate; a new manifest starts
    /// whenever the current one could no longer fit alongside two more full
    /// names, and the first data segment always gets one.
    fn segment_with_manifests(
        &self,
        base: &Name,
        bytes: &[u8],
        cap: usize,
        segments: u64,
        emit: &mut EmitFn<'_>,
    ) -> Result<u64, ProduceError> {
        let mut emitted = 0u64;
        let mut current = 0u64;
        let mut packaged = 0u64;
        let mut manifest: Option<Manifest> = None;
        let mut need_manifest = true;

        while packaged < segments {
            if need_manifest {
                if let Some(previous) = manifest.take() {
                    self.emit_manifest(previous, current, emit)?;
                    emitted += 1;
                }
                let mut fresh = Manifest::new(base.clone().with_segment(current));
                fresh.set_final_block(Component::segment(
                    current + segments - packaged,
                ));
                manifest = Some(fresh);
                need_manifest = false;
                current += 1;
            }
            let locator = manifest
                .as_ref()
                .map(|m| m.name().clone())
                .unwrap_or_default();

            let mut data = Data::new(base.clone().with_segment(current));
            data.freshness = self.cfg.data_freshness;
            data.final_block =
                Some(Component::segment(current + segments - packaged - 1));
            data.content = slice_at(bytes, packaged as usize, cap);

            emit(&mut data, SegmentBinding::Manifest(&locator))
                .map_err(ProduceError::Emit)?;
            emitted += 1;

            let data_seg = current;
            current += 1;
            packaged += 1;

            if let Some(manifest) = manifest.as_mut() {
                manifest.push_entry(data_seg, data.wire_digest());

                let full_name_size =
                    data.name.encoded_len() + data.signature_value.len();
                if manifest.estimated_size() + 2 * full_name_size
                    > self.cfg.data_packet_size
                {
                    need_manifest = true;
                }
            }

            if packaged == segments
                && let Some(last) = manifest.take()
            {
                self.emit_manifest(last, current, emit)?;
                emitted += 1;
            }
        }

        Ok(emitted)
    }

    /// Emits a finished manifest. The final-block marker is recomputed at
    /// emission time: the last data segment this manifest dominates, which
    /// is the one emitted just before (`current - 1`).
    fn emit_manifest(
        &self,
        mut manifest: Manifest,
        current: u64,
        emit: &mut EmitFn<'_>,
    ) -> Result<(), ProduceError> {
        manifest.set_final_block(Component::segment(current.saturating_sub(1)));

        let mut data = manifest.into_data(self.cfg.data_freshness);
        emit(&mut data, SegmentBinding::Standalone).map_err(ProduceError::Emit)?;
        Ok(())
    }
}

fn slice_at(bytes: &[u8], index: usize, cap: usize) -> Bytes {
    let start = index * cap;
    let end = (start + cap).min(bytes.len());
    Bytes::copy_from_slice(&bytes[start..end])
}
