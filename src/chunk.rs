/*
 * tpx3-interpret - chunk.rs
 *
 * Copyright (C) 2024 Timepix3 Interpret Contributors
 *
 * This library is free software: you can redistribute it and/or
 * modify it under the terms of the GNU Lesser General Public License
 * as published by the Free Software Foundation, either version 3 of
 * the License, or (at your option) any later version.
 *
 * This library is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
 * Lesser General Public License for more details.
 *
 * You should have received a copy of the GNU Lesser General Public
 * License along with this library.  If not, see
 * <http://www.gnu.org/licenses/>.
 */

//! Chunk index repairer: heals half-word orphans at chunk boundaries and
//! cascades hard errors to their successor chunk, strictly in chunk order
//! so repairs can propagate forward.

use std::collections::HashSet;

use log::{debug, warn};

use crate::container::{ChunkMeta, RawDataSource};
use crate::decode::{ext_half, header, is_half1, link_id, EXT_HEADER};
use crate::Result;

/// One chunk's surviving raw-stream indices after repair, plus the
/// metadata the field extractor needs downstream. An empty `indices`
/// means the chunk was discarded.
#[derive(Clone, Debug)]
pub struct RepairedChunk {
    pub indices: Vec<u64>,
    pub scan_param_id: u16,
    pub timestamp_start: f64,
}

struct Partition {
    link_half0: [Vec<u64>; 8],
    link_half1: [Vec<u64>; 8],
    ext_half0: Vec<u64>,
    ext_half1: Vec<u64>,
}

fn partition(raw: &dyn RawDataSource, indices: &[u64]) -> Result<Partition> {
    let mut link_half0: [Vec<u64>; 8] = Default::default();
    let mut link_half1: [Vec<u64>; 8] = Default::default();
    let mut ext_half0 = Vec::new();
    let mut ext_half1 = Vec::new();

    for &idx in indices {
        let word = raw.raw_word(idx)?;
        if header(word) == EXT_HEADER {
            match ext_half(word) {
                Some(false) => ext_half0.push(idx),
                Some(true) => ext_half1.push(idx),
                None => {}
            }
        } else {
            let link = link_id(word);
            if is_half1(word) {
                link_half1[link].push(idx);
            } else {
                link_half0[link].push(idx);
            }
        }
    }

    Ok(Partition {
        link_half0,
        link_half1,
        ext_half0,
        ext_half1,
    })
}

/// Drop the first half-1 of a stream when it precedes the first half-0
/// (or no half-0 is present at all). Returns the removed index, if any.
fn remove_leading_orphan(half0: &[u64], half1: &[u64]) -> Option<u64> {
    match (half0.first(), half1.first()) {
        (Some(&h0), Some(&h1)) if h1 < h0 => Some(h1),
        (None, Some(&h1)) => Some(h1),
        _ => None,
    }
}

/// Move a lone trailing half-1 (one more half-1 than half-0) to the next
/// chunk. Returns its index, if any.
fn trailing_orphan(half0: &[u64], half1: &[u64]) -> Option<u64> {
    if half1.len() == half0.len() + 1 {
        half1.last().copied()
    } else {
        None
    }
}

/// Repair every chunk's index list in place, discarding chunks with
/// unrecoverable per-link imbalance and handing orphan half-words across
/// chunk boundaries. Returns the repaired chunks and the total count of
/// raw words dropped (never emitted in any surviving chunk).
pub fn repair_chunks(meta: &[ChunkMeta], raw: &dyn RawDataSource) -> Result<(Vec<RepairedChunk>, u64)> {
    let n = meta.len();
    let mut errors: Vec<u32> = meta
        .iter()
        .map(|c| c.discard_error + c.decode_error)
        .collect();
    let mut indices: Vec<Vec<u64>> = meta
        .iter()
        .map(|c| (c.index_start..c.index_stop).collect())
        .collect();

    let mut chunks_after_errors: HashSet<usize> = HashSet::new();
    for i in 0..n {
        if errors[i] != 0 && i + 1 < n {
            chunks_after_errors.insert(i + 1);
        }
    }

    let mut discarded: u64 = 0;

    for i in 0..n {
        if errors[i] != 0 || indices[i].is_empty() {
            continue;
        }

        let part = partition(raw, &indices[i])?;
        let mut removed: HashSet<u64> = HashSet::new();

        if chunks_after_errors.contains(&i) {
            for l in 0..8 {
                if let Some(idx) = remove_leading_orphan(&part.link_half0[l], &part.link_half1[l]) {
                    removed.insert(idx);
                    discarded += 1;
                }
            }
            if let Some(idx) = remove_leading_orphan(&part.ext_half0, &part.ext_half1) {
                removed.insert(idx);
                discarded += 1;
            }
        }

        let remaining_count = |half: &[u64]| half.iter().filter(|v| !removed.contains(v)).count();

        let mut hard_error = false;
        for l in 0..8 {
            let c0 = remaining_count(&part.link_half0[l]) as i64;
            let c1 = remaining_count(&part.link_half1[l]) as i64;
            if (c0 - c1).abs() > 1 {
                hard_error = true;
                break;
            }
        }

        if hard_error {
            errors[i] += 1;
            warn!("chunk {i}: half-word imbalance exceeds one, discarding chunk");
            if i + 1 < n {
                chunks_after_errors.insert(i + 1);
            }
            continue;
        }

        let mut moved: Vec<u64> = Vec::new();
        let mut copied: Vec<u64> = Vec::new();

        for l in 0..8 {
            let h0: Vec<u64> = part.link_half0[l]
                .iter()
                .copied()
                .filter(|v| !removed.contains(v))
                .collect();
            let h1: Vec<u64> = part.link_half1[l]
                .iter()
                .copied()
                .filter(|v| !removed.contains(v))
                .collect();
            if let Some(idx) = trailing_orphan(&h0, &h1) {
                moved.push(idx);
                debug!("chunk {i} link {l}: handing off trailing half-1 index {idx}");
            }
        }

        let ext0: Vec<u64> = part
            .ext_half0
            .iter()
            .copied()
            .filter(|v| !removed.contains(v))
            .collect();
        let ext1: Vec<u64> = part
            .ext_half1
            .iter()
            .copied()
            .filter(|v| !removed.contains(v))
            .collect();

        let ext_orphan = trailing_orphan(&ext0, &ext1);
        if let Some(idx) = ext_orphan {
            moved.push(idx);
        }

        // Always copy the last two extension-stream indices forward
        // (minus the one just moved, if any) so the successor chunk can
        // align its own hits against the boundary extension.
        let mut ext_tail: Vec<u64> = ext0
            .iter()
            .chain(ext1.iter())
            .copied()
            .filter(|v| Some(*v) != ext_orphan)
            .collect();
        ext_tail.sort_unstable();
        for &idx in ext_tail.iter().rev().take(2) {
            copied.push(idx);
        }

        if i + 1 < n {
            let mut removed_from_current: HashSet<u64> = removed.clone();
            removed_from_current.extend(moved.iter().copied());

            indices[i].retain(|v| !removed_from_current.contains(v));

            indices[i + 1].extend(moved.iter().copied());
            indices[i + 1].extend(copied.iter().copied());
            indices[i + 1].sort_unstable();
            indices[i + 1].dedup();
        } else {
            let mut removed_from_current = removed.clone();
            removed_from_current.extend(moved.iter().copied());
            // No successor to hand off to: unpaired trailing halves are
            // dropped at the end of the stream.
            discarded += moved.len() as u64;
            indices[i].retain(|v| !removed_from_current.contains(v));
        }
    }

    let mut repaired = Vec::with_capacity(n);
    for i in 0..n {
        if errors[i] > 0 {
            discarded += indices[i].len() as u64;
            repaired.push(RepairedChunk {
                indices: Vec::new(),
                scan_param_id: meta[i].scan_param_id,
                timestamp_start: meta[i].timestamp_start,
            });
        } else {
            repaired.push(RepairedChunk {
                indices: std::mem::take(&mut indices[i]),
                scan_param_id: meta[i].scan_param_id,
                timestamp_start: meta[i].timestamp_start,
            });
        }
    }

    Ok((repaired, discarded))
}
