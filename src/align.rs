/*
 * tpx3-interpret - align.rs
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

//! Extension aligner: matches each hit to the nearest-lower-index ToA
//! extension and corrects a one-unit two-bit parity ambiguity.

use crate::decode::DecodedChunk;
use crate::tables::GRAY14_INV;

/// The extension value aligned to one hit, by its `hit_index`.
#[derive(Clone, Copy, Debug)]
pub struct AlignedHit {
    pub hit_index: u64,
    pub extension: u64,
}

/// `searchsorted(haystack, needle, side="right") - 1`, clamped at 0.
/// `haystack` must be sorted ascending.
fn last_le_index(haystack: &[u64], needle: u64) -> usize {
    let pos = haystack.partition_point(|&v| v <= needle);
    pos.saturating_sub(1)
}

/// Align every hit in the chunk to its nearest-lower extension, applying
/// a single-step two-bit parity correction where the extension's high
/// ToA bits disagree with the hit's own Gray-decoded ToA.
pub fn align_chunk(decoded: &DecodedChunk) -> Vec<AlignedHit> {
    let mut out = Vec::new();
    if decoded.full_ext.is_empty() {
        return out;
    }

    for link in &decoded.links {
        for (&hit, &hit_index) in link.hits.iter().zip(link.indices.iter()) {
            let j = last_le_index(&decoded.ext_indices, hit_index);
            let mut candidate_ext = decoded.full_ext[j];

            let toa14 = GRAY14_INV[((hit >> 14) & 0x3FFF) as usize] as u64;
            if (candidate_ext & 0x3000) != (toa14 & 0x3000) {
                candidate_ext = candidate_ext.wrapping_sub(1);
            }
            // A residual mismatch after this single correction is left
            // uncorrected rather than looped to convergence.

            out.push(AlignedHit {
                hit_index,
                extension: candidate_ext,
            });
        }
    }

    out
}
