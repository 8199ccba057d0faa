/*
 * tpx3-interpret - decode.rs
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

//! Chunk decoder: classifies raw words by header, pairs half-words per
//! link into 48-bit hits, and assembles ToA extensions.

use crate::container::RawDataSource;
use crate::Result;

pub(crate) const EXT_HEADER: u32 = 0b0101;

pub(crate) fn header(word: u32) -> u32 {
    (word >> 28) & 0xF
}

pub(crate) fn link_id(word: u32) -> usize {
    ((word >> 25) & 0x7) as usize
}

pub(crate) fn is_half1(word: u32) -> bool {
    (word >> 24) & 0x1 == 1
}

fn payload24(word: u32) -> u64 {
    (word & 0x00FF_FFFF) as u64
}

pub(crate) fn ext_half(word: u32) -> Option<bool> {
    match (word >> 24) & 0x3 {
        0b01 => Some(false),
        0b10 => Some(true),
        _ => None,
    }
}

/// Per-link decoded hits, with the absolute raw-stream index of each
/// hit's half-0 word carried alongside.
#[derive(Clone, Debug, Default)]
pub struct LinkHits {
    pub hits: Vec<u64>,
    pub indices: Vec<u64>,
}

/// The full output of decoding one (already repaired) chunk.
#[derive(Clone, Debug)]
pub struct DecodedChunk {
    pub links: [LinkHits; 8],
    pub full_ext: Vec<u64>,
    pub ext_indices: Vec<u64>,
}

/// Pair an ordered half-0/half-1 index stream into full records.
/// A length difference of exactly one truncates the longer side; more
/// than one is a hard failure for the chunk.
fn pair_halves(
    half0: &[(u64, u64)],
    half1: &[(u64, u64)],
) -> Result<(Vec<u64>, Vec<u64>)> {
    let diff = half0.len() as i64 - half1.len() as i64;
    if diff.abs() > 1 {
        return Err(crate::Error::Decode(format!(
            "half-word count imbalance: {} vs {}",
            half0.len(),
            half1.len()
        )));
    }
    let n = half0.len().min(half1.len());
    let mut values = Vec::with_capacity(n);
    let mut indices = Vec::with_capacity(n);
    for k in 0..n {
        let (idx0, v0) = half0[k];
        let (_idx1, v1) = half1[k];
        values.push((v0 << 24) | v1);
        indices.push(idx0);
    }
    Ok((values, indices))
}

/// Decode one chunk's raw words (already repaired for index imbalance) into per-link
/// hit arrays and, in DataTake mode, assembled ToA extensions.
pub fn decode_chunk(
    raw: &dyn RawDataSource,
    stream_indices: &[u64],
    data_take: bool,
) -> Result<DecodedChunk> {
    let words: Vec<u32> = stream_indices
        .iter()
        .map(|&i| raw.raw_word(i))
        .collect::<Result<_>>()?;

    let mut link_half0: [Vec<(u64, u64)>; 8] = Default::default();
    let mut link_half1: [Vec<(u64, u64)>; 8] = Default::default();
    let mut ext_half0: Vec<(u64, u64)> = Vec::new();
    let mut ext_half1: Vec<(u64, u64)> = Vec::new();

    for (&idx, &word) in stream_indices.iter().zip(words.iter()) {
        if header(word) == EXT_HEADER {
            if !data_take {
                continue;
            }
            match ext_half(word) {
                Some(false) => ext_half0.push((idx, (word & 0x00FF_F000) as u64)),
                Some(true) => ext_half1.push((idx, payload24(word))),
                None => {}
            }
        } else {
            let link = link_id(word);
            if is_half1(word) {
                link_half1[link].push((idx, payload24(word)));
            } else {
                link_half0[link].push((idx, payload24(word)));
            }
        }
    }

    let mut links: [LinkHits; 8] = Default::default();
    for l in 0..8 {
        let (hits, indices) = pair_halves(&link_half0[l], &link_half1[l])?;
        links[l] = LinkHits { hits, indices };
    }

    let (full_ext, ext_indices) = if data_take {
        let n = ext_half0.len().min(ext_half1.len());
        if (ext_half0.len() as i64 - ext_half1.len() as i64).abs() > 1 {
            return Err(crate::Error::Decode(
                "extension half-word count imbalance".into(),
            ));
        }
        let mut values = Vec::with_capacity(n);
        let mut indices = Vec::with_capacity(n);
        for k in 0..n {
            let (idx0, lo) = ext_half0[k];
            let (_idx1, hi) = ext_half1[k];
            values.push((hi << 24) | lo);
            indices.push(idx0);
        }
        (values, indices)
    } else {
        (Vec::new(), Vec::new())
    };

    Ok(DecodedChunk {
        links,
        full_ext,
        ext_indices,
    })
}
