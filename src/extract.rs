/*
 * tpx3-interpret - extract.rs
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

//! Field extraction: turns a 48-bit hit record plus its aligned extension
//! into an output row, per op_mode/vco.

use crate::align::AlignedHit;
use crate::config::{GeneralConfig, OpMode};
use crate::decode::LinkHits;
use crate::tables::{GRAY14_INV, LFSR10_INV, LFSR14_INV, LFSR4_INV};

/// One row of the output hit table.
#[derive(Clone, Copy, Debug, PartialEq, hdf5::H5Type)]
#[repr(C)]
pub struct HitRow {
    pub data_header: u8,
    pub header: u8,
    pub hit_index: u64,
    pub x: u8,
    pub y: u8,
    pub toa: u16,
    pub tot: u16,
    pub event_counter: u16,
    pub hit_counter: u8,
    pub ftoa: u8,
    pub scan_param_id: u16,
    pub chunk_start_time: f64,
    pub itot: u16,
    pub toa_extension: u64,
    pub toa_combined: u64,
}

/// Decode the spatial coordinates out of a raw 48-bit hit.
fn coordinates(hit: u64) -> (u8, u8) {
    let pixel = (hit >> 28) & 0x7;
    let super_pixel = (hit >> 31) & 0x3F;
    let eoc = (hit >> 37) & 0x7F;
    let right_col = (pixel > 3) as u64;
    let x = 2 * eoc + right_col;
    let y = 4 * super_pixel + pixel - 4 * right_col;
    (x as u8, y as u8)
}

/// Extract one output row from a hit, its source index, its aligned
/// extension (when in DataTake), and chunk-level metadata.
pub fn extract_row(
    hit: u64,
    hit_index: u64,
    aligned_ext: Option<u64>,
    config: GeneralConfig,
    scan_param_id: u16,
    chunk_start_time: f64,
) -> HitRow {
    let (x, y) = coordinates(hit);
    let data_header = (hit >> 47) as u8 & 0x1;
    let header = (hit >> 44) as u8 & 0xF;

    let (hit_counter, ftoa) = if !config.vco {
        (LFSR4_INV[(hit & 0xF) as usize] as u8, 0u8)
    } else {
        (0u8, (hit & 0xF) as u8)
    };

    let (itot, tot, toa, event_counter) = match config.op_mode {
        OpMode::Mode0 => (
            0u16,
            LFSR10_INV[((hit >> 4) & 0x3FF) as usize],
            GRAY14_INV[((hit >> 14) & 0x3FFF) as usize],
            0u16,
        ),
        OpMode::Mode1 => (0u16, 0u16, GRAY14_INV[((hit >> 14) & 0x3FFF) as usize], 0u16),
        OpMode::Other => (
            LFSR14_INV[((hit >> 14) & 0x3FFF) as usize],
            0u16,
            0u16,
            LFSR10_INV[((hit >> 4) & 0x3FF) as usize],
        ),
    };

    let (toa_extension, toa_combined) = match aligned_ext {
        Some(ext) => (ext & 0xFFFF_FFFF_FFFF, (ext & 0xFFFF_FFFF_C000) + toa as u64),
        None => (0u64, 0u64),
    };

    HitRow {
        data_header,
        header,
        hit_index,
        x,
        y,
        toa,
        tot,
        event_counter,
        hit_counter,
        ftoa,
        scan_param_id,
        chunk_start_time,
        itot,
        toa_extension,
        toa_combined,
    }
}

/// Extract and concatenate rows for every link of a decoded, aligned chunk.
/// Rows come back sorted by `hit_index` ascending (stable).
pub fn extract_chunk(
    links: &[LinkHits; 8],
    aligned: &[AlignedHit],
    config: GeneralConfig,
    scan_param_id: u16,
    chunk_start_time: f64,
    data_take: bool,
) -> Vec<HitRow> {
    let mut rows = Vec::new();
    let mut aligned_by_index = aligned
        .iter()
        .map(|a| (a.hit_index, a.extension))
        .collect::<std::collections::HashMap<_, _>>();

    for link in links {
        for (hit, hit_index) in link.hits.iter().zip(link.indices.iter()) {
            let aligned_ext = if data_take {
                aligned_by_index.remove(hit_index)
            } else {
                None
            };
            rows.push(extract_row(
                *hit,
                *hit_index,
                aligned_ext,
                config,
                scan_param_id,
                chunk_start_time,
            ));
        }
    }

    rows.sort_by_key(|r| r.hit_index);
    rows
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_coordinates_left_column() {
        // pixel=2 (<=3, left column), super_pixel=3, eoc=10
        let hit = (2u64 << 28) | (3u64 << 31) | (10u64 << 37);
        let (x, y) = coordinates(hit);
        assert_eq!(x, 20);
        assert_eq!(y, 14);
    }

    #[test]
    fn test_coordinates_right_column() {
        // pixel=5 (right column), super_pixel=3, eoc=10
        let hit = (5u64 << 28) | (3u64 << 31) | (10u64 << 37);
        let (x, y) = coordinates(hit);
        assert_eq!(x, 21);
        assert_eq!(y, 13);
    }

    #[test]
    fn test_extract_row_mode0_no_extension() {
        // pixel=5, super_pixel=3, eoc=10, ToA_gray=0, ToT_lfsr=lfsr10(42)
        let pixel = 5u64;
        let super_pixel = 3u64;
        let eoc = 10u64;
        let tot_field = LFSR10_INV
            .iter()
            .position(|&v| v == 42)
            .expect("42 reachable by LFSR-10");
        let hit = (pixel << 28)
            | (super_pixel << 31)
            | (eoc << 37)
            | ((tot_field as u64) << 4)
            | (0u64 << 14);
        let config = GeneralConfig {
            op_mode: OpMode::Mode0,
            vco: false,
        };
        let row = extract_row(hit, 0, None, config, 0, 0.0);
        assert_eq!(row.x, 21);
        assert_eq!(row.y, 13);
        assert_eq!(row.tot, 42);
        assert_eq!(row.toa, 0);
        assert_eq!(row.ftoa, 0);
        assert_eq!(row.toa_combined, 0);
    }
}
