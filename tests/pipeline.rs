/*
 * tpx3-interpret - tests/pipeline.rs
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

//! End-to-end pipeline test against an in-memory synthetic raw stream,
//! exercising repair, decode, alignment and extraction together.

use std::cell::RefCell;
use std::ops::Range;

use tpx3_interpret::{
    run, ChunkMeta, ConfigurationSource, GeneralConfig, HitRow, HitTableWriter, MetaDataSource,
    OpMode, RawDataSource, Result, RunConfig, ScanId,
};

struct MemRaw {
    words: Vec<u32>,
}

impl RawDataSource for MemRaw {
    fn raw_word(&self, i: u64) -> Result<u32> {
        Ok(self.words[i as usize])
    }

    fn raw_words(&self, range: Range<u64>) -> Result<Vec<u32>> {
        Ok(self.words[range.start as usize..range.end as usize].to_vec())
    }
}

struct MemMeta {
    chunks: Vec<ChunkMeta>,
}

impl MetaDataSource for MemMeta {
    fn chunks(&self) -> Result<Vec<ChunkMeta>> {
        Ok(self.chunks.clone())
    }
}

struct MemConfig {
    run_config: RunConfig,
    general_config: GeneralConfig,
}

impl ConfigurationSource for MemConfig {
    fn run_config(&self) -> Result<RunConfig> {
        Ok(self.run_config.clone())
    }

    fn general_config(&self) -> Result<GeneralConfig> {
        Ok(self.general_config)
    }
}

#[derive(Default)]
struct MemWriter {
    rows: RefCell<Vec<HitRow>>,
}

impl HitTableWriter for MemWriter {
    fn write_hits(&mut self, rows: &[HitRow]) -> Result<()> {
        self.rows.borrow_mut().extend_from_slice(rows);
        Ok(())
    }
}

fn hit_word(link: u32, half1: bool, payload: u32) -> u32 {
    (link << 25) | ((half1 as u32) << 24) | (payload & 0x00FF_FFFF)
}

fn ext_word(half1: bool, payload: u32) -> u32 {
    let marker = if half1 { 0b10u32 } else { 0b01u32 };
    (0b0101u32 << 28) | (marker << 24) | (payload & 0x00FF_FFFF)
}

#[test]
fn full_pipeline_non_data_take_keeps_both_hits_without_real_ordering() {
    // Two links, two hits each, non-DataTake: TOA_Combined stays zero for
    // every row (no extension stream exists to derive it from), so the
    // global sort is a no-op here, but every row must still come through
    // un-dropped.
    // eoc=10, super_pixel=3, pixel=5, placed at half0's local bits 19..13,
    // 12..7 and 6..4 respectively (hit bits 43..37, 36..31, 30..28).
    let payload0 = (10u32 << 13) | (3u32 << 7) | (5u32 << 4);
    let words = vec![
        hit_word(0, false, payload0),
        hit_word(0, true, 0),
        hit_word(1, false, payload0),
        hit_word(1, true, 0),
    ];
    let raw = MemRaw { words };
    let meta = MemMeta {
        chunks: vec![ChunkMeta {
            index_start: 0,
            index_stop: 4,
            discard_error: 0,
            decode_error: 0,
            scan_param_id: 0,
            timestamp_start: 0.0,
        }],
    };
    let config = MemConfig {
        run_config: RunConfig {
            scan_id: ScanId::new("Threshold Scan"),
        },
        general_config: GeneralConfig {
            op_mode: OpMode::Mode0,
            vco: false,
        },
    };
    let mut writer = MemWriter::default();

    let summary = run(&raw, &meta, &config, &mut writer, Some(2)).unwrap();

    assert_eq!(summary.total_words, 4);
    assert_eq!(summary.discarded_words, 0);
    let rows = writer.rows.borrow();
    assert_eq!(rows.len(), 2);
    for row in rows.iter() {
        assert_eq!(row.x, 21);
        assert_eq!(row.y, 13);
        assert_eq!(row.toa_combined, 0);
    }
}

/// One chunk's worth of words: an ext pair assembling to `ext_value == 0`
/// (so `TOA_Combined` reduces to the hit's own ToA) followed by a single
/// hit on `link` whose ToA binary value is `toa_binary`.
fn data_take_chunk_words(link: u32, toa_binary: u32) -> Vec<u32> {
    let toa_gray = toa_binary ^ (toa_binary >> 1);
    let payload0 = (10u32 << 13) | (3u32 << 7) | (5u32 << 4) | (toa_gray & 0xF);
    let payload1 = ((toa_gray >> 4) & 0x3FF) << 14;
    vec![
        ext_word(false, 0),
        ext_word(true, 0),
        hit_word(link, false, payload0),
        hit_word(link, true, payload1),
    ]
}

#[test]
fn full_pipeline_sorts_hits_by_combined_time_with_tie_break() {
    // Three DataTake chunks, each contributing one hit with its own ToA
    // binary value (and a zero extension, so TOA_Combined reduces to that
    // ToA value exactly): 300, 50, 300. Chunk order in the raw stream is
    // A, B, C, so the pre-sort row order is [300, 50, 300] identified by
    // scan_param_id 1, 2, 3. The global sort must produce [50, 300, 300]
    // ascending, and the tied pair must keep A (scan_param_id 1) ahead of
    // C (scan_param_id 3) since that was their relative order going in —
    // proof the final sort is a genuine stable sort by TOA_Combined, not
    // an accidental no-op.
    let mut words = data_take_chunk_words(0, 300); // chunk A
    words.extend(data_take_chunk_words(1, 50)); // chunk B
    words.extend(data_take_chunk_words(2, 300)); // chunk C

    let raw = MemRaw { words };
    let meta = MemMeta {
        chunks: vec![
            ChunkMeta {
                index_start: 0,
                index_stop: 4,
                discard_error: 0,
                decode_error: 0,
                scan_param_id: 1,
                timestamp_start: 0.0,
            },
            ChunkMeta {
                index_start: 4,
                index_stop: 8,
                discard_error: 0,
                decode_error: 0,
                scan_param_id: 2,
                timestamp_start: 1.0,
            },
            ChunkMeta {
                index_start: 8,
                index_stop: 12,
                discard_error: 0,
                decode_error: 0,
                scan_param_id: 3,
                timestamp_start: 2.0,
            },
        ],
    };
    let config = MemConfig {
        run_config: RunConfig {
            scan_id: ScanId::new("DataTake"),
        },
        general_config: GeneralConfig {
            op_mode: OpMode::Mode0,
            vco: false,
        },
    };
    let mut writer = MemWriter::default();

    let summary = run(&raw, &meta, &config, &mut writer, Some(3)).unwrap();
    assert_eq!(summary.total_words, 12);
    assert_eq!(summary.discarded_words, 0);

    let rows = writer.rows.borrow();
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows.iter().map(|r| r.toa_combined).collect::<Vec<_>>(),
        vec![50, 300, 300]
    );
    assert_eq!(rows[0].scan_param_id, 2);
    assert_eq!(rows[1].scan_param_id, 1);
    assert_eq!(rows[2].scan_param_id, 3);
}

#[test]
fn full_pipeline_aligns_extensions_in_data_take_mode() {
    // ext half0/half1 assemble an extension with bits 13..12 == 0b01.
    // The hit's ToA binary value 0x1000 also has bits 13..12 == 0b01, so
    // the two should agree without the parity correction kicking in.
    let toa_binary: u32 = 0x1000;
    let toa_gray = toa_binary ^ (toa_binary >> 1);
    // half0 carries the ToA field's low 4 bits (hit bits 27..24); half1
    // carries its upper 10 bits (hit bits 23..14), shifted to local
    // position 23..14 within half1's own 24-bit payload.
    let payload0 = (10u32 << 13) | (3u32 << 7) | (5u32 << 4) | (toa_gray & 0xF);
    let payload1 = ((toa_gray >> 4) & 0x3FF) << 14;

    let ext_value: u32 = 0x1000;
    let words = vec![
        ext_word(false, ext_value & 0x00FF_F000),
        ext_word(true, 0),
        hit_word(2, false, payload0),
        hit_word(2, true, payload1),
    ];
    let raw = MemRaw { words };
    let meta = MemMeta {
        chunks: vec![ChunkMeta {
            index_start: 0,
            index_stop: 4,
            discard_error: 0,
            decode_error: 0,
            scan_param_id: 3,
            timestamp_start: 2.5,
        }],
    };
    let config = MemConfig {
        run_config: RunConfig {
            scan_id: ScanId::new("DataTake"),
        },
        general_config: GeneralConfig {
            op_mode: OpMode::Mode0,
            vco: false,
        },
    };
    let mut writer = MemWriter::default();

    let summary = run(&raw, &meta, &config, &mut writer, Some(1)).unwrap();
    assert_eq!(summary.discarded_words, 0);

    let rows = writer.rows.borrow();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.scan_param_id, 3);
    assert_eq!(row.toa_extension & 0x3000, (row.toa as u64) & 0x3000);
    assert_eq!(
        row.toa_combined,
        (row.toa_extension & 0xFFFF_FFFF_C000) + row.toa as u64
    );
}
