/*
 * tpx3-interpret - container.rs
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

//! Container traits. The decode pipeline is written against these, not
//! against any concrete file format, so it stays testable without HDF5.

use std::ops::Range;

use crate::config::{GeneralConfig, RunConfig};
use crate::extract::HitRow;
use crate::Result;

/// One entry of `meta_data`: the boundaries and error counters of a chunk.
#[derive(Clone, Copy, Debug, PartialEq, hdf5::H5Type)]
#[repr(C)]
pub struct ChunkMeta {
    pub index_start: u64,
    pub index_stop: u64,
    pub discard_error: u32,
    pub decode_error: u32,
    pub scan_param_id: u16,
    pub timestamp_start: f64,
}

impl ChunkMeta {
    /// `discard_error + decode_error > 0`: this chunk was already flagged
    /// upstream and must be discarded in full.
    pub fn has_error(&self) -> bool {
        self.discard_error + self.decode_error > 0
    }
}

/// Random-access read of the raw 32-bit word stream.
pub trait RawDataSource {
    /// Read a single word at absolute stream position `i`.
    fn raw_word(&self, i: u64) -> Result<u32>;

    /// Read a contiguous range of words, in stream order.
    fn raw_words(&self, range: Range<u64>) -> Result<Vec<u32>> {
        range.map(|i| self.raw_word(i)).collect()
    }
}

/// The chunk boundary table.
pub trait MetaDataSource {
    fn chunks(&self) -> Result<Vec<ChunkMeta>>;
}

/// The run configuration key-value tables.
pub trait ConfigurationSource {
    fn run_config(&self) -> Result<RunConfig>;
    fn general_config(&self) -> Result<GeneralConfig>;
}

/// Write-only adapter for the decoded hit table.
pub trait HitTableWriter {
    /// Persist the final, globally-sorted hit table and copy the input's
    /// `configuration` subtree verbatim alongside it.
    fn write_hits(&mut self, rows: &[HitRow]) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory fakes used by unit and integration tests.

    use super::*;
    use std::cell::RefCell;

    pub struct FakeRawStore {
        pub words: Vec<u32>,
    }

    impl RawDataSource for FakeRawStore {
        fn raw_word(&self, i: u64) -> Result<u32> {
            self.words
                .get(i as usize)
                .copied()
                .ok_or_else(|| crate::Error::Decode(format!("raw index {i} out of range")))
        }
    }

    pub struct FakeMetaStore {
        pub chunks: Vec<ChunkMeta>,
    }

    impl MetaDataSource for FakeMetaStore {
        fn chunks(&self) -> Result<Vec<ChunkMeta>> {
            Ok(self.chunks.clone())
        }
    }

    pub struct FakeConfig {
        pub run_config: RunConfig,
        pub general_config: GeneralConfig,
    }

    impl ConfigurationSource for FakeConfig {
        fn run_config(&self) -> Result<RunConfig> {
            Ok(self.run_config.clone())
        }

        fn general_config(&self) -> Result<GeneralConfig> {
            Ok(self.general_config)
        }
    }

    #[derive(Default)]
    pub struct FakeWriter {
        pub rows: RefCell<Vec<HitRow>>,
    }

    impl HitTableWriter for FakeWriter {
        fn write_hits(&mut self, rows: &[HitRow]) -> Result<()> {
            self.rows.borrow_mut().extend_from_slice(rows);
            Ok(())
        }
    }
}
