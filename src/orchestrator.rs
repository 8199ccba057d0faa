/*
 * tpx3-interpret - orchestrator.rs
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

//! Drives the full pipeline: sequential chunk repair, then a parallel
//! per-chunk decode/align/extract pass, then a global time sort.

use log::{info, warn};
use rayon::prelude::*;

use crate::align::align_chunk;
use crate::chunk::{repair_chunks, RepairedChunk};
use crate::config::GeneralConfig;
use crate::container::{ConfigurationSource, HitTableWriter, MetaDataSource, RawDataSource};
use crate::decode::decode_chunk;
use crate::extract::{extract_chunk, HitRow};
use crate::Result;

/// Summary counters reported once processing completes.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunSummary {
    pub total_words: u64,
    pub discarded_words: u64,
    pub hits_written: u64,
}

impl RunSummary {
    pub fn discarded_fraction(&self) -> f64 {
        if self.total_words == 0 {
            0.0
        } else {
            self.discarded_words as f64 / self.total_words as f64
        }
    }
}

/// The worker pool size used when the caller doesn't request one explicitly.
const DEFAULT_WORKERS: usize = 4;

/// Build a `rayon` thread pool with the given worker count, or
/// `DEFAULT_WORKERS` when `None`.
fn build_pool(workers: Option<usize>) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers.unwrap_or(DEFAULT_WORKERS))
        .build()
        .map_err(|e| crate::Error::Decode(format!("failed to build worker pool: {e}")))
}

fn decode_one_chunk(
    raw: &dyn RawDataSource,
    chunk: &RepairedChunk,
    data_take: bool,
    config: GeneralConfig,
) -> Option<Vec<HitRow>> {
    if chunk.indices.is_empty() {
        return None;
    }
    match decode_chunk(raw, &chunk.indices, data_take) {
        Ok(decoded) => {
            let aligned = if data_take { align_chunk(&decoded) } else { Vec::new() };
            Some(extract_chunk(
                &decoded.links,
                &aligned,
                config,
                chunk.scan_param_id,
                chunk.timestamp_start,
                data_take,
            ))
        }
        Err(err) => {
            warn!("chunk decode failed, dropping chunk: {err}");
            None
        }
    }
}

/// Run the full pipeline against the given container collaborators and
/// hand the final, globally sorted hit table to `writer`.
pub fn run(
    raw: &dyn RawDataSource,
    meta: &dyn MetaDataSource,
    config_source: &dyn ConfigurationSource,
    writer: &mut dyn HitTableWriter,
    workers: Option<usize>,
) -> Result<RunSummary> {
    let chunks = meta.chunks()?;
    let run_config = config_source.run_config()?;
    let general_config = config_source.general_config()?;
    let data_take = run_config.scan_id.is_data_take();

    let total_words: u64 = chunks.iter().map(|c| c.index_stop - c.index_start).sum();

    info!("repairing {} chunks", chunks.len());
    let (repaired, discarded_words) = repair_chunks(&chunks, raw)?;

    let pool = build_pool(workers)?;
    let mut rows: Vec<HitRow> = pool.install(|| {
        repaired
            .par_iter()
            .filter_map(|c| decode_one_chunk(raw, c, data_take, general_config))
            .flatten()
            .collect()
    });

    rows.sort_by_key(|r| r.toa_combined);

    let summary = RunSummary {
        total_words,
        discarded_words,
        hits_written: rows.len() as u64,
    };

    info!(
        "discarded {} of {} raw words ({:.4}%)",
        summary.discarded_words,
        summary.total_words,
        summary.discarded_fraction() * 100.0
    );

    writer.write_hits(&rows)?;

    Ok(summary)
}
