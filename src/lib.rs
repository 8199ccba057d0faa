/*
 * tpx3-interpret - lib.rs
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

//! Decodes a Timepix3 raw readout stream into a time-sorted hit table.
//!
//! The pipeline is split into small, independently testable stages —
//! chunk repair, per-chunk decode, extension alignment, field
//! extraction — driven by [`orchestrator::run`] against the
//! [`container`] traits. [`hdf5_container`] is the concrete adapter used
//! by the `tpx3-interpret` binary; anything else implementing the same
//! traits (an in-memory fake, a different file format) works just as
//! well against the same pipeline.

mod align;
mod chunk;
mod config;
mod container;
mod decode;
mod error;
mod extract;
mod hdf5_container;
mod orchestrator;
mod tables;

pub use config::{GeneralConfig, OpMode, RunConfig, ScanId};
pub use container::{ChunkMeta, ConfigurationSource, HitTableWriter, MetaDataSource, RawDataSource};
pub use error::{Error, Result};
pub use extract::HitRow;
pub use hdf5_container::Hdf5Container;
pub use orchestrator::{run, RunSummary};
