/*
 * tpx3-interpret - hdf5_container.rs
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

//! The concrete `hdf5-metno`-backed container adapter. Everything in
//! `chunk`, `decode`, `align`, `extract` and `orchestrator` is written
//! against the traits in `container` instead of this module directly.

use std::ops::Range;
use std::path::Path;

use hdf5::types::{FloatSize, IntSize, TypeDescriptor, VarLenUnicode};

use crate::config::{GeneralConfig, OpMode, RunConfig, ScanId};
use crate::container::{ChunkMeta, ConfigurationSource, HitTableWriter, MetaDataSource, RawDataSource};
use crate::extract::HitRow;
use crate::Result;

const RAW_DATASET: &str = "raw_data";
const META_DATASET: &str = "meta_data";
const RUN_CONFIG_GROUP: &str = "configuration/run_config";
const GENERAL_CONFIG_GROUP: &str = "configuration/generalConfig";

/// One open HDF5 file, used as both the input container (raw words,
/// chunk metadata, configuration) and the output container (the
/// interpreted hit table).
pub struct Hdf5Container {
    file: hdf5::File,
}

impl Hdf5Container {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            file: hdf5::File::open(path)?,
        })
    }

    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            file: hdf5::File::create(path)?,
        })
    }

    fn write_scalar_str_attr(group: &hdf5::Group, name: &str, value: &str) -> Result<()> {
        let v: VarLenUnicode = value.parse().expect("attribute strings are plain ASCII");
        group
            .new_attr::<VarLenUnicode>()
            .create(name)?
            .write_scalar(&v)?;
        Ok(())
    }

    fn write_i64_array_attr(group: &hdf5::Group, name: &str, values: &[i64]) -> Result<()> {
        group
            .new_attr::<i64>()
            .shape(values.len())
            .create(name)?
            .write(values)?;
        Ok(())
    }

    /// Copy `source`'s whole `configuration` subtree, verbatim, under this
    /// file's `interpreted/run_0/configuration`: every child group and
    /// dataset it holds, at any depth, along with their attributes. Called
    /// by the CLI after `write_hits`, once both the input and output files
    /// are open.
    ///
    /// This does not special-case `run_config`/`generalConfig` the way
    /// `run_config()`/`general_config()` do for decode-time use; whatever
    /// the source file actually stored under `configuration` is what gets
    /// reproduced in the output, so a scan setup field this crate never
    /// reads still survives the round trip.
    pub fn copy_configuration_from(&self, source: &Hdf5Container) -> Result<()> {
        let src_config = source.file.group("configuration")?;
        let dest = self.file.group("interpreted/run_0")?;
        let dest_config = dest.create_group("configuration")?;
        copy_group(&src_config, &dest_config)
    }
}

/// A scalar or 1-D attribute/dataset element type this copier knows how to
/// move byte-for-byte. Compound and nested-array types are out of scope;
/// one is logged and skipped rather than silently dropped.
fn copy_attrs(src: &hdf5::Group, dest: &hdf5::Group) -> Result<()> {
    for name in src.attr_names()? {
        let attr = src.attr(&name)?;
        let descriptor = attr.dtype()?.to_descriptor()?;
        match descriptor {
            TypeDescriptor::Integer(IntSize::U8) => {
                let v: i64 = attr.read_scalar()?;
                dest.new_attr::<i64>().create(name.as_str())?.write_scalar(&v)?;
            }
            TypeDescriptor::Float(FloatSize::U8) => {
                let v: f64 = attr.read_scalar()?;
                dest.new_attr::<f64>().create(name.as_str())?.write_scalar(&v)?;
            }
            TypeDescriptor::Boolean => {
                let v: bool = attr.read_scalar()?;
                dest.new_attr::<bool>().create(name.as_str())?.write_scalar(&v)?;
            }
            TypeDescriptor::VarLenUnicode | TypeDescriptor::VarLenAscii => {
                let v: VarLenUnicode = attr.read_scalar()?;
                dest.new_attr::<VarLenUnicode>()
                    .create(name.as_str())?
                    .write_scalar(&v)?;
            }
            other => {
                log::warn!("configuration attribute `{name}` has unsupported type {other:?}, skipping");
            }
        }
    }
    Ok(())
}

/// Copy one dataset's data and attributes, dispatching on its element type.
fn copy_dataset(src: &hdf5::Dataset, dest_group: &hdf5::Group, name: &str) -> Result<()> {
    let descriptor = src.dtype()?.to_descriptor()?;
    let shape = src.shape();
    match descriptor {
        TypeDescriptor::Integer(IntSize::U8) => {
            let data = src.read_1d::<i64>()?.to_vec();
            dest_group.new_dataset::<i64>().shape(shape).create(name)?.write(&data)?;
        }
        TypeDescriptor::Float(FloatSize::U8) => {
            let data = src.read_1d::<f64>()?.to_vec();
            dest_group.new_dataset::<f64>().shape(shape).create(name)?.write(&data)?;
        }
        TypeDescriptor::Boolean => {
            let data = src.read_1d::<bool>()?.to_vec();
            dest_group.new_dataset::<bool>().shape(shape).create(name)?.write(&data)?;
        }
        TypeDescriptor::VarLenUnicode | TypeDescriptor::VarLenAscii => {
            let data = src.read_1d::<VarLenUnicode>()?.to_vec();
            dest_group
                .new_dataset::<VarLenUnicode>()
                .shape(shape)
                .create(name)?
                .write(&data)?;
        }
        other => {
            log::warn!("configuration dataset `{name}` has unsupported type {other:?}, skipping");
            return Ok(());
        }
    }
    let new_dataset = dest_group.dataset(name)?;
    copy_attrs_onto_dataset(src, &new_dataset)
}

/// `attr_names`/`attr` are defined on the `Location` trait, so the same
/// dispatch as `copy_attrs` applies to datasets; only the container type
/// of the source/destination differs, hence this thin duplicate rather
/// than a generic helper the two callers would need a trait bound for.
fn copy_attrs_onto_dataset(src: &hdf5::Dataset, dest: &hdf5::Dataset) -> Result<()> {
    for name in src.attr_names()? {
        let attr = src.attr(&name)?;
        let descriptor = attr.dtype()?.to_descriptor()?;
        match descriptor {
            TypeDescriptor::Integer(IntSize::U8) => {
                let v: i64 = attr.read_scalar()?;
                dest.new_attr::<i64>().create(name.as_str())?.write_scalar(&v)?;
            }
            TypeDescriptor::Float(FloatSize::U8) => {
                let v: f64 = attr.read_scalar()?;
                dest.new_attr::<f64>().create(name.as_str())?.write_scalar(&v)?;
            }
            TypeDescriptor::Boolean => {
                let v: bool = attr.read_scalar()?;
                dest.new_attr::<bool>().create(name.as_str())?.write_scalar(&v)?;
            }
            TypeDescriptor::VarLenUnicode | TypeDescriptor::VarLenAscii => {
                let v: VarLenUnicode = attr.read_scalar()?;
                dest.new_attr::<VarLenUnicode>()
                    .create(name.as_str())?
                    .write_scalar(&v)?;
            }
            other => {
                log::warn!("configuration attribute `{name}` has unsupported type {other:?}, skipping");
            }
        }
    }
    Ok(())
}

/// Recursively copy every attribute, dataset and child group of `src` into
/// `dest`, mirroring `configuration`'s own substructure rather than a
/// hardcoded set of keys.
fn copy_group(src: &hdf5::Group, dest: &hdf5::Group) -> Result<()> {
    copy_attrs(src, dest)?;
    for name in src.member_names()? {
        if let Ok(child) = src.group(&name) {
            let dest_child = dest.create_group(&name)?;
            copy_group(&child, &dest_child)?;
        } else {
            let dataset = src.dataset(&name)?;
            copy_dataset(&dataset, dest, &name)?;
        }
    }
    Ok(())
}

impl RawDataSource for Hdf5Container {
    fn raw_word(&self, i: u64) -> Result<u32> {
        let dataset = self.file.dataset(RAW_DATASET)?;
        let slice = dataset.read_slice_1d::<u32, _>(i as usize..i as usize + 1)?;
        Ok(slice[0])
    }

    fn raw_words(&self, range: Range<u64>) -> Result<Vec<u32>> {
        let dataset = self.file.dataset(RAW_DATASET)?;
        let arr = dataset.read_slice_1d::<u32, _>(range.start as usize..range.end as usize)?;
        Ok(arr.to_vec())
    }
}

impl MetaDataSource for Hdf5Container {
    fn chunks(&self) -> Result<Vec<ChunkMeta>> {
        let dataset = self.file.dataset(META_DATASET)?;
        let arr = dataset.read_1d::<ChunkMeta>()?;
        Ok(arr.to_vec())
    }
}

impl ConfigurationSource for Hdf5Container {
    fn run_config(&self) -> Result<RunConfig> {
        let group = self.file.group(RUN_CONFIG_GROUP)?;
        let scan_id: VarLenUnicode = group.attr("scan_id")?.read_scalar()?;
        Ok(RunConfig {
            scan_id: ScanId::new(scan_id.to_string()),
        })
    }

    fn general_config(&self) -> Result<GeneralConfig> {
        let group = self.file.group(GENERAL_CONFIG_GROUP)?;
        let op_mode_raw: i64 = group.attr("Op_mode")?.read_scalar()?;
        let vco: bool = group.attr("Fast_Io_en")?.read_scalar()?;
        Ok(GeneralConfig {
            op_mode: OpMode::try_from(op_mode_raw)?,
            vco,
        })
    }
}

impl HitTableWriter for Hdf5Container {
    fn write_hits(&mut self, rows: &[HitRow]) -> Result<()> {
        let interpreted = self.file.create_group("interpreted")?;
        Self::write_scalar_str_attr(&interpreted, "TimepixVersion", "Timepix3")?;
        Self::write_i64_array_attr(&interpreted, "centerChip", &[0])?;
        Self::write_scalar_str_attr(&interpreted, "runFolderKind", "rfUnknown")?;
        Self::write_scalar_str_attr(&interpreted, "runType", "rfXrayFinger")?;

        let run0 = interpreted.create_group("run_0")?;
        Self::write_i64_array_attr(&run0, "BadBatchCount", &[0])?;
        Self::write_i64_array_attr(&run0, "BadSliceCount", &[0])?;
        Self::write_i64_array_attr(&run0, "batchSize", &[100_000_000])?;
        Self::write_i64_array_attr(&run0, "numChips", &[1])?;

        run0.new_dataset::<HitRow>()
            .shape(rows.len())
            .deflate(2)
            .create("hit_data")?
            .write(rows)?;

        Ok(())
    }
}
