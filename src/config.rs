/*
 * tpx3-interpret - config.rs
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

//! Typed run configuration read from the input container's key-value tables.

use crate::{Error, Result};

/// Field-extraction mode, selected by the `Op_mode` configuration key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpMode {
    /// `Op_mode == 0`: ToA + ToT.
    Mode0,
    /// `Op_mode == 1`: ToA only.
    Mode1,
    /// `Op_mode` is anything else (2 or 3): iToT + EventCounter.
    Other,
}

impl TryFrom<i64> for OpMode {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(OpMode::Mode0),
            1 => Ok(OpMode::Mode1),
            2 | 3 => Ok(OpMode::Other),
            _ => Err(Error::Configuration(format!(
                "Op_mode must be in {{0,1,2,3}}, got {value}"
            ))),
        }
    }
}

impl OpMode {
    /// The canonical integer this mode re-serializes to. `Other` collapses
    /// both 2 and 3 to 2 on the way back out; the distinction between them
    /// carries no decode-time meaning: extraction treats both identically.
    pub fn as_i64(&self) -> i64 {
        match self {
            OpMode::Mode0 => 0,
            OpMode::Mode1 => 1,
            OpMode::Other => 2,
        }
    }
}

/// The scan identifier string. `"DataTake"` is the literal trigger for
/// ToA extension processing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanId(String);

impl ScanId {
    pub fn new(s: impl Into<String>) -> Self {
        ScanId(s.into())
    }

    pub fn is_data_take(&self) -> bool {
        self.0 == "DataTake"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// `configuration.run_config` as read from the container.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub scan_id: ScanId,
}

/// `configuration.generalConfig` as read from the container.
#[derive(Clone, Copy, Debug)]
pub struct GeneralConfig {
    pub op_mode: OpMode,
    /// `Fast_Io_en`: selects HitCounter (false) vs FTOA (true).
    pub vco: bool,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_op_mode_from_i64() {
        assert_eq!(OpMode::try_from(0).unwrap(), OpMode::Mode0);
        assert_eq!(OpMode::try_from(1).unwrap(), OpMode::Mode1);
        assert_eq!(OpMode::try_from(2).unwrap(), OpMode::Other);
        assert_eq!(OpMode::try_from(3).unwrap(), OpMode::Other);
        assert!(OpMode::try_from(4).is_err());
    }

    #[test]
    fn test_scan_id_data_take() {
        assert!(ScanId::new("DataTake").is_data_take());
        assert!(!ScanId::new("Threshold Scan").is_data_take());
    }
}
