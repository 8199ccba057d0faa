/*
 * tpx3-interpret - error.rs
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

/// Standard Error for tpx3-interpret
#[derive(Debug)]
pub enum Error {
    /// A required configuration key was missing or had the wrong type.
    Configuration(String),
    /// The raw-word stream or meta-data was malformed beyond recovery.
    Decode(String),
    /// IO error reading or writing the container.
    Io(String),
    /// HDF5 container error.
    Hdf5(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err.to_string())
    }
}

impl From<hdf5::Error> for Error {
    fn from(err: hdf5::Error) -> Error {
        Error::Hdf5(err.to_string())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Configuration(ref msg) => write!(f, "Configuration error: {msg}"),
            Self::Decode(ref msg) => write!(f, "Decode error: {msg}"),
            Self::Io(ref err) => write!(f, "IO error: {err}"),
            Self::Hdf5(ref err) => write!(f, "HDF5 error: {err}"),
        }
    }
}

impl std::error::Error for Error {}

/// Standard Result for tpx3-interpret
pub type Result<T> = std::result::Result<T, Error>;
