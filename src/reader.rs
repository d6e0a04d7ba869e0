//! Time coordinate access for mirrored mission logs.
//!
//! The validator only needs a file's time coordinate units and its first
//! and last raw values; [`TimeAxisReader`] abstracts over the container
//! format so the validator can be exercised without netCDF files.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadError {
    #[error("can't open {path}: {message}")]
    Open { path: PathBuf, message: String },

    #[error("time axis '{name}' not found")]
    MissingAxis { name: String },

    #[error("time axis '{name}' has no string 'units' attribute")]
    MissingUnits { name: String },

    #[error("time axis '{name}' is empty")]
    Empty { name: String },

    #[error("can't read values of '{name}': {message}")]
    Values { name: String, message: String },
}

/// Units and bounding raw values of a time coordinate
#[derive(Debug, Clone, PartialEq)]
pub struct TimeAxis {
    pub units: String,
    pub first: f64,
    pub last: f64,
}

/// Reads the named time coordinate of a local file
pub trait TimeAxisReader: Send + Sync + 'static {
    fn read_time_axis(&self, path: &Path, axis: &str) -> Result<TimeAxis, ReadError>;
}

/// Reader for netCDF-4 mission logs
#[cfg(feature = "netcdf")]
#[derive(Debug, Clone, Copy, Default)]
pub struct NetCdfReader;

#[cfg(feature = "netcdf")]
impl TimeAxisReader for NetCdfReader {
    fn read_time_axis(&self, path: &Path, axis: &str) -> Result<TimeAxis, ReadError> {
        let file = netcdf::open(path).map_err(|e| ReadError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let variable = file.variable(axis).ok_or_else(|| ReadError::MissingAxis {
            name: axis.to_string(),
        })?;

        let units = variable
            .attribute("units")
            .and_then(|attr| attr.value().ok())
            .and_then(|value| match value {
                netcdf::AttributeValue::Str(s) => Some(s),
                _ => None,
            })
            .ok_or_else(|| ReadError::MissingUnits {
                name: axis.to_string(),
            })?;

        let len = variable.len();
        if len == 0 {
            return Err(ReadError::Empty {
                name: axis.to_string(),
            });
        }

        let value_at = |index: usize| {
            variable
                .get_value::<f64, _>([index])
                .map_err(|e| ReadError::Values {
                    name: axis.to_string(),
                    message: e.to_string(),
                })
        };

        Ok(TimeAxis {
            units,
            first: value_at(0)?,
            last: value_at(len - 1)?,
        })
    }
}
