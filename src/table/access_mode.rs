use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::util::{Result, Status};

/// Access intent of a table handle, fixed for the handle's lifetime
///
/// - `Read`: iterate rows of an existing table
/// - `Write`: populate a table, closing it when the handle is released
/// - `Append`: add rows to an open table, leaving it open on release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    Read,
    Write,
    Append,
}

impl AccessMode {
    /// Resolve the deprecated `keep_open` flag and `mode` into one mode
    ///
    /// `keep_open = true` means `Write`, `false` means `Read`. Giving both
    /// is rejected rather than letting one silently win. With neither,
    /// the handle reads.
    pub fn resolve(keep_open: Option<bool>, mode: Option<AccessMode>) -> Result<AccessMode> {
        match (keep_open, mode) {
            (Some(_), Some(_)) => Err(Status::conflicting_mode_spec()),
            (None, Some(mode)) => Ok(mode),
            (Some(true), None) => Ok(AccessMode::Write),
            (Some(false), None) | (None, None) => Ok(AccessMode::Read),
        }
    }

    /// Like [`AccessMode::resolve`], for tables that are about to be created
    ///
    /// A new table has no content to read, so `Read` (explicit, or the
    /// legacy `keep_open = false`) is rejected. With neither given the
    /// table is opened for writing.
    pub fn resolve_for_create(
        keep_open: Option<bool>,
        mode: Option<AccessMode>,
    ) -> Result<AccessMode> {
        if keep_open.is_none() && mode.is_none() {
            return Ok(AccessMode::Write);
        }
        match AccessMode::resolve(keep_open, mode)? {
            AccessMode::Read => Err(Status::invalid_mode_for_create(
                "a table being created can only be opened for write or append",
            )),
            mode => Ok(mode),
        }
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self, AccessMode::Read)
    }

    /// Whether releasing a handle in this mode finalizes the remote table
    pub fn closes_on_release(&self) -> bool {
        matches!(self, AccessMode::Write)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "r",
            AccessMode::Write => "w",
            AccessMode::Append => "a",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessMode {
    type Err = Status;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" | "read" => Ok(AccessMode::Read),
            "w" | "write" => Ok(AccessMode::Write),
            "a" | "append" => Ok(AccessMode::Append),
            other => Err(Status::invalid_argument(format!(
                "unknown access mode '{other}', expected one of r, w, a"
            ))),
        }
    }
}
