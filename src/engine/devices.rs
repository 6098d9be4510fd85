//! Block device allocation.
//!
//! Each module gets its own volume attached as `/dev/sd<letter>`. Letters are
//! handed out from a configurable base in declaration order; the base differs
//! between machine images (right after the root volume, or further along when
//! the image reserves letters), so it is an input rather than a constant.

use std::fmt;
use std::path::PathBuf;

use crate::error::{BootstrapError, Result};
use crate::modules::ModuleSpec;

/// A single device letter in `a..=z`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceLetter(u8);

impl DeviceLetter {
    /// Parse a base letter; only lowercase ASCII letters are valid.
    pub fn new(letter: char) -> Result<Self> {
        if letter.is_ascii_lowercase() {
            Ok(Self(letter as u8))
        } else {
            Err(BootstrapError::setting(
                "deviceBase",
                letter.to_string(),
                "must be a lowercase letter a-z",
            ))
        }
    }

    pub fn as_char(self) -> char {
        self.0 as char
    }

    /// Letters left from this one through `z`, inclusive
    pub fn remaining(self) -> usize {
        usize::from(b'z' - self.0) + 1
    }

    /// The letter `n` positions after this one, if still within `a..=z`
    fn offset(self, n: usize) -> Option<Self> {
        let next = usize::from(self.0).checked_add(n)?;
        (next <= usize::from(b'z')).then(|| Self(next as u8))
    }

    /// Device path, e.g. `/dev/sdf`
    pub fn device_path(self) -> PathBuf {
        PathBuf::from(format!("/dev/sd{}", self.as_char()))
    }
}

impl fmt::Display for DeviceLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A module paired with the device its volume is attached to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAssignment {
    pub module: ModuleSpec,
    pub letter: DeviceLetter,
}

impl DeviceAssignment {
    pub fn device_path(&self) -> PathBuf {
        self.letter.device_path()
    }
}

/// Assign one device letter per module, `base + index`, in input order.
///
/// # Errors
///
/// `DeviceSpaceExhausted` if the letters from `base` through `z` cannot
/// cover every module. Letters never wrap around.
pub fn allocate_devices(
    modules: Vec<ModuleSpec>,
    base: DeviceLetter,
) -> Result<Vec<DeviceAssignment>> {
    if modules.len() > base.remaining() {
        return Err(BootstrapError::DeviceSpaceExhausted {
            base: base.as_char(),
            requested: modules.len(),
            available: base.remaining(),
        });
    }

    modules
        .into_iter()
        .enumerate()
        .try_fold(Vec::new(), |mut assigned, (index, module)| {
            let letter = base
                .offset(index)
                .ok_or_else(|| BootstrapError::DeviceSpaceExhausted {
                    base: base.as_char(),
                    requested: index + 1,
                    available: base.remaining(),
                })?;
            assigned.push(DeviceAssignment { module, letter });
            Ok(assigned)
        })
}
