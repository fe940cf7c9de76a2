//! Error types for the proximity function driver.

use core::fmt::{self, Debug};

/// The main error type for the proximity function driver.
pub enum ProxError<TBUSERR> {
    /// The register transport failed. Carries the host bus error verbatim.
    Bus(TBUSERR),
    /// The descriptor table was exhausted without finding the proximity
    /// function.
    FunctionNotFound,
    /// Control surface input that does not parse as a hexadecimal byte.
    InvalidArgument,
    /// The device has already been removed.
    Detached,
}

impl<TBUSERR: Debug> Debug for ProxError<TBUSERR> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(err) => write!(f, "Bus({err:?})"),
            Self::FunctionNotFound => write!(f, "FunctionNotFound"),
            Self::InvalidArgument => write!(f, "InvalidArgument"),
            Self::Detached => write!(f, "Detached"),
        }
    }
}
