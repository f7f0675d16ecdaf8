// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error::Error as StdError;
use std::fmt;
use std::result;

/// `Error` provides an enumeration of all possible errors reported by Cadenza.
///
/// Encoding and decoding themselves are infallible: malformed BRR streams are normalised by
/// padding, and all arithmetic overflow is defined by the S-DSP's clamp and wrap semantics.
/// Errors arise only from kernel selection and option handling.
#[derive(Debug)]
pub enum Error {
    /// The requested codec kernel is not registered.
    UnknownCodec(String),
    /// The option name is not recognized by the selected codec kernel.
    UnknownOption(String),
    /// The option value failed to parse, or is out of range, for the named option.
    InvalidOptionValue {
        /// The name of the option that rejected the value.
        name: &'static str,
        /// The offending value.
        value: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::UnknownCodec(ref name) => {
                write!(f, "unknown codec kernel: {}", name)
            }
            Error::UnknownOption(ref name) => {
                write!(f, "unknown codec option: {}", name)
            }
            Error::InvalidOptionValue { name, ref value } => {
                write!(f, "invalid value for option {}: {}", name, value)
            }
        }
    }
}

impl StdError for Error {}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create an unknown codec kernel error.
pub fn unknown_codec_error<T>(name: &str) -> Result<T> {
    Err(Error::UnknownCodec(name.to_string()))
}

/// Convenience function to create an unknown option error.
pub fn unknown_option_error<T>(name: &str) -> Result<T> {
    Err(Error::UnknownOption(name.to_string()))
}

/// Convenience function to create an invalid option value error.
pub fn invalid_value_error<T>(name: &'static str, value: &str) -> Result<T> {
    Err(Error::InvalidOptionValue { name, value: value.to_string() })
}
