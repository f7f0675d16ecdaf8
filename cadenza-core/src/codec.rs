// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `codec` module defines the BRR codec kernel trait, and a registry to support lookup and
//! instantiation of kernels by name at runtime.

use std::collections::HashMap;

use crate::errors::{unknown_codec_error, Result};

/// Statistics collected over the course of one encoding operation.
///
/// Error figures are measured between the desired 15-bit sample and the sample the decoder will
/// reconstruct. The alternate kernel records absolute error totals only; the legacy kernel records
/// squared error with per-block minimum and maximum.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct EncodeStats {
    /// Sum of the per-block reconstruction error over the whole stream.
    pub total_error: f64,
    /// Average per-block reconstruction error.
    pub avg_error: f64,
    /// Smallest per-block reconstruction error.
    pub min_error: f64,
    /// Largest per-block reconstruction error.
    pub max_error: f64,
}

/// A `BrrCodec` transcodes between 16-bit signed mono PCM and the S-DSP's 9-byte BRR block
/// format.
///
/// A kernel is stateful with respect to its options, but each call to [`BrrCodec::encode`] or
/// [`BrrCodec::decode`] is a complete, independent operation over the provided buffer.
pub trait BrrCodec {
    /// Set a named option.
    ///
    /// Each kernel recognizes its own set of option names. An unrecognized name yields
    /// [`Error::UnknownOption`](crate::errors::Error::UnknownOption), a value that fails to parse
    /// or is out of range yields
    /// [`Error::InvalidOptionValue`](crate::errors::Error::InvalidOptionValue).
    fn set_option(&mut self, name: &str, value: &str) -> Result<()>;

    /// Encode PCM samples into a BRR block stream.
    ///
    /// The output is always a non-empty whole number of 9-byte blocks, with the END flag set on
    /// the final block (plus the LOOP flag when a loop is configured). The input is copied into a
    /// kernel-owned working buffer first; passes that modify samples (loop unrolling, overflow
    /// attenuation) never touch the caller's buffer.
    fn encode(&mut self, pcm: &[i16]) -> Vec<u8>;

    /// Decode a BRR block stream into PCM samples, returning them with the output sample rate.
    ///
    /// A stream whose length is not a multiple of 9 is zero-padded, and the final block's END
    /// flag is forced, before decoding.
    fn decode(&mut self, brr: &[u8]) -> (Vec<i16>, u32);

    /// Get the statistics recorded by the most recent call to [`BrrCodec::encode`].
    fn encode_stats(&self) -> EncodeStats;
}

/// Description of a codec kernel supported by a `BrrCodec` implementation.
#[derive(Copy, Clone)]
pub struct SupportedKernel {
    /// The name the kernel is selected by.
    pub name: &'static str,
    /// A human readable description of the kernel.
    pub long_name: &'static str,
}

/// To support registration in a codec registry, a `BrrCodec` must implement the
/// `RegisterableBrrCodec` trait.
pub trait RegisterableBrrCodec: BrrCodec {
    /// Instantiate the codec with default options.
    fn registry_new() -> Box<dyn BrrCodec>
    where
        Self: Sized;

    /// Get a list of kernels supported by this codec.
    fn supported_kernels() -> &'static [SupportedKernel];
}

/// `BrrCodec` factory function. Creates a boxed `BrrCodec`.
pub type BrrCodecFactoryFn = fn() -> Box<dyn BrrCodec>;

/// Registration details of a codec kernel.
pub struct RegisteredCodec {
    /// Kernel details.
    pub kernel: SupportedKernel,
    /// Factory function to instantiate the codec.
    pub factory: BrrCodecFactoryFn,
}

/// A `CodecRegistry` allows the registration of codec kernels, and provides a method to
/// instantiate a `BrrCodec` given a kernel name.
#[derive(Default)]
pub struct CodecRegistry {
    kernels: HashMap<&'static str, RegisteredCodec>,
}

impl CodecRegistry {
    /// Instantiate a new `CodecRegistry`.
    pub fn new() -> Self {
        CodecRegistry { kernels: Default::default() }
    }

    /// Get the registration information for the named kernel.
    pub fn get(&self, name: &str) -> Option<&RegisteredCodec> {
        self.kernels.get(name)
    }

    /// Iterate over all registered kernels.
    pub fn kernels(&self) -> impl Iterator<Item = &RegisteredCodec> {
        self.kernels.values()
    }

    /// Registers all kernels supported by the codec.
    ///
    /// If a supported kernel was previously registered by another codec, it will be replaced
    /// within the registry.
    pub fn register<C: RegisterableBrrCodec>(&mut self) {
        for kernel in C::supported_kernels() {
            let reg = RegisteredCodec { kernel: *kernel, factory: C::registry_new };
            self.kernels.insert(kernel.name, reg);
        }
    }

    /// Instantiate a codec for the named kernel.
    ///
    /// If no codec supporting the kernel is registered, an error is returned.
    pub fn make_codec(&self, name: &str) -> Result<Box<dyn BrrCodec>> {
        match self.kernels.get(name) {
            Some(codec) => Ok((codec.factory)()),
            None => unknown_codec_error(name),
        }
    }
}

/// Convenience macro for declaring a `SupportedKernel`.
#[macro_export]
macro_rules! support_kernel {
    ($name:expr, $long_name:expr) => {
        $crate::codec::SupportedKernel { name: $name, long_name: $long_name }
    };
}
