// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! # Project Cadenza
//!
//! Cadenza is a pure Rust codec suite for the SNES S-DSP's BRR (Bit Rate Reduction) sample
//! format, converting between 16-bit signed mono PCM and 9-byte BRR blocks.
//!
//! # Usage
//!
//! The typical flow is:
//!
//! 1. Instantiate a [`Transcoder`]. It owns the PCM and BRR buffers and a codec kernel
//!    (`alt` by default).
//! 2. Optionally select a kernel with [`Transcoder::set_codec`] and configure it with
//!    [`Transcoder::set_codec_option`] or [`Transcoder::set_loop`].
//! 3. Fill [`Transcoder::pcm_data`] and call [`Transcoder::encode`], or fill
//!    [`Transcoder::brr_data`] (for example via [`Transcoder::set_brr_data`]) and call
//!    [`Transcoder::decode`].
//! 4. Read the opposite buffer back. After decoding, [`Transcoder::pcm_rate`] holds the rate the
//!    produced PCM should be played at; after encoding, [`Transcoder::encoding_stats`] reports
//!    the reconstruction error.
//!
//! Kernels can also be instantiated directly from the registry returned by
//! [`default::get_codecs`], or constructed by hand from the
//! [`cadenza-codec-brr`](cadenza_codec_brr) crate.
//!
//! # Kernels
//!
//! | Name     | Description                                                          |
//! |----------|----------------------------------------------------------------------|
//! | `legacy` | Models the S-DSP's exact integer pipeline; supports gaussian decode. |
//! | `alt`    | Follows the published S-DSP decoding formulas.                       |
//!
//! # Options
//!
//! | Option   | Kernel   | Values                        | Effect                              |
//! |----------|----------|-------------------------------|-------------------------------------|
//! | `loop`   | both     | integer, negative disables    | loop start sample index             |
//! | `gauss`  | `legacy` | `0` or `1`                    | gaussian interpolation on decode    |
//! | `pitch`  | `legacy` | 1..=0x3FFF, decimal or `0x`   | pitch counter step for decoding     |
//! | `compat` | `legacy` | `0` or `1`                    | replicate reference decoder quirks  |

pub mod default {
    //! The `default` module provides a convenience registry with all of the Cadenza codec
    //! kernels pre-registered.

    use cadenza_core::codec::CodecRegistry;

    use lazy_static::lazy_static;

    lazy_static! {
        static ref CODEC_REGISTRY: CodecRegistry = {
            let mut registry = CodecRegistry::new();
            register_kernels(&mut registry);
            registry
        };
    }

    /// Gets the default `CodecRegistry`, with every Cadenza codec kernel pre-registered.
    ///
    /// This function is lazy and does not instantiate the `CodecRegistry` until the first call.
    pub fn get_codecs() -> &'static CodecRegistry {
        &CODEC_REGISTRY
    }

    /// Registers all of the Cadenza codec kernels on the provided registry.
    ///
    /// Use this function to easily populate a custom registry.
    pub fn register_kernels(registry: &mut CodecRegistry) {
        registry.register::<cadenza_codec_brr::AltCodec>();
        registry.register::<cadenza_codec_brr::LegacyCodec>();
    }
}

pub use cadenza_core as core;

use cadenza_core::block::BLOCK_LEN;
use cadenza_core::codec::{BrrCodec, EncodeStats};
use cadenza_core::errors::Result;

use cadenza_codec_brr::AltCodec;

/// The default output sample rate of BRR data.
pub const DEFAULT_SAMPLE_RATE: u32 = 32000;

/// Transcodes between BRR and PCM. Buffers are kept entirely in memory.
///
/// A `Transcoder` owns its buffers and a codec kernel. The kernel works on copies, so
/// [`Transcoder::pcm_data`] is never modified by encoding.
pub struct Transcoder {
    /// 16-bit signed mono PCM data, read by [`Transcoder::encode`] and replaced by
    /// [`Transcoder::decode`].
    pub pcm_data: Vec<i16>,

    /// The sample rate of the PCM data. Usually 32000, but decoding can change it depending on
    /// the kernel options.
    pub pcm_rate: u32,

    /// Raw BRR block data, read by [`Transcoder::decode`] and replaced by
    /// [`Transcoder::encode`].
    pub brr_data: Vec<u8>,

    codec: Box<dyn BrrCodec>,
}

impl Transcoder {
    /// Instantiate a `Transcoder` with the default (`alt`) codec kernel.
    pub fn new() -> Transcoder {
        Transcoder {
            pcm_data: Vec::new(),
            pcm_rate: DEFAULT_SAMPLE_RATE,
            brr_data: Vec::new(),
            codec: Box::new(AltCodec::new()),
        }
    }

    /// Replace the codec kernel with the named one, with default options.
    ///
    /// Returns [`Error::UnknownCodec`](cadenza_core::errors::Error::UnknownCodec) if no such
    /// kernel is registered.
    pub fn set_codec(&mut self, name: &str) -> Result<()> {
        self.codec = default::get_codecs().make_codec(name)?;
        Ok(())
    }

    /// Set an option on the codec kernel.
    pub fn set_codec_option(&mut self, name: &str, value: &str) -> Result<()> {
        self.codec.set_option(name, value)
    }

    /// Set or clear the loop start point, measured in samples.
    ///
    /// The loop start may be adjusted during encoding to land on a block boundary; the remainder
    /// of the sample is unrolled to align. Looping sets the LOOP flag on the stream's final
    /// block, and the loop entry block is coded with filter 0 so the loop seam cannot corrupt.
    pub fn set_loop(&mut self, loop_start: Option<u64>) -> Result<()> {
        match loop_start {
            Some(start) => self.codec.set_option("loop", &start.to_string()),
            None => self.codec.set_option("loop", "-1"),
        }
    }

    /// Load the BRR buffer, padding the stream to a whole number of blocks.
    pub fn set_brr_data(&mut self, data: &[u8]) {
        self.brr_data = data.to_vec();
        while self.brr_data.len() % BLOCK_LEN != 0 {
            self.brr_data.push(0);
        }
    }

    /// Encode the data in the PCM buffer into the BRR buffer.
    pub fn encode(&mut self) {
        self.brr_data = self.codec.encode(&self.pcm_data);
    }

    /// Decode the data in the BRR buffer into the PCM buffer, updating
    /// [`Transcoder::pcm_rate`].
    pub fn decode(&mut self) {
        let (pcm, rate) = self.codec.decode(&self.brr_data);
        self.pcm_data = pcm;
        self.pcm_rate = rate;
    }

    /// Get statistics about the last encoding operation.
    ///
    /// During encoding, statistics about the differences between the desired and the
    /// reconstructed samples are recorded.
    pub fn encoding_stats(&self) -> EncodeStats {
        self.codec.encode_stats()
    }
}

impl Default for Transcoder {
    fn default() -> Transcoder {
        Transcoder::new()
    }
}
