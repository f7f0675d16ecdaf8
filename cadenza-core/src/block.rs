// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `block` module describes the structure of a BRR block.
//!
//! A block is 9 bytes: one header byte laid out as `RRRR FFEL`, followed by 8 data bytes holding
//! 16 signed 4-bit residues, upper nibble first.

use bitflags::bitflags;

/// Size of one BRR block in bytes.
pub const BLOCK_LEN: usize = 9;

/// Number of PCM samples coded by one BRR block.
pub const SAMPLES_PER_BLOCK: usize = 16;

bitflags! {
    /// Flags stored in the low two bits of a BRR block header.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct HeaderFlags: u8 {
        /// Set on the final block of a sample. Terminates decoding.
        const END = 0b01;
        /// Set alongside `END` when the sample loops.
        const LOOP = 0b10;
    }
}

/// A decoded BRR block header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    /// Range (left-shift) applied to each 4-bit residue, 0..=15. Encoders only produce 1..=12.
    pub range: u8,
    /// Prediction filter selector, 0..=3.
    pub filter: u8,
    /// END and LOOP flags.
    pub flags: HeaderFlags,
}

impl BlockHeader {
    /// Parse a header byte.
    pub fn parse(byte: u8) -> BlockHeader {
        BlockHeader {
            range: byte >> 4,
            filter: (byte >> 2) & 0x3,
            flags: HeaderFlags::from_bits_truncate(byte),
        }
    }

    /// Pack the header back into its byte representation.
    pub fn pack(&self) -> u8 {
        (self.range << 4) | (self.filter << 2) | self.flags.bits()
    }
}

/// `Nibble` selects the upper or lower 4 bits of a data byte.
///
/// Within a data byte the upper nibble is coded first.
pub enum Nibble {
    Upper,
    Lower,
}

impl Nibble {
    /// Extract the selected nibble.
    pub fn get(&self, byte: u8) -> u8 {
        match self {
            Nibble::Upper => byte >> 4,
            Nibble::Lower => byte & 0x0F,
        }
    }
}
