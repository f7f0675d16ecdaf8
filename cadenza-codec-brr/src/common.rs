// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Helpers shared by the BRR codec kernels.

/// Compute the prediction base for the next sample from the two previous reconstructed 15-bit
/// samples.
///
/// The four filters realize the fixed coefficient pairs (0, 0), (15/16, 0), (61/32, -15/16), and
/// (115/64, -13/16), expressed exactly as the hardware computes them. All shifts are arithmetic.
pub(crate) fn filter_base(prev1: i32, prev2: i32, filter: u8) -> i32 {
    match filter {
        1 => prev1 + ((-prev1) >> 4),
        2 => (prev1 * 2) + ((-prev1 * 3) >> 5) - prev2 + (prev2 >> 4),
        3 => (prev1 * 2) + ((-prev1 * 13) >> 6) - prev2 + ((prev2 * 3) >> 4),
        _ => 0,
    }
}

/// Pack 16 four-bit residues into the 8 data bytes of a block, upper nibble first.
pub(crate) fn pack_nibbles(residues: &[u8; 16], data: &mut [u8]) {
    for (byte, pair) in data.iter_mut().zip(residues.chunks_exact(2)) {
        *byte = (pair[0] << 4) | (pair[1] & 0x0F);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_filter_base() {
        // Filter 0 ignores history entirely.
        assert_eq!(filter_base(1000, -1000, 0), 0);
        // Filter 1: 15/16 of prev1.
        assert_eq!(filter_base(1600, 0, 1), 1500);
        assert_eq!(filter_base(-1600, 0, 1), -1500);
        // Filter 2: 61/32 of prev1 minus 15/16 of prev2.
        assert_eq!(filter_base(3200, 1600, 2), 6100 - 1500);
        // Filter 3: 115/64 of prev1 minus 13/16 of prev2.
        assert_eq!(filter_base(6400, 1600, 3), 11500 - 1300);
    }

    #[test]
    fn verify_pack_nibbles() {
        let mut residues = [0u8; 16];
        for (n, r) in residues.iter_mut().enumerate() {
            *r = n as u8;
        }
        let mut data = [0u8; 8];
        pack_nibbles(&residues, &mut data);
        assert_eq!(data, [0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF]);
    }
}
