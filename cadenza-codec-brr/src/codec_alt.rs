// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use cadenza_core::block::{BlockHeader, HeaderFlags, Nibble, BLOCK_LEN, SAMPLES_PER_BLOCK};
use cadenza_core::codec::{BrrCodec, EncodeStats, RegisterableBrrCodec, SupportedKernel};
use cadenza_core::errors::{invalid_value_error, unknown_option_error, Result};
use cadenza_core::support_kernel;
use cadenza_core::util::bits::sign_extend_leq8_to_i8;
use cadenza_core::util::clamp::{clamp_i16, clamp_i4};

use log::{debug, warn};

use crate::common::{filter_base, pack_nibbles};

/// Bounds the encoder holds every reconstructed 15-bit sample to. Residues producing samples
/// outside this window are nudged back towards it.
const RECON_MIN: i32 = -0x3FFA;
const RECON_MAX: i32 = 0x3FF8;

/// BRR codec kernel following the published S-DSP decoding formulas.
///
/// The encoder searches filters and shifts per block, scoring candidates by total absolute
/// error. The decoder inverts the encoder exactly; it does not model the hardware's pitch
/// counter or gaussian interpolation. Registered under the name `alt`.
#[derive(Default)]
pub struct AltCodec {
    loop_point: Option<usize>,
    stats: EncodeStats,
}

/// Search one block over filter 0..=`filter_max` and shift 11..=0 for the coding with the least
/// total absolute error. Ties keep the earliest candidate, so larger shifts and simpler filters
/// win.
///
/// `prev1` and `prev2` are the previous two reconstructed 15-bit samples. Returns the coded
/// block, the two trailing reconstructed samples, and the block's error.
fn encode_block(
    pcm: &[i16],
    prev1: i32,
    prev2: i32,
    filter_max: u8,
) -> ([u8; BLOCK_LEN], i32, i32, i32) {
    let mut best_err = i32::MAX;
    let mut best_block = [0u8; BLOCK_LEN];
    let mut best_prev1 = 0;
    let mut best_prev2 = 0;

    for filter in 0..=filter_max {
        for shift in (0..=11i32).rev() {
            let half = (1i32 << shift) >> 1;

            let mut p1 = prev1;
            let mut p2 = prev2;
            let mut residues = [0u8; SAMPLES_PER_BLOCK];
            let mut err_sum = 0;
            let mut failed = false;

            for (residue, &x) in residues.iter_mut().zip(pcm) {
                let desired = i32::from(x) >> 1;
                let base = filter_base(p1, p2, filter);

                let mut q = clamp_i4((desired - base + half) >> shift);

                // If the reconstruction leaves the legal sample window, walk the residue back
                // towards it. The walk can exhaust the 4-bit range, which fails the whole
                // (filter, shift) candidate.
                loop {
                    let recon = base + (q << shift);
                    if recon < RECON_MIN {
                        if q < 7 {
                            q += 1;
                            continue;
                        }
                        failed = true;
                    }
                    else if recon > RECON_MAX {
                        if q > -8 {
                            q -= 1;
                            continue;
                        }
                        failed = true;
                    }
                    break;
                }

                if failed {
                    break;
                }

                let recon = base + (q << shift);
                err_sum += (desired - recon).abs();
                *residue = (q & 0x0F) as u8;
                p2 = p1;
                p1 = recon;
            }

            if failed {
                continue;
            }

            if err_sum < best_err {
                best_err = err_sum;
                best_prev1 = p1;
                best_prev2 = p2;

                let header = BlockHeader {
                    range: (shift + 1) as u8,
                    filter,
                    flags: HeaderFlags::empty(),
                };
                best_block[0] = header.pack();
                pack_nibbles(&residues, &mut best_block[1..]);
            }
        }
    }

    (best_block, best_prev1, best_prev2, best_err)
}

impl AltCodec {
    pub fn new() -> AltCodec {
        Default::default()
    }
}

impl BrrCodec for AltCodec {
    fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "loop" => match value.parse::<i64>() {
                Ok(start) if start >= 0 => self.loop_point = Some(start as usize),
                Ok(_) => self.loop_point = None,
                Err(_) => return invalid_value_error("loop", value),
            },
            _ => return unknown_option_error(name),
        }
        Ok(())
    }

    fn encode(&mut self, pcm: &[i16]) -> Vec<u8> {
        self.stats = Default::default();

        let mut pcm = pcm.to_vec();
        let loop_point = match self.loop_point.filter(|&start| start < pcm.len()) {
            Some(mut start) => {
                // Repeat samples from the loop point until the loop start is block aligned,
                // then unroll whole copies of the loop until the end is block aligned too.
                while start & 15 != 0 {
                    let s = pcm[start];
                    pcm.push(s);
                    start += 1;
                }

                let region = pcm[start..].to_vec();
                while pcm.len() & 15 != 0 {
                    pcm.extend_from_slice(&region);
                }

                debug!("alt: loop start aligned to sample {}", start);
                Some(start)
            }
            None => {
                while pcm.len() & 15 != 0 {
                    pcm.push(0);
                }
                None
            }
        };

        let mut output = Vec::with_capacity((pcm.len() / SAMPLES_PER_BLOCK) * BLOCK_LEN);
        let mut prev1 = 0;
        let mut prev2 = 0;

        for (bi, block) in pcm.chunks_exact(SAMPLES_PER_BLOCK).enumerate() {
            let read_pos = bi * SAMPLES_PER_BLOCK;

            // Filters predict from samples the decoder has not necessarily produced yet at the
            // stream start and at the loop entry, so those blocks are held to filter 0.
            let no_filter = read_pos == 0 || Some(read_pos) == loop_point;
            let filter_max = if no_filter { 0 } else { 3 };

            let (coded, p1, p2, err) = encode_block(block, prev1, prev2, filter_max);
            prev1 = p1;
            prev2 = p2;

            self.stats.total_error += f64::from(err);
            self.stats.avg_error += f64::from(err / 16);

            output.extend_from_slice(&coded);
        }

        if output.is_empty() {
            output.extend_from_slice(&[0; BLOCK_LEN]);
        }

        let last = output.len() - BLOCK_LEN;
        output[last] |= HeaderFlags::END.bits();
        if loop_point.is_some() {
            output[last] |= HeaderFlags::LOOP.bits();
        }

        output
    }

    fn decode(&mut self, brr: &[u8]) -> (Vec<i16>, u32) {
        if brr.is_empty() {
            return (Vec::new(), 32000);
        }

        let mut brr = brr.to_vec();
        if brr.len() % BLOCK_LEN != 0 {
            warn!("alt: stream length {} is not a multiple of {}, padding", brr.len(), BLOCK_LEN);
            brr.resize(brr.len().div_ceil(BLOCK_LEN) * BLOCK_LEN, 0);
        }

        // Decoding stops at the END flag; force it on the last block so a stream missing it
        // still terminates.
        let last = brr.len() - BLOCK_LEN;
        brr[last] |= HeaderFlags::END.bits();

        let mut pcm = Vec::with_capacity((brr.len() / BLOCK_LEN) * SAMPLES_PER_BLOCK);
        let mut prev1 = 0;
        let mut prev2 = 0;

        for block in brr.chunks_exact(BLOCK_LEN) {
            let header = BlockHeader::parse(block[0]);

            for n in 0..SAMPLES_PER_BLOCK {
                let byte = block[1 + (n >> 1)];
                let nibble = if n & 1 == 0 { Nibble::Upper } else { Nibble::Lower };
                let residue = i32::from(sign_extend_leq8_to_i8(nibble.get(byte), 4));

                let unpacked = (residue << header.range) >> 1;
                let sample = filter_base(prev1, prev2, header.filter) + unpacked;

                pcm.push(clamp_i16(sample << 1));

                prev2 = prev1;
                prev1 = sample;
            }

            if header.flags.contains(HeaderFlags::END) {
                break;
            }
        }

        (pcm, 32000)
    }

    fn encode_stats(&self) -> EncodeStats {
        self.stats
    }
}

impl RegisterableBrrCodec for AltCodec {
    fn registry_new() -> Box<dyn BrrCodec> {
        Box::new(AltCodec::new())
    }

    fn supported_kernels() -> &'static [SupportedKernel] {
        &[support_kernel!("alt", "BRR (published S-DSP formulas)")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::errors::Error;

    #[test]
    fn verify_flat_block() {
        let mut codec = AltCodec::new();
        let brr = codec.encode(&[16; 16]);

        // Shift 3 is the largest shift reproducing the block exactly, and the range field
        // stores shift + 1.
        assert_eq!(brr, [0x41, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11]);
        assert_eq!(codec.encode_stats().total_error, 0.0);

        let (pcm, rate) = codec.decode(&brr);
        assert_eq!(pcm, [16; 16]);
        assert_eq!(rate, 32000);
    }

    #[test]
    fn verify_zero_block() {
        let mut codec = AltCodec::new();
        let brr = codec.encode(&[0; 16]);

        // All shifts code a zero block exactly; the descending sweep keeps the largest.
        assert_eq!(brr, [0xC1, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn verify_empty_input() {
        let mut codec = AltCodec::new();
        let brr = codec.encode(&[]);
        assert_eq!(brr, [0x01, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn verify_decode_known_block() {
        let mut codec = AltCodec::new();
        let (pcm, rate) =
            codec.decode(&[0x21, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11]);

        // Shift 2, filter 0, every residue 1: each sample is (1 << 2) >> 1, doubled on output.
        assert_eq!(pcm, [4; 16]);
        assert_eq!(rate, 32000);
    }

    #[test]
    fn verify_decode_stops_at_end_flag() {
        let mut brr = vec![0x21, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11];
        brr.extend_from_slice(&[0x20, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22]);

        let mut codec = AltCodec::new();
        let (pcm, _) = codec.decode(&brr);
        assert_eq!(pcm.len(), 16);
    }

    #[test]
    fn verify_loop_alignment() {
        let mut codec = AltCodec::new();
        codec.set_option("loop", "40").unwrap();

        let pcm: Vec<i16> = (0..100).map(|n| (n * 7) as i16).collect();
        let brr = codec.encode(&pcm);

        // Loop start 40 advances to 48; the 60-sample loop region is unrolled into the tail
        // until the total length reaches 288 samples (18 blocks).
        assert_eq!(brr.len(), 18 * BLOCK_LEN);
        let last = BlockHeader::parse(brr[brr.len() - BLOCK_LEN]);
        assert_eq!(last.flags, HeaderFlags::END | HeaderFlags::LOOP);

        // No block before the last carries flags.
        for block in brr[..brr.len() - BLOCK_LEN].chunks_exact(BLOCK_LEN) {
            assert_eq!(BlockHeader::parse(block[0]).flags, HeaderFlags::empty());
        }
    }

    #[test]
    fn verify_loop_past_end_is_ignored() {
        let mut codec = AltCodec::new();
        codec.set_option("loop", "64").unwrap();

        let brr = codec.encode(&[100; 64]);
        assert_eq!(brr.len(), 4 * BLOCK_LEN);

        let last = BlockHeader::parse(brr[brr.len() - BLOCK_LEN]);
        assert_eq!(last.flags, HeaderFlags::END);
    }

    #[test]
    fn verify_options() {
        let mut codec = AltCodec::new();

        codec.set_option("loop", "-1").unwrap();
        assert!(codec.loop_point.is_none());

        assert!(matches!(
            codec.set_option("loop", "x").unwrap_err(),
            Error::InvalidOptionValue { name: "loop", .. }
        ));
        assert!(matches!(
            codec.set_option("gauss", "1").unwrap_err(),
            Error::UnknownOption(_)
        ));
    }
}
