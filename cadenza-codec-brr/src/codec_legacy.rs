// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use cadenza_core::block::{BlockHeader, HeaderFlags, Nibble, BLOCK_LEN, SAMPLES_PER_BLOCK};
use cadenza_core::codec::{BrrCodec, EncodeStats, RegisterableBrrCodec, SupportedKernel};
use cadenza_core::dsp::gauss::{probe_overflow, GAUSS_TABLE};
use cadenza_core::errors::{invalid_value_error, unknown_option_error, Result};
use cadenza_core::support_kernel;
use cadenza_core::util::bits::{sign_extend_leq8_to_i8, wrap_i15};
use cadenza_core::util::clamp::{clamp_i15, clamp_i16, clamp_i4};

use log::{debug, warn};

use crate::common::{filter_base, pack_nibbles};

/// The attenuation rate applied when a freshly coded block fails the interpolation overflow
/// probe. The rate compounds by 1.1 on every retry of the same block and resets on success, so a
/// pathological block is eventually silenced to zero.
const BASE_ADJUST_RATE: f64 = 0.0004;

/// The pitch counter step producing one output sample per coded sample.
const UNITY_PITCH: i32 = 0x1000;

/// BRR codec kernel modelling the S-DSP's exact integer pipeline.
///
/// The encoder jointly searches filters and ranges per block over both possible pre-wrap 16-bit
/// interpretations of each sample, and re-codes blocks whose output could overflow the gaussian
/// interpolation accumulator. The decoder reproduces the hardware's sample timing with a 12-bit
/// pitch counter, and optionally applies 4-tap gaussian interpolation. Registered under the name
/// `legacy`.
#[derive(Default)]
pub struct LegacyCodec {
    loop_point: Option<usize>,
    /// Pitch counter step for decoding. Zero selects the unity step.
    pitch: u16,
    gauss: bool,
    compat: bool,
    stats: EncodeStats,
}

fn parse_pitch(value: &str) -> Option<u16> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => value.parse::<u32>().ok()?,
    };

    if parsed < 0x0001 || parsed > 0x3FFF {
        return None;
    }
    Some(parsed as u16)
}

fn parse_switch(value: &str) -> Option<bool> {
    match value {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

impl LegacyCodec {
    pub fn new() -> LegacyCodec {
        Default::default()
    }
}

/// Search one block over filter 0..=`filter_max` and range 12..=1 for the coding with the least
/// total squared error, simulating the decoder's saturate-and-wrap pipeline exactly.
///
/// `samp` enters holding the two reconstructed samples carried over from the previous block and
/// leaves holding the block's 16 reconstructed samples behind them. Returns the coded block and
/// its error.
fn best_block_coding(pcm: &[i16], samp: &mut [i16; 18], filter_max: u8) -> ([u8; BLOCK_LEN], f64) {
    let mut best_err = f64::MAX;
    let mut best_data = [0u8; BLOCK_LEN];
    let mut blk_samp = [0i16; 18];

    blk_samp[0] = samp[0];
    blk_samp[1] = samp[1];

    for filter in 0..=filter_max {
        // Ranges 0 and 13..=15 are never used for encoding: every value they can produce is
        // covered by the other ranges, so nothing is lost.
        for range in (1..=12i32).rev() {
            let rhalf = (1i32 << range) >> 1;
            let mut blk_err = 0.0;
            let mut blk_data = [0u8; SAMPLES_PER_BLOCK];

            for n in 0..SAMPLES_PER_BLOCK {
                let base = filter_base(i32::from(blk_samp[n + 1]), i32::from(blk_samp[n]), filter);

                // Undo the 15 -> 16 bit conversion.
                let xs = i32::from(pcm[n]) >> 1;

                // Undo the 16 -> 15 bit wrap; both possible 16-bit values are candidates.
                let mut s1 = i32::from((xs & 0x7FFF) as i16);
                let mut s2 = i32::from((xs | 0x8000) as i16);

                // Undo the filtering and restore the low bit lost during range decoding.
                s1 = (s1 - base) << 1;
                s2 = (s2 - base) << 1;

                // Reduce to the 4-bit residue range with round-to-nearest.
                s1 = clamp_i4((s1 + rhalf) >> range);
                s2 = clamp_i4((s2 + rhalf) >> range);

                let r1 = (s1 & 0x0F) as u8;
                let r2 = (s2 & 0x0F) as u8;

                // -16384 to 16383
                s1 = (s1 << range) >> 1;
                s2 = (s2 << range) >> 1;

                // The accumulator widens to 17 bits, saturates to 16 bits, and wraps to 15 bits.
                if filter >= 2 {
                    s1 = i32::from(clamp_i16(s1 + base));
                    s2 = i32::from(clamp_i16(s2 + base));
                }
                else {
                    // No clamp: the result cannot overflow 16 bits.
                    s1 += base;
                    s2 += base;
                }

                s1 = wrap_i15(s1);
                s2 = wrap_i15(s2);

                let d1 = f64::from(xs - s1);
                let d2 = f64::from(xs - s2);
                let (d1, d2) = (d1 * d1, d2 * d2);

                // On an exact tie, prefer the s2 candidate.
                if d1 < d2 {
                    blk_err += d1;
                    blk_samp[n + 2] = s1 as i16;
                    blk_data[n] = r1;
                }
                else {
                    blk_err += d2;
                    blk_samp[n + 2] = s2 as i16;
                    blk_data[n] = r2;
                }
            }

            // Strict comparison: later candidates must improve to win, so equal error rates
            // resolve to the simpler filter and the higher range. This measurably lowers the
            // average error.
            if blk_err < best_err {
                best_err = blk_err;
                samp[2..].copy_from_slice(&blk_samp[2..]);

                let header =
                    BlockHeader { range: range as u8, filter, flags: HeaderFlags::empty() };
                best_data[0] = header.pack();
                pack_nibbles(&blk_data, &mut best_data[1..]);
            }
        }
    }

    (best_data, best_err)
}

/// Build the per-sample attenuation factors for a block that failed the overflow probe.
///
/// Every flagged position spreads a correction over the whole block, strongest at the position
/// itself and decaying by a factor of ten per sample outward.
fn attenuation_factors(mut overflow: u16, adjust_rate: f64) -> [f64; SAMPLES_PER_BLOCK] {
    let mut f = [adjust_rate; SAMPLES_PER_BLOCK];

    for n in 0..SAMPLES_PER_BLOCK {
        if overflow & 0x8000 != 0 {
            let mut t = 0.05;
            for i in (0..=n).rev() {
                f[i] *= 1.0 + t;
                t *= 0.1;
            }

            let mut t = 0.05 * 0.1;
            for i in n + 1..SAMPLES_PER_BLOCK {
                f[i] *= 1.0 + t;
                t *= 0.1;
            }
        }
        overflow <<= 1;
    }

    f
}

impl BrrCodec for LegacyCodec {
    fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "loop" => match value.parse::<i64>() {
                Ok(start) if start >= 0 => self.loop_point = Some(start as usize),
                Ok(_) => self.loop_point = None,
                Err(_) => return invalid_value_error("loop", value),
            },
            "gauss" => match parse_switch(value) {
                Some(gauss) => self.gauss = gauss,
                None => return invalid_value_error("gauss", value),
            },
            "pitch" => match parse_pitch(value) {
                Some(pitch) => self.pitch = pitch,
                None => return invalid_value_error("pitch", value),
            },
            "compat" => match parse_switch(value) {
                Some(compat) => self.compat = compat,
                None => return invalid_value_error("compat", value),
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
                let start_align = (16 - (start & 15)) & 15;
                let loop_size = pcm.len() - start;

                // Double the loop length until it is block aligned, then grow the alignment tail
                // to also cover the loop start alignment.
                let mut end_align = loop_size;
                while end_align & 15 != 0 {
                    end_align <<= 1;
                }
                end_align = end_align - loop_size + start_align;

                if end_align != 0 {
                    let mut src = start;
                    for _ in 0..end_align {
                        let s = pcm[src];
                        pcm.push(s);
                        src += 1;
                    }

                    start += start_align;
                    debug!("legacy: loop start aligned to sample {}", start);
                }

                Some(start)
            }
            None => {
                while pcm.len() & 15 != 0 {
                    pcm.push(0);
                }
                None
            }
        };

        let loop_block = loop_point.map(|start| start / SAMPLES_PER_BLOCK);
        let block_count = pcm.len() / SAMPLES_PER_BLOCK;

        let mut output = Vec::with_capacity(block_count * BLOCK_LEN);
        let mut samp = [0i16; 18];
        let mut adjust_rate = BASE_ADJUST_RATE;

        let mut total_error = 0.0;
        let mut min_error = f64::MAX;
        let mut max_error = 0.0f64;

        let mut wi = 0;
        while wi != block_count {
            let block = &mut pcm[wi * SAMPLES_PER_BLOCK..(wi + 1) * SAMPLES_PER_BLOCK];

            let no_filter = wi == 0 || Some(wi) == loop_block;
            let filter_max = if no_filter { 0 } else { 3 };

            let (best_data, best_err) = best_block_coding(block, &mut samp, filter_max);

            // Slide the probe across the block's reconstruction, including the two samples
            // carried in from the previous block, and collect a flag per position.
            let mut overflow = 0u16;
            for n in 0..SAMPLES_PER_BLOCK {
                overflow = (overflow << 1) | u16::from(probe_overflow(&samp[n..n + 3]));
            }

            if overflow != 0 {
                // Scale the inputs down around the flagged positions and code the same block
                // again. The rate compounds while the block keeps failing.
                debug!(
                    "legacy: block {} can overflow interpolation (mask {:#06x}), attenuating",
                    wi, overflow
                );

                let f = attenuation_factors(overflow, adjust_rate);
                for (x, f) in block.iter_mut().zip(&f) {
                    *x = (f64::from(*x) * (1.0 - f)) as i16;
                }

                adjust_rate *= 1.1;
            }
            else {
                adjust_rate = BASE_ADJUST_RATE;
                samp[0] = samp[16];
                samp[1] = samp[17];

                total_error += best_err;
                min_error = min_error.min(best_err);
                max_error = max_error.max(best_err);

                output.extend_from_slice(&best_data);
                wi += 1;
            }
        }

        self.stats = if block_count == 0 {
            Default::default()
        }
        else {
            EncodeStats {
                total_error,
                avg_error: total_error / block_count as f64,
                min_error,
                max_error,
            }
        };

        // The reference encoder emits one extra silent block when looping is disabled.
        if output.is_empty() || (self.compat && loop_point.is_none()) {
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
        let pitch_step = if self.pitch == 0 { UNITY_PITCH } else { i32::from(self.pitch) };

        // 7.8125 = 32000 / 0x1000
        let rate = if self.gauss { (f64::from(pitch_step) * 7.8125 + 0.5) as u32 } else { 32000 };

        if brr.is_empty() {
            return (Vec::new(), rate);
        }

        let mut brr = brr.to_vec();
        if brr.len() % BLOCK_LEN != 0 {
            warn!(
                "legacy: stream length {} is not a multiple of {}, padding",
                brr.len(),
                BLOCK_LEN
            );
            brr.resize(brr.len().div_ceil(BLOCK_LEN) * BLOCK_LEN, 0);
        }

        // Decoding stops at the END flag; force it on the last block so a stream missing it
        // still terminates.
        let last = brr.len() - BLOCK_LEN;
        brr[last] |= HeaderFlags::END.bits();

        let mut pcm = Vec::with_capacity((brr.len() / BLOCK_LEN) * SAMPLES_PER_BLOCK);

        // The last four reconstructed samples, stored twice so any four-sample window can be
        // sliced without wrapping.
        let mut ring = [0i16; 8];
        let mut ring_i = 0usize;

        let mut last_sample = [0i16; 2];
        let mut header = BlockHeader::parse(0);
        let mut data = 0usize;

        // The counter strikes zero immediately to fetch the first header. An initial pitch
        // phase of 0x3000 decodes four samples ahead of the first output, as the hardware's
        // interpolation window requires; the plain path skips the warm-up.
        let mut brr_counter = 1;
        let mut pitch = if self.compat || self.gauss { 0x3000 } else { 0 };

        loop {
            while pitch >= 0 {
                pitch -= UNITY_PITCH;

                brr_counter -= 1;
                if brr_counter == 0 {
                    if header.flags.contains(HeaderFlags::END) {
                        return (pcm, rate);
                    }

                    header = BlockHeader::parse(brr[data]);
                    data += 1;
                    brr_counter = 16;

                    // The reference decoder returns as soon as it fetches a header with END set
                    // and LOOP clear, dropping that block's data.
                    if self.compat && header.flags == HeaderFlags::END {
                        return (pcm, rate);
                    }
                }

                let byte = brr[data];
                let nibble = if brr_counter & 1 == 1 {
                    data += 1;
                    Nibble::Lower
                }
                else {
                    Nibble::Upper
                };

                let mut s = i32::from(sign_extend_leq8_to_i8(nibble.get(byte), 4));

                if header.range > 12 {
                    s &= !0x07FF; // collapses to -2048 or 0
                }
                else {
                    s = (s << header.range) >> 1; // -16384 to 16383
                }

                // The accumulator widens to 17 bits, saturates to 16 bits, and wraps to 15 bits.
                s += filter_base(i32::from(last_sample[1]), i32::from(last_sample[0]), header.filter);
                if header.filter >= 2 {
                    s = i32::from(clamp_i16(s));
                }
                s = wrap_i15(s);

                last_sample[0] = last_sample[1];
                last_sample[1] = s as i16;

                // Step the ring before storing.
                ring_i = ring_i.wrapping_sub(1) & 3;
                ring[ring_i] = s as i16;
                ring[ring_i + 4] = s as i16;
            }

            let samp = &ring[ring_i..ring_i + 4];
            let mut s;

            if self.gauss {
                let p = pitch >> 4;

                // p is always in [-256, -1]. The first three taps accumulate with 15-bit wrap;
                // the fourth accumulates to 16 bits and saturates to 15.
                let g4 = i32::from(GAUSS_TABLE[(-1 - p) as usize]);
                let g3 = i32::from(GAUSS_TABLE[(255 - p) as usize]);
                let g2 = i32::from(GAUSS_TABLE[(512 + p) as usize]);
                let g1 = i32::from(GAUSS_TABLE[(256 + p) as usize]);

                s = (g4 * i32::from(samp[3])) >> 11;
                s += (g3 * i32::from(samp[2])) >> 11;
                s += (g2 * i32::from(samp[1])) >> 11;
                s = wrap_i15(s);
                s += (g1 * i32::from(samp[0])) >> 11;
                s = clamp_i15(s);

                s = (s * 0x07FF) >> 11; // envelope, full scale
                s = (s * 0x7F) >> 7; // volume, full scale

                pitch += pitch_step;
            }
            else {
                s = i32::from(samp[3]);
                pitch += UNITY_PITCH;
            }

            pcm.push((s << 1) as i16);
        }
    }

    fn encode_stats(&self) -> EncodeStats {
        self.stats
    }
}

impl RegisterableBrrCodec for LegacyCodec {
    fn registry_new() -> Box<dyn BrrCodec> {
        Box::new(LegacyCodec::new())
    }

    fn supported_kernels() -> &'static [SupportedKernel] {
        &[support_kernel!("legacy", "BRR (S-DSP hardware model)")]
    }
}
