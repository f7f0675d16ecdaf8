// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use cadenza_codec_brr::{AltCodec, LegacyCodec};
use cadenza_core::block::{BlockHeader, HeaderFlags, BLOCK_LEN, SAMPLES_PER_BLOCK};
use cadenza_core::codec::BrrCodec;
use cadenza_core::dsp::gauss::probe_overflow;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn predict(prev1: i32, prev2: i32, filter: u8) -> i32 {
    match filter {
        1 => prev1 + ((-prev1) >> 4),
        2 => (prev1 * 2) + ((-prev1 * 3) >> 5) - prev2 + (prev2 >> 4),
        3 => (prev1 * 2) + ((-prev1 * 13) >> 6) - prev2 + ((prev2 * 3) >> 4),
        _ => 0,
    }
}

/// Construct PCM that codes to BRR with zero error: pick a filter, a shift, and random residues
/// per block, run them forward through the predictor, and reject any block whose reconstruction
/// leaves the safe sample window.
fn lossless_pcm(rng: &mut SmallRng, blocks: usize) -> Vec<i16> {
    let mut output = Vec::with_capacity(blocks * SAMPLES_PER_BLOCK);
    let mut prev1 = 0i32;
    let mut prev2 = 0i32;

    for b in 0..blocks {
        let mut filter = if b == 0 { 0u8 } else { rng.random_range(0..4u8) };
        let shift = rng.random_range(0..11i32);

        'retry: loop {
            let mut chunk = Vec::with_capacity(SAMPLES_PER_BLOCK);

            for _ in 0..SAMPLES_PER_BLOCK {
                let residue = rng.random_range(-8..8i32);
                let sample = (residue << shift) + predict(prev1, prev2, filter);

                // Filter 0 is insensitive to history, so a retry always lands in the window.
                if sample < -0x3FF0 || sample >= 0x3FF0 {
                    filter = 0;
                    continue 'retry;
                }

                prev2 = prev1;
                prev1 = sample;
                chunk.push((sample << 1) as i16);
            }

            output.extend_from_slice(&chunk);
            break;
        }
    }

    output
}

#[test]
fn alt_round_trip_is_lossless() {
    let mut rng = SmallRng::seed_from_u64(0xCADE);

    for _ in 0..8 {
        let pcm = lossless_pcm(&mut rng, 50);

        let mut codec = AltCodec::new();
        let brr = codec.encode(&pcm);
        assert_eq!(codec.encode_stats().total_error, 0.0);

        let (decoded, rate) = codec.decode(&brr);
        assert_eq!(rate, 32000);
        assert_eq!(decoded, pcm);
    }
}

#[test]
fn legacy_reconstruction_is_lossless() {
    let mut rng = SmallRng::seed_from_u64(0xCADE);

    for _ in 0..8 {
        let pcm = lossless_pcm(&mut rng, 50);

        let mut codec = LegacyCodec::new();
        let brr = codec.encode(&pcm);
        assert_eq!(codec.encode_stats().total_error, 0.0);

        // The legacy decoder emits through a four-deep interpolation ring, so its output trails
        // the coded samples by three positions.
        let (decoded, rate) = codec.decode(&brr);
        assert_eq!(rate, 32000);
        assert_eq!(decoded.len(), pcm.len());
        assert_eq!(&decoded[..3], &[0, 0, 0][..]);
        assert_eq!(&decoded[3..], &pcm[..pcm.len() - 3]);
    }
}

#[test]
fn kernels_agree_on_flat_input() {
    let pcm = [16i16; 16];

    let mut alt = AltCodec::new();
    let mut legacy = LegacyCodec::new();

    let brr = alt.encode(&pcm);
    assert_eq!(brr, legacy.encode(&pcm));
    assert_eq!(brr, [0x41, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11]);
}

#[test]
fn stream_shape_properties() {
    let mut rng = SmallRng::seed_from_u64(1234);

    for len in [0usize, 1, 15, 16, 17, 64, 100, 999] {
        let pcm: Vec<i16> = (0..len).map(|_| rng.random()).collect();

        let mut kernels: [Box<dyn BrrCodec>; 2] =
            [Box::new(AltCodec::new()), Box::new(LegacyCodec::new())];

        for codec in kernels.iter_mut() {
            let brr = codec.encode(&pcm);

            assert!(brr.len() >= BLOCK_LEN);
            assert_eq!(brr.len() % BLOCK_LEN, 0);

            let blocks = brr.len() / BLOCK_LEN;
            for (i, block) in brr.chunks_exact(BLOCK_LEN).enumerate() {
                let flags = BlockHeader::parse(block[0]).flags;
                if i == blocks - 1 {
                    assert_eq!(flags, HeaderFlags::END);
                }
                else {
                    assert_eq!(flags, HeaderFlags::empty());
                }
            }
        }
    }
}

#[test]
fn four_block_stream_lengths() {
    let pcm: Vec<i16> = (0..64).map(|n| (n * 50 - 1600) as i16).collect();

    let mut alt = AltCodec::new();
    let brr = alt.encode(&pcm);
    assert_eq!(brr.len(), 36);
    assert_eq!(alt.decode(&brr).0.len(), 64);

    let mut legacy = LegacyCodec::new();
    let brr = legacy.encode(&pcm);
    assert_eq!(brr.len(), 36);
    assert_eq!(legacy.decode(&brr).0.len(), 64);

    // The compat trailer block grows the stream by one block, and a plain decode of that stream
    // yields a full five blocks of samples.
    legacy.set_option("compat", "1").unwrap();
    let brr = legacy.encode(&pcm);
    assert_eq!(brr.len(), 45);

    legacy.set_option("compat", "0").unwrap();
    assert_eq!(legacy.decode(&brr).0.len(), 80);
}

#[test]
fn trailing_partial_block_is_padded_away() {
    let mut rng = SmallRng::seed_from_u64(5678);
    let pcm = lossless_pcm(&mut rng, 20);

    let mut kernels: [Box<dyn BrrCodec>; 2] =
        [Box::new(AltCodec::new()), Box::new(LegacyCodec::new())];

    for codec in kernels.iter_mut() {
        let brr = codec.encode(&pcm);
        let base = codec.decode(&brr);

        // Any partial trailing block pads to silence behind the END flag and never decodes.
        for extra in 1..BLOCK_LEN {
            let mut padded = brr.clone();
            padded.resize(brr.len() + extra, 0);
            assert_eq!(codec.decode(&padded), base);
        }
    }
}

#[test]
fn decode_length_is_bounded() {
    let mut rng = SmallRng::seed_from_u64(99);

    for len in [1usize, 8, 9, 10, 45, 449, 450] {
        let brr: Vec<u8> = (0..len).map(|_| rng.random()).collect();
        let bound = len.div_ceil(BLOCK_LEN) * SAMPLES_PER_BLOCK;

        let mut alt = AltCodec::new();
        assert!(alt.decode(&brr).0.len() <= bound);

        let mut legacy = LegacyCodec::new();
        assert!(legacy.decode(&brr).0.len() <= bound);
    }
}

#[test]
fn legacy_output_never_overflows_interpolation() {
    let mut rng = SmallRng::seed_from_u64(7);
    let pcm: Vec<i16> = (0..512).map(|_| rng.random()).collect();

    let mut codec = LegacyCodec::new();
    let brr = codec.encode(&pcm);

    // Replay the stream and probe every window of the 15-bit reconstruction.
    let (decoded, _) = codec.decode(&brr);
    let recon: Vec<i16> = decoded.iter().map(|&s| s >> 1).collect();
    for window in recon.windows(3) {
        assert!(!probe_overflow(window));
    }
}

#[test]
fn gauss_pitch_scales_sample_timing() {
    let brr = [0x41, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11];

    let mut codec = LegacyCodec::new();
    codec.set_option("gauss", "1").unwrap();
    codec.set_option("pitch", "0x2000").unwrap();

    // Doubling the pitch step consumes two coded samples per output: four warm-up nibbles, then
    // two per output, leaves seven outputs from one block.
    let (pcm, rate) = codec.decode(&brr);
    assert_eq!(rate, 64000);
    assert_eq!(pcm.len(), 7);
}
