//! Landmark hashing: anchor/target peak pairs packed into 32-bit addresses.
//!
//! Addresses are lookup keys, not unique identifiers; collisions are expected
//! and absorbed by the matcher's histogram scoring.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::spectral::Peak;

/// How many peaks after an anchor are paired with it.
pub const TARGET_ZONE_SIZE: usize = 5;

const FREQ_BITS: u32 = 9;
const DELTA_BITS: u32 = 14;

/// The value stored alongside an address: where the anchor sits in the song's
/// timeline, and which song owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Couple {
    pub anchor_time_ms: u32,
    pub song_id: u32,
}

/// Pair each peak with the next [`TARGET_ZONE_SIZE`] peaks and hash every
/// pair into an address.
///
/// Within one call, a later pair overwrites an earlier pair that hashed to
/// the same address; the store accumulates across calls, so the occasional
/// lost couple does not hurt matching.
pub fn fingerprint(peaks: &[Peak], song_id: u32) -> HashMap<u32, Couple> {
    let mut fingerprints = HashMap::new();

    for (i, anchor) in peaks.iter().enumerate() {
        let zone_end = (i + TARGET_ZONE_SIZE).min(peaks.len().saturating_sub(1));
        for target in &peaks[(i + 1).min(peaks.len())..=zone_end] {
            let address = pack_address(anchor, target);
            let anchor_time_ms = (anchor.time_sec * 1000.0) as u32;

            fingerprints.insert(
                address,
                Couple {
                    anchor_time_ms,
                    song_id,
                },
            );
        }
    }

    fingerprints
}

/// Pack an anchor/target pair into a 32-bit address:
/// bits 31..23 anchor frequency bucket, 22..14 target frequency bucket,
/// 13..0 target-anchor delta in milliseconds. Fields are masked to width,
/// never validated.
///
/// The delta is taken between the floored millisecond timestamps, matching
/// the resolution the anchor time is stored at.
fn pack_address(anchor: &Peak, target: &Peak) -> u32 {
    let anchor_bin = (anchor.freq_hz / 10.0) as u32 & ((1 << FREQ_BITS) - 1);
    let target_bin = (target.freq_hz / 10.0) as u32 & ((1 << FREQ_BITS) - 1);

    let anchor_ms = (anchor.time_sec * 1000.0) as u32;
    let target_ms = (target.time_sec * 1000.0) as u32;
    let delta_ms = target_ms.saturating_sub(anchor_ms) & ((1 << DELTA_BITS) - 1);

    (anchor_bin << 23) | (target_bin << 14) | delta_ms
}
