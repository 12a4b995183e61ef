// weave-core/src/retarget.rs

use crate::{block::Block, types::*};

/// Whether a block at `height` is a retarget block
pub fn is_retarget_height(height: Height) -> bool {
    height > 0 && height % RETARGET_BLOCKS == 0
}

/// The difficulty and last-retarget values for a block at `height` mined at
/// `timestamp` on top of a block carrying (`prev_diff`, `prev_last_retarget`)
pub fn maybe_retarget(
    height: Height,
    timestamp: Timestamp,
    prev_diff: Difficulty,
    prev_last_retarget: Timestamp,
) -> (Difficulty, Timestamp) {
    if is_retarget_height(height) {
        (
            new_diff(prev_diff, timestamp, prev_last_retarget),
            timestamp,
        )
    } else {
        (prev_diff, prev_last_retarget)
    }
}

/// The retarget rule
///
/// Difficulty is a leading-zero-bit count, so a one-bit step is a 2x work
/// change; a single retarget can never move difficulty by more than that.
pub fn new_diff(
    prev_diff: Difficulty,
    timestamp: Timestamp,
    last_retarget: Timestamp,
) -> Difficulty {
    let target = RETARGET_BLOCKS * TARGET_TIME;
    let actual = timestamp.saturating_sub(last_retarget);
    let error = actual.abs_diff(target);

    let diff = if (error as f64) < target as f64 * RETARGET_TOLERANCE {
        prev_diff
    } else if actual < target {
        prev_diff + 1
    } else {
        prev_diff.saturating_sub(1)
    };
    diff.clamp(MIN_DIFF, MAX_DIFF)
}

/// Whether `block` carries the correct difficulty relative to `prev`
///
/// Retarget blocks must carry the deterministic retarget of the previous
/// difficulty and stamp `last_retarget` with their own timestamp; all other
/// blocks carry both fields verbatim.
pub fn retarget_ok(block: &Block, prev: &Block) -> bool {
    if is_retarget_height(block.height) {
        block.diff == new_diff(prev.diff, block.timestamp, prev.last_retarget)
            && block.last_retarget == block.timestamp
    } else {
        block.diff == prev.diff && block.last_retarget == prev.last_retarget
    }
}
