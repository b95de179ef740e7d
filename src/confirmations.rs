//! Confirmation depth.

/// Blocks from `tx_height` up to and including `tip_height`.
///
/// The tip block itself counts as one confirmation. A transaction claimed
/// above the tip has none. Always derive this from the current tip instead
/// of storing it: it changes with every new block.
pub fn confirmations(tx_height: u32, tip_height: u32) -> u32 {
    if tip_height < tx_height {
        0
    } else {
        (tip_height - tx_height).saturating_add(1)
    }
}
