//! Node state: the `opmode` flag set and the single process-wide node
//! record.

use core::fmt;

use bitflags::bitflags;

use crate::frame::{Beacon, Data};

bitflags! {
    /// Independent capability/activity flags. Multiple may be set at once
    /// (e.g. `READY | TRACK | RXBCN`); this is modelled as a flag set
    /// rather than an exclusive enum precisely because the original
    /// firmware's `opmode` legitimately carries several bits at a time.
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct OpMode: u16 {
        const READY  = 0x0001;
        const SCAN   = 0x0002;
        const TRACK  = 0x0004;
        const TXBCN  = 0x0008;
        const TXDATA = 0x0010;
        const RXBCN  = 0x0020;
        const RXDATA = 0x0040;
        const ROOT   = 0x0080;
        const NODE   = 0x0100;
    }
}

impl fmt::Display for OpMode {
    /// Letter-coded rendering matching the original firmware's
    /// `debug_opmode` (`r`/`s`/`t`/`B`/`D`/`b`/`d`/`0`/`n`, `.` for unset).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const FLAGS: [(OpMode, char); 9] = [
            (OpMode::READY, 'r'),
            (OpMode::SCAN, 's'),
            (OpMode::TRACK, 't'),
            (OpMode::TXBCN, 'B'),
            (OpMode::TXDATA, 'D'),
            (OpMode::RXBCN, 'b'),
            (OpMode::RXDATA, 'd'),
            (OpMode::ROOT, '0'),
            (OpMode::NODE, 'n'),
        ];
        write!(f, "[")?;
        for (flag, ch) in FLAGS.iter() {
            write!(f, "{}", if self.contains(*flag) { *ch } else { '.' })?;
        }
        write!(f, "]")
    }
}

/// Hop value meaning "no estimate yet".
pub const HOP_UNSYNCED: u8 = 0xff;

/// The transmit/receive buffers a node holds at any one time.
///
/// One slot per direction, overwritten without queueing. `own_tx` and
/// `forward_tx` are kept separate: application-originated traffic and
/// relayed traffic no longer share a buffer, so a forwarded frame can no
/// longer silently clobber a pending local payload, and `TXCOMPLETE` is
/// only ever reported for `own_tx`. Each `Option` doubles as its own
/// pending bit — `is_some()` means "pending", made structural instead of
/// tracked by a side flag.
#[derive(Debug, Clone, Default)]
pub struct Buffers {
    pub beacon_tx: Option<Beacon>,
    pub own_tx: Option<Data>,
    pub forward_tx: Option<Data>,
    pub data_rx: Option<Data>,
}

/// The single, process-wide node record (`BLINK` in the original firmware).
#[derive(Debug, Clone)]
pub struct NodeState {
    pub nodeid: u8,
    pub opmode: OpMode,
    pub slot: u8,
    pub hop: u8,
    /// Cleared at each epoch start; set on the first beacon accepted in
    /// that epoch.
    pub hop_updated: bool,
    pub missed_beacons: u8,
    /// Reset to `Config::cad_checks` whenever a fresh CAD-gated wait begins.
    pub cad_retries_remaining: u8,
    pub buffers: Buffers,
}

impl NodeState {
    /// `blink_init` — zero all internal state and buffers.
    pub fn new(nodeid: u8) -> NodeState {
        NodeState {
            nodeid,
            opmode: OpMode::empty(),
            slot: 0,
            hop: HOP_UNSYNCED,
            hop_updated: false,
            missed_beacons: 0,
            cad_retries_remaining: 0,
            buffers: Buffers::default(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.opmode.contains(OpMode::ROOT)
    }

    pub fn is_synced(&self) -> bool {
        self.opmode.contains(OpMode::TRACK)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_renders_letter_codes() {
        let m = OpMode::READY | OpMode::TRACK | OpMode::RXBCN;
        assert_eq!(format!("{}", m), "[r.t..b..]");
    }

    #[test]
    fn fresh_node_is_unsynced() {
        let n = NodeState::new(7);
        assert_eq!(n.hop, HOP_UNSYNCED);
        assert!(!n.is_synced());
        assert!(n.buffers.own_tx.is_none());
    }
}
