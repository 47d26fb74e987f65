//! Data forwarder.
//!
//! `Data::hop` carries the remaining hop budget toward the root. Originating
//! a frame sets `hop` to the sender's own distance; each forward decrements
//! it by one, the same way `enzo/blink.c` does it (`data_msg_tx.header.hop--`)
//! — a frame overheard from more than one hop farther out than the receiver
//! still only loses one hop of budget per relay, it doesn't snap to the
//! receiver's own distance. A frame whose `hop` doesn't exceed the
//! receiver's own distance didn't come from farther out in the tree and is
//! dropped — this is the loop-prevention / "closer to root" filter.

use crate::config::{Config, DEST_BROADCAST, ROOT_ID};
use crate::error::BlinkError;
use crate::frame::{Data, Footer};
use crate::state::NodeState;

/// What a node should do with a just-received data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RxOutcome {
    /// Addressed to this node (or a root-bound broadcast this node is the
    /// root for); hand to the application.
    Deliver(Data),
    /// Came from farther out in the tree; stage for onward forwarding with
    /// `hop` and trace updated.
    Forward(Data),
    /// Arrived at or closer to the root than this node already is, or its
    /// hop budget is exhausted — discard silently.
    Drop,
}

/// Stage `payload` addressed to `dest` for transmission as this node's own
/// traffic (`blink_tx`).
///
/// Fails if the node hasn't joined the tree yet (`hop` unset — `NotReady`)
/// or if `payload` doesn't fit in `Config::max_payload_len`
/// (`PayloadTooLong`). Overwrites any previously staged, not-yet-sent
/// `own_tx` frame.
pub fn stage_own_tx<E>(
    state: &mut NodeState,
    config: &Config,
    dest: u8,
    payload: &[u8],
) -> Result<(), BlinkError<E>> {
    if !state.is_synced() && !state.is_root() {
        return Err(BlinkError::NotReady);
    }
    if payload.len() > config.max_payload_len {
        return Err(BlinkError::PayloadTooLong);
    }

    let footer = Footer::default().with_fragment(state.hop, state.nodeid);
    state.buffers.own_tx = Some(Data::new(state.hop, dest, footer, payload));
    Ok(())
}

/// Classify a just-received data frame.
///
/// A frame addressed to this node, or to `DEST_BROADCAST` while this node
/// is the root, is delivered locally. Otherwise it is forwarded, hop budget
/// decremented by one, if it arrived from strictly farther out than this
/// node (`frame.hop > state.hop`); anything else — arriving at or inside
/// this node's own ring, or a depth that would exceed
/// `Config::max_data_hops` — is dropped.
pub fn classify_rx(state: &NodeState, config: &Config, frame: Data) -> RxOutcome {
    let addressed_here =
        frame.dest == state.nodeid || (frame.dest == DEST_BROADCAST && state.is_root());
    if addressed_here {
        return RxOutcome::Deliver(frame);
    }

    if state.is_root() {
        // Nothing is farther from the root than the root; any non-local
        // frame reaching here is a misrouted stray.
        return RxOutcome::Drop;
    }

    if frame.hop <= state.hop || frame.hop > config.max_data_hops {
        return RxOutcome::Drop;
    }

    let forwarded_hop = frame.hop - 1;
    let footer = frame.footer.with_fragment(forwarded_hop, state.nodeid);
    RxOutcome::Forward(Data::new(forwarded_hop, frame.dest, footer, frame.payload()))
}

/// Stage `frame` (already classified as [`RxOutcome::Forward`]) into the
/// relay buffer, kept separate from `own_tx` so a node's own pending uplink
/// is never silently clobbered by transit traffic. Overwrites any
/// previously staged, not-yet-sent relay frame — one in flight per slot is
/// all the schedule allows.
pub fn stage_forward(state: &mut NodeState, frame: Data) {
    state.buffers.forward_tx = Some(frame);
}

#[cfg(test)]
mod test {
    use super::*;

    fn node_at_hop(hop: u8) -> NodeState {
        let mut s = NodeState::new(5);
        s.hop = hop;
        s.opmode = crate::state::OpMode::TRACK | crate::state::OpMode::NODE;
        s
    }

    #[test]
    fn stage_own_tx_rejects_before_sync() {
        let mut s = NodeState::new(5);
        let c = Config::default();
        let err: Result<(), BlinkError<()>> = stage_own_tx(&mut s, &c, ROOT_ID, &[1, 2]);
        assert_eq!(err, Err(BlinkError::NotReady));
    }

    #[test]
    fn stage_own_tx_rejects_oversized_payload() {
        let mut s = node_at_hop(2);
        let c = Config::default();
        let payload = [0u8; 64];
        let err: Result<(), BlinkError<()>> = stage_own_tx(&mut s, &c, ROOT_ID, &payload);
        assert_eq!(err, Err(BlinkError::PayloadTooLong));
    }

    #[test]
    fn stage_own_tx_sets_hop_to_own_distance() {
        let mut s = node_at_hop(3);
        let c = Config::default();
        let ok: Result<(), BlinkError<()>> = stage_own_tx(&mut s, &c, ROOT_ID, &[9]);
        assert!(ok.is_ok());
        let staged = s.buffers.own_tx.as_ref().unwrap();
        assert_eq!(staged.hop, 3);
        assert_eq!(staged.footer.fragment_at(3), Some(5 & 0b111));
    }

    #[test]
    fn adjacent_node_frame_is_forwarded_with_hop_decremented() {
        let s = node_at_hop(2);
        let c = Config::default();
        let incoming = Data::new(3, ROOT_ID, Footer::default(), &[1, 2]);

        match classify_rx(&s, &c, incoming) {
            RxOutcome::Forward(d) => {
                assert_eq!(d.hop, 2);
                assert_eq!(d.footer.fragment_at(2), Some(5 & 0b111));
            }
            other => panic!("expected Forward, got {:?}", other),
        }
    }

    #[test]
    fn overheard_frame_from_farther_than_one_hop_away_only_loses_one_hop() {
        let s = node_at_hop(2);
        let c = Config::default();
        // overheard from a node 3 hops farther out than this one, not the
        // immediate sender this node would normally relay for
        let incoming = Data::new(5, ROOT_ID, Footer::default(), &[1, 2]);

        match classify_rx(&s, &c, incoming) {
            RxOutcome::Forward(d) => {
                assert_eq!(d.hop, 4);
                assert_eq!(d.footer.fragment_at(4), Some(5 & 0b111));
            }
            other => panic!("expected Forward, got {:?}", other),
        }
    }

    #[test]
    fn same_or_closer_hop_is_dropped() {
        let s = node_at_hop(2);
        let c = Config::default();
        let same = Data::new(2, ROOT_ID, Footer::default(), &[1]);
        assert_eq!(classify_rx(&s, &c, same), RxOutcome::Drop);

        let closer = Data::new(1, ROOT_ID, Footer::default(), &[1]);
        assert_eq!(classify_rx(&s, &c, closer), RxOutcome::Drop);
    }

    #[test]
    fn frame_exceeding_max_hops_is_dropped() {
        let s = node_at_hop(2);
        let mut c = Config::default();
        c.max_data_hops = 3;
        let too_far = Data::new(4, ROOT_ID, Footer::default(), &[1]);
        assert_eq!(classify_rx(&s, &c, too_far), RxOutcome::Drop);
    }

    #[test]
    fn frame_addressed_here_is_delivered() {
        let s = node_at_hop(2);
        let c = Config::default();
        let mine = Data::new(3, 5, Footer::default(), &[7]);
        assert_eq!(classify_rx(&s, &c, mine.clone()), RxOutcome::Deliver(mine));
    }

    #[test]
    fn root_delivers_broadcast_dest_and_drops_strays() {
        let mut s = node_at_hop(0);
        s.opmode.insert(crate::state::OpMode::ROOT);
        let c = Config::default();

        let uplink = Data::new(1, DEST_BROADCAST, Footer::default(), &[1]);
        assert_eq!(classify_rx(&s, &c, uplink.clone()), RxOutcome::Deliver(uplink));

        let stray = Data::new(1, 99, Footer::default(), &[1]);
        assert_eq!(classify_rx(&s, &c, stray), RxOutcome::Drop);
    }
}
