//! Beacon rebroadcaster.

use crate::config::Config;
use crate::frame::Beacon;
use crate::state::NodeState;

/// Stage `beacon` for rebroadcast one hop further from the root, if its
/// depth budget allows: the rebroadcast's `hop` is strictly greater than
/// the received beacon's and never exceeds `max_beacon_hops`.
///
/// If a rebroadcast is already pending, the new one overwrites it — one
/// rebroadcast per epoch suffices, since each node sits at a fixed hop
/// distance from the root.
pub fn rebroadcast_beacon(state: &mut NodeState, config: &Config, beacon: &Beacon) {
    if beacon.hop < config.max_beacon_hops {
        state.buffers.beacon_tx = Some(beacon.rebroadcast());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rebroadcast_increments_hop_and_overwrites_pending() {
        let mut s = NodeState::new(2);
        let c = Config::default();

        rebroadcast_beacon(&mut s, &c, &Beacon::new(0, 0xff));
        assert_eq!(s.buffers.beacon_tx, Some(Beacon::new(1, 0xff)));

        rebroadcast_beacon(&mut s, &c, &Beacon::new(1, 0xff));
        assert_eq!(s.buffers.beacon_tx, Some(Beacon::new(2, 0xff)));
    }

    #[test]
    fn rebroadcast_stops_at_max_hops() {
        let mut s = NodeState::new(2);
        let mut c = Config::default();
        c.max_beacon_hops = 3;

        rebroadcast_beacon(&mut s, &c, &Beacon::new(3, 0xff));
        assert_eq!(s.buffers.beacon_tx, None);
    }
}
