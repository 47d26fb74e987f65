//! Deterministic multi-node simulation harness (test-only).
//!
//! Combines `radio::mock::MockRadio` with an idealised broadcast medium to
//! drive a small network through cold join, multi-hop forwarding, and
//! loss-of-sync end-to-end, without real time or hardware. Grounded on
//! `timer::mock::MockTimer` and the `radio` crate's `mock` feature
//! (teacher's `radio = { features = ["mock"] }` dev-dependency) — this
//! module is the multi-node analogue of those single-component doubles.
//!
//! Every currently-active node is driven in lockstep, one simulated slot
//! per [`Network::advance`] call: real deployments rely on the protocol's
//! own drift correction to keep nodes' slot boundaries aligned (exercised
//! directly in `scheduler.rs`'s unit tests), so this harness simply
//! assumes that alignment holds and focuses on forwarding/sync semantics.

#![cfg(test)]

use std::vec::Vec;

use crate::config::Config;
use crate::event::{Blink, Event};
use crate::radio::mock::MockRadio;
use crate::radio::RadioStatus;
use crate::scheduler::Scheduler;
use crate::time::Ticks;

/// A scheduler that does nothing: this harness drives every active node's
/// `on_wakeup` once per simulated slot directly, rather than waiting on a
/// per-node armed deadline the way a real job queue would.
struct SimScheduler;

impl Scheduler for SimScheduler {
    fn now(&self) -> Ticks {
        Ticks::ZERO
    }
    fn schedule_wakeup(&mut self, _at: Ticks) {}
    fn cancel_wakeup(&mut self) {}
}

struct Node {
    blink: Blink<MockRadio, SimScheduler>,
    events: Vec<Event>,
}

/// A tiny simulated network: nodes connected by an explicit adjacency list
/// rather than a path-loss model (radio physics is out of scope here) —
/// just enough to make multi-hop forwarding and out-of-range loss-of-sync
/// reachable in a test.
struct Network {
    nodes: Vec<Node>,
    adjacency: Vec<Vec<bool>>,
    tick: Ticks,
    slot_ticks: Ticks,
}

impl Network {
    fn new(ids: &[u8], config: &Config, edges: &[(u8, u8)]) -> Network {
        let nodes = ids
            .iter()
            .map(|&id| Node {
                blink: Blink::new(id, config.clone(), MockRadio::new(), SimScheduler),
                events: Vec::new(),
            })
            .collect::<Vec<_>>();

        let mut adjacency = std::vec![std::vec![false; ids.len()]; ids.len()];
        for &(a, b) in edges {
            let (ia, ib) = (Self::index_of(ids, a), Self::index_of(ids, b));
            adjacency[ia][ib] = true;
            adjacency[ib][ia] = true;
        }

        Network { nodes, adjacency, tick: Ticks::ZERO, slot_ticks: config.slot_ticks() }
    }

    fn index_of(ids: &[u8], id: u8) -> usize {
        ids.iter().position(|&x| x == id).expect("node id in network")
    }

    fn sever(&mut self, a: u8, b: u8) {
        let (ia, ib) = (self.idx(a), self.idx(b));
        self.adjacency[ia][ib] = false;
        self.adjacency[ib][ia] = false;
    }

    fn idx(&self, id: u8) -> usize {
        self.nodes.iter().position(|n| n.blink.state.nodeid == id).expect("node id in network")
    }

    fn reset_and_start(&mut self, root_id: u8) {
        let root_idx = self.idx(root_id);
        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.blink.blink_reset(i == root_idx).unwrap();
            node.blink.blink_start_sync().unwrap();
        }
    }

    /// Advance the whole network by `slots` simulated slot boundaries.
    /// Every node that is synced (or is the root) gets `on_wakeup` called
    /// exactly once per slot; nodes still scanning get a chance to hear
    /// whatever was transmitted this tick.
    fn advance(&mut self, slots: usize) {
        for _ in 0..slots {
            self.tick = self.tick + self.slot_ticks;
            self.step(self.tick);
        }
    }

    fn step(&mut self, fired_at: Ticks) {
        let active: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| {
                let n = &self.nodes[i].blink;
                n.state.is_synced() || n.state.is_root()
            })
            .collect();

        for &i in &active {
            if let Some(e) = self.nodes[i].blink.on_wakeup(fired_at).expect("on_wakeup") {
                self.nodes[i].events.push(e);
            }
        }

        // frames transmitted this tick, tagged with their sender so a
        // receiver only hears what it's adjacent to
        let mut frames: Vec<(usize, Vec<u8>)> = Vec::new();
        for &i in &active {
            if self.nodes[i].blink.pending_is_tx() {
                if let Some(bytes) = self.nodes[i].blink.peek_last_tx() {
                    frames.push((i, bytes.to_vec()));
                }
            }
        }

        for i in 0..self.nodes.len() {
            self.resolve_pending(i, &frames, fired_at);
        }
    }

    fn resolve_pending(&mut self, i: usize, frames: &[(usize, Vec<u8>)], fired_at: Ticks) {
        if self.nodes[i].blink.pending_is_none() {
            return;
        }

        loop {
            let is_tx = self.nodes[i].blink.pending_is_tx();
            let heard = frames
                .iter()
                .find(|(sender, _)| self.adjacency[*sender][i])
                .map(|(_, bytes)| bytes.clone());

            let status = if is_tx {
                RadioStatus::tx_done(fired_at)
            } else if let Some(bytes) = heard {
                self.nodes[i].blink.stage_rx(&bytes);
                let mut s = RadioStatus::tx_done(fired_at);
                s.received_len = bytes.len();
                s
            } else {
                RadioStatus::tx_done(fired_at)
            };

            match self.nodes[i].blink.on_radio_complete(status) {
                Ok(Some(event)) => {
                    self.nodes[i].events.push(event);
                    break;
                }
                Ok(None) => {
                    if self.nodes[i].blink.pending_is_cad() {
                        continue;
                    }
                    break;
                }
                Err(_) => break,
            }
        }
    }

    fn node(&self, id: u8) -> &Node {
        &self.nodes[self.idx(id)]
    }

    fn node_mut(&mut self, id: u8) -> &mut Node {
        let idx = self.idx(id);
        &mut self.nodes[idx]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::state::OpMode;

    #[test]
    fn cold_join_and_two_hop_forward() {
        let config = Config::default();
        // line topology: root(0) -- relay(1) -- leaf(2); the leaf cannot
        // hear the root directly, so delivery proves forwarding happened.
        let mut net = Network::new(&[0, 1, 2], &config, &[(0, 1), (1, 2)]);
        net.reset_and_start(0);

        net.advance(10);

        assert!(net.node(1).blink.state.is_synced());
        assert_eq!(net.node(1).blink.state.hop, 1);
        assert!(net.node(2).blink.state.is_synced());
        assert_eq!(net.node(2).blink.state.hop, 2);

        net.node_mut(2).blink.blink_tx(0, &[0xab]).unwrap();
        net.advance(config.time_slots as usize);

        let delivered = net.node(0).events.iter().find_map(|e| match e {
            Event::Received(d) => Some(d.payload().to_vec()),
            _ => None,
        });
        assert_eq!(delivered, Some(std::vec![0xab]));
    }

    #[test]
    fn relay_loses_sync_once_out_of_range() {
        let config = Config::default();
        let mut net = Network::new(&[0, 1], &config, &[(0, 1)]);
        net.reset_and_start(0);

        net.advance(5);
        assert!(net.node(1).blink.state.is_synced());

        net.sever(0, 1);
        net.advance((config.max_missed_beacons as usize + 2) * config.time_slots as usize);

        assert!(net.node(1).events.contains(&Event::LostSync));
        assert!(net.node(1).blink.state.opmode.contains(OpMode::SCAN));
        assert!(!net.node(1).blink.state.opmode.contains(OpMode::TRACK));
    }
}
