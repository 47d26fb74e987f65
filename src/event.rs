//! Upper-layer event surface and the `Blink<R, S>` facade: the public API
//! (`blink_init`/`blink_reset`/`blink_start_sync`/`blink_tx`) and the two
//! platform-driven entry points (`on_wakeup`/`on_radio_complete`).

use log::{debug, info, trace, warn};

use crate::config::{Config, Modulation, DEST_BROADCAST, ROOT_ID};
use crate::error::BlinkError;
use crate::forward::{classify_rx, stage_forward, stage_own_tx, RxOutcome};
use crate::frame::{decode_any, Beacon, Data, Frame, BEACON_LEN, MAX_PAYLOAD_CAP};
use crate::radio::{Radio, RadioOp, RadioStatus};
use crate::scheduler::{self, Scheduler};
use crate::state::{NodeState, OpMode};
use crate::sync;
use crate::time::Ticks;

/// Application-visible outcomes of driving the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Joined the tree; `hop` is the newly-learned distance from the root.
    Synced { hop: u8 },
    /// Missed too many beacons in a row and returned to `SCAN`.
    LostSync,
    /// A data frame addressed to this node arrived.
    Received(Data),
    /// This node's own staged `own_tx` frame finished transmitting.
    Sent,
}

/// What the radio facade is currently doing, so a completion routes without
/// re-deriving it from `opmode` — an unmatched completion is a fatal
/// invariant violation, not a recoverable condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    ScanRx,
    SlotRx,
    BeaconTx,
    DataTx,
    Cad,
}

/// Ties node state, the sync/forwarding engines, and a node's radio +
/// scheduler collaborators into the single object a caller drives.
pub struct Blink<R, S> {
    pub state: NodeState,
    pub config: Config,
    radio: R,
    scheduler: S,
    pending: Pending,
    /// Deadline currently armed on `scheduler`, tracked here so a beacon's
    /// actual arrival time can be compared against it for drift correction.
    next_deadline: Ticks,
}

impl<R, S> Blink<R, S>
where
    R: Radio,
    S: Scheduler,
{
    pub fn new(nodeid: u8, config: Config, radio: R, scheduler: S) -> Blink<R, S> {
        Blink {
            state: NodeState::new(nodeid),
            config,
            radio,
            scheduler,
            pending: Pending::None,
            next_deadline: Ticks::ZERO,
        }
    }

    fn arm_wakeup(&mut self, at: Ticks) {
        self.scheduler.schedule_wakeup(at);
        self.next_deadline = at;
    }

    /// `blink_reset` — apply the default modulation and (re)initialise node
    /// state. `is_root` fixes `ROOT`/`NODE` and `hop = 0` for the sink,
    /// which never runs the sync engine.
    pub fn blink_reset(&mut self, is_root: bool) -> Result<(), BlinkError<R::Error>> {
        self.radio.apply(&Modulation::default()).map_err(BlinkError::Radio)?;

        self.state = NodeState::new(self.state.nodeid);
        self.state.opmode.insert(OpMode::READY);
        if is_root {
            self.state.opmode.insert(OpMode::ROOT);
            self.state.hop = 0;
        } else {
            self.state.opmode.insert(OpMode::NODE);
        }
        self.pending = Pending::None;

        debug!("blink_reset: opmode {}", self.state.opmode);
        Ok(())
    }

    /// `blink_start_sync` — begin (or resume) participating in the tree.
    /// The root starts in `TRACK` at slot 0 immediately; a non-root node
    /// starts scanning continuously for the first beacon.
    pub fn blink_start_sync(&mut self) -> Result<(), BlinkError<R::Error>> {
        if !self.state.opmode.contains(OpMode::READY) {
            return Err(BlinkError::NotReady);
        }

        if self.state.is_root() {
            self.state.opmode.insert(OpMode::TRACK);
            // wraps to slot 0 on the first `on_wakeup`, so the root's own
            // beacon goes out on that very first tick rather than a full
            // epoch later.
            self.state.slot = self.config.time_slots - 1;
            let now = self.scheduler.now();
            self.arm_wakeup(scheduler::root_next_wakeup(now, &self.config));
            info!("blink_start_sync: root active, beacon due next tick");
        } else {
            self.state.opmode.insert(OpMode::SCAN);
            self.radio.request(RadioOp::ReceiveContinuous, &[]).map_err(BlinkError::Radio)?;
            self.pending = Pending::ScanRx;
            info!("blink_start_sync: scanning for beacon");
        }
        Ok(())
    }

    /// `blink_tx` — stage `payload` for `dest` as this node's own traffic.
    pub fn blink_tx(&mut self, dest: u8, payload: &[u8]) -> Result<(), BlinkError<R::Error>> {
        stage_own_tx(&mut self.state, &self.config, dest, payload)
    }

    /// Drive one wake-up tick, called when the scheduler's recurring job
    /// fires. `fired_at` is the deadline that elapsed and is the base the
    /// *next* schedule is computed from, not `scheduler.now()` read here.
    pub fn on_wakeup(&mut self, fired_at: Ticks) -> Result<Option<Event>, BlinkError<R::Error>> {
        if self.state.is_root() {
            return self.on_wakeup_root(fired_at);
        }
        if !self.state.is_synced() {
            // still scanning; no slot schedule to drive yet
            return Ok(None);
        }

        scheduler::next_slot(&mut self.state, &self.config);

        if self.config.is_beacon_slot(self.state.slot) {
            self.dispatch_beacon_slot()?;
        } else {
            self.dispatch_data_slot()?;
        }

        let next = scheduler::next_wakeup(fired_at, &self.config);
        self.arm_wakeup(next);
        Ok(None)
    }

    /// Root never scans or rebroadcasts: it originates its own beacon in
    /// slot 0 every epoch and otherwise only listens during data slots.
    fn on_wakeup_root(&mut self, fired_at: Ticks) -> Result<Option<Event>, BlinkError<R::Error>> {
        scheduler::next_slot(&mut self.state, &self.config);

        if self.state.slot == 0 {
            let beacon = Beacon::new(ROOT_ID, DEST_BROADCAST);
            self.transmit_beacon(&beacon)?;
        } else if self.config.is_data_slot(self.state.slot) {
            self.arm_slot_rx()?;
        }

        let next = scheduler::root_next_wakeup(fired_at, &self.config);
        self.arm_wakeup(next);
        Ok(None)
    }

    fn dispatch_beacon_slot(&mut self) -> Result<(), BlinkError<R::Error>> {
        if let Some(beacon) = self.state.buffers.beacon_tx.take() {
            self.transmit_beacon(&beacon)?;
        } else {
            self.arm_slot_rx()?;
        }
        Ok(())
    }

    fn dispatch_data_slot(&mut self) -> Result<(), BlinkError<R::Error>> {
        // own traffic takes priority over relayed traffic
        let staged =
            self.state.buffers.own_tx.take().or_else(|| self.state.buffers.forward_tx.take());
        match staged {
            Some(frame) => self.transmit_data(&frame),
            None => self.arm_slot_rx(),
        }
    }

    fn transmit_beacon(&mut self, beacon: &Beacon) -> Result<(), BlinkError<R::Error>> {
        let mut buf = [0u8; BEACON_LEN];
        let n = beacon.encode(&mut buf);
        self.radio.request(RadioOp::Transmit, &buf[..n]).map_err(BlinkError::Radio)?;
        self.pending = Pending::BeaconTx;
        self.state.opmode.insert(OpMode::TXBCN);
        Ok(())
    }

    fn transmit_data(&mut self, frame: &Data) -> Result<(), BlinkError<R::Error>> {
        let mut buf = [0u8; MAX_PAYLOAD_CAP + 4];
        let len = self.config.max_payload_len;
        let n = frame.encode(&mut buf[..len + 4], len);
        self.radio.request(RadioOp::Transmit, &buf[..n]).map_err(BlinkError::Radio)?;
        self.pending = Pending::DataTx;
        self.state.opmode.insert(OpMode::TXDATA);
        Ok(())
    }

    fn arm_slot_rx(&mut self) -> Result<(), BlinkError<R::Error>> {
        if self.config.use_cad {
            self.state.cad_retries_remaining = self.config.cad_checks;
            self.radio.request(RadioOp::Cad, &[]).map_err(BlinkError::Radio)?;
            self.pending = Pending::Cad;
        } else {
            let timeout_symbols = self.config.rx_timeout_symbols;
            self.radio.request(RadioOp::ReceiveTimed { timeout_symbols }, &[]).map_err(BlinkError::Radio)?;
            self.pending = Pending::SlotRx;
        }
        Ok(())
    }

    /// `on_radio_complete` — route a completion of whatever command is
    /// currently pending. Returns `UnexpectedCompletion` if no command was
    /// outstanding.
    pub fn on_radio_complete(
        &mut self,
        status: RadioStatus,
    ) -> Result<Option<Event>, BlinkError<R::Error>> {
        match core::mem::replace(&mut self.pending, Pending::None) {
            Pending::None => Err(BlinkError::UnexpectedCompletion),
            Pending::ScanRx => self.complete_scan_rx(status),
            Pending::SlotRx => self.complete_slot_rx(status),
            Pending::BeaconTx => {
                self.state.opmode.remove(OpMode::TXBCN);
                Ok(None)
            }
            Pending::DataTx => {
                self.state.opmode.remove(OpMode::TXDATA);
                Ok(Some(Event::Sent))
            }
            Pending::Cad => self.complete_cad(status),
        }
    }

    fn complete_cad(&mut self, status: RadioStatus) -> Result<Option<Event>, BlinkError<R::Error>> {
        if status.cad_detected {
            let timeout_symbols = self.config.rx_timeout_symbols;
            self.radio.request(RadioOp::ReceiveTimed { timeout_symbols }, &[]).map_err(BlinkError::Radio)?;
            self.pending = Pending::SlotRx;
            return Ok(None);
        }
        if self.state.cad_retries_remaining > 0 {
            self.state.cad_retries_remaining -= 1;
            self.radio.request(RadioOp::Cad, &[]).map_err(BlinkError::Radio)?;
            self.pending = Pending::Cad;
            return Ok(None);
        }
        // retries exhausted with no activity detected: abandon the receive,
        // same bookkeeping as a CRC failure would trigger
        self.handle_missed_slot()
    }

    fn complete_scan_rx(&mut self, status: RadioStatus) -> Result<Option<Event>, BlinkError<R::Error>> {
        if !status.rx_ok() {
            self.radio.request(RadioOp::ReceiveContinuous, &[]).map_err(BlinkError::Radio)?;
            self.pending = Pending::ScanRx;
            return Ok(None);
        }

        let mut buf = [0u8; MAX_PAYLOAD_CAP + 4];
        let n = self.radio.copy_received(&mut buf).map_err(BlinkError::Radio)?;

        match Beacon::decode(&buf[..n]) {
            Ok(beacon) => {
                let sync_result =
                    sync::accept_first_beacon(&mut self.state, &self.config, &beacon, status.rx_time);
                self.arm_wakeup(sync_result.next_wakeup);
                info!("synced at hop {}", self.state.hop);
                Ok(Some(Event::Synced { hop: self.state.hop }))
            }
            Err(_) => {
                // not a beacon, or garbage; keep scanning
                self.radio.request(RadioOp::ReceiveContinuous, &[]).map_err(BlinkError::Radio)?;
                self.pending = Pending::ScanRx;
                Ok(None)
            }
        }
    }

    fn complete_slot_rx(&mut self, status: RadioStatus) -> Result<Option<Event>, BlinkError<R::Error>> {
        if !status.rx_ok() {
            return self.handle_missed_slot();
        }

        let mut buf = [0u8; MAX_PAYLOAD_CAP + 4];
        let n = self.radio.copy_received(&mut buf).map_err(BlinkError::Radio)?;

        match decode_any(&buf[..n], self.config.max_payload_len) {
            Ok(Frame::Beacon(beacon)) => {
                let result = sync::accept_tracked_beacon(&mut self.state, &self.config, &beacon);
                if let Some(corrected) =
                    scheduler::drift_correction(self.next_deadline, status.rx_time, &self.config)
                {
                    debug!("drift corrected to {:?}", corrected);
                    self.arm_wakeup(corrected);
                }
                trace!(
                    "beacon outside home slot: hop_updated={} slot_corrected={}",
                    result.hop_updated_this_beacon,
                    result.slot_corrected
                );
                Ok(None)
            }
            Ok(Frame::Data(data)) => match classify_rx(&self.state, &self.config, data) {
                RxOutcome::Deliver(d) => {
                    trace!("delivered frame, trace={:#06x}", d.footer.trace);
                    Ok(Some(Event::Received(d)))
                }
                RxOutcome::Forward(d) => {
                    stage_forward(&mut self.state, d);
                    Ok(None)
                }
                RxOutcome::Drop => Ok(None),
            },
            Err(_) => {
                warn!("failed to decode received frame");
                Ok(None)
            }
        }
    }

    /// A scheduled receive came back empty or failed to decode. Every failed
    /// listen in a beacon slot counts toward `missed_beacons`, not just this
    /// node's own designated listening slot — a relay still needs to notice
    /// when it's gone deaf even in the slots it spends forwarding other
    /// nodes' beacons. A missed data-slot receive is just a quiet slot.
    fn handle_missed_slot(&mut self) -> Result<Option<Event>, BlinkError<R::Error>> {
        if self.config.is_beacon_slot(self.state.slot) {
            if sync::missed_beacon(&mut self.state, &self.config) {
                self.scheduler.cancel_wakeup();
                self.radio.request(RadioOp::ReceiveContinuous, &[]).map_err(BlinkError::Radio)?;
                self.pending = Pending::ScanRx;
                warn!("lost sync after {} missed beacons", self.config.max_missed_beacons);
                return Ok(Some(Event::LostSync));
            }
        }
        Ok(None)
    }
}

/// Test/simulation-only peepholes into a mock-radio-backed `Blink`, used by
/// `src/sim.rs` to drive a multi-node network without re-deriving protocol
/// state from the outside.
#[cfg(test)]
impl<S> Blink<crate::radio::mock::MockRadio, S>
where
    S: Scheduler,
{
    pub(crate) fn peek_last_tx(&self) -> Option<&[u8]> {
        self.radio.last_tx()
    }

    pub(crate) fn stage_rx(&mut self, frame: &[u8]) {
        self.radio.stage_rx(frame)
    }

    pub(crate) fn pending_is_tx(&self) -> bool {
        matches!(self.pending, Pending::BeaconTx | Pending::DataTx)
    }

    pub(crate) fn pending_is_cad(&self) -> bool {
        matches!(self.pending, Pending::Cad)
    }

    pub(crate) fn pending_is_none(&self) -> bool {
        matches!(self.pending, Pending::None)
    }
}

#[cfg(test)]
mod test {
    use core::cell::Cell;

    use super::*;
    use crate::radio::mock::MockRadio;

    struct TestScheduler {
        now: Cell<i64>,
        armed: Cell<Option<Ticks>>,
    }

    impl TestScheduler {
        fn new(now_ms: u32) -> TestScheduler {
            TestScheduler { now: Cell::new(Ticks::from_ms(now_ms).as_i64()), armed: Cell::new(None) }
        }
    }

    impl Scheduler for TestScheduler {
        fn now(&self) -> Ticks {
            Ticks(self.now.get())
        }
        fn schedule_wakeup(&mut self, at: Ticks) {
            self.armed.set(Some(at));
        }
        fn cancel_wakeup(&mut self) {
            self.armed.set(None);
        }
    }

    fn new_blink() -> Blink<MockRadio, TestScheduler> {
        Blink::new(5, Config::default(), MockRadio::new(), TestScheduler::new(0))
    }

    #[test]
    fn root_start_sync_enters_track_and_arms_wakeup() {
        let mut b = new_blink();
        b.blink_reset(true).unwrap();
        b.blink_start_sync().unwrap();

        assert!(b.state.opmode.contains(OpMode::TRACK));
        assert_eq!(b.state.hop, ROOT_ID);
        assert_eq!(b.scheduler.armed.get(), Some(b.next_deadline));
    }

    #[test]
    fn node_start_sync_issues_continuous_receive() {
        let mut b = new_blink();
        b.blink_reset(false).unwrap();
        b.blink_start_sync().unwrap();

        assert!(b.state.opmode.contains(OpMode::SCAN));
        assert_eq!(b.pending, Pending::ScanRx);
    }

    #[test]
    fn unmatched_completion_is_an_error() {
        let mut b = new_blink();
        b.blink_reset(false).unwrap();
        let result = b.on_radio_complete(RadioStatus::tx_done(Ticks::ZERO));
        assert_eq!(result, Err(BlinkError::UnexpectedCompletion));
    }

    #[test]
    fn scan_completion_with_beacon_syncs() {
        let mut b = new_blink();
        b.blink_reset(false).unwrap();
        b.blink_start_sync().unwrap();

        let mut buf = [0u8; BEACON_LEN];
        Beacon::new(1, DEST_BROADCAST).encode(&mut buf);
        b.radio.stage_rx(&buf);

        let mut status = RadioStatus::tx_done(Ticks::from_ms(1_000));
        status.received_len = BEACON_LEN;

        let event = b.on_radio_complete(status).unwrap();
        assert_eq!(event, Some(Event::Synced { hop: 2 }));
        assert!(b.state.opmode.contains(OpMode::TRACK));
    }

    #[test]
    fn blink_tx_requires_sync_first() {
        let mut b = new_blink();
        b.blink_reset(false).unwrap();
        assert_eq!(b.blink_tx(ROOT_ID, &[1, 2]), Err(BlinkError::NotReady));

        b.state.opmode.insert(OpMode::TRACK);
        b.state.hop = 2;
        assert!(b.blink_tx(ROOT_ID, &[1, 2]).is_ok());
        assert!(b.state.buffers.own_tx.is_some());
    }
}
