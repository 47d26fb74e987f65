//! Jittered per-epoch uplink demo.
//!
//! Wires a root and a single leaf node together over a shared mock radio
//! and drives them through cold join, then mimics the original firmware's
//! `reportfunc`/`next_report_time` job: once synced, the leaf schedules its
//! first report `NODE_ID` slots in, and after each report picks a fresh
//! random data slot for the next one so that many leaves sharing an epoch
//! don't collide. Not part of the core protocol — this lives outside
//! `src/` as a standalone demo binary.

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, info};
use rand::Rng;

use blink_lpwan::config::{Config, DEST_BROADCAST, ROOT_ID};
use blink_lpwan::event::{Blink, Event};
use blink_lpwan::radio::mock::MockRadio;
use blink_lpwan::radio::{Radio, RadioOp, RadioStatus};
use blink_lpwan::scheduler::Scheduler;
use blink_lpwan::time::Ticks;

const LEAF_ID: u8 = 3;

/// Forwards every `Radio` call through a shared `MockRadio`, so the driver
/// loop can also reach into it (`last_tx`/`stage_rx`) without needing a
/// handle into the `Blink` that owns it.
#[derive(Clone)]
struct SharedRadio(Rc<RefCell<MockRadio>>);

impl SharedRadio {
    fn new() -> Self {
        SharedRadio(Rc::new(RefCell::new(MockRadio::new())))
    }
}

impl Radio for SharedRadio {
    type Error = ();

    fn apply(&mut self, modulation: &blink_lpwan::config::Modulation) -> Result<(), ()> {
        self.0.borrow_mut().apply(modulation)
    }

    fn request(&mut self, op: RadioOp, frame: &[u8]) -> Result<(), ()> {
        self.0.borrow_mut().request(op, frame)
    }

    fn copy_received(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        self.0.borrow_mut().copy_received(buf)
    }
}

/// Drives `Blink` in lockstep from the outside (`src/sim.rs`'s driving
/// style); the armed deadline is never consulted, only `fired_at`.
struct DemoScheduler;

impl Scheduler for DemoScheduler {
    fn now(&self) -> Ticks {
        Ticks::ZERO
    }
    fn schedule_wakeup(&mut self, _at: Ticks) {}
    fn cancel_wakeup(&mut self) {}
}

/// Demo-layer equivalent of `examples/blink/main.c`'s `_report_job` +
/// `tx` flag: the core protocol has no notion of "my own periodic uplink",
/// so this lives here rather than in `event::Blink`.
struct ReportJob {
    counter: u32,
    next_due: Option<Ticks>,
    awaiting_send: bool,
}

impl ReportJob {
    fn new() -> Self {
        ReportJob { counter: 0, next_due: None, awaiting_send: false }
    }

    fn on_event(&mut self, event: &Event, now: Ticks, config: &Config, slot: u8) {
        match event {
            Event::Synced { .. } => {
                self.next_due = Some(now + Ticks::from_ms(config.time_slot_ms).mul(LEAF_ID as i64));
                info!("leaf {}: joined, first report in {} slots", LEAF_ID, LEAF_ID);
            }
            Event::LostSync => {
                self.next_due = None;
                info!("leaf {}: lost sync, reports suspended", LEAF_ID);
            }
            Event::Sent if self.awaiting_send => {
                self.awaiting_send = false;
                self.next_due = Some(now + next_report_time(config, slot));
                debug!("leaf {}: report sent, next one scheduled", LEAF_ID);
            }
            _ => {}
        }
    }
}

trait TicksExt {
    fn mul(self, n: i64) -> Ticks;
}
impl TicksExt for Ticks {
    fn mul(self, n: i64) -> Ticks {
        Ticks(self.as_i64() * n)
    }
}

/// Mirrors `next_report_time()`: a random data slot somewhere in the epoch
/// that just started, so many leaves sharing a root don't pick the same
/// slot every time.
fn next_report_time(config: &Config, slot: u8) -> Ticks {
    let time_till_next_epoch = Ticks::from_ms(config.time_slot_ms).mul((config.time_slots - slot) as i64);
    let data_slot_offset = Ticks::from_ms(config.time_slot_ms).mul(config.beacon_slots as i64);
    let tx_slot = rand::thread_rng().gen_range(0..config.data_slots());
    let tx_time = Ticks::from_ms(config.time_slot_ms).mul(tx_slot as i64);
    time_till_next_epoch + data_slot_offset + tx_time
}

fn main() -> anyhow::Result<()> {
    simplelog::SimpleLogger::init(simplelog::LevelFilter::Info, simplelog::Config::default())
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))?;

    let config = Config::default();

    let root_radio = SharedRadio::new();
    let leaf_radio = SharedRadio::new();

    let mut root = Blink::new(ROOT_ID, config.clone(), root_radio.clone(), DemoScheduler);
    let mut leaf = Blink::new(LEAF_ID, config.clone(), leaf_radio.clone(), DemoScheduler);

    root.blink_reset(true).map_err(|e| anyhow::anyhow!("root blink_reset: {e:?}"))?;
    root.blink_start_sync().map_err(|e| anyhow::anyhow!("root blink_start_sync: {e:?}"))?;
    leaf.blink_reset(false).map_err(|e| anyhow::anyhow!("leaf blink_reset: {e:?}"))?;
    leaf.blink_start_sync().map_err(|e| anyhow::anyhow!("leaf blink_start_sync: {e:?}"))?;

    let mut report = ReportJob::new();
    let mut tick = Ticks::ZERO;
    let slot_ticks = config.slot_ticks();

    for _ in 0..200 {
        tick = tick + slot_ticks;

        let root_ops_before = root_radio.0.borrow().ops.len();
        let leaf_ops_before = leaf_radio.0.borrow().ops.len();

        root.on_wakeup(tick).map_err(|e| anyhow::anyhow!("root on_wakeup: {e:?}"))?;
        let leaf_active = leaf.state.is_synced();
        if leaf_active {
            leaf.on_wakeup(tick).map_err(|e| anyhow::anyhow!("leaf on_wakeup: {e:?}"))?;
        }

        // the op (if any) each node issued THIS tick, not whatever it last
        // issued historically
        let root_new_op = new_op(&root_radio, root_ops_before);
        let leaf_new_op = new_op(&leaf_radio, leaf_ops_before);

        let root_tx = matches!(&root_new_op, Some((RadioOp::Transmit, _)));
        let leaf_tx = matches!(&leaf_new_op, Some((RadioOp::Transmit, _)));
        let root_tx_bytes = root_tx.then(|| root_radio.0.borrow().last_tx().map(|b| b.to_vec())).flatten();
        let leaf_tx_bytes = leaf_tx.then(|| leaf_radio.0.borrow().last_tx().map(|b| b.to_vec())).flatten();

        let root_status = resolve(&root_radio, root_new_op, leaf_tx_bytes.as_deref(), tick);
        let leaf_status = resolve(&leaf_radio, leaf_new_op, root_tx_bytes.as_deref(), tick);

        if let Some(status) = root_status {
            if let Some(e) = root.on_radio_complete(status).map_err(|e| anyhow::anyhow!("root on_radio_complete: {e:?}"))? {
                info!("root: {:?}", e);
            }
        }
        if let Some(status) = leaf_status {
            if let Ok(Some(e)) = leaf.on_radio_complete(status) {
                report.on_event(&e, tick, &config, leaf.state.slot);
                info!("leaf: {:?}", e);
            }
        }
        if report.next_due.map_or(false, |due| tick >= due) && leaf.state.is_synced() {
            let mut data = [0u8; 5];
            report.counter += 1;
            data[0] = LEAF_ID;
            data[1..].copy_from_slice(&report.counter.to_be_bytes());
            if leaf.blink_tx(DEST_BROADCAST, &data).is_ok() {
                report.awaiting_send = true;
                report.next_due = None;
            }
        }
    }

    Ok(())
}

/// The `(op, frame)` a node issued this tick, if any — distinguished from
/// its overall request history by the op count observed before `on_wakeup`
/// ran, since an idle slot (e.g. the root outside slot 0 and the data
/// portion) issues no new request at all.
fn new_op(radio: &SharedRadio, ops_before: usize) -> Option<(RadioOp, Vec<u8>)> {
    let r = radio.0.borrow();
    if r.ops.len() > ops_before {
        r.ops.last().map(|(op, frame)| (*op, frame.to_vec()))
    } else {
        None
    }
}

/// Build the completion `RadioStatus` for the command `radio` issued this
/// tick: a transmit always "completes" this tick; a receive completes with
/// `heard`'s bytes if the peer transmitted this tick, or an empty
/// (timed-out) reception otherwise. Returns `None` if nothing was issued
/// this tick.
fn resolve(
    radio: &SharedRadio,
    new_op: Option<(RadioOp, Vec<u8>)>,
    heard: Option<&[u8]>,
    at: Ticks,
) -> Option<RadioStatus> {
    let (op, _) = new_op?;

    Some(match op {
        RadioOp::Transmit => RadioStatus::tx_done(at),
        _ => match heard {
            Some(bytes) => {
                radio.0.borrow_mut().stage_rx(bytes);
                let mut status = RadioStatus::tx_done(at);
                status.received_len = bytes.len();
                status
            }
            None => RadioStatus::tx_done(at),
        },
    })
}
