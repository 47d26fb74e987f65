//! Radio facade.
//!
//! The radio hardware itself is out of scope here; this module only
//! specifies the five commands the protocol issues and the shape of the
//! completion status the facade guarantees to deliver exactly once per
//! command. Grounded on `lib.rs::Radio<I, E>` and `base.rs::Base`, which
//! compose the external `radio` crate's trait bounds the same way.

use crate::config::Modulation;
use crate::time::Ticks;

/// The five radio operations the protocol ever issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioOp {
    /// Abort whatever the radio is doing and return to idle.
    Reset,
    /// Transmit the staged frame.
    Transmit,
    /// Enter continuous receive (used during scan).
    ReceiveContinuous,
    /// Single-shot receive with a symbol-count timeout.
    ReceiveTimed { timeout_symbols: u8 },
    /// Channel-activity-detect.
    Cad,
}

/// Completion status delivered exactly once per issued command, via the
/// scheduler's single completion job.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RadioStatus {
    /// Number of bytes received; 0 for transmit completions or timeouts.
    pub received_len: usize,
    /// CRC failed on the received frame.
    pub crc_error: bool,
    /// The PHY header decoded successfully.
    pub valid_header: bool,
    /// Channel activity was detected (CAD completions only).
    pub cad_detected: bool,
    pub rssi: i16,
    pub snr: i8,
    /// Tick at which reception completed.
    pub rx_time: Ticks,
}

impl RadioStatus {
    /// A status describing a transmit completion (no payload fields used).
    pub fn tx_done(at: Ticks) -> RadioStatus {
        RadioStatus {
            received_len: 0,
            crc_error: false,
            valid_header: false,
            cad_detected: false,
            rssi: 0,
            snr: 0,
            rx_time: at,
        }
    }

    /// Whether this status represents a usable (non-garbage) reception.
    pub fn rx_ok(&self) -> bool {
        self.received_len > 0 && !self.crc_error
    }
}

/// Typed wrapper over the radio's five commands and its staged TX buffer.
///
/// Implementors own the actual peripheral; the protocol never touches
/// registers directly, treating the radio as a singleton resource it owns
/// exclusively. `apply` loads the default modulation (`blink_reset`); every
/// other method starts a long-running operation whose result arrives later
/// via the scheduler's completion job, not as this call's return value.
pub trait Radio {
    type Error;

    /// Apply the modulation/frequency/power parameters (`blink_reset`).
    fn apply(&mut self, modulation: &Modulation) -> Result<(), Self::Error>;

    /// Issue `op`. For `Transmit`, `frame` holds the bytes to send;
    /// otherwise it is ignored.
    fn request(&mut self, op: RadioOp, frame: &[u8]) -> Result<(), Self::Error>;

    /// Copy a completed reception into `buf`, returning the number of
    /// bytes written. Only valid to call after a completion whose status
    /// reports `received_len > 0`.
    fn copy_received(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use super::*;
    use heapless::Vec;

    /// A scripted radio double for deterministic protocol tests.
    ///
    /// Every `request` is recorded; `copy_received` returns whatever was
    /// most recently staged via [`MockRadio::stage_rx`]. No timing or
    /// completion scheduling happens here — `src/sim.rs` drives that.
    #[derive(Debug, Default)]
    pub struct MockRadio {
        pub ops: Vec<(RadioOp, Vec<u8, { crate::frame::MAX_PAYLOAD_CAP + 4 }>), 64>,
        pub applied: Option<Modulation>,
        rx_buf: Vec<u8, { crate::frame::MAX_PAYLOAD_CAP + 4 }>,
    }

    impl MockRadio {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn stage_rx(&mut self, frame: &[u8]) {
            self.rx_buf = Vec::from_slice(frame).expect("frame fits mock buffer");
        }

        pub fn last_tx(&self) -> Option<&[u8]> {
            self.ops.iter().rev().find_map(|(op, f)| match op {
                RadioOp::Transmit => Some(f.as_slice()),
                _ => None,
            })
        }
    }

    impl Radio for MockRadio {
        type Error = ();

        fn apply(&mut self, modulation: &Modulation) -> Result<(), ()> {
            self.applied = Some(*modulation);
            Ok(())
        }

        fn request(&mut self, op: RadioOp, frame: &[u8]) -> Result<(), ()> {
            let stored = Vec::from_slice(frame).map_err(|_| ())?;
            self.ops.push((op, stored)).map_err(|_| ())?;
            Ok(())
        }

        fn copy_received(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
            let n = self.rx_buf.len().min(buf.len());
            buf[..n].copy_from_slice(&self.rx_buf[..n]);
            Ok(n)
        }
    }
}
