//! Compile-time-in-spirit, runtime-configurable protocol constants.
//!
//! The original firmware (`enzo/blink.h`) expresses these as C `enum`
//! constants. Following `mac/config.rs` / `mac_802154/config.rs`'s pattern
//! of a plain struct with a hand-written `Default`, each constant becomes a
//! field here so a deployment can tune them without recompiling against a
//! different set of `const` items.

use crate::time::Ticks;

/// Node identity reserved for the sink / root of the tree.
pub const ROOT_ID: u8 = 0;

/// Destination byte meaning "broadcast to all listeners in this slot".
pub const DEST_BROADCAST: u8 = 0xff;

/// Width, in bits, of one trace fragment packed into the footer.
pub const TRACE_SHIFT: u32 = 3;

/// Mask isolating one trace fragment's bits within a node id.
pub const TRACE_MASK: u8 = (1 << TRACE_SHIFT) - 1;

/// Number of trace fragments that fit in the 16-bit footer.
pub const TRACE_MAX: u8 = (16 / TRACE_SHIFT) as u8;

/// Default payload capacity, in bytes.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 6;

/// Protocol-wide tuning knobs, one field per application-visible constant
/// the original firmware exposed.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Duration of one slot, in milliseconds (`TIME_SLOT_ms`).
    pub time_slot_ms: u32,

    /// Total slots per epoch (`TIME_SLOTS`).
    pub time_slots: u8,

    /// Leading slots reserved for beacon traffic (`BEACON_SLOTS`).
    pub beacon_slots: u8,

    /// Maximum beacon rebroadcast depth (`MAX_BEACON_HOPS`).
    pub max_beacon_hops: u8,

    /// Maximum hops a data frame may travel (`MAX_DATA_HOPS`).
    pub max_data_hops: u8,

    /// Maximum application payload length, in bytes (`MAX_PAYLOAD_LEN`).
    pub max_payload_len: usize,

    /// Consecutive missed beacon slots before loss-of-sync
    /// (`MAX_MISSED_BEACONS`).
    pub max_missed_beacons: u8,

    /// Maximum acceptable drift between a scheduled wake-up and the
    /// beacon's actual arrival time, in milliseconds (`MAX_DRIFT_ms`).
    pub max_drift_ms: u32,

    /// Number of CAD checks to run before giving up on a slot
    /// (`CAD_CHECKS`).
    pub cad_checks: u8,

    /// Gate the CAD pre-check before a scheduled receive
    /// (`BLINK_USE_CAD`).
    pub use_cad: bool,

    /// Symbol timeout for a single-shot receive (the original firmware's
    /// `ENZO.rxsyms = 50` magic constant, made tunable here so it isn't
    /// buried as a literal at every call site).
    pub rx_timeout_symbols: u8,

    /// Airtime of one beacon frame at the configured modulation, in
    /// microseconds (`AIRTIME_BEACON_us`).
    pub airtime_beacon_us: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_slot_ms: 5_000,
            time_slots: 60,
            beacon_slots: 5,

            max_beacon_hops: 5,
            max_data_hops: 5,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,

            max_missed_beacons: 5 * 3,
            max_drift_ms: 400,

            cad_checks: 3,
            use_cad: false,
            rx_timeout_symbols: 50,

            // SF12/BW125/CR4_5, explicit header + CRC, 4-byte beacon frame.
            airtime_beacon_us: 827_392,
        }
    }
}

impl Config {
    /// Number of data slots per epoch (`DATA_SLOTS`).
    pub fn data_slots(&self) -> u8 {
        self.time_slots - self.beacon_slots
    }

    /// Whether `slot` falls in the beacon portion of the epoch.
    pub fn is_beacon_slot(&self, slot: u8) -> bool {
        slot < self.beacon_slots
    }

    /// Whether `slot` falls in the data portion of the epoch.
    pub fn is_data_slot(&self, slot: u8) -> bool {
        slot >= self.beacon_slots && slot < self.time_slots
    }

    /// Duration of one slot as a tick count.
    pub fn slot_ticks(&self) -> Ticks {
        Ticks::from_ms(self.time_slot_ms)
    }

    /// Precomputed beacon airtime as a tick count.
    pub fn airtime_beacon_ticks(&self) -> Ticks {
        Ticks::from_us(self.airtime_beacon_us)
    }
}

/// Default radio modulation parameters (`blink_reset`'s `DEFAULT_RPS` /
/// `DEFAULT_FREQ` / `DEFAULT_TXPOWER` in `blink-common.h`).
///
/// Radio parameter bit-packing itself is out of scope here; this struct
/// only carries the values a `Radio` implementation needs to apply them.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Modulation {
    pub spreading_factor: u8,
    pub bandwidth_khz: u16,
    pub coding_rate: u8,
    pub freq_hz: u32,
    pub tx_power_dbm: i8,
}

impl Default for Modulation {
    fn default() -> Self {
        Self {
            spreading_factor: 12,
            bandwidth_khz: 125,
            coding_rate: 5, // 4/5
            freq_hz: 868_000_000,
            tx_power_dbm: 17,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn slot_classification() {
        let c = Config::default();
        assert!(c.is_beacon_slot(0));
        assert!(c.is_beacon_slot(4));
        assert!(!c.is_beacon_slot(5));
        assert!(c.is_data_slot(5));
        assert!(c.is_data_slot(59));
        assert!(!c.is_data_slot(60));
        assert_eq!(c.data_slots(), 55);
    }
}
