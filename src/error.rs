//! Error types returned by the protocol state machine.

use crate::frame::DecodeError;

/// Errors raised while driving the protocol.
///
/// Radio and codec failures are mostly absorbed internally; this enum
/// exists for the handful of conditions that are either programmer errors
/// (calling an operation out of sequence) or that a caller may reasonably
/// want to report even though the protocol itself recovers from them.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlinkError<E> {
    /// A radio command was issued while a previous one was still pending.
    RadioBusy,

    /// The radio reported a completion while no operation was outstanding.
    ///
    /// This is a fatal internal-invariant violation; the caller should
    /// treat it as a bug rather than attempt to recover.
    UnexpectedCompletion,

    /// A received buffer failed to decode as any recognised frame.
    Decode(DecodeError),

    /// `blink_start_sync` (or an operation requiring it) was called before
    /// `blink_reset`, or `blink_tx` was called before the node had joined
    /// the tree.
    NotReady,

    /// `blink_tx`'s payload exceeded `Config::max_payload_len`.
    PayloadTooLong,

    /// Wrapper for the underlying radio driver's own error type.
    Radio(E),
}

impl<E> From<DecodeError> for BlinkError<E> {
    fn from(e: DecodeError) -> Self {
        BlinkError::Decode(e)
    }
}
