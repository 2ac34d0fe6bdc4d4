//! Local call state.

use courier_shared::types::{CallId, CallKind, UserId};

/// The engine's view of the call state machine. The shared record's status
/// is monotonic except that both parties may independently drive it to
/// `ended`; the local machine mirrors that and adds the distinction between
/// the outbound and inbound ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    Idle,
    /// We created the session and are waiting on the receiver.
    RingingOutbound { session: CallId, peer: UserId },
    /// A session naming us as receiver is ringing. At most one inbound
    /// session is surfaced at a time.
    RingingInbound {
        session: CallId,
        peer: UserId,
        kind: CallKind,
        offer: String,
    },
    Active { session: CallId, peer: UserId },
    /// Terminal. Local media has been released; a new call may start.
    Ended { session: CallId, reason: EndReason },
}

impl CallState {
    /// Whether a new outbound call may start.
    pub fn can_start(&self) -> bool {
        matches!(self, CallState::Idle | CallState::Ended { .. })
    }

    /// The session currently being negotiated or held, if any.
    pub fn session(&self) -> Option<&CallId> {
        match self {
            CallState::RingingOutbound { session, .. }
            | CallState::RingingInbound { session, .. }
            | CallState::Active { session, .. } => Some(session),
            CallState::Idle | CallState::Ended { .. } => None,
        }
    }
}

/// Why a call reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Either party set the session status to `ended`.
    HungUp,
    /// The receiver rejected the ring before accepting.
    Declined,
    /// The session document disappeared; treated identically to `ended`.
    Dropped,
}
