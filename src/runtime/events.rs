//! Runtime event stream payloads.

use crate::types::{EventKey, OpSeq, RecordKey, UserId};

/// Events emitted by the runtime after each applied mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConferenceEvent {
    /// A new event was published.
    EventCreated {
        /// Allocated key.
        key: EventKey,
    },
    /// A profile was created with defaults.
    UserCreated {
        /// New user id.
        user_id: UserId,
    },
    /// A transaction committed.
    Committed {
        /// Journal sequence of the commit.
        op_seq: OpSeq,
        /// Records written.
        keys: Vec<RecordKey>,
    },
    /// An administrator alert was posted.
    AlertPosted {
        /// Journal sequence of the post.
        op_seq: OpSeq,
    },
    /// Persistence has reached at least this op sequence.
    DurableUpTo {
        /// Highest sequence known durable.
        op_seq: OpSeq,
    },
}
