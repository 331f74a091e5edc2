use hashbrown::HashMap;

use crate::types::{EventKey, UserId};

/// Multi-valued index.
pub type VecIndex<K, V> = HashMap<K, Vec<V>>;

/// Events grouped by organizer, in creation order.
pub type OrganizerIndex = VecIndex<UserId, EventKey>;
