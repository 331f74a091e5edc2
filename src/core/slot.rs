use std::sync::{Arc, RwLock};

use crate::engine::traits::AnnouncementCache;

/// Process-wide announcement cell; `None` is the only "nothing to report" state.
#[derive(Debug, Clone, Default)]
pub struct AnnouncementSlot {
    value: Arc<RwLock<Option<String>>>,
}

impl AnnouncementSlot {
    /// Empty (absent) slot.
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnnouncementCache for AnnouncementSlot {
    fn get(&self) -> Option<String> {
        // A poisoned lock still holds the last complete write.
        match self.value.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set(&self, announcement: String) {
        match self.value.write() {
            Ok(mut guard) => *guard = Some(announcement),
            Err(poisoned) => *poisoned.into_inner() = Some(announcement),
        }
    }

    fn delete(&self) {
        match self.value.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_differs_from_empty_value() {
        let slot = AnnouncementSlot::new();
        slot.set(String::new());
        assert_eq!(slot.get(), Some(String::new()));

        slot.delete();
        assert_eq!(slot.get(), None);
    }

    #[test]
    fn clones_share_the_cell() {
        let slot = AnnouncementSlot::new();
        let reader = slot.clone();
        slot.set("hello".to_string());
        assert_eq!(reader.get().as_deref(), Some("hello"));
    }
}
