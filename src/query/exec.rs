use std::cmp::Ordering;

use crate::event::EventRecord;

use super::{Attribute, Direction, Filter, QuerySpec, Value};

/// Values of `attribute` on `event`; multi-valued attributes yield several, in ascending order.
pub fn attribute_values(event: &EventRecord, attribute: Attribute) -> Vec<Value> {
    match attribute {
        Attribute::Name => vec![Value::Str(event.name.clone())],
        Attribute::City => vec![Value::Str(event.city.clone())],
        Attribute::Topics => event.topics.iter().cloned().map(Value::Str).collect(),
        Attribute::Month => vec![Value::Int(i64::from(event.month))],
        Attribute::MaxAttendees => vec![Value::Int(i64::from(event.max_attendees))],
        Attribute::SeatsAvailable => vec![Value::Int(i64::from(event.seats_available))],
    }
}

impl Filter {
    /// A multi-valued attribute matches when any one of its values does.
    pub fn matches(&self, event: &EventRecord) -> bool {
        attribute_values(event, self.attribute)
            .iter()
            .any(|v| self.comparator.holds(v.cmp(&self.value)))
    }
}

impl QuerySpec {
    /// True when `event` passes every filter.
    pub fn matches(&self, event: &EventRecord) -> bool {
        self.filters.iter().all(|f| f.matches(event))
    }

    /// Orders two events by this spec's sort keys.
    ///
    /// Multi-valued attributes sort ascending by their smallest value and descending by
    /// their largest. Records tie-break on key so results are fully deterministic.
    pub fn compare(&self, a: &EventRecord, b: &EventRecord) -> Ordering {
        self.order
            .iter()
            .map(|key| {
                let av = attribute_values(a, key.attribute);
                let bv = attribute_values(b, key.attribute);
                match key.direction {
                    Direction::Ascending => av.first().cmp(&bv.first()),
                    Direction::Descending => bv.last().cmp(&av.last()),
                }
            })
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| a.key.cmp(&b.key))
    }

    /// Filters and sorts `events`.
    pub fn execute<'a, I>(&self, events: I) -> Vec<EventRecord>
    where
        I: IntoIterator<Item = &'a EventRecord>,
    {
        let mut out: Vec<EventRecord> = events
            .into_iter()
            .filter(|e| self.matches(e))
            .cloned()
            .collect();
        out.sort_by(|a, b| self.compare(a, b));
        out
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        event::EventDraft,
        query::{Clause, compile_filters},
        types::EventKey,
    };

    use super::*;

    fn event(id: u64, name: &str, city: &str, topics: &[&str], max: u32) -> EventRecord {
        let mut draft = EventDraft::new(name, max);
        draft.city = city.to_string();
        draft.topics = topics.iter().map(|t| (*t).to_string()).collect();
        draft.into_record(EventKey::new("org", id))
    }

    #[test]
    fn range_field_leads_the_order() {
        let events = vec![
            event(1, "Zeta", "Chicago", &["Web"], 80),
            event(2, "Alpha", "Chicago", &["Web"], 60),
            event(3, "Beta", "Chicago", &["Web"], 80),
            event(4, "Gamma", "Paris", &["Web"], 500),
            event(5, "Delta", "Chicago", &["Web"], 20),
        ];
        let spec = compile_filters(&[
            Clause::new("CITY", "EQ", "Chicago"),
            Clause::new("MAX_ATTENDEES", "GT", "50"),
        ])
        .unwrap();

        let names: Vec<_> = spec.execute(&events).into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["Alpha", "Beta", "Zeta"]);
    }

    #[test]
    fn topic_filters_compare_set_membership() {
        let events = vec![
            event(1, "Med", "Chicago", &["Medical Innovations", "Health"], 10),
            event(2, "Web", "Chicago", &["Web"], 10),
        ];
        let spec = compile_filters(&[Clause::new("TOPIC", "EQ", "Medical Innovations")]).unwrap();
        let hits = spec.execute(&events);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Med");
    }
}
