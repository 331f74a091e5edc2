use std::collections::BTreeSet;

use proptest::prelude::*;

use confcentral::{
    config::RetryPolicy,
    core::store::ConferenceStore,
    engine::{
        registration::{ConflictReason, RegistrationEngine, RegistrationError},
        traits::Datastore,
    },
    event::{EventDraft, EventRecord},
    profile::UserRecord,
    query::{Clause, compile_filters},
    runtime::handle::{RuntimeConfig, spawn_conference},
    types::{EventKey, Principal},
};

#[derive(Debug, Clone)]
struct Action {
    user: u8,
    event: u8,
    register: bool,
}

fn action_strategy() -> impl Strategy<Value = Action> {
    (0u8..6, 0u8..3, any::<bool>()).prop_map(|(user, event, register)| Action {
        user,
        event,
        register,
    })
}

fn principal(idx: u8) -> Principal {
    Principal::new(format!("u{idx}"), format!("u{idx}@example.com"))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

proptest! {
    #[test]
    fn seats_match_holders_after_any_sequence(
        capacities in proptest::collection::vec(0u32..4, 3),
        actions in proptest::collection::vec(action_strategy(), 1..60),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let handle = spawn_conference(ConferenceStore::new(), None, RuntimeConfig::default());
            let mut keys: Vec<EventKey> = Vec::new();
            for (i, cap) in capacities.iter().enumerate() {
                let event = handle
                    .insert_event(&"org".to_string(), EventDraft::new(format!("E{i}"), *cap))
                    .await
                    .expect("insert");
                keys.push(event.key);
            }
            let engine = RegistrationEngine::new(handle.clone(), RetryPolicy::default());

            // Model of who holds which event.
            let mut model: BTreeSet<(u8, u8)> = BTreeSet::new();
            for action in &actions {
                let key = &keys[usize::from(action.event)];
                let held = model.contains(&(action.user, action.event));
                let result = engine
                    .set_registration(&principal(action.user), key, action.register)
                    .await;
                let taken = model.iter().filter(|(_, e)| *e == action.event).count() as u32;
                match (action.register, held) {
                    (true, true) => assert_eq!(
                        result,
                        Err(RegistrationError::Conflict(ConflictReason::AlreadyRegistered))
                    ),
                    (true, false) if taken >= capacities[usize::from(action.event)] => assert_eq!(
                        result,
                        Err(RegistrationError::Conflict(ConflictReason::NoSeatsAvailable))
                    ),
                    (true, false) => {
                        assert_eq!(result, Ok(true));
                        model.insert((action.user, action.event));
                    }
                    (false, true) => {
                        assert_eq!(result, Ok(true));
                        model.remove(&(action.user, action.event));
                    }
                    (false, false) => assert_eq!(result, Ok(false)),
                }
            }

            let events: Vec<EventRecord> = handle
                .get_events(&keys)
                .await
                .expect("events")
                .into_iter()
                .flatten()
                .collect();
            let ids: Vec<String> = (0u8..6).map(|i| format!("u{i}")).collect();
            let users: Vec<UserRecord> = handle
                .get_users(&ids)
                .await
                .expect("users")
                .into_iter()
                .flatten()
                .collect();

            for event in &events {
                let holders = users.iter().filter(|u| u.is_attending(&event.key)).count() as u32;
                assert_eq!(event.seats_available, event.max_attendees - holders);
            }
            for user in &users {
                let distinct: BTreeSet<_> = user.attending.iter().collect();
                assert_eq!(distinct.len(), user.attending.len());
            }
        });
    }

    #[test]
    fn compiled_queries_have_at_most_one_range_field(
        ops in proptest::collection::vec(
            (
                prop_oneof![Just("CITY"), Just("TOPIC"), Just("MONTH"), Just("MAX_ATTENDEES")],
                prop_oneof![Just("EQ"), Just("GT"), Just("GTEQ"), Just("LT"), Just("LTEQ"), Just("NE")],
            ),
            0..6,
        ),
    ) {
        let clauses: Vec<Clause> = ops.iter().map(|(f, o)| Clause::new(*f, *o, "7")).collect();
        let ranged: BTreeSet<&str> = ops.iter().filter(|(_, o)| *o != "EQ").map(|(f, _)| *f).collect();

        match compile_filters(&clauses) {
            Ok(spec) => {
                prop_assert!(ranged.len() <= 1);
                prop_assert_eq!(spec.filters().len(), clauses.len());
                let expected_len = if spec.range_field().is_some() { 2 } else { 1 };
                prop_assert_eq!(spec.order().len(), expected_len);
            }
            Err(_) => prop_assert!(ranged.len() > 1),
        }
    }
}
