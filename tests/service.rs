use chrono::{TimeZone, Utc};

use confcentral::{
    config::ConferenceConfig,
    core::{slot::AnnouncementSlot, store::ConferenceStore},
    error::{ConferenceError, ErrorKind},
    event::EventDraft,
    profile::ProfilePatch,
    query::Clause,
    runtime::handle::{ConferenceHandle, RuntimeConfig, spawn_conference},
    service::ConferenceService,
    types::{EventKey, Principal, SizePreference},
};

fn service() -> ConferenceService<ConferenceHandle, AnnouncementSlot> {
    let handle = spawn_conference(ConferenceStore::new(), None, RuntimeConfig::default());
    ConferenceService::new(handle, AnnouncementSlot::new(), &ConferenceConfig::default())
}

fn principal(id: &str) -> Principal {
    Principal::new(id, format!("{id}@example.com"))
}

fn draft(name: &str, city: &str, topics: &[&str], seats: u32) -> EventDraft {
    let mut draft = EventDraft::new(name, seats);
    draft.city = city.to_string();
    draft.topics = topics.iter().map(|t| (*t).to_string()).collect();
    draft
}

#[tokio::test]
async fn create_event_fills_defaults_and_indexes_by_organizer() {
    let svc = service();
    let organizer = principal("org");

    let mut with_date = EventDraft::new("Spring Summit", 0);
    with_date.start_date = Some(Utc.with_ymd_and_hms(2026, 4, 12, 9, 0, 0).unwrap());
    let dated = svc.create_event(&organizer, with_date).await.expect("create");
    assert_eq!(dated.city, "Default City");
    assert_eq!(dated.topics.iter().map(String::as_str).collect::<Vec<_>>(), vec!["Default", "Topic"]);
    assert_eq!(dated.month, 4);
    assert_eq!(dated.seats_available, 0);
    assert_eq!(dated.key.organizer, "org");

    let other = svc
        .create_event(&organizer, draft("Autumn Meetup", "Chicago", &["Rust"], 25))
        .await
        .expect("create");
    assert_eq!(other.seats_available, 25);
    assert_eq!(other.month, 0);

    let created = svc.events_created(&organizer).await.expect("created");
    assert_eq!(created.iter().map(|e| e.key.clone()).collect::<Vec<_>>(), vec![dated.key, other.key]);
    assert!(svc.events_created(&principal("nobody")).await.expect("none").is_empty());
}

#[tokio::test]
async fn unnamed_events_are_rejected() {
    let svc = service();
    let err = svc.create_event(&principal("org"), EventDraft::new("  ", 5)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(svc.events_created(&principal("org")).await.expect("list").is_empty());
}

#[tokio::test]
async fn get_event_resolves_the_organizer_name_and_encoded_keys() {
    let svc = service();
    let organizer = principal("org");
    svc.save_profile(
        &organizer,
        ProfilePatch {
            display_name: Some("Ada".to_string()),
            ..ProfilePatch::default()
        },
    )
    .await
    .expect("save");
    let event = svc.create_event(&organizer, EventDraft::new("Conf", 5)).await.expect("create");

    let view = svc.get_event_by_encoded(&event.key.encode()).await.expect("get");
    assert_eq!(view.event, event);
    assert_eq!(view.organizer_display_name, "Ada");

    let missing = svc.get_event(&EventKey::new("org", 77)).await.unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);

    let malformed = svc.get_event_by_encoded("no-dot-here").await.unwrap_err();
    assert!(matches!(malformed, ConferenceError::Key(_)));
}

#[tokio::test]
async fn profiles_are_created_on_first_access_and_patched() {
    let svc = service();
    let user = principal("u1");

    let profile = svc.get_profile(&user).await.expect("profile");
    assert_eq!(profile.display_name, "u1@example.com");
    assert_eq!(profile.size_preference, SizePreference::NotSpecified);

    let saved = svc
        .save_profile(
            &user,
            ProfilePatch {
                size_preference: Some(SizePreference::from_token("XL_W")),
                ..ProfilePatch::default()
            },
        )
        .await
        .expect("save");
    assert_eq!(saved.size_preference, SizePreference::XlW);
    assert_eq!(saved.display_name, "u1@example.com");
    assert_eq!(svc.get_profile(&user).await.expect("profile"), saved);
}

#[tokio::test]
async fn query_events_applies_filters_and_order() {
    let svc = service();
    let organizer = principal("org");
    for (name, city, topics, seats) in [
        ("Gamma", "Chicago", &["Web", "Rust"][..], 80),
        ("Alpha", "Chicago", &["Go"][..], 60),
        ("Beta", "Chicago", &["Rust"][..], 80),
        ("Delta", "Boston", &["Rust"][..], 200),
        ("Epsilon", "Chicago", &["Rust"][..], 20),
    ] {
        svc.create_event(&organizer, draft(name, city, topics, seats)).await.expect("create");
    }

    let names = |events: Vec<confcentral::event::EventRecord>| {
        events.into_iter().map(|e| e.name).collect::<Vec<_>>()
    };

    let hits = svc
        .query_events(&[Clause::new("CITY", "EQ", "Chicago"), Clause::new("MAX_ATTENDEES", "GT", "50")])
        .await
        .expect("query");
    assert_eq!(names(hits), vec!["Alpha", "Beta", "Gamma"]);

    let rust = svc.query_events(&[Clause::new("TOPIC", "EQ", "Rust")]).await.expect("query");
    assert_eq!(names(rust), vec!["Beta", "Delta", "Epsilon", "Gamma"]);

    let err = svc.query_events(&[Clause::new("VENUE", "EQ", "x")]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn registration_flow_through_the_facade() {
    let svc = service();
    let organizer = principal("org");
    let event = svc.create_event(&organizer, EventDraft::new("Solo", 1)).await.expect("create");

    assert!(svc.register(&principal("a"), &event.key).await.expect("register"));
    let err = svc.register(&principal("b"), &event.key).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(!err.is_retryable());

    let attending = svc.list_attending(&principal("a")).await.expect("list");
    assert_eq!(attending.len(), 1);
    assert_eq!(attending[0].organizer_display_name, "org@example.com");

    assert!(svc.unregister(&principal("a"), &event.key).await.expect("unregister"));
    assert!(!svc.unregister(&principal("a"), &event.key).await.expect("again"));

    let announcement = svc.refresh_announcement().await.expect("refresh");
    assert!(announcement.is_some_and(|a| a.ends_with("Solo")));
    assert!(svc.read_announcement().ends_with("Solo"));
}

#[tokio::test]
async fn latest_alert_is_the_newest_post() {
    let svc = service();
    assert_eq!(svc.latest_alert().await.expect("empty"), "");

    let admin = principal("admin");
    svc.post_alert(&admin, "Registration opens Monday").await.expect("post");
    svc.post_alert(&admin, "Keynote moved to hall B").await.expect("post");
    assert_eq!(svc.latest_alert().await.expect("latest"), "Keynote moved to hall B");

    let snapshot = svc.store().snapshot().expect("snapshot");
    assert_eq!(snapshot.alerts.len(), 2);
    assert_eq!(snapshot.alerts[1].author, "admin@example.com");
}
