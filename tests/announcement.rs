use std::{sync::Arc, time::Duration};

use confcentral::{
    config::RetryPolicy,
    core::{slot::AnnouncementSlot, store::ConferenceStore},
    engine::{
        announcement::ScarcityRefresher,
        registration::RegistrationEngine,
        traits::{AnnouncementCache, Datastore},
    },
    event::EventDraft,
    runtime::handle::{ConferenceHandle, RuntimeConfig, spawn_conference},
    types::{EventKey, Principal},
};

async fn event_with_seats(handle: &ConferenceHandle, name: &str, seats: u32) -> EventKey {
    handle
        .insert_event(&"org".to_string(), EventDraft::new(name, seats))
        .await
        .expect("insert")
        .key
}

#[tokio::test]
async fn announcement_follows_scarcity_and_clears_when_sold_out() {
    let handle = spawn_conference(ConferenceStore::new(), None, RuntimeConfig::default());
    let slot = AnnouncementSlot::new();
    let refresher = ScarcityRefresher::new(handle.clone(), slot.clone());
    let key = event_with_seats(&handle, "Tiny Conf", 3).await;
    event_with_seats(&handle, "Huge Conf", 500).await;

    let announcement = refresher.refresh().await.expect("refresh").expect("announcement");
    assert!(announcement.contains("Tiny Conf"));
    assert!(!announcement.contains("Huge Conf"));
    assert_eq!(refresher.read_announcement(), announcement);

    let engine = RegistrationEngine::new(handle.clone(), RetryPolicy::default());
    for i in 0..3 {
        let user = Principal::new(format!("u{i}"), format!("u{i}@example.com"));
        engine.set_registration(&user, &key, true).await.expect("register");
    }

    assert_eq!(refresher.refresh().await, Ok(None));
    assert_eq!(slot.get(), None);
    assert_eq!(refresher.read_announcement(), "");
}

#[tokio::test]
async fn names_are_ordered_by_seats_then_name() {
    let handle = spawn_conference(ConferenceStore::new(), None, RuntimeConfig::default());
    event_with_seats(&handle, "Bravo", 5).await;
    event_with_seats(&handle, "Alpha", 5).await;
    event_with_seats(&handle, "Charlie", 1).await;
    event_with_seats(&handle, "Boundary", 6).await;

    let refresher = ScarcityRefresher::new(handle, AnnouncementSlot::new());
    let announcement = refresher.refresh().await.expect("refresh");
    assert_eq!(
        announcement.as_deref(),
        Some("Last chance to attend! The following conferences are nearly sold out: Charlie, Alpha, Bravo")
    );
}

#[tokio::test]
async fn refresh_overwrites_a_stale_value() {
    let handle = spawn_conference(ConferenceStore::new(), None, RuntimeConfig::default());
    let slot = AnnouncementSlot::new();
    slot.set("stale".to_string());

    let refresher = ScarcityRefresher::new(handle, slot.clone());
    assert_eq!(refresher.read_announcement(), "stale");
    refresher.refresh().await.expect("refresh");
    assert_eq!(slot.get(), None);
}

#[tokio::test]
async fn periodic_refresh_picks_up_new_events() {
    let handle = spawn_conference(ConferenceStore::new(), None, RuntimeConfig::default());
    let slot = AnnouncementSlot::new();
    let refresher = Arc::new(ScarcityRefresher::new(handle.clone(), slot.clone()));
    let task = refresher.spawn_periodic(Duration::from_millis(10));

    event_with_seats(&handle, "Late Addition", 2).await;

    let mut announced = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if slot.get().is_some_and(|a| a.ends_with("Late Addition")) {
            announced = true;
            break;
        }
    }
    task.abort();
    assert!(announced, "expected the periodic refresh to announce the new event");
}
