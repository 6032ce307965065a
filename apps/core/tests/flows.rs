use std::sync::Arc;

use autoservice_core::{
    compute_free_slots, free_slots_for_date, ConversationId, ConversationState, Engine, Intent,
    ManualClock, MemoryStorage, Phone, Prompt, SessionStore, Slot, Storage, UserProfile,
    SLOT_TEMPLATE,
};
use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};

const ANNA: ConversationId = ConversationId(1001);

fn msk() -> FixedOffset {
    FixedOffset::east_opt(3 * 3600).unwrap()
}

fn setup() -> (Arc<MemoryStorage>, Arc<ManualClock>, Arc<Engine>) {
    let storage = Arc::new(MemoryStorage::new());
    let clock = Arc::new(ManualClock::new(
        msk()
            .with_ymd_and_hms(2026, 10, 16, 11, 0, 0)
            .unwrap()
            .with_timezone(&Utc),
        msk(),
    ));
    let engine = Engine::new(
        storage.clone(),
        SessionStore::new(clock.clone()),
        clock.clone(),
    );
    (storage, clock, Arc::new(engine))
}

#[tokio::test]
async fn registration_saves_exactly_one_user() {
    let (storage, _clock, engine) = setup();

    assert_eq!(
        engine.handle(ANNA, Intent::Start).await.unwrap(),
        vec![Prompt::AskName]
    );
    assert_eq!(
        engine.handle(ANNA, Intent::Text("Anna".into())).await.unwrap(),
        vec![Prompt::AskPhone {
            name: "Anna".into()
        }]
    );
    assert_eq!(
        engine
            .handle(ANNA, Intent::Text("5551234".into()))
            .await
            .unwrap(),
        vec![Prompt::ConfirmRegistration {
            name: "Anna".into(),
            phone: Phone::parse("5551234").unwrap(),
        }]
    );
    let prompts = engine.handle(ANNA, Intent::Yes).await.unwrap();
    assert_eq!(prompts, vec![Prompt::Welcome, Prompt::ShowMainMenu]);

    let saved = storage.saved_users();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].name, "Anna");
    assert_eq!(saved[0].phone.as_str(), "5551234");
    assert_eq!(engine.state(ANNA).await, ConversationState::Idle);
}

#[tokio::test]
async fn booking_saves_slot_instant_and_removes_it_from_availability() {
    let (storage, clock, engine) = setup();
    storage
        .save_user(&UserProfile {
            id: ANNA,
            name: "Anna".into(),
            phone: Phone::parse("5551234").unwrap(),
        })
        .await
        .unwrap();
    let date = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();
    let nine = Slot::parse("09:00").unwrap();

    engine.handle(ANNA, Intent::AddBooking).await.unwrap();
    let prompts = engine.handle(ANNA, Intent::Day(20)).await.unwrap();
    assert_eq!(
        prompts,
        vec![Prompt::ShowSlots {
            date,
            slots: SLOT_TEMPLATE.to_vec()
        }]
    );
    assert_eq!(
        engine.handle(ANNA, Intent::Slot(nine)).await.unwrap(),
        vec![Prompt::ConfirmBooking { date, slot: nine }]
    );
    let prompts = engine.handle(ANNA, Intent::Yes).await.unwrap();
    assert_eq!(prompts[0], Prompt::BookingSaved);
    assert_eq!(engine.state(ANNA).await, ConversationState::Idle);

    let bookings = storage.bookings();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].user, ANNA);
    assert_eq!(
        bookings[0].starts_at,
        msk().with_ymd_and_hms(2026, 10, 20, 9, 0, 0).unwrap()
    );

    let free = free_slots_for_date(storage.as_ref(), clock.as_ref(), date)
        .await
        .unwrap();
    assert!(!free.contains(&nine));
    assert_eq!(free, SLOT_TEMPLATE[1..].to_vec());
}

#[tokio::test]
async fn yesterday_rejected_today_accepted() {
    let (storage, _clock, engine) = setup();
    storage
        .save_user(&UserProfile {
            id: ANNA,
            name: "Anna".into(),
            phone: Phone::parse("5551234").unwrap(),
        })
        .await
        .unwrap();
    engine.handle(ANNA, Intent::AddBooking).await.unwrap();

    let prompts = engine.handle(ANNA, Intent::Day(15)).await.unwrap();
    assert!(matches!(prompts[0], Prompt::PastDateRejected { .. }));
    assert_eq!(
        engine.state(ANNA).await,
        ConversationState::AwaitingDateSelection
    );

    let prompts = engine.handle(ANNA, Intent::Day(16)).await.unwrap();
    assert!(matches!(prompts[0], Prompt::ShowSlots { .. }));
    assert_eq!(
        engine.state(ANNA).await,
        ConversationState::AwaitingTimeSelection
    );
}

#[tokio::test]
async fn two_conversations_cannot_book_the_same_slot() {
    let (storage, _clock, engine) = setup();
    let oleg = ConversationId(2002);
    for (id, name) in [(ANNA, "Anna"), (oleg, "Oleg")] {
        storage
            .save_user(&UserProfile {
                id,
                name: name.into(),
                phone: Phone::parse("5551234").unwrap(),
            })
            .await
            .unwrap();
    }
    let nine = Slot::parse("09:00").unwrap();
    for id in [ANNA, oleg] {
        engine.handle(id, Intent::AddBooking).await.unwrap();
        engine.handle(id, Intent::Day(21)).await.unwrap();
        engine.handle(id, Intent::Slot(nine)).await.unwrap();
    }

    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.handle(ANNA, Intent::Yes).await.unwrap() }
    });
    let second = tokio::spawn({
        let engine = engine.clone();
        async move { engine.handle(oleg, Intent::Yes).await.unwrap() }
    });
    let outcomes = [first.await.unwrap(), second.await.unwrap()];

    let saved = outcomes
        .iter()
        .filter(|p| p.first() == Some(&Prompt::BookingSaved))
        .count();
    let taken = outcomes
        .iter()
        .filter(|p| matches!(p.first(), Some(Prompt::SlotTaken { .. })))
        .count();
    assert_eq!((saved, taken), (1, 1));
    assert_eq!(storage.bookings().len(), 1);
}

#[test]
fn same_day_cutoff_example() {
    let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
    let now = msk()
        .with_ymd_and_hms(2026, 10, 16, 12, 15, 0)
        .unwrap()
        .with_timezone(&Utc);
    let labels: Vec<_> = compute_free_slots(date, &[], now, msk())
        .iter()
        .map(|s| s.label())
        .collect();
    assert_eq!(labels, ["13:30", "15:00", "16:30", "18:00", "19:30"]);
}
