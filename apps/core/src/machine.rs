//! Conversation state machine.
//!
//! Each turn is `(state, intent) -> route -> handler -> Transition`. The routing table is a
//! plain function over the pair so it can be read (and tested) on its own; handlers do the
//! storage and session work and decide the next state.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::availability::free_slots_for_date;
use crate::calendar::{self, render_month, Direction, Navigation, YearMonth};
use crate::clock::Clock;
use crate::error::{EngineError, Result, ValidationError};
use crate::intent::{InfoPage, Intent};
use crate::models::{parse_name, Booking, ConversationId, Phone, UserProfile};
use crate::prompt::Prompt;
use crate::session::{to_delta, Purpose, SessionKey, SessionStore, SessionValue};
use crate::slots::{Slot, SLOT_TEMPLATE};
use crate::storage::Storage;

/// A conversation with no transition for this long falls back to `Idle`.
pub const STATE_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingName,
    AwaitingPhone,
    AwaitingRegistrationConfirm,
    AwaitingDateSelection,
    AwaitingTimeSelection,
    AwaitingBookingConfirm,
    AwaitingPhoneChangeInput,
    AwaitingPhoneChangeConfirm,
}

/// Outcome of one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: ConversationState,
    pub prompts: Vec<Prompt>,
}

impl Transition {
    fn to(next: ConversationState, prompts: Vec<Prompt>) -> Self {
        Self { next, prompts }
    }
}

/// Handler selected for a `(state, intent)` pair, with the intent's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Start,
    Cancel,
    MainMenu,
    RecordsMenu,
    Info(InfoPage),
    ListBookings,
    BeginBooking,
    BeginPhoneChange,
    EnterName(&'a str),
    EnterPhone(&'a str),
    ConfirmRegistration(bool),
    Navigate(Direction),
    PickDay(u32),
    BackToCalendar,
    PickSlot(Slot),
    ConfirmBooking(bool),
    EnterNewPhone(&'a str),
    ConfirmPhoneChange(bool),
}

/// Transition table. `None` means the intent is ignored in this state.
pub fn route(state: ConversationState, intent: &Intent) -> Option<Route<'_>> {
    use ConversationState as S;

    let route = match (state, intent) {
        (_, Intent::Start) => Route::Start,
        (_, Intent::Cancel) => Route::Cancel,

        (S::Idle, Intent::Back) => Route::MainMenu,
        (S::Idle, Intent::RecordsMenu) => Route::RecordsMenu,
        (S::Idle, Intent::Info(page)) => Route::Info(*page),
        (S::Idle, Intent::MyBookings) => Route::ListBookings,
        (S::Idle, Intent::AddBooking) => Route::BeginBooking,
        (S::Idle, Intent::ChangePhone) => Route::BeginPhoneChange,

        (S::AwaitingName, Intent::Text(text)) => Route::EnterName(text),
        (S::AwaitingPhone, Intent::Text(text)) => Route::EnterPhone(text),
        (S::AwaitingRegistrationConfirm, Intent::Yes) => Route::ConfirmRegistration(true),
        (S::AwaitingRegistrationConfirm, Intent::No) => Route::ConfirmRegistration(false),

        (S::AwaitingDateSelection, Intent::PrevMonth) => Route::Navigate(Direction::Previous),
        (S::AwaitingDateSelection, Intent::NextMonth) => Route::Navigate(Direction::Next),
        (S::AwaitingDateSelection, Intent::Day(day)) => Route::PickDay(*day),
        (S::AwaitingTimeSelection, Intent::Slot(slot)) => Route::PickSlot(*slot),
        (S::AwaitingTimeSelection, Intent::Back) => Route::BackToCalendar,
        (S::AwaitingBookingConfirm, Intent::Yes) => Route::ConfirmBooking(true),
        (S::AwaitingBookingConfirm, Intent::No) => Route::ConfirmBooking(false),

        (S::AwaitingPhoneChangeInput, Intent::Text(text)) => Route::EnterNewPhone(text),
        (S::AwaitingPhoneChangeConfirm, Intent::Yes) => Route::ConfirmPhoneChange(true),
        (S::AwaitingPhoneChangeConfirm, Intent::No) => Route::ConfirmPhoneChange(false),

        _ => return None,
    };
    Some(route)
}

#[derive(Debug, Default)]
struct StateCell {
    state: ConversationState,
    expires_at: DateTime<Utc>,
}

impl StateCell {
    fn current(&self, now: DateTime<Utc>) -> ConversationState {
        if self.expires_at > now {
            self.state
        } else {
            ConversationState::Idle
        }
    }
}

/// Drives every conversation. Turns for the same conversation run one at a time; turns for
/// different conversations run concurrently.
pub struct Engine {
    storage: Arc<dyn Storage>,
    sessions: SessionStore,
    clock: Arc<dyn Clock>,
    conversations: DashMap<ConversationId, Arc<Mutex<StateCell>>>,
    /// Held across "re-check slot + save booking".
    booking_lock: Mutex<()>,
    state_ttl: TimeDelta,
}

impl Engine {
    pub fn new(storage: Arc<dyn Storage>, sessions: SessionStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            sessions,
            clock,
            conversations: DashMap::new(),
            booking_lock: Mutex::new(()),
            state_ttl: to_delta(STATE_TTL),
        }
    }

    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = to_delta(ttl);
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn state(&self, conversation: ConversationId) -> ConversationState {
        let cell = self.conversations.get(&conversation).map(|c| c.value().clone());
        match cell {
            Some(cell) => cell.lock().await.current(self.clock.now()),
            None => ConversationState::Idle,
        }
    }

    /// Process one intent and return what to show.
    ///
    /// `SessionExpired` is absorbed here: the conversation goes back to `Idle` and the user is
    /// told to start over. Any other error leaves the state untouched so the turn can be retried.
    pub async fn handle(
        &self,
        conversation: ConversationId,
        intent: Intent,
    ) -> Result<Vec<Prompt>> {
        let cell = self
            .conversations
            .entry(conversation)
            .or_insert_with(|| Arc::new(Mutex::new(StateCell::default())))
            .value()
            .clone();
        let mut cell = cell.lock().await;
        let current = cell.current(self.clock.now());

        // an ignored intent must not extend the life of the current flow
        if route(current, &intent).is_none() {
            tracing::debug!(conversation = %conversation, state = ?current, ?intent, "intent ignored");
            return Ok(Vec::new());
        }

        match self.step(conversation, current, &intent).await {
            Ok(transition) => {
                if transition.next != current {
                    tracing::info!(
                        conversation = %conversation,
                        from = ?current,
                        to = ?transition.next,
                        "conversation transition"
                    );
                }
                cell.state = transition.next;
                cell.expires_at = self.expiry_from_now();
                Ok(transition.prompts)
            }
            Err(EngineError::SessionExpired) => {
                tracing::warn!(
                    conversation = %conversation,
                    state = ?current,
                    "session data expired, resetting conversation"
                );
                self.sessions.clear_conversation(conversation);
                cell.state = ConversationState::Idle;
                Ok(vec![Prompt::SessionExpiredError])
            }
            Err(err) => {
                tracing::warn!(
                    conversation = %conversation,
                    state = ?current,
                    error = %err,
                    "turn failed, state unchanged"
                );
                Err(err)
            }
        }
    }

    /// Run the handler for `(state, intent)` without touching the stored state.
    pub async fn step(
        &self,
        conversation: ConversationId,
        state: ConversationState,
        intent: &Intent,
    ) -> Result<Transition> {
        let Some(route) = route(state, intent) else {
            tracing::debug!(conversation = %conversation, ?state, ?intent, "intent ignored");
            return Ok(Transition::to(state, Vec::new()));
        };

        match route {
            Route::Start => self.start(conversation).await,
            Route::Cancel => {
                self.sessions.clear_conversation(conversation);
                Ok(Transition::to(
                    ConversationState::Idle,
                    vec![Prompt::Cancelled, Prompt::ShowMainMenu],
                ))
            }
            Route::MainMenu => Ok(idle(vec![Prompt::ShowMainMenu])),
            Route::Info(page) => Ok(idle(vec![Prompt::ShowInfo { page }])),
            Route::RecordsMenu => self.records_menu(conversation).await,
            Route::ListBookings => self.list_bookings(conversation).await,
            Route::BeginBooking => self.begin_booking(conversation).await,
            Route::BeginPhoneChange => self.begin_phone_change(conversation).await,
            Route::EnterName(text) => Ok(self.enter_name(conversation, text)),
            Route::EnterPhone(text) => self.enter_phone(conversation, text),
            Route::ConfirmRegistration(yes) => self.confirm_registration(conversation, yes).await,
            Route::Navigate(direction) => self.navigate(conversation, direction),
            Route::PickDay(day) => self.pick_day(conversation, day).await,
            Route::BackToCalendar => Ok(self.show_current_month(conversation, Vec::new())),
            Route::PickSlot(slot) => self.pick_slot(conversation, slot),
            Route::ConfirmBooking(yes) => self.confirm_booking(conversation, yes).await,
            Route::EnterNewPhone(text) => Ok(self.enter_new_phone(conversation, text)),
            Route::ConfirmPhoneChange(yes) => self.confirm_phone_change(conversation, yes).await,
        }
    }

    /// Drop conversations that are back to `Idle` and not in use. Returns how many went.
    pub fn purge_idle(&self) -> usize {
        let now = self.clock.now();
        let before = self.conversations.len();
        self.conversations.retain(|_, cell| {
            // a clone outside the map means a turn is in flight
            if Arc::strong_count(cell) > 1 {
                return true;
            }
            match cell.try_lock() {
                Ok(guard) => guard.current(now) != ConversationState::Idle,
                Err(_) => true,
            }
        });
        before.saturating_sub(self.conversations.len())
    }

    fn expiry_from_now(&self) -> DateTime<Utc> {
        self.clock
            .now()
            .checked_add_signed(self.state_ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn key(&self, conversation: ConversationId, purpose: Purpose) -> SessionKey {
        SessionKey::new(conversation, purpose)
    }

    fn require_text(&self, conversation: ConversationId, purpose: Purpose) -> Result<String> {
        self.sessions
            .text(self.key(conversation, purpose))
            .ok_or(EngineError::SessionExpired)
    }

    // ── Registration ──

    async fn start(&self, conversation: ConversationId) -> Result<Transition> {
        let exists = self.storage.user_exists(conversation).await?;
        self.sessions.clear_conversation(conversation);
        if exists {
            Ok(idle(vec![Prompt::ShowMainMenu]))
        } else {
            Ok(ask_name())
        }
    }

    fn enter_name(&self, conversation: ConversationId, text: &str) -> Transition {
        match parse_name(text) {
            Ok(name) => {
                self.sessions.set(
                    self.key(conversation, Purpose::Name),
                    SessionValue::Text(name.clone()),
                );
                Transition::to(ConversationState::AwaitingPhone, vec![Prompt::AskPhone { name }])
            }
            Err(_) => Transition::to(ConversationState::AwaitingName, vec![Prompt::InvalidName]),
        }
    }

    fn enter_phone(&self, conversation: ConversationId, text: &str) -> Result<Transition> {
        let phone = match Phone::parse(text) {
            Ok(phone) => phone,
            Err(_) => {
                return Ok(Transition::to(
                    ConversationState::AwaitingPhone,
                    vec![Prompt::InvalidPhone],
                ))
            }
        };
        let name = self.require_text(conversation, Purpose::Name)?;
        self.sessions.set(
            self.key(conversation, Purpose::Phone),
            SessionValue::Text(phone.as_str().to_string()),
        );
        Ok(Transition::to(
            ConversationState::AwaitingRegistrationConfirm,
            vec![Prompt::ConfirmRegistration { name, phone }],
        ))
    }

    async fn confirm_registration(
        &self,
        conversation: ConversationId,
        yes: bool,
    ) -> Result<Transition> {
        if !yes {
            return Ok(Transition::to(
                ConversationState::AwaitingName,
                vec![Prompt::RestartRegistration],
            ));
        }
        let name = self.require_text(conversation, Purpose::Name)?;
        let phone = Phone::parse(&self.require_text(conversation, Purpose::Phone)?)?;
        let profile = UserProfile {
            id: conversation,
            name,
            phone,
        };
        self.storage.save_user(&profile).await?;
        tracing::info!(conversation = %conversation, "user registered");
        self.sessions.remove(self.key(conversation, Purpose::Name));
        self.sessions.remove(self.key(conversation, Purpose::Phone));
        Ok(idle(vec![Prompt::Welcome, Prompt::ShowMainMenu]))
    }

    // ── Menus ──

    async fn records_menu(&self, conversation: ConversationId) -> Result<Transition> {
        if !self.storage.user_exists(conversation).await? {
            return Ok(ask_name());
        }
        let profile = self.storage.get_user(conversation).await?;
        Ok(idle(vec![Prompt::ShowRecordsMenu { profile }]))
    }

    async fn list_bookings(&self, conversation: ConversationId) -> Result<Transition> {
        let offset = self.clock.offset();
        let bookings: Vec<_> = self
            .storage
            .list_future_bookings(conversation, self.clock.now())
            .await?
            .into_iter()
            .map(|at| at.with_timezone(&offset))
            .collect();
        if bookings.is_empty() {
            Ok(idle(vec![Prompt::NoBookings]))
        } else {
            Ok(idle(vec![Prompt::ShowBookings { bookings }]))
        }
    }

    // ── Booking ──

    async fn begin_booking(&self, conversation: ConversationId) -> Result<Transition> {
        if !self.storage.user_exists(conversation).await? {
            return Ok(ask_name());
        }
        Ok(self.show_current_month(conversation, Vec::new()))
    }

    /// Put `month` on screen and remember it for navigation and day picks.
    fn calendar_prompt(&self, conversation: ConversationId, month: YearMonth) -> Prompt {
        self.sessions.set(
            self.key(conversation, Purpose::CalendarMonth),
            SessionValue::Date(month.first_day()),
        );
        Prompt::ShowCalendar {
            view: render_month(month),
        }
    }

    fn show_current_month(
        &self,
        conversation: ConversationId,
        mut prompts: Vec<Prompt>,
    ) -> Transition {
        let month = YearMonth::of(self.clock.business_today());
        prompts.push(self.calendar_prompt(conversation, month));
        Transition::to(ConversationState::AwaitingDateSelection, prompts)
    }

    fn displayed_month(&self, conversation: ConversationId) -> Result<YearMonth> {
        self.sessions
            .date(self.key(conversation, Purpose::CalendarMonth))
            .map(YearMonth::of)
            .ok_or(EngineError::SessionExpired)
    }

    fn navigate(&self, conversation: ConversationId, direction: Direction) -> Result<Transition> {
        let month = self.displayed_month(conversation)?;
        let prompts = match calendar::navigate(month, direction, self.clock.business_today()) {
            Navigation::Moved(target) => vec![self.calendar_prompt(conversation, target)],
            Navigation::Rejected(_) => {
                tracing::debug!(conversation = %conversation, %month, "navigation before current month refused");
                Vec::new()
            }
        };
        Ok(Transition::to(ConversationState::AwaitingDateSelection, prompts))
    }

    async fn pick_day(&self, conversation: ConversationId, day: u32) -> Result<Transition> {
        let month = self.displayed_month(conversation)?;
        let date = match calendar::validate_day(month, day, self.clock.business_today()) {
            Ok(date) => date,
            Err(ValidationError::PastDate(date)) => {
                return Ok(self.show_current_month(
                    conversation,
                    vec![Prompt::PastDateRejected { date }],
                ))
            }
            Err(_) => {
                let prompts = vec![
                    Prompt::InvalidDay { day },
                    self.calendar_prompt(conversation, month),
                ];
                return Ok(Transition::to(ConversationState::AwaitingDateSelection, prompts));
            }
        };

        self.sessions.set(
            self.key(conversation, Purpose::ChosenDate),
            SessionValue::Date(date),
        );
        let slots = free_slots_for_date(self.storage.as_ref(), self.clock.as_ref(), date).await?;
        Ok(Transition::to(
            ConversationState::AwaitingTimeSelection,
            vec![Prompt::ShowSlots { date, slots }],
        ))
    }

    fn pick_slot(&self, conversation: ConversationId, slot: Slot) -> Result<Transition> {
        let date = self
            .sessions
            .date(self.key(conversation, Purpose::ChosenDate))
            .ok_or(EngineError::SessionExpired)?;
        self.sessions.set(
            self.key(conversation, Purpose::ChosenDateTime),
            SessionValue::Instant(slot.on(date, self.clock.offset())),
        );
        Ok(Transition::to(
            ConversationState::AwaitingBookingConfirm,
            vec![Prompt::ConfirmBooking { date, slot }],
        ))
    }

    async fn confirm_booking(&self, conversation: ConversationId, yes: bool) -> Result<Transition> {
        if !yes {
            return Ok(self.show_current_month(conversation, Vec::new()));
        }
        let offset = self.clock.offset();
        let starts_at = self
            .sessions
            .instant(self.key(conversation, Purpose::ChosenDateTime))
            .ok_or(EngineError::SessionExpired)?;
        let local = starts_at.with_timezone(&offset);
        let date = local.date_naive();
        let slot = SLOT_TEMPLATE
            .iter()
            .copied()
            .find(|slot| slot.on(date, offset) == starts_at)
            .ok_or(EngineError::SessionExpired)?;
        let profile = self.storage.get_user(conversation).await?;

        {
            let _guard = self.booking_lock.lock().await;
            let free = free_slots_for_date(self.storage.as_ref(), self.clock.as_ref(), date).await?;
            if !free.contains(&slot) {
                tracing::info!(conversation = %conversation, %date, %slot, "slot no longer free");
                self.sessions.set(
                    self.key(conversation, Purpose::ChosenDate),
                    SessionValue::Date(date),
                );
                return Ok(Transition::to(
                    ConversationState::AwaitingTimeSelection,
                    vec![
                        Prompt::SlotTaken { date, slot },
                        Prompt::ShowSlots { date, slots: free },
                    ],
                ));
            }
            self.storage
                .save_booking(&Booking {
                    user: conversation,
                    starts_at,
                })
                .await?;
        }

        tracing::info!(conversation = %conversation, %starts_at, "booking saved");
        for purpose in [
            Purpose::CalendarMonth,
            Purpose::ChosenDate,
            Purpose::ChosenDateTime,
        ] {
            self.sessions.remove(self.key(conversation, purpose));
        }
        Ok(idle(vec![
            Prompt::BookingSaved,
            Prompt::NotifyOperator {
                at: local,
                name: profile.name,
                phone: profile.phone,
            },
        ]))
    }

    // ── Phone change ──

    async fn begin_phone_change(&self, conversation: ConversationId) -> Result<Transition> {
        if !self.storage.user_exists(conversation).await? {
            return Ok(ask_name());
        }
        Ok(Transition::to(
            ConversationState::AwaitingPhoneChangeInput,
            vec![Prompt::AskNewPhone],
        ))
    }

    fn enter_new_phone(&self, conversation: ConversationId, text: &str) -> Transition {
        match Phone::parse(text) {
            Ok(phone) => {
                self.sessions.set(
                    self.key(conversation, Purpose::PendingPhone),
                    SessionValue::Text(phone.as_str().to_string()),
                );
                Transition::to(
                    ConversationState::AwaitingPhoneChangeConfirm,
                    vec![Prompt::ConfirmPhoneChange { phone }],
                )
            }
            Err(_) => Transition::to(
                ConversationState::AwaitingPhoneChangeInput,
                vec![Prompt::InvalidPhone],
            ),
        }
    }

    async fn confirm_phone_change(
        &self,
        conversation: ConversationId,
        yes: bool,
    ) -> Result<Transition> {
        if !yes {
            return Ok(Transition::to(
                ConversationState::AwaitingPhoneChangeInput,
                vec![Prompt::ResendPhone],
            ));
        }
        let phone = Phone::parse(&self.require_text(conversation, Purpose::PendingPhone)?)?;
        self.storage.update_phone(conversation, &phone).await?;
        tracing::info!(conversation = %conversation, "phone number updated");
        self.sessions
            .remove(self.key(conversation, Purpose::PendingPhone));
        Ok(idle(vec![Prompt::PhoneSaved, Prompt::ShowMainMenu]))
    }
}

fn idle(prompts: Vec<Prompt>) -> Transition {
    Transition::to(ConversationState::Idle, prompts)
}

fn ask_name() -> Transition {
    Transition::to(ConversationState::AwaitingName, vec![Prompt::AskName])
}

// ── Tests ──
