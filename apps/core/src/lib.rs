//! Conversational appointment-scheduling engine.
//!
//! The crate knows nothing about chat transports or databases: the transport hands
//! [`Intent`]s to the [`Engine`] and renders the [`Prompt`]s it gets back, and persistence
//! is reached through the [`Storage`] trait.

pub mod availability;
pub mod calendar;
pub mod clock;
pub mod error;
pub mod intent;
pub mod machine;
pub mod models;
pub mod prompt;
pub mod session;
pub mod slots;
pub mod storage;

pub use availability::{compute_free_slots, free_slots_for_date};
pub use calendar::{Direction, MonthView, Navigation, YearMonth};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{EngineError, ValidationError};
pub use intent::{InfoPage, Intent};
pub use machine::{ConversationState, Engine, Transition};
pub use models::{Booking, ConversationId, Phone, UserProfile};
pub use prompt::Prompt;
pub use session::{Purpose, SessionKey, SessionStore, SessionValue};
pub use slots::{Slot, SLOT_TEMPLATE};
pub use storage::{MemoryStorage, Storage};
