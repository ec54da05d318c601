pub mod availability;
pub mod draft;
pub mod event;
pub mod intent;
pub mod session;
pub mod slot;

pub use availability::BusinessHours;
pub use draft::AppointmentDraft;
pub use event::{BookingOutcome, CalendarEvent, NewEvent};
pub use intent::{ExtractedDetails, Intent, IntentResult};
pub use session::{
    ConversationMessage, DialogueState, Role, Session, StateSnapshot, TurnResponse,
};
pub use slot::TimeSlot;
