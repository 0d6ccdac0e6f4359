//! Pure order-intake dialogue: states, events, and the transition function.
//! No IO happens here; side effects are requested through [`StepCommand`]
//! values and their results come back as resumption events.

pub mod action;
pub mod engine;
pub mod states;

pub use action::CallbackAction;
pub use states::{
    Button, DialogState, Keyboard, OrderForm, PendingProduct, Reply, SessionEvent, StepCommand,
    StepOutcome,
};
