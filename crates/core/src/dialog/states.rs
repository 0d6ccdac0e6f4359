use crate::dialog::action::CallbackAction;
use crate::domain::order::{DraftPayload, SelectedItem};
use crate::domain::product::{Product, ProductId};

/// Where a dialogue currently waits for input. `Idle` means no order intake
/// is in progress; anything else is one step of the intake flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialogState {
    Idle,
    ChoosingType,
    EnteringCustomName,
    SearchingProduct,
    SelectingProduct,
    EnteringQuantity,
    EnteringRecipient,
    EnteringPhone,
    EnteringAddress,
    EnteringPostcode,
    ChoosingDelivery,
    EnteringCustomDelivery,
}

/// Input the engine reacts to. `Text` and `Action` arrive from the chat
/// transport; the other two resume a step after the requested IO finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Text(String),
    Action(CallbackAction),
    CatalogResults { query: String, products: Vec<Product> },
    ProductFetched { id: ProductId, product: Option<Product> },
}

/// Product picked from the search results but still waiting for its size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingProduct {
    pub id: ProductId,
    pub name: String,
}

/// Everything collected so far. Reset to default whenever the dialogue ends,
/// restarts, or an order is handed off for submission.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderForm {
    pub custom_name: Option<String>,
    pub search_query: Option<String>,
    pub candidates: Vec<Product>,
    pub selected: Vec<SelectedItem>,
    pub quantities: Vec<u32>,
    pub recipient: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub pending_size: Option<PendingProduct>,
    pub awaiting_fetch: Option<ProductId>,
}

impl OrderForm {
    pub fn has_cart(&self) -> bool {
        !self.selected.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Button {
    /// Plain reply-keyboard button; pressing it sends its label as text.
    Reply { label: String },
    /// Inline button carrying a typed action.
    Callback { label: String, action: CallbackAction },
}

impl Button {
    pub fn reply(label: impl Into<String>) -> Self {
        Self::Reply { label: label.into() }
    }

    pub fn callback(label: impl Into<String>, action: CallbackAction) -> Self {
        Self::Callback { label: label.into(), action }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new(rows: Vec<Vec<Button>>) -> Self {
        Self { rows }
    }
}

/// One message the engine wants sent back to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

impl Reply {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), keyboard: None }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self { text: text.into(), keyboard: Some(keyboard) }
    }
}

/// Side effect the driver must perform before the dialogue can continue.
/// `SearchCatalog` and `FetchProduct` results come back as resumption events;
/// `Submit` ends the dialogue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepCommand {
    SearchCatalog { query: String },
    FetchProduct { id: ProductId },
    Submit(DraftPayload),
}

/// Result of one transition: the next state and form, messages to send, and
/// at most one command for the driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepOutcome {
    pub state: DialogState,
    pub form: OrderForm,
    pub replies: Vec<Reply>,
    pub command: Option<StepCommand>,
}

impl StepOutcome {
    pub fn stay(state: DialogState, form: OrderForm, replies: Vec<Reply>) -> Self {
        Self { state, form, replies, command: None }
    }
}
