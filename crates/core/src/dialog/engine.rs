//! Transition function for the order-intake dialogue.
//!
//! The engine is a pure function over `(state, form, event)`. Anything that
//! needs IO is returned as a [`StepCommand`] and its result re-enters the
//! engine as a resumption event, so every branch here is unit-testable
//! without a transport or a store.

use crate::dialog::action::CallbackAction;
use crate::dialog::states::{
    Button, DialogState, Keyboard, OrderForm, PendingProduct, Reply, SessionEvent, StepCommand,
    StepOutcome,
};
use crate::domain::order::{DraftKind, DraftPayload, SelectedItem};
use crate::domain::product::Product;

pub const BTN_RESTART: &str = "Start over";
pub const BTN_BACK: &str = "Back";
pub const BTN_CATALOG: &str = "Catalog item";
pub const BTN_CUSTOM: &str = "Custom item";
pub const BTN_CREATE_ORDER: &str = "Create order";
pub const BTN_HISTORY: &str = "History";
pub const DELIVERY_POST: &str = "Post";
pub const DELIVERY_COURIER: &str = "Courier";
pub const DELIVERY_CDEK: &str = "CDEK";
pub const BTN_CUSTOM_DELIVERY: &str = "Other";

/// Keyboard shown when no dialogue is active.
pub fn main_menu() -> Keyboard {
    Keyboard::new(vec![vec![Button::reply(BTN_CREATE_ORDER), Button::reply(BTN_HISTORY)]])
}

fn nav_keyboard() -> Keyboard {
    Keyboard::new(vec![vec![Button::reply(BTN_BACK), Button::reply(BTN_RESTART)]])
}

/// Entry point of a fresh intake dialogue. Also the target of every restart.
pub fn start() -> StepOutcome {
    StepOutcome::stay(
        DialogState::ChoosingType,
        OrderForm::default(),
        vec![Reply::with_keyboard(
            "What kind of order is it?",
            Keyboard::new(vec![
                vec![Button::reply(BTN_CATALOG), Button::reply(BTN_CUSTOM)],
                vec![Button::reply(BTN_RESTART)],
            ]),
        )],
    )
}

/// Advances the dialogue by one event.
pub fn transition(state: DialogState, form: OrderForm, event: SessionEvent) -> StepOutcome {
    // Restart outranks every state.
    match &event {
        SessionEvent::Text(text) if text.trim() == BTN_RESTART => return start(),
        SessionEvent::Action(CallbackAction::Restart) => return start(),
        _ => {}
    }

    match state {
        DialogState::Idle => StepOutcome::stay(state, form, Vec::new()),
        DialogState::ChoosingType => choose_type(form, event),
        DialogState::EnteringCustomName => enter_custom_name(form, event),
        DialogState::SearchingProduct => search_product(form, event),
        DialogState::SelectingProduct => select_product(form, event),
        DialogState::EnteringQuantity => enter_quantity(form, event),
        DialogState::EnteringRecipient => enter_recipient(form, event),
        DialogState::EnteringPhone => enter_phone(form, event),
        DialogState::EnteringAddress => enter_address(form, event),
        DialogState::EnteringPostcode => enter_postcode(form, event),
        DialogState::ChoosingDelivery => choose_delivery(form, event),
        DialogState::EnteringCustomDelivery => enter_custom_delivery(form, event),
    }
}

fn choose_type(form: OrderForm, event: SessionEvent) -> StepOutcome {
    let SessionEvent::Text(text) = event else {
        return StepOutcome::stay(DialogState::ChoosingType, form, Vec::new());
    };

    match text.trim() {
        BTN_CUSTOM => prompt_custom_name(form),
        BTN_CATALOG => prompt_search(form),
        _ => StepOutcome::stay(
            DialogState::ChoosingType,
            form,
            vec![Reply::plain("Please choose one of the order types below.")],
        ),
    }
}

fn prompt_custom_name(form: OrderForm) -> StepOutcome {
    StepOutcome::stay(
        DialogState::EnteringCustomName,
        form,
        vec![Reply::with_keyboard("Enter the name of the item you need.", nav_keyboard())],
    )
}

fn prompt_search(form: OrderForm) -> StepOutcome {
    StepOutcome::stay(
        DialogState::SearchingProduct,
        form,
        vec![Reply::with_keyboard("Enter a product name to search for.", nav_keyboard())],
    )
}

fn enter_custom_name(mut form: OrderForm, event: SessionEvent) -> StepOutcome {
    let SessionEvent::Text(text) = event else {
        return StepOutcome::stay(DialogState::EnteringCustomName, form, Vec::new());
    };
    let text = text.trim();

    if text == BTN_BACK {
        return start();
    }
    if text.is_empty() {
        return StepOutcome::stay(
            DialogState::EnteringCustomName,
            form,
            vec![Reply::plain("The item name must not be empty. Enter the name of the item.")],
        );
    }

    form.custom_name = Some(text.to_owned());
    prompt_recipient(form)
}

fn search_product(mut form: OrderForm, event: SessionEvent) -> StepOutcome {
    match event {
        SessionEvent::Text(text) => {
            let text = text.trim();
            if text == BTN_BACK {
                return start();
            }
            if text.is_empty() {
                return StepOutcome::stay(
                    DialogState::SearchingProduct,
                    form,
                    vec![Reply::plain("Enter at least one character to search for.")],
                );
            }

            form.search_query = Some(text.to_owned());
            StepOutcome {
                state: DialogState::SearchingProduct,
                form,
                replies: vec![Reply::plain("Searching the catalog...")],
                command: Some(StepCommand::SearchCatalog { query: text.to_owned() }),
            }
        }
        SessionEvent::CatalogResults { products, .. } => {
            if products.is_empty() {
                return StepOutcome::stay(
                    DialogState::SearchingProduct,
                    form,
                    vec![Reply::plain("No products found. Try a different search term.")],
                );
            }

            form.candidates = products;
            let keyboard = candidates_keyboard(&form.candidates);
            StepOutcome::stay(
                DialogState::SelectingProduct,
                form,
                vec![Reply::with_keyboard("Pick a product from the results:", keyboard)],
            )
        }
        _ => StepOutcome::stay(DialogState::SearchingProduct, form, Vec::new()),
    }
}

fn candidates_keyboard(candidates: &[Product]) -> Keyboard {
    let mut rows: Vec<Vec<Button>> = candidates
        .iter()
        .map(|product| {
            vec![Button::callback(
                product.name.clone(),
                CallbackAction::SelectProduct { id: product.id.clone() },
            )]
        })
        .collect();
    rows.push(vec![Button::callback(BTN_RESTART, CallbackAction::Restart)]);
    Keyboard::new(rows)
}

fn after_select_keyboard() -> Keyboard {
    Keyboard::new(vec![
        vec![
            Button::callback("Add another product", CallbackAction::AddMore),
            Button::callback("Back to search", CallbackAction::BackToSearch),
        ],
        vec![
            Button::callback("Done", CallbackAction::FinishSelection),
            Button::callback("Show selected", CallbackAction::ShowSelected),
        ],
        vec![Button::callback(BTN_RESTART, CallbackAction::Restart)],
    ])
}

fn size_keyboard(pending: &PendingProduct, sizes: &[String]) -> Keyboard {
    let mut rows: Vec<Vec<Button>> = sizes
        .iter()
        .map(|size| {
            vec![Button::callback(
                size.clone(),
                CallbackAction::SelectSize { id: pending.id.clone(), size: size.clone() },
            )]
        })
        .collect();
    rows.push(vec![Button::callback("Back to search", CallbackAction::BackToSearch)]);
    Keyboard::new(rows)
}

fn selection_overview(selected: &[SelectedItem]) -> Reply {
    let mut lines = vec!["Selected products:".to_owned()];
    for (position, item) in selected.iter().enumerate() {
        match &item.size {
            Some(size) => lines.push(format!("{}. {} (size {})", position + 1, item.name, size)),
            None => lines.push(format!("{}. {}", position + 1, item.name)),
        }
    }

    let mut rows: Vec<Vec<Button>> = selected
        .iter()
        .map(|item| {
            vec![Button::callback(
                format!("Remove {}", item.name),
                CallbackAction::DeleteProduct { id: item.product_id.clone() },
            )]
        })
        .collect();
    rows.push(vec![Button::callback("Clear all", CallbackAction::ClearAll)]);

    Reply::with_keyboard(lines.join("\n"), Keyboard::new(rows))
}

fn select_product(mut form: OrderForm, event: SessionEvent) -> StepOutcome {
    match event {
        SessionEvent::Action(CallbackAction::SelectProduct { id }) => {
            if form.selected.iter().any(|item| item.product_id == id) {
                return StepOutcome::stay(
                    DialogState::SelectingProduct,
                    form,
                    vec![Reply::plain("This product is already selected.")],
                );
            }
            if !form.candidates.iter().any(|product| product.id == id) {
                return StepOutcome::stay(
                    DialogState::SelectingProduct,
                    form,
                    vec![Reply::plain("Product not found. Pick one from the list.")],
                );
            }

            form.awaiting_fetch = Some(id.clone());
            StepOutcome {
                state: DialogState::SelectingProduct,
                form,
                replies: Vec::new(),
                command: Some(StepCommand::FetchProduct { id }),
            }
        }
        SessionEvent::ProductFetched { id, product } => {
            if form.awaiting_fetch.as_ref() != Some(&id) {
                return StepOutcome::stay(DialogState::SelectingProduct, form, Vec::new());
            }
            form.awaiting_fetch = None;

            let Some(product) = product else {
                // Deleted between search and selection; the intake cannot
                // continue with a stale candidate list.
                return StepOutcome::stay(
                    DialogState::Idle,
                    OrderForm::default(),
                    vec![Reply::with_keyboard(
                        "That product is no longer available. Start a new order when ready.",
                        main_menu(),
                    )],
                );
            };

            if product.has_sizes() {
                let pending = PendingProduct { id: product.id.clone(), name: product.name.clone() };
                let keyboard = size_keyboard(&pending, &product.sizes);
                form.pending_size = Some(pending);
                return StepOutcome::stay(
                    DialogState::SelectingProduct,
                    form,
                    vec![Reply::with_keyboard(
                        format!("Pick a size for {}:", product.name),
                        keyboard,
                    )],
                );
            }

            form.selected.push(SelectedItem {
                product_id: product.id.clone(),
                name: product.name.clone(),
                size: None,
            });
            StepOutcome::stay(
                DialogState::SelectingProduct,
                form,
                vec![Reply::with_keyboard(
                    format!("Added {}.", product.name),
                    after_select_keyboard(),
                )],
            )
        }
        SessionEvent::Action(CallbackAction::SelectSize { id, size }) => {
            let matches_pending = form.pending_size.as_ref().is_some_and(|pending| pending.id == id);
            if !matches_pending {
                return StepOutcome::stay(
                    DialogState::SelectingProduct,
                    form,
                    vec![Reply::plain("Pick a product first.")],
                );
            }

            let pending = form.pending_size.take().unwrap_or(PendingProduct {
                id: id.clone(),
                name: String::new(),
            });
            form.selected.push(SelectedItem {
                product_id: pending.id,
                name: pending.name.clone(),
                size: Some(size),
            });
            StepOutcome::stay(
                DialogState::SelectingProduct,
                form,
                vec![Reply::with_keyboard(
                    format!("Added {}.", pending.name),
                    after_select_keyboard(),
                )],
            )
        }
        SessionEvent::Action(CallbackAction::AddMore) => prompt_search(form),
        SessionEvent::Action(CallbackAction::BackToSearch) => {
            form.selected.clear();
            form.pending_size = None;
            let keyboard = candidates_keyboard(&form.candidates);
            StepOutcome::stay(
                DialogState::SelectingProduct,
                form,
                vec![Reply::with_keyboard("Pick a product from the results:", keyboard)],
            )
        }
        SessionEvent::Action(CallbackAction::FinishSelection) => {
            if form.selected.is_empty() {
                return StepOutcome::stay(
                    DialogState::Idle,
                    OrderForm::default(),
                    vec![Reply::with_keyboard(
                        "You have not selected any products.",
                        main_menu(),
                    )],
                );
            }

            let count = form.selected.len();
            StepOutcome::stay(
                DialogState::EnteringQuantity,
                form,
                vec![Reply::with_keyboard(
                    format!(
                        "Enter exactly {count} quantities separated by commas (for example 2,3)."
                    ),
                    nav_keyboard(),
                )],
            )
        }
        SessionEvent::Action(CallbackAction::ShowSelected) => {
            if form.selected.is_empty() {
                return StepOutcome::stay(
                    DialogState::SelectingProduct,
                    form,
                    vec![Reply::plain("No selected products.")],
                );
            }
            let overview = selection_overview(&form.selected);
            StepOutcome::stay(DialogState::SelectingProduct, form, vec![overview])
        }
        SessionEvent::Action(CallbackAction::DeleteProduct { id }) => {
            form.selected.retain(|item| item.product_id != id);
            let reply = if form.selected.is_empty() {
                Reply::plain("No selected products.")
            } else {
                selection_overview(&form.selected)
            };
            StepOutcome::stay(DialogState::SelectingProduct, form, vec![reply])
        }
        SessionEvent::Action(CallbackAction::ClearAll) => {
            form.selected.clear();
            form.pending_size = None;
            StepOutcome::stay(
                DialogState::SelectingProduct,
                form,
                vec![Reply::plain("Selection cleared.")],
            )
        }
        SessionEvent::Text(_) => StepOutcome::stay(
            DialogState::SelectingProduct,
            form,
            vec![Reply::plain("Use the buttons to pick a product.")],
        ),
        _ => StepOutcome::stay(DialogState::SelectingProduct, form, Vec::new()),
    }
}

fn enter_quantity(mut form: OrderForm, event: SessionEvent) -> StepOutcome {
    let SessionEvent::Text(text) = event else {
        return StepOutcome::stay(DialogState::EnteringQuantity, form, Vec::new());
    };
    let text = text.trim();

    if text == BTN_BACK {
        return prompt_search(form);
    }

    let expected = form.selected.len();
    match parse_quantities(text, expected) {
        Some(quantities) => {
            form.quantities = quantities;
            prompt_recipient(form)
        }
        None => StepOutcome::stay(
            DialogState::EnteringQuantity,
            form,
            vec![Reply::plain(format!(
                "Enter exactly {expected} whole numbers of at least 1, separated by commas."
            ))],
        ),
    }
}

/// All-or-nothing: the whole list is rejected unless every entry is a whole
/// number of at least 1 and the count matches the selection.
fn parse_quantities(text: &str, expected: usize) -> Option<Vec<u32>> {
    let quantities: Vec<u32> = text
        .split(',')
        .map(|piece| piece.trim().parse::<u32>().ok().filter(|quantity| *quantity >= 1))
        .collect::<Option<Vec<u32>>>()?;

    (quantities.len() == expected).then_some(quantities)
}

fn prompt_recipient(form: OrderForm) -> StepOutcome {
    StepOutcome::stay(
        DialogState::EnteringRecipient,
        form,
        vec![Reply::with_keyboard("Enter the recipient's full name.", nav_keyboard())],
    )
}

fn enter_recipient(mut form: OrderForm, event: SessionEvent) -> StepOutcome {
    let SessionEvent::Text(text) = event else {
        return StepOutcome::stay(DialogState::EnteringRecipient, form, Vec::new());
    };
    let text = text.trim();

    if text == BTN_BACK {
        // The recipient step is shared by both intake branches.
        return if form.has_cart() {
            let count = form.selected.len();
            StepOutcome::stay(
                DialogState::EnteringQuantity,
                form,
                vec![Reply::with_keyboard(
                    format!(
                        "Enter exactly {count} quantities separated by commas (for example 2,3)."
                    ),
                    nav_keyboard(),
                )],
            )
        } else {
            prompt_custom_name(form)
        };
    }
    if text.is_empty() {
        return StepOutcome::stay(
            DialogState::EnteringRecipient,
            form,
            vec![Reply::plain("The recipient name must not be empty.")],
        );
    }

    form.recipient = Some(text.to_owned());
    StepOutcome::stay(
        DialogState::EnteringPhone,
        form,
        vec![Reply::with_keyboard("Enter a contact phone number.", nav_keyboard())],
    )
}

fn enter_phone(mut form: OrderForm, event: SessionEvent) -> StepOutcome {
    let SessionEvent::Text(text) = event else {
        return StepOutcome::stay(DialogState::EnteringPhone, form, Vec::new());
    };
    let text = text.trim();

    if text == BTN_BACK {
        return prompt_recipient(form);
    }
    if !text.chars().any(|ch| ch.is_ascii_digit()) {
        return StepOutcome::stay(
            DialogState::EnteringPhone,
            form,
            vec![Reply::plain("The phone number must contain at least one digit.")],
        );
    }

    form.phone = Some(text.to_owned());
    StepOutcome::stay(
        DialogState::EnteringAddress,
        form,
        vec![Reply::with_keyboard("Enter the delivery address.", nav_keyboard())],
    )
}

fn enter_address(mut form: OrderForm, event: SessionEvent) -> StepOutcome {
    let SessionEvent::Text(text) = event else {
        return StepOutcome::stay(DialogState::EnteringAddress, form, Vec::new());
    };
    let text = text.trim();

    if text == BTN_BACK {
        return StepOutcome::stay(
            DialogState::EnteringPhone,
            form,
            vec![Reply::with_keyboard("Enter a contact phone number.", nav_keyboard())],
        );
    }
    if text.is_empty() {
        return StepOutcome::stay(
            DialogState::EnteringAddress,
            form,
            vec![Reply::plain("The address must not be empty.")],
        );
    }

    form.address = Some(text.to_owned());
    StepOutcome::stay(
        DialogState::EnteringPostcode,
        form,
        vec![Reply::with_keyboard("Enter the postal code (digits only).", nav_keyboard())],
    )
}

fn enter_postcode(mut form: OrderForm, event: SessionEvent) -> StepOutcome {
    let SessionEvent::Text(text) = event else {
        return StepOutcome::stay(DialogState::EnteringPostcode, form, Vec::new());
    };
    let text = text.trim();

    if text == BTN_BACK {
        return StepOutcome::stay(
            DialogState::EnteringAddress,
            form,
            vec![Reply::with_keyboard("Enter the delivery address.", nav_keyboard())],
        );
    }
    if text.is_empty() || !text.chars().all(|ch| ch.is_ascii_digit()) {
        return StepOutcome::stay(
            DialogState::EnteringPostcode,
            form,
            vec![Reply::plain("The postal code must consist of digits only.")],
        );
    }

    form.postal_code = Some(text.to_owned());
    prompt_delivery(form)
}

fn prompt_delivery(form: OrderForm) -> StepOutcome {
    StepOutcome::stay(
        DialogState::ChoosingDelivery,
        form,
        vec![Reply::with_keyboard(
            "Choose a delivery method.",
            Keyboard::new(vec![
                vec![Button::reply(DELIVERY_POST), Button::reply(DELIVERY_COURIER)],
                vec![Button::reply(DELIVERY_CDEK), Button::reply(BTN_CUSTOM_DELIVERY)],
                vec![Button::reply(BTN_BACK), Button::reply(BTN_RESTART)],
            ]),
        )],
    )
}

fn choose_delivery(form: OrderForm, event: SessionEvent) -> StepOutcome {
    let SessionEvent::Text(text) = event else {
        return StepOutcome::stay(DialogState::ChoosingDelivery, form, Vec::new());
    };

    match text.trim() {
        BTN_BACK => StepOutcome::stay(
            DialogState::EnteringPostcode,
            form,
            vec![Reply::with_keyboard("Enter the postal code (digits only).", nav_keyboard())],
        ),
        BTN_CUSTOM_DELIVERY => StepOutcome::stay(
            DialogState::EnteringCustomDelivery,
            form,
            vec![Reply::with_keyboard("Describe your delivery method.", nav_keyboard())],
        ),
        choice @ (DELIVERY_POST | DELIVERY_COURIER | DELIVERY_CDEK) => submit(form, choice),
        _ => StepOutcome::stay(
            DialogState::ChoosingDelivery,
            form,
            vec![Reply::plain("Please choose one of the delivery methods below.")],
        ),
    }
}

fn enter_custom_delivery(form: OrderForm, event: SessionEvent) -> StepOutcome {
    let SessionEvent::Text(text) = event else {
        return StepOutcome::stay(DialogState::EnteringCustomDelivery, form, Vec::new());
    };
    let text = text.trim();

    if text == BTN_BACK {
        return prompt_delivery(form);
    }
    if text.is_empty() {
        return StepOutcome::stay(
            DialogState::EnteringCustomDelivery,
            form,
            vec![Reply::plain("The delivery description must not be empty.")],
        );
    }

    submit(form, text)
}

/// Folds the completed form into a draft and ends the dialogue. The driver
/// owns everything past this point: persisting, confirming, notifying.
fn submit(form: OrderForm, delivery: &str) -> StepOutcome {
    let kind = if form.has_cart() {
        DraftKind::Catalog {
            product_ids: form.selected.iter().map(|item| item.product_id.clone()).collect(),
            quantities: form.quantities.clone(),
            sizes: form.selected.iter().map(|item| item.size.clone()).collect(),
        }
    } else {
        DraftKind::Custom { name: form.custom_name.clone().unwrap_or_default() }
    };

    let payload = DraftPayload {
        kind,
        recipient: form.recipient.unwrap_or_default(),
        phone: form.phone.unwrap_or_default(),
        address: form.address.unwrap_or_default(),
        postal_code: form.postal_code.unwrap_or_default(),
        delivery: delivery.to_owned(),
    };

    StepOutcome {
        state: DialogState::Idle,
        form: OrderForm::default(),
        replies: Vec::new(),
        command: Some(StepCommand::Submit(payload)),
    }
}
