use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use intake_chat::{ChatTransport, InboundEvent, InboundHandler, InboundKind, OutboundMessage};
use intake_core::dialog::action::CallbackAction;
use intake_core::dialog::engine::{self, BTN_CREATE_ORDER, BTN_HISTORY};
use intake_core::dialog::{DialogState, OrderForm, Reply, SessionEvent, StepCommand, StepOutcome};
use intake_core::domain::account::Account;
use intake_core::domain::order::STATUS_PROCESSING;
use intake_core::errors::ApplicationError;
use intake_core::reconcile::StatusEntry;
use intake_store::{AccessRegistry, OrderVault, ProductCatalog};

use crate::reconcile::SharedSnapshot;

/// Drives one dialogue per chat identity. The router already serializes
/// events per user, so the session map is only contended across users.
pub struct SessionService<C, V, T> {
    registry: Arc<AccessRegistry>,
    catalog: Arc<C>,
    vault: Arc<V>,
    transport: Arc<T>,
    snapshot: SharedSnapshot,
    admin_chat_id: String,
    sessions: tokio::sync::Mutex<HashMap<String, SessionState>>,
}

struct SessionState {
    state: DialogState,
    form: OrderForm,
}

impl<C, V, T> SessionService<C, V, T>
where
    C: ProductCatalog,
    V: OrderVault,
    T: ChatTransport,
{
    pub fn new(
        registry: Arc<AccessRegistry>,
        catalog: Arc<C>,
        vault: Arc<V>,
        transport: Arc<T>,
        snapshot: SharedSnapshot,
        admin_chat_id: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            catalog,
            vault,
            transport,
            snapshot,
            admin_chat_id: admin_chat_id.into(),
            sessions: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    async fn take_session(&self, user: &str) -> (DialogState, OrderForm) {
        match self.sessions.lock().await.remove(user) {
            Some(session) => (session.state, session.form),
            None => (DialogState::Idle, OrderForm::default()),
        }
    }

    async fn store_session(&self, user: &str, state: DialogState, form: OrderForm) {
        if state == DialogState::Idle {
            return;
        }
        self.sessions.lock().await.insert(user.to_owned(), SessionState { state, form });
    }

    async fn send_reply(&self, user: &str, reply: Reply) {
        if let Err(err) = self.transport.send(user, reply.into()).await {
            error!(user, error = %err, "failed to deliver a reply");
        }
    }

    /// Aborts the dialogue after an infrastructure failure: the session is
    /// dropped and the user gets the error's safe one-liner.
    async fn fail(&self, user: &str, error: ApplicationError) {
        error!(user, error = %error, "dialogue step failed");
        self.sessions.lock().await.remove(user);
        self.send_reply(user, Reply::with_keyboard(error.user_message(), engine::main_menu()))
            .await;
    }

    async fn handle_text(&self, user: &str, text: String) {
        let Some(account) = self.registry.account(user).cloned() else {
            self.send_reply(user, Reply::plain("Access denied.")).await;
            return;
        };

        match text.as_str() {
            "/start" => {
                self.sessions.lock().await.remove(user);
                self.send_reply(
                    user,
                    Reply::with_keyboard(
                        "Welcome to the order bot. Use the buttons below.",
                        engine::main_menu(),
                    ),
                )
                .await;
            }
            "/create" | BTN_CREATE_ORDER => self.apply(user, &account, engine::start()).await,
            "/history" | BTN_HISTORY => self.send_history(user, &account).await,
            _ => {
                let (state, form) = self.take_session(user).await;
                if state == DialogState::Idle {
                    self.send_reply(
                        user,
                        Reply::with_keyboard(
                            "Use the menu below to create an order or view your history.",
                            engine::main_menu(),
                        ),
                    )
                    .await;
                    return;
                }

                let outcome = engine::transition(state, form, SessionEvent::Text(text));
                self.apply(user, &account, outcome).await;
            }
        }
    }

    async fn handle_action(&self, user: &str, action: CallbackAction) {
        let Some(account) = self.registry.account(user).cloned() else {
            return;
        };

        let (state, form) = self.take_session(user).await;
        if state == DialogState::Idle {
            // Stale button from a finished dialogue.
            return;
        }

        let outcome = engine::transition(state, form, SessionEvent::Action(action));
        self.apply(user, &account, outcome).await;
    }

    /// Sends the outcome's replies and services its command, feeding IO
    /// results back into the engine until the step settles.
    async fn apply(&self, user: &str, account: &Account, mut outcome: StepOutcome) {
        loop {
            for reply in std::mem::take(&mut outcome.replies) {
                self.send_reply(user, reply).await;
            }

            match outcome.command.take() {
                None => {
                    self.store_session(user, outcome.state, outcome.form).await;
                    return;
                }
                Some(StepCommand::SearchCatalog { query }) => {
                    match self.catalog.search_visible(&query, &account.department).await {
                        Ok(products) => {
                            outcome = engine::transition(
                                outcome.state,
                                outcome.form,
                                SessionEvent::CatalogResults { query, products },
                            );
                        }
                        Err(err) => {
                            self.fail(user, ApplicationError::Store(err.to_string())).await;
                            return;
                        }
                    }
                }
                Some(StepCommand::FetchProduct { id }) => match self.catalog.fetch(&id).await {
                    Ok(product) => {
                        outcome = engine::transition(
                            outcome.state,
                            outcome.form,
                            SessionEvent::ProductFetched { id, product },
                        );
                    }
                    Err(err) => {
                        self.fail(user, ApplicationError::Store(err.to_string())).await;
                        return;
                    }
                },
                Some(StepCommand::Submit(payload)) => {
                    self.submit(user, account, payload).await;
                    return;
                }
            }
        }
    }

    async fn submit(
        &self,
        user: &str,
        account: &Account,
        payload: intake_core::domain::order::DraftPayload,
    ) {
        self.sessions.lock().await.remove(user);
        let draft = payload.with_owner(account.record_id.clone());

        match self.vault.submit(&draft).await {
            Ok(receipt) => {
                info!(
                    event_name = "order.submitted",
                    user,
                    order_number = %receipt.order_number,
                    kind = draft.kind.type_label(),
                    "order submitted"
                );
                self.send_reply(
                    user,
                    Reply::with_keyboard(
                        format!("✅ Order {} created.", receipt.order_number),
                        engine::main_menu(),
                    ),
                )
                .await;

                // Admin notice is best effort; the order already exists.
                let notice = format!(
                    "New order {} from {} (type: {})",
                    receipt.order_number,
                    user,
                    draft.kind.type_label()
                );
                if let Err(err) =
                    self.transport.send(&self.admin_chat_id, OutboundMessage::plain(notice)).await
                {
                    error!(error = %err, "failed to notify the administrator about a new order");
                }

                // Seed the snapshot so the reconciler does not re-announce
                // the initial status on its next cycle.
                self.snapshot.lock().await.insert(
                    receipt.record_id,
                    StatusEntry {
                        status: STATUS_PROCESSING.to_owned(),
                        tracking: None,
                        order_number: receipt.order_number,
                    },
                );
            }
            Err(err) => {
                self.fail(user, ApplicationError::Store(err.to_string())).await;
            }
        }
    }

    async fn send_history(&self, user: &str, account: &Account) {
        match self.vault.history_for(&account.record_id).await {
            Ok(blocks) if blocks.is_empty() => {
                self.send_reply(
                    user,
                    Reply::with_keyboard("You have no orders yet.", engine::main_menu()),
                )
                .await;
            }
            Ok(blocks) => {
                self.send_reply(
                    user,
                    Reply::with_keyboard(blocks.join("\n\n"), engine::main_menu()),
                )
                .await;
            }
            Err(err) => {
                let error = ApplicationError::Store(err.to_string());
                error!(user, error = %error, "failed to load the order history");
                self.send_reply(user, Reply::plain(error.user_message())).await;
            }
        }
    }
}

#[async_trait]
impl<C, V, T> InboundHandler for SessionService<C, V, T>
where
    C: ProductCatalog + 'static,
    V: OrderVault + 'static,
    T: ChatTransport + 'static,
{
    async fn handle(&self, event: InboundEvent) {
        let user = event.user;
        match event.kind {
            InboundKind::Text(text) => self.handle_text(&user, text.trim().to_owned()).await,
            InboundKind::Action(action) => self.handle_action(&user, action).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    use super::SessionService;
    use crate::reconcile::SharedSnapshot;
    use intake_chat::{
        ChatTransport, InboundEvent, InboundHandler, InboundKind, OutboundMessage, TransportError,
    };
    use intake_core::dialog::action::CallbackAction;
    use intake_core::domain::product::ProductId;
    use intake_core::domain::RecordId;
    use intake_store::{AccessRegistry, InMemoryRecordStore, StoreCatalog, StoreVault};

    const ADMIN: &str = "admin-chat";

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, OutboundMessage)>>,
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn next_event(&self) -> Result<Option<InboundEvent>, TransportError> {
            Ok(None)
        }

        async fn send(&self, user: &str, message: OutboundMessage) -> Result<(), TransportError> {
            self.sent.lock().await.push((user.to_owned(), message));
            Ok(())
        }
    }

    impl RecordingTransport {
        async fn texts_for(&self, user: &str) -> Vec<String> {
            self.sent
                .lock()
                .await
                .iter()
                .filter(|(recipient, _)| recipient == user)
                .map(|(_, message)| message.text.clone())
                .collect()
        }
    }

    type Service = SessionService<
        StoreCatalog<InMemoryRecordStore>,
        StoreVault<InMemoryRecordStore>,
        RecordingTransport,
    >;

    fn object(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        let serde_json::Value::Object(map) = value else {
            panic!("fixture must be an object");
        };
        map
    }

    fn store_config() -> intake_core::config::StoreConfig {
        intake_core::config::StoreConfig {
            base_url: "https://store.invalid/v0".to_owned(),
            api_key: String::from("unused").into(),
            base_id: "appTest".to_owned(),
            users_table: "Users".to_owned(),
            products_table: "Products".to_owned(),
            orders_table: "Orders".to_owned(),
            custom_orders_table: "Custom_Orders".to_owned(),
        }
    }

    async fn service_fixture() -> (Arc<InMemoryRecordStore>, Arc<RecordingTransport>, SharedSnapshot, Service)
    {
        let store = Arc::new(InMemoryRecordStore::new());
        store
            .seed("Users", "recUser", object(json!({ "Chat_ID": "111", "Department": "Common" })))
            .await;
        store
            .seed(
                "Products",
                "recMug",
                object(json!({ "Name": "Mug", "Stock": 4, "Department": "Common" })),
            )
            .await;

        let registry = Arc::new(AccessRegistry::load(store.as_ref(), "Users").await);
        let catalog = Arc::new(StoreCatalog::new(Arc::clone(&store), "Products"));
        let vault = Arc::new(StoreVault::new(Arc::clone(&store), &store_config()));
        let transport = Arc::new(RecordingTransport::default());
        let snapshot: SharedSnapshot = Arc::new(Mutex::new(Default::default()));

        let service = SessionService::new(
            registry,
            catalog,
            vault,
            Arc::clone(&transport),
            Arc::clone(&snapshot),
            ADMIN,
        );

        (store, transport, snapshot, service)
    }

    async fn say(service: &Service, user: &str, text: &str) {
        service
            .handle(InboundEvent { user: user.to_owned(), kind: InboundKind::Text(text.to_owned()) })
            .await;
    }

    async fn press(service: &Service, user: &str, action: CallbackAction) {
        service
            .handle(InboundEvent { user: user.to_owned(), kind: InboundKind::Action(action) })
            .await;
    }

    #[tokio::test]
    async fn unknown_identities_are_denied() {
        let (_store, transport, _snapshot, service) = service_fixture().await;

        say(&service, "222", "/create").await;

        let texts = transport.texts_for("222").await;
        assert_eq!(texts, vec!["Access denied.".to_owned()]);
    }

    #[tokio::test]
    async fn full_catalog_intake_persists_and_announces_the_order() {
        let (store, transport, snapshot, service) = service_fixture().await;

        say(&service, "111", "/create").await;
        say(&service, "111", "Catalog item").await;
        say(&service, "111", "mug").await;
        press(&service, "111", CallbackAction::SelectProduct {
            id: ProductId("recMug".to_owned()),
        })
        .await;
        press(&service, "111", CallbackAction::FinishSelection).await;
        say(&service, "111", "2").await;
        say(&service, "111", "Jane Roe").await;
        say(&service, "111", "555-0100").await;
        say(&service, "111", "1 Main St").await;
        say(&service, "111", "12345").await;
        say(&service, "111", "Post").await;

        let orders = store.records("Orders").await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].text("Status"), Some("Processing"));
        assert_eq!(orders[0].first_link("User"), Some(RecordId("recUser".to_owned())));

        let texts = transport.texts_for("111").await;
        assert!(texts.iter().any(|text| text.contains("Order A-0001 created")));

        let admin_texts = transport.texts_for(ADMIN).await;
        assert_eq!(admin_texts.len(), 1);
        assert!(admin_texts[0].contains("New order A-0001 from 111 (type: catalog)"));

        let snapshot = snapshot.lock().await;
        let entry = snapshot.get(&orders[0].id).expect("snapshot entry for the new order");
        assert_eq!(entry.status, "Processing");
    }

    #[tokio::test]
    async fn custom_intake_lands_in_the_custom_table() {
        let (store, _transport, _snapshot, service) = service_fixture().await;

        say(&service, "111", "Create order").await;
        say(&service, "111", "Custom item").await;
        say(&service, "111", "Ceramic vase").await;
        say(&service, "111", "Jane Roe").await;
        say(&service, "111", "555-0100").await;
        say(&service, "111", "1 Main St").await;
        say(&service, "111", "12345").await;
        say(&service, "111", "Courier").await;

        let orders = store.records("Custom_Orders").await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].text("Custom_Name"), Some("Ceramic vase"));
        assert!(store.records("Orders").await.is_empty());
    }

    #[tokio::test]
    async fn store_outage_aborts_the_dialogue_with_a_safe_message() {
        let (store, transport, _snapshot, service) = service_fixture().await;

        say(&service, "111", "/create").await;
        say(&service, "111", "Catalog item").await;
        store.set_fail(true).await;
        say(&service, "111", "mug").await;

        let texts = transport.texts_for("111").await;
        let last = texts.last().expect("at least one reply");
        assert!(last.contains("Please try again later"));

        // The session is gone: new text falls back to the menu hint.
        store.set_fail(false).await;
        say(&service, "111", "mug").await;
        let texts = transport.texts_for("111").await;
        assert!(texts.last().is_some_and(|text| text.contains("Use the menu")));
    }

    #[tokio::test]
    async fn history_lists_the_users_own_orders() {
        let (store, transport, _snapshot, service) = service_fixture().await;
        store
            .seed(
                "Orders",
                "recO1",
                object(json!({
                    "Status": "Shipped", "Order_Number": "A-9",
                    "Products": ["recMug"], "Quantity": "1", "Size": "none",
                    "User": ["recUser"]
                })),
            )
            .await;

        say(&service, "111", "/history").await;

        let texts = transport.texts_for("111").await;
        let history = texts.last().expect("history reply");
        assert!(history.contains("Order A-9"));
        assert!(history.contains("Mug x1"));
        assert!(history.contains("Status: Shipped"));
    }

    #[tokio::test]
    async fn stale_callbacks_outside_a_dialogue_are_ignored() {
        let (_store, transport, _snapshot, service) = service_fixture().await;

        press(&service, "111", CallbackAction::FinishSelection).await;

        assert!(transport.texts_for("111").await.is_empty());
    }
}
