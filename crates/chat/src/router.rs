use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::events::InboundEvent;
use crate::transport::ChatTransport;

const MAILBOX_CAPACITY: usize = 32;

/// Consumes routed inbound events. One call at a time per user.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, event: InboundEvent);
}

/// Fans inbound events out to one mailbox per user. A dedicated worker task
/// drains each mailbox sequentially, so a user's events are handled in
/// arrival order while different users proceed concurrently.
pub struct SessionRouter {
    mailboxes: Mutex<HashMap<String, mpsc::Sender<InboundEvent>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for SessionRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRouter {
    pub fn new() -> Self {
        Self { mailboxes: Mutex::new(HashMap::new()), workers: Mutex::new(Vec::new()) }
    }

    /// Pulls events from the transport until it reports shutdown, then waits
    /// for every per-user worker to drain its mailbox.
    pub async fn run<T, H>(&self, transport: Arc<T>, handler: Arc<H>)
    where
        T: ChatTransport + 'static,
        H: InboundHandler + 'static,
    {
        loop {
            match transport.next_event().await {
                Ok(Some(event)) => self.route(event, &handler).await,
                Ok(None) => {
                    info!("chat transport closed, draining sessions");
                    break;
                }
                Err(err) => {
                    error!(error = %err, "failed to poll the chat transport");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        // Dropping the senders lets each worker finish its backlog and exit.
        self.mailboxes.lock().await.clear();
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            if let Err(err) = worker.await {
                error!(error = %err, "session worker panicked");
            }
        }
    }

    async fn route<H>(&self, event: InboundEvent, handler: &Arc<H>)
    where
        H: InboundHandler + 'static,
    {
        let correlation_id = Uuid::new_v4();
        let user = event.user.clone();

        let mut mailboxes = self.mailboxes.lock().await;
        if let Some(sender) = mailboxes.get(&user) {
            if sender.send(event.clone()).await.is_ok() {
                return;
            }
            // Worker is gone; fall through and start a fresh one.
            mailboxes.remove(&user);
        }

        let (sender, mut receiver) = mpsc::channel::<InboundEvent>(MAILBOX_CAPACITY);
        let worker_handler = Arc::clone(handler);
        let worker = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                worker_handler.handle(event).await;
            }
        });

        info!(user = %user, correlation_id = %correlation_id, "session worker started");
        if sender.send(event).await.is_err() {
            error!(user = %user, "freshly started session worker rejected its first event");
        }
        mailboxes.insert(user, sender);
        self.workers.lock().await.push(worker);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{InboundHandler, SessionRouter};
    use crate::events::{InboundEvent, InboundKind, OutboundMessage};
    use crate::transport::{ChatTransport, TransportError};

    struct ScriptedTransport {
        events: Mutex<VecDeque<InboundEvent>>,
    }

    impl ScriptedTransport {
        fn new(events: Vec<InboundEvent>) -> Self {
            Self { events: Mutex::new(events.into()) }
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn next_event(&self) -> Result<Option<InboundEvent>, TransportError> {
            Ok(self.events.lock().await.pop_front())
        }

        async fn send(&self, _user: &str, _message: OutboundMessage) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl InboundHandler for RecordingHandler {
        async fn handle(&self, event: InboundEvent) {
            let InboundKind::Text(text) = event.kind else {
                return;
            };
            self.seen.lock().await.push((event.user, text));
        }
    }

    fn text_event(user: &str, text: &str) -> InboundEvent {
        InboundEvent { user: user.to_owned(), kind: InboundKind::Text(text.to_owned()) }
    }

    #[tokio::test]
    async fn events_for_one_user_are_handled_in_arrival_order() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            text_event("alice", "one"),
            text_event("bob", "hello"),
            text_event("alice", "two"),
            text_event("alice", "three"),
        ]));
        let handler = Arc::new(RecordingHandler::default());
        let router = SessionRouter::new();

        router.run(transport, Arc::clone(&handler)).await;

        let seen = handler.seen.lock().await;
        let alice: Vec<&str> = seen
            .iter()
            .filter(|(user, _)| user == "alice")
            .map(|(_, text)| text.as_str())
            .collect();
        assert_eq!(alice, vec!["one", "two", "three"]);
        assert_eq!(seen.len(), 4);
    }
}
