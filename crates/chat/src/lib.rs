//! Chat-facing plumbing: inbound/outbound event types, line-boundary message
//! chunking, the Bot API long-poll transport, and a router that serializes
//! events per user so each dialogue sees its inputs in arrival order.

pub mod events;
pub mod notify;
pub mod router;
pub mod transport;

pub use events::{chunk_text, InboundEvent, InboundKind, OutboundMessage, MAX_MESSAGE_LEN};
pub use notify::{NotificationSink, TransportSink};
pub use router::{InboundHandler, SessionRouter};
pub use transport::{BotApiTransport, ChatTransport, NoopChatTransport, TransportError};
