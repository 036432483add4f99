//! Real-time dispatch: in-process push fan-out and signed webhook delivery.

pub mod dispatcher;
pub mod webhook;

pub use dispatcher::{Dispatcher, PushHandle, DEFAULT_MAX_CONNECTIONS, SEND_BUFFER};
pub use webhook::{run_workers, sign, DeliverySink, WebhookSender, MAX_ATTEMPTS};
