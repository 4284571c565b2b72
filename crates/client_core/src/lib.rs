use shared::domain::BillId;
use tokio::sync::broadcast;
use tracing::{error, info};

pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod payment_poll;
pub mod records;
pub mod screens;
pub mod transport;
pub mod view_state;

pub use backend::{HospitalBackend, HttpBackend};
pub use config::{load_settings, load_settings_from, ClientSettings};
pub use dispatcher::{
    ActionDispatcher, CheckoutLauncher, DispatchError, LoggingLauncher, Reconcile,
};
pub use orchestrator::{AppointmentDetail, BillingOverview, FetchError, FetchOrchestrator};
pub use payment_poll::{PaymentPollState, PaymentWatch, PollSettings};
pub use transport::{ApiClient, CredentialProvider, RequestError, StaticToken};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// A transient message for the notification surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    Notice(Notice),
    PaymentStateChanged {
        bill_id: BillId,
        state: PaymentPollState,
    },
}

/// Fan-out of [`ClientEvent`]s to whoever renders them. Sending with no
/// subscriber is not an error.
#[derive(Debug, Clone)]
pub struct Notifier {
    events: broadcast::Sender<ClientEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn publish(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    pub fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        self.publish(ClientEvent::Notice(Notice {
            level,
            message: message.into(),
        }));
    }

    pub fn success(&self, message: impl Into<String>) {
        let message = message.into();
        info!("notice: success message={message:?}");
        self.notify(NoticeLevel::Success, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Info, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("notice: error message={message:?}");
        self.notify(NoticeLevel::Error, message);
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
