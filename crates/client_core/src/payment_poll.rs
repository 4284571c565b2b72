//! Bounded polling for an out-of-band online payment.
//!
//! After the checkout page is opened the patient's bills are re-fetched
//! every `interval` until the target bill reads PAID or `ceiling` elapses.
//! The loop runs on its own task; [`PaymentWatch`] owns that task and stops
//! it when cancelled or dropped.

use std::{sync::Arc, time::Duration};

use shared::domain::{Bill, BillId, PatientId};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval_at, sleep_until, Instant, MissedTickBehavior},
};
use tracing::{info, warn};

use crate::{backend::HospitalBackend, ClientEvent, Notifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub ceiling: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            ceiling: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentPollState {
    Idle,
    AwaitingExternalPayment {
        /// Poll requests issued so far.
        attempts: u32,
    },
    /// Carries the bill list from the poll that observed PAID.
    Confirmed { bills: Vec<Bill> },
    TimedOut,
    Cancelled,
}

impl PaymentPollState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentPollState::Confirmed { .. }
                | PaymentPollState::TimedOut
                | PaymentPollState::Cancelled
        )
    }
}

/// Handle to a running poll. Dropping it cancels the poll.
pub struct PaymentWatch {
    bill_id: BillId,
    notifier: Notifier,
    state: Arc<watch::Sender<PaymentPollState>>,
    task: Option<JoinHandle<()>>,
}

impl PaymentWatch {
    pub fn start(
        backend: Arc<dyn HospitalBackend>,
        notifier: Notifier,
        patient_id: PatientId,
        bill_id: BillId,
        settings: PollSettings,
    ) -> Self {
        let awaiting = PaymentPollState::AwaitingExternalPayment { attempts: 0 };
        notifier.publish(ClientEvent::PaymentStateChanged {
            bill_id,
            state: awaiting.clone(),
        });
        let (sender, _) = watch::channel(awaiting);
        let state = Arc::new(sender);
        let task = tokio::spawn(run_poll(
            PollTarget {
                backend,
                notifier: notifier.clone(),
                patient_id,
                bill_id,
            },
            settings,
            state.clone(),
        ));
        Self {
            bill_id,
            notifier,
            state,
            task: Some(task),
        }
    }

    pub fn bill_id(&self) -> BillId {
        self.bill_id
    }

    pub fn state(&self) -> PaymentPollState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PaymentPollState> {
        self.state.subscribe()
    }

    /// Resolves once the poll reaches a terminal state.
    pub async fn wait(&self) -> PaymentPollState {
        let mut receiver = self.state.subscribe();
        let state = match receiver.wait_for(PaymentPollState::is_terminal).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        state
    }

    /// Stops the poll. A poll that already finished keeps its outcome.
    pub fn cancel(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        task.abort();
        let cancelled = self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = PaymentPollState::Cancelled;
                true
            }
        });
        if cancelled {
            info!("payment: poll cancelled bill_id={}", self.bill_id);
            self.notifier.publish(ClientEvent::PaymentStateChanged {
                bill_id: self.bill_id,
                state: PaymentPollState::Cancelled,
            });
        }
    }
}

impl Drop for PaymentWatch {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct PollTarget {
    backend: Arc<dyn HospitalBackend>,
    notifier: Notifier,
    patient_id: PatientId,
    bill_id: BillId,
}

impl PollTarget {
    fn publish(&self, sender: &watch::Sender<PaymentPollState>, state: PaymentPollState) {
        sender.send_replace(state.clone());
        self.notifier.publish(ClientEvent::PaymentStateChanged {
            bill_id: self.bill_id,
            state,
        });
    }
}

async fn run_poll(
    target: PollTarget,
    settings: PollSettings,
    sender: Arc<watch::Sender<PaymentPollState>>,
) {
    let started = Instant::now();
    let deadline = sleep_until(started + settings.ceiling);
    tokio::pin!(deadline);
    let mut ticker = interval_at(started + settings.interval, settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut attempts = 0u32;
    info!(
        "payment: polling bill_id={} interval_ms={} ceiling_secs={}",
        target.bill_id,
        settings.interval.as_millis(),
        settings.ceiling.as_secs()
    );

    loop {
        let polled = tokio::select! {
            biased;
            _ = &mut deadline => None,
            result = async {
                ticker.tick().await;
                target.backend.bills_for_patient(target.patient_id).await
            } => Some(result),
        };

        let Some(result) = polled else {
            info!(
                "payment: poll ceiling reached bill_id={} attempts={attempts}",
                target.bill_id
            );
            target.publish(&sender, PaymentPollState::TimedOut);
            return;
        };

        attempts += 1;
        match result {
            Ok(bills) => {
                let paid = bills
                    .iter()
                    .any(|bill| bill.bill_id == target.bill_id && bill.is_paid());
                if paid {
                    info!(
                        "payment: confirmed bill_id={} attempts={attempts}",
                        target.bill_id
                    );
                    target.notifier.success("Thanh toán thành công!");
                    target.publish(&sender, PaymentPollState::Confirmed { bills });
                    return;
                }
            }
            Err(err) => {
                warn!(
                    "payment: poll request failed bill_id={} attempt={attempts} err={err}",
                    target.bill_id
                );
            }
        }
        target.publish(
            &sender,
            PaymentPollState::AwaitingExternalPayment { attempts },
        );
    }
}

#[cfg(test)]
#[path = "tests/payment_poll_tests.rs"]
mod tests;
