//! Per-screen composition of orchestrator, view state and dispatcher.

use std::collections::HashMap;

use async_trait::async_trait;
use shared::{
    codes::AppointmentStatus,
    domain::{
        Appointment, AppointmentId, BillId, EmergencyContact, NoteId, PageRequest, PatientId,
        PatientSummary, Prescription, ServiceOrderId, Transaction,
    },
};
use tokio::sync::watch;
use tracing::warn;

use crate::{
    dispatcher::{ActionDispatcher, DispatchError, Reconcile},
    orchestrator::{AppointmentDetail, FetchError, FetchOrchestrator, DIRECTORY_PAGE_SIZE},
    payment_poll::{PaymentPollState, PaymentWatch},
    records::InvoiceRow,
    view_state::{SortOrder, ViewRecord, ViewSlice, ViewState, DEFAULT_PAGE_SIZE},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Ready,
    /// The primary fetch failed; `reload` again to retry.
    Failed(String),
}

/// Where a list screen's records come from.
#[async_trait]
pub trait ListSource: Send + Sync {
    type Record: ViewRecord + Send + Sync;

    /// Rows per page until the user picks another size.
    const PAGE_SIZE: usize = DEFAULT_PAGE_SIZE;
    /// Direction of the record's default sort field.
    const DEFAULT_ORDER: SortOrder = SortOrder::Asc;

    async fn load(
        &self,
        orchestrator: &FetchOrchestrator,
    ) -> Result<Vec<Self::Record>, FetchError>;
}

pub struct PatientBills(pub PatientId);

#[async_trait]
impl ListSource for PatientBills {
    type Record = InvoiceRow;

    const PAGE_SIZE: usize = 8;
    /// Newest bills first.
    const DEFAULT_ORDER: SortOrder = SortOrder::Desc;

    async fn load(&self, orchestrator: &FetchOrchestrator) -> Result<Vec<InvoiceRow>, FetchError> {
        Ok(orchestrator.load_billing(self.0).await?.into_rows())
    }
}

pub struct PatientAppointments(pub PatientId);

#[async_trait]
impl ListSource for PatientAppointments {
    type Record = Appointment;

    async fn load(&self, orchestrator: &FetchOrchestrator) -> Result<Vec<Appointment>, FetchError> {
        Ok(orchestrator.load_appointments(self.0).await?.items)
    }
}

pub struct PatientContacts(pub PatientId);

#[async_trait]
impl ListSource for PatientContacts {
    type Record = EmergencyContact;

    const PAGE_SIZE: usize = 6;

    async fn load(
        &self,
        orchestrator: &FetchOrchestrator,
    ) -> Result<Vec<EmergencyContact>, FetchError> {
        orchestrator.load_contacts(self.0).await
    }
}

pub struct PatientPrescriptions(pub PatientId);

#[async_trait]
impl ListSource for PatientPrescriptions {
    type Record = Prescription;

    const PAGE_SIZE: usize = 5;

    async fn load(
        &self,
        orchestrator: &FetchOrchestrator,
    ) -> Result<Vec<Prescription>, FetchError> {
        orchestrator.load_prescriptions(self.0).await
    }
}

/// The patient directory, fetched as one large page and paged locally.
pub struct PatientDirectory {
    pub request: PageRequest,
}

impl Default for PatientDirectory {
    fn default() -> Self {
        Self {
            request: PageRequest::first(DIRECTORY_PAGE_SIZE),
        }
    }
}

#[async_trait]
impl ListSource for PatientDirectory {
    type Record = PatientSummary;

    async fn load(
        &self,
        orchestrator: &FetchOrchestrator,
    ) -> Result<Vec<PatientSummary>, FetchError> {
        Ok(orchestrator.load_patients(self.request).await?.items)
    }
}

pub struct PatientTransactions(pub PatientId);

#[async_trait]
impl ListSource for PatientTransactions {
    type Record = Transaction;

    async fn load(
        &self,
        orchestrator: &FetchOrchestrator,
    ) -> Result<Vec<Transaction>, FetchError> {
        orchestrator.load_transactions(self.0).await
    }
}

pub struct ListScreen<S: ListSource> {
    source: S,
    orchestrator: FetchOrchestrator,
    view: ViewState<S::Record>,
    status: LoadStatus,
}

impl<S: ListSource> ListScreen<S> {
    pub fn new(source: S, orchestrator: FetchOrchestrator) -> Self {
        Self {
            source,
            orchestrator,
            view: ViewState::default()
                .with_page_size(S::PAGE_SIZE)
                .with_sort_order(S::DEFAULT_ORDER),
            status: LoadStatus::Idle,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    pub fn view(&self) -> &ViewState<S::Record> {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ViewState<S::Record> {
        &mut self.view
    }

    pub fn slice(&self) -> ViewSlice<S::Record> {
        self.view.view()
    }

    /// Replaces the collection wholesale. On failure the list is emptied so
    /// stale rows are never shown next to an error.
    pub async fn reload(&mut self) -> &LoadStatus {
        self.status = LoadStatus::Loading;
        match self.source.load(&self.orchestrator).await {
            Ok(items) => {
                self.view.replace_items(items);
                self.status = LoadStatus::Ready;
            }
            Err(err) => {
                warn!("screen: reload failed err={err}");
                self.view.replace_items(Vec::new());
                self.status = LoadStatus::Failed(err.to_string());
            }
        }
        &self.status
    }

    pub async fn apply(&mut self, reconcile: Reconcile<S::Record>) {
        match reconcile {
            Reconcile::Refetch => {
                self.reload().await;
            }
            Reconcile::Remove(key) => {
                self.view.remove(&key);
            }
            Reconcile::Upsert(record) => self.view.upsert(record),
        }
    }
}

/// Bill list of one patient with cash and online payment.
pub struct InvoicesScreen {
    patient_id: PatientId,
    list: ListScreen<PatientBills>,
    dispatcher: ActionDispatcher,
    payment: Option<PaymentWatch>,
}

impl InvoicesScreen {
    pub fn new(
        patient_id: PatientId,
        orchestrator: FetchOrchestrator,
        dispatcher: ActionDispatcher,
    ) -> Self {
        Self {
            patient_id,
            list: ListScreen::new(PatientBills(patient_id), orchestrator),
            dispatcher,
            payment: None,
        }
    }

    pub fn list(&self) -> &ListScreen<PatientBills> {
        &self.list
    }

    pub fn list_mut(&mut self) -> &mut ListScreen<PatientBills> {
        &mut self.list
    }

    pub async fn reload(&mut self) -> &LoadStatus {
        self.list.reload().await
    }

    pub async fn pay_cash(&mut self, bill_id: BillId) -> Result<(), DispatchError> {
        let reconcile = self.dispatcher.pay_cash(bill_id).await?;
        self.list.apply(reconcile).await;
        Ok(())
    }

    /// Starts an online payment for a listed bill. A poll already running
    /// for another bill is cancelled.
    pub async fn pay_online(
        &mut self,
        bill_id: BillId,
    ) -> Result<watch::Receiver<PaymentPollState>, DispatchError> {
        let bill = self
            .list
            .view()
            .find(&bill_id)
            .map(|row| row.bill.clone())
            .ok_or_else(|| {
                self.dispatcher
                    .reject(&format!("Không tìm thấy hóa đơn #{bill_id}"))
            })?;
        let watch = self
            .dispatcher
            .start_online_payment(self.patient_id, &bill)
            .await?;
        let receiver = watch.subscribe();
        self.payment = Some(watch);
        Ok(receiver)
    }

    pub fn payment_state(&self) -> PaymentPollState {
        self.payment
            .as_ref()
            .map(PaymentWatch::state)
            .unwrap_or(PaymentPollState::Idle)
    }

    /// Waits for the running poll to finish and folds its outcome in.
    pub async fn wait_for_payment(&mut self) -> Option<PaymentPollState> {
        let state = self.payment.as_ref()?.wait().await;
        self.sync_payment();
        Some(state)
    }

    pub fn cancel_payment(&mut self) {
        if let Some(mut watch) = self.payment.take() {
            watch.cancel();
        }
    }

    /// Merges a confirmed poll's bills into the list, keeping each bill's
    /// already-fetched services. Returns whether anything changed.
    pub fn sync_payment(&mut self) -> bool {
        let state = self.payment.as_ref().map(PaymentWatch::state);
        let Some(PaymentPollState::Confirmed { bills }) = state else {
            return false;
        };
        let mut services: HashMap<BillId, _> = self
            .list
            .view()
            .items()
            .iter()
            .map(|row| (row.bill.bill_id, row.services.clone()))
            .collect();
        let rows = bills
            .into_iter()
            .map(|bill| InvoiceRow {
                services: services.remove(&bill.bill_id).unwrap_or_default(),
                bill,
            })
            .collect();
        self.list.view_mut().replace_items(rows);
        self.payment = None;
        true
    }
}

/// One appointment with its service orders, notes and prescription.
pub struct AppointmentDetailScreen {
    appointment_id: AppointmentId,
    orchestrator: FetchOrchestrator,
    dispatcher: ActionDispatcher,
    detail: Option<AppointmentDetail>,
    status: LoadStatus,
}

impl AppointmentDetailScreen {
    pub fn new(
        appointment_id: AppointmentId,
        orchestrator: FetchOrchestrator,
        dispatcher: ActionDispatcher,
    ) -> Self {
        Self {
            appointment_id,
            orchestrator,
            dispatcher,
            detail: None,
            status: LoadStatus::Idle,
        }
    }

    pub fn detail(&self) -> Option<&AppointmentDetail> {
        self.detail.as_ref()
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    pub async fn reload(&mut self) -> &LoadStatus {
        self.status = LoadStatus::Loading;
        match self
            .orchestrator
            .load_appointment_detail(self.appointment_id)
            .await
        {
            Ok(detail) => {
                self.detail = Some(detail);
                self.status = LoadStatus::Ready;
            }
            Err(err) => {
                warn!("screen: appointment detail failed err={err}");
                self.detail = None;
                self.status = LoadStatus::Failed(err.to_string());
            }
        }
        &self.status
    }

    pub async fn change_status(&mut self, new: AppointmentStatus) -> Result<(), DispatchError> {
        let current = self
            .detail
            .as_ref()
            .map(|detail| detail.appointment.appointment_status)
            .ok_or_else(|| self.dispatcher.reject("Chưa tải thông tin lịch hẹn"))?;
        let reconcile = self
            .dispatcher
            .change_appointment_status(self.appointment_id, current, new)
            .await?;
        if matches!(reconcile, Reconcile::Refetch) {
            self.reload().await;
        }
        Ok(())
    }

    pub async fn delete_service_order(
        &mut self,
        order_id: ServiceOrderId,
    ) -> Result<(), DispatchError> {
        self.dispatcher.delete_service_order(order_id).await?;
        self.reload().await;
        Ok(())
    }

    pub async fn delete_note(&mut self, note_id: NoteId) -> Result<(), DispatchError> {
        self.dispatcher.delete_appointment_note(note_id).await?;
        self.reload().await;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/screens_tests.rs"]
mod tests;
