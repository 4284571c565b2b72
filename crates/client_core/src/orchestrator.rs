//! Assembles composite view models from several dependent backend reads.
//!
//! Same-level requests fan out concurrently; a level starts only after the
//! one it depends on has fully resolved. Only the primary read of each
//! operation can fail the whole assembly. Enrichment failures degrade the
//! affected item and are logged.

use std::{collections::HashMap, sync::Arc};

use futures::future::join_all;
use shared::domain::{
    Appointment, AppointmentId, AppointmentNote, Bill, BillId, EmergencyContact, Page,
    PageRequest, PatientId, PatientSummary, Prescription, ServiceInfo, ServiceOrder,
    ServiceOrderLine, Transaction,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    backend::HospitalBackend, error::user_message, records::InvoiceRow, transport::RequestError,
};

/// Page size the patient appointment tab requests.
pub const APPOINTMENT_PAGE_SIZE: u32 = 50;
pub const DIRECTORY_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
#[error("{context}: {detail}")]
pub struct FetchError {
    pub context: &'static str,
    pub detail: String,
    #[source]
    pub source: RequestError,
}

impl FetchError {
    fn new(context: &'static str, source: RequestError) -> Self {
        let detail = user_message(&source);
        warn!("orchestrator: primary fetch failed context={context:?} err={source}");
        Self {
            context,
            detail,
            source,
        }
    }
}

/// Bills plus, for every bill, its enriched service orders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BillingOverview {
    pub bills: Vec<Bill>,
    pub services_by_bill: HashMap<BillId, Vec<ServiceOrder>>,
}

impl BillingOverview {
    pub fn services_for(&self, bill_id: BillId) -> &[ServiceOrder] {
        self.services_by_bill
            .get(&bill_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn into_rows(mut self) -> Vec<InvoiceRow> {
        self.bills
            .into_iter()
            .map(|bill| {
                let services = self
                    .services_by_bill
                    .remove(&bill.bill_id)
                    .unwrap_or_default();
                InvoiceRow { bill, services }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentDetail {
    pub appointment: Appointment,
    pub service_orders: Vec<ServiceOrder>,
    pub notes: Vec<AppointmentNote>,
    pub prescription: Option<Prescription>,
}

#[derive(Clone)]
pub struct FetchOrchestrator {
    backend: Arc<dyn HospitalBackend>,
}

impl FetchOrchestrator {
    pub fn new(backend: Arc<dyn HospitalBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn HospitalBackend> {
        &self.backend
    }

    /// Bills, then service orders per bill, then service metadata per order.
    pub async fn load_billing(&self, patient_id: PatientId) -> Result<BillingOverview, FetchError> {
        let bills = self
            .backend
            .bills_for_patient(patient_id)
            .await
            .map_err(|err| FetchError::new("Không thể tải danh sách hóa đơn", err))?;

        let orders_per_bill = join_all(bills.iter().map(|bill| async move {
            let lines = match bill.appointment_id() {
                Some(appointment_id) => self.order_lines(appointment_id).await,
                None => Vec::new(),
            };
            (bill.bill_id, lines)
        }))
        .await;

        let services_by_bill: HashMap<BillId, Vec<ServiceOrder>> =
            join_all(orders_per_bill.into_iter().map(|(bill_id, lines)| async move {
                (bill_id, self.enrich(lines).await)
            }))
            .await
            .into_iter()
            .collect();

        info!(
            "orchestrator: billing loaded patient_id={patient_id} bills={} orders={}",
            bills.len(),
            services_by_bill.values().map(Vec::len).sum::<usize>()
        );
        Ok(BillingOverview {
            bills,
            services_by_bill,
        })
    }

    async fn order_lines(&self, appointment_id: AppointmentId) -> Vec<ServiceOrderLine> {
        match self
            .backend
            .service_orders_for_appointment(appointment_id)
            .await
        {
            Ok(lines) => lines,
            Err(err) => {
                warn!(
                    "orchestrator: service orders unavailable appointment_id={appointment_id} err={err}"
                );
                Vec::new()
            }
        }
    }

    async fn enrich(&self, lines: Vec<ServiceOrderLine>) -> Vec<ServiceOrder> {
        join_all(lines.into_iter().map(|line| async move {
            let service = match self.backend.service(line.service_id).await {
                Ok(service) => service,
                Err(err) => {
                    warn!(
                        "orchestrator: service metadata unavailable service_id={} err={err}",
                        line.service_id
                    );
                    ServiceInfo::placeholder(line.service_id)
                }
            };
            line.with_service(service)
        }))
        .await
    }

    pub async fn load_appointments(
        &self,
        patient_id: PatientId,
    ) -> Result<Page<Appointment>, FetchError> {
        self.backend
            .appointments_for_patient(patient_id, PageRequest::first(APPOINTMENT_PAGE_SIZE))
            .await
            .map_err(|err| FetchError::new("Không thể tải danh sách lịch hẹn", err))
    }

    pub async fn load_contacts(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<EmergencyContact>, FetchError> {
        self.backend
            .emergency_contacts(patient_id)
            .await
            .map_err(|err| FetchError::new("Không thể tải danh sách liên hệ khẩn cấp", err))
    }

    pub async fn load_prescriptions(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<Prescription>, FetchError> {
        self.backend
            .prescriptions_for_patient(patient_id)
            .await
            .map_err(|err| FetchError::new("Không thể tải danh sách đơn thuốc", err))
    }

    pub async fn load_patients(
        &self,
        page: PageRequest,
    ) -> Result<Page<PatientSummary>, FetchError> {
        self.backend
            .patients(page)
            .await
            .map_err(|err| FetchError::new("Không thể tải danh sách bệnh nhân", err))
    }

    pub async fn load_transactions(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<Transaction>, FetchError> {
        self.backend
            .transactions_for_patient(patient_id)
            .await
            .map_err(|err| FetchError::new("Không thể tải lịch sử giao dịch", err))
    }

    /// The appointment itself must load; its orders, notes and prescription
    /// each fall back to empty on failure.
    pub async fn load_appointment_detail(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<AppointmentDetail, FetchError> {
        let appointment = self
            .backend
            .appointment(appointment_id)
            .await
            .map_err(|err| FetchError::new("Không thể tải thông tin lịch hẹn", err))?;

        let orders = async {
            let lines = self.order_lines(appointment_id).await;
            self.enrich(lines).await
        };
        let notes = async {
            self.backend
                .appointment_notes(appointment_id)
                .await
                .unwrap_or_else(|err| {
                    warn!("orchestrator: notes unavailable appointment_id={appointment_id} err={err}");
                    Vec::new()
                })
        };
        let prescription = async {
            self.backend
                .prescription_for_appointment(appointment_id)
                .await
                .unwrap_or_else(|err| {
                    warn!(
                        "orchestrator: prescription unavailable appointment_id={appointment_id} err={err}"
                    );
                    None
                })
        };
        let (service_orders, notes, prescription) = tokio::join!(orders, notes, prescription);

        Ok(AppointmentDetail {
            appointment,
            service_orders,
            notes,
            prescription,
        })
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
