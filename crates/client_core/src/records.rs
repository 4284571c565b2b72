//! [`ViewRecord`] implementations for every list the screens show.

use std::convert::Infallible;

use chrono::{DateTime, Utc};
use shared::{
    codes::{AppointmentStatus, BillStatus, Gender, Relationship, TransactionStatus},
    domain::{
        Appointment, AppointmentId, Bill, BillId, ContactId, EmergencyContact, PatientId,
        PatientSummary, Prescription, PrescriptionId, ServiceOrder, Transaction, TransactionId,
    },
    protocol::lenient::parse_timestamp,
};

use crate::view_state::{SortKey, ViewRecord};

fn millis(at: Option<DateTime<Utc>>) -> SortKey {
    SortKey::Timestamp(at.map(|at| at.timestamp_millis()))
}

/// A bill joined with its enriched service orders.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRow {
    pub bill: Bill,
    pub services: Vec<ServiceOrder>,
}

impl InvoiceRow {
    pub fn services_total(&self) -> f64 {
        self.services.iter().map(|order| order.service.price).sum()
    }

    pub fn has_services(&self) -> bool {
        !self.services.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceSearchField {
    BillId,
    ServiceName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceSortField {
    Date,
    Amount,
    Status,
}

impl ViewRecord for InvoiceRow {
    type Key = BillId;
    type SearchField = InvoiceSearchField;
    type SortField = InvoiceSortField;
    type Category = BillStatus;

    const SEARCH_FIELDS: &'static [InvoiceSearchField] =
        &[InvoiceSearchField::BillId, InvoiceSearchField::ServiceName];
    const DEFAULT_SORT: InvoiceSortField = InvoiceSortField::Date;

    fn key(&self) -> BillId {
        self.bill.bill_id
    }

    fn search_value(&self, field: InvoiceSearchField) -> Option<String> {
        match field {
            InvoiceSearchField::BillId => Some(self.bill.bill_id.to_string()),
            InvoiceSearchField::ServiceName => Some(
                self.services
                    .iter()
                    .map(|order| order.service.service_name.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
        }
    }

    fn category(&self) -> Option<BillStatus> {
        Some(self.bill.status)
    }

    fn sort_key(&self, field: InvoiceSortField) -> SortKey {
        match field {
            InvoiceSortField::Date => millis(self.bill.created_at),
            InvoiceSortField::Amount => SortKey::Number(self.bill.service_fee),
            InvoiceSortField::Status => SortKey::Text(self.bill.status.as_str().to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentSearchField {
    DoctorName,
    AppointmentId,
    Symptoms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentSortField {
    Date,
    Doctor,
    Status,
}

fn appointment_time(appointment: &Appointment) -> SortKey {
    let scheduled = appointment
        .schedule
        .as_ref()
        .and_then(|schedule| schedule.work_date.as_deref())
        .and_then(|date| {
            appointment
                .slot_start
                .as_deref()
                .and_then(|start| parse_timestamp(&format!("{date} {start}")))
                .or_else(|| parse_timestamp(date))
        });
    millis(scheduled.or(appointment.created_at))
}

impl ViewRecord for Appointment {
    type Key = AppointmentId;
    type SearchField = AppointmentSearchField;
    type SortField = AppointmentSortField;
    type Category = AppointmentStatus;

    const SEARCH_FIELDS: &'static [AppointmentSearchField] = &[
        AppointmentSearchField::DoctorName,
        AppointmentSearchField::AppointmentId,
        AppointmentSearchField::Symptoms,
    ];
    const DEFAULT_SORT: AppointmentSortField = AppointmentSortField::Date;

    fn key(&self) -> AppointmentId {
        self.appointment_id
    }

    fn search_value(&self, field: AppointmentSearchField) -> Option<String> {
        match field {
            AppointmentSearchField::DoctorName => self.doctor_name().map(str::to_string),
            AppointmentSearchField::AppointmentId => Some(self.appointment_id.to_string()),
            AppointmentSearchField::Symptoms => self.symptoms.clone(),
        }
    }

    fn category(&self) -> Option<AppointmentStatus> {
        Some(self.appointment_status)
    }

    fn sort_key(&self, field: AppointmentSortField) -> SortKey {
        match field {
            AppointmentSortField::Date => appointment_time(self),
            AppointmentSortField::Doctor => {
                SortKey::Text(self.doctor_name().unwrap_or_default().to_string())
            }
            AppointmentSortField::Status => {
                SortKey::Text(self.appointment_status.as_str().to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactSearchField {
    Name,
    Phone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactSortField {
    Name,
    Phone,
    Relationship,
}

impl ViewRecord for EmergencyContact {
    type Key = ContactId;
    type SearchField = ContactSearchField;
    type SortField = ContactSortField;
    type Category = Relationship;

    const SEARCH_FIELDS: &'static [ContactSearchField] =
        &[ContactSearchField::Name, ContactSearchField::Phone];
    const DEFAULT_SORT: ContactSortField = ContactSortField::Name;

    fn key(&self) -> ContactId {
        self.contact_id
    }

    fn search_value(&self, field: ContactSearchField) -> Option<String> {
        match field {
            ContactSearchField::Name => Some(self.contact_name.clone()),
            ContactSearchField::Phone => Some(self.contact_phone.clone()),
        }
    }

    fn category(&self) -> Option<Relationship> {
        Some(self.relationship)
    }

    fn sort_key(&self, field: ContactSortField) -> SortKey {
        match field {
            ContactSortField::Name => SortKey::Text(self.contact_name.clone()),
            ContactSortField::Phone => SortKey::Text(self.contact_phone.clone()),
            ContactSortField::Relationship => SortKey::Text(self.relationship.label().to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrescriptionSearchField {
    Diagnosis,
    Note,
    Medicine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrescriptionSortField {
    Date,
    Diagnosis,
}

impl ViewRecord for Prescription {
    type Key = PrescriptionId;
    type SearchField = PrescriptionSearchField;
    type SortField = PrescriptionSortField;
    type Category = Infallible;

    const SEARCH_FIELDS: &'static [PrescriptionSearchField] = &[
        PrescriptionSearchField::Diagnosis,
        PrescriptionSearchField::Note,
        PrescriptionSearchField::Medicine,
    ];
    const DEFAULT_SORT: PrescriptionSortField = PrescriptionSortField::Date;

    fn key(&self) -> PrescriptionId {
        self.prescription_id
    }

    fn search_value(&self, field: PrescriptionSearchField) -> Option<String> {
        match field {
            PrescriptionSearchField::Diagnosis => self.diagnosis.clone(),
            PrescriptionSearchField::Note => self.note.clone(),
            PrescriptionSearchField::Medicine => Some(
                self.details
                    .iter()
                    .map(|detail| detail.medicine_name.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
        }
    }

    fn category(&self) -> Option<Infallible> {
        None
    }

    fn sort_key(&self, field: PrescriptionSortField) -> SortKey {
        match field {
            PrescriptionSortField::Date => millis(self.created_at),
            PrescriptionSortField::Diagnosis => {
                SortKey::Text(self.diagnosis.clone().unwrap_or_default())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientSearchField {
    Name,
    Phone,
    Email,
    IdentityNumber,
    InsuranceNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientSortField {
    Name,
    Id,
}

impl ViewRecord for PatientSummary {
    type Key = PatientId;
    type SearchField = PatientSearchField;
    type SortField = PatientSortField;
    type Category = Gender;

    const SEARCH_FIELDS: &'static [PatientSearchField] = &[
        PatientSearchField::Name,
        PatientSearchField::Phone,
        PatientSearchField::Email,
        PatientSearchField::IdentityNumber,
        PatientSearchField::InsuranceNumber,
    ];
    const DEFAULT_SORT: PatientSortField = PatientSortField::Name;

    fn key(&self) -> PatientId {
        self.patient_id
    }

    fn search_value(&self, field: PatientSearchField) -> Option<String> {
        match field {
            PatientSearchField::Name => Some(self.full_name.clone()),
            PatientSearchField::Phone => self.phone.clone(),
            PatientSearchField::Email => self.email.clone(),
            PatientSearchField::IdentityNumber => self.identity_number.clone(),
            PatientSearchField::InsuranceNumber => self.insurance_number.clone(),
        }
    }

    fn category(&self) -> Option<Gender> {
        Some(self.gender)
    }

    fn sort_key(&self, field: PatientSortField) -> SortKey {
        match field {
            PatientSortField::Name => SortKey::Text(self.full_name.clone()),
            PatientSortField::Id => SortKey::Number(self.patient_id.0 as f64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionSearchField {
    Id,
    Method,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionSortField {
    Date,
    Amount,
}

impl ViewRecord for Transaction {
    type Key = TransactionId;
    type SearchField = TransactionSearchField;
    type SortField = TransactionSortField;
    type Category = TransactionStatus;

    const SEARCH_FIELDS: &'static [TransactionSearchField] =
        &[TransactionSearchField::Id, TransactionSearchField::Method];
    const DEFAULT_SORT: TransactionSortField = TransactionSortField::Date;

    fn key(&self) -> TransactionId {
        self.transaction_id
    }

    fn search_value(&self, field: TransactionSearchField) -> Option<String> {
        match field {
            TransactionSearchField::Id => Some(self.transaction_id.to_string()),
            TransactionSearchField::Method => Some(format!(
                "{} {}",
                self.payment_method.as_str(),
                self.payment_method.label()
            )),
        }
    }

    fn category(&self) -> Option<TransactionStatus> {
        Some(self.status)
    }

    fn sort_key(&self, field: TransactionSortField) -> SortKey {
        match field {
            TransactionSortField::Date => millis(self.transaction_date),
            TransactionSortField::Amount => SortKey::Number(self.amount),
        }
    }
}
