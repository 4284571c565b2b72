use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::codes::{
    AppointmentStatus, BillStatus, Gender, NoteType, PaymentMethod, Relationship,
    TransactionStatus,
};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

id_newtype!(PatientId);
id_newtype!(BillId);
id_newtype!(AppointmentId);
id_newtype!(ServiceId);
id_newtype!(ServiceOrderId);
id_newtype!(RoomId);
id_newtype!(DoctorId);
id_newtype!(ScheduleId);
id_newtype!(ContactId);
id_newtype!(TransactionId);
id_newtype!(PrescriptionId);
id_newtype!(NoteId);

/// Display name used when a service's metadata could not be fetched.
pub const UNKNOWN_SERVICE_NAME: &str = "Không xác định";

/// A bill's link to its appointment: either a bare id or an embedded object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AppointmentRef {
    Id(AppointmentId),
    Embedded {
        #[serde(rename = "appointmentId")]
        appointment_id: AppointmentId,
        #[serde(flatten)]
        details: Map<String, Value>,
    },
}

impl AppointmentRef {
    pub fn appointment_id(&self) -> AppointmentId {
        match self {
            AppointmentRef::Id(id) => *id,
            AppointmentRef::Embedded { appointment_id, .. } => *appointment_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillDetail {
    pub detail_id: Option<i64>,
    pub item_type: Option<String>,
    pub quantity: f64,
    pub unit_price: f64,
    pub total_price: f64,
    pub insurance_discount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub bill_id: BillId,
    pub appointment: Option<AppointmentRef>,
    pub patient_id: Option<PatientId>,
    pub total_cost: f64,
    pub insurance_discount: f64,
    pub amount: f64,
    pub service_fee: f64,
    pub status: BillStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub bill_details: Vec<BillDetail>,
}

impl Bill {
    pub fn appointment_id(&self) -> Option<AppointmentId> {
        self.appointment.as_ref().map(AppointmentRef::appointment_id)
    }

    /// `total_cost - insurance_discount`; the backend's `amount` is expected
    /// to match but this is not enforced.
    pub fn expected_amount(&self) -> f64 {
        self.total_cost - self.insurance_discount
    }

    pub fn is_paid(&self) -> bool {
        self.status == BillStatus::Paid
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub service_id: ServiceId,
    pub service_name: String,
    pub price: f64,
}

impl ServiceInfo {
    pub fn placeholder(service_id: ServiceId) -> Self {
        Self {
            service_id,
            service_name: UNKNOWN_SERVICE_NAME.to_string(),
            price: 0.0,
        }
    }
}

/// A service order as returned by the backend, before its service metadata
/// has been joined in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOrderLine {
    pub order_id: ServiceOrderId,
    pub appointment_id: Option<AppointmentId>,
    pub service_id: ServiceId,
    pub room_id: Option<RoomId>,
    pub price: f64,
    pub order_status: Option<String>,
}

impl ServiceOrderLine {
    pub fn with_service(self, service: ServiceInfo) -> ServiceOrder {
        ServiceOrder {
            order_id: self.order_id,
            appointment_id: self.appointment_id,
            service_id: self.service_id,
            room_id: self.room_id,
            price: self.price,
            order_status: self.order_status,
            service,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOrder {
    pub order_id: ServiceOrderId,
    pub appointment_id: Option<AppointmentId>,
    pub service_id: ServiceId,
    pub room_id: Option<RoomId>,
    pub price: f64,
    pub order_status: Option<String>,
    pub service: ServiceInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorInfo {
    pub doctor_id: Option<DoctorId>,
    pub full_name: Option<String>,
    pub specialization: Option<String>,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub schedule_id: Option<ScheduleId>,
    pub work_date: Option<String>,
    pub shift: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub appointment_id: AppointmentId,
    pub doctor_id: Option<DoctorId>,
    pub doctor_info: Option<DoctorInfo>,
    pub schedule: Option<Schedule>,
    pub symptoms: Option<String>,
    pub slot_start: Option<String>,
    pub slot_end: Option<String>,
    pub appointment_status: AppointmentStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub prescription_id: Option<PrescriptionId>,
}

impl Appointment {
    pub fn doctor_name(&self) -> Option<&str> {
        self.doctor_info.as_ref()?.full_name.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentNote {
    pub note_id: NoteId,
    pub note_type: NoteType,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Id carried by a contact that has not been saved yet.
pub const NEW_CONTACT_ID: ContactId = ContactId(0);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    pub contact_id: ContactId,
    pub contact_name: String,
    pub contact_phone: String,
    pub relationship: Relationship,
}

impl EmergencyContact {
    pub fn is_new(&self) -> bool {
        self.contact_id == NEW_CONTACT_ID
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactDraft {
    pub contact_name: String,
    pub contact_phone: String,
    pub relationship: Relationship,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub bill_id: Option<BillId>,
    pub amount: f64,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    pub transaction_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub patient_id: PatientId,
    pub full_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub identity_number: Option<String>,
    pub insurance_number: Option<String>,
    pub gender: Gender,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionDetail {
    pub medicine_name: String,
    pub quantity: f64,
    pub dosage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub prescription_id: PrescriptionId,
    pub appointment_id: Option<AppointmentId>,
    pub diagnosis: Option<String>,
    pub note: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub details: Vec<PrescriptionDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLink {
    pub checkout_url: String,
    pub order_code: Option<String>,
}

/// Canonical list shape every paginated endpoint is normalized into.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn from_items(items: Vec<T>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn first(page_size: u32) -> Self {
        Self { page: 1, page_size }
    }
}
