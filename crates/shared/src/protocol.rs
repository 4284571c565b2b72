//! Backend wire shapes and their translation into view models.
//!
//! The backend speaks snake_case with short enumeration codes, decimals as
//! strings, and three different list envelopes. Everything is normalized here
//! so nothing past the fetch boundary sees the raw shapes.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::{
    codes::{
        AppointmentStatus, BillStatus, Gender, NoteType, PaymentMethod, Relationship,
        TransactionStatus,
    },
    domain::{
        Appointment, AppointmentId, AppointmentNote, AppointmentRef, Bill, BillDetail, BillId,
        CheckoutLink, ContactDraft, ContactId, DoctorId, DoctorInfo, EmergencyContact, NoteId,
        Page, PatientId, PatientSummary, Prescription, PrescriptionDetail, PrescriptionId, RoomId,
        Schedule, ScheduleId, ServiceId, ServiceInfo, ServiceOrderId, ServiceOrderLine,
        Transaction, TransactionId,
    },
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("{entity} is missing required field `{field}`")]
    MissingField {
        entity: &'static str,
        field: &'static str,
    },
}

fn missing(entity: &'static str, field: &'static str) -> ProtocolError {
    ProtocolError::MissingField { entity, field }
}

/// Field decoders that tolerate the backend's loose typing.
pub mod lenient {
    use super::*;

    pub fn value_as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Accepts a number, a numeric string, or an object carrying an `id`.
    pub fn value_as_id(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            Value::Object(map) => map.get("id").and_then(value_as_id),
            _ => None,
        }
    }

    pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(parsed.and_utc());
            }
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }

    /// Missing, null and unparseable values all decode as `0`.
    pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<Value>::deserialize(deserializer)?
            .as_ref()
            .and_then(value_as_f64)
            .unwrap_or(0.0))
    }

    pub fn opt_number<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<f64>, D::Error> {
        Ok(Option::<Value>::deserialize(deserializer)?
            .as_ref()
            .and_then(value_as_f64))
    }

    pub fn opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        Ok(Option::<Value>::deserialize(deserializer)?
            .as_ref()
            .and_then(value_as_id))
    }

    pub fn opt_timestamp<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(Option::<String>::deserialize(deserializer)?
            .as_deref()
            .and_then(parse_timestamp))
    }
}

/// Any of the list envelopes the backend returns.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PageEnvelope<T> {
    Content {
        content: Vec<T>,
        #[serde(default, alias = "totalElements")]
        total_elements: Option<u64>,
    },
    Results {
        results: Vec<T>,
        #[serde(default)]
        count: Option<u64>,
    },
    Data {
        data: Vec<T>,
        #[serde(default)]
        total: Option<u64>,
    },
    Bare(Vec<T>),
}

impl<T> PageEnvelope<T> {
    pub fn into_page(self) -> Page<T> {
        let (items, total) = match self {
            PageEnvelope::Content {
                content,
                total_elements,
            } => (content, total_elements),
            PageEnvelope::Results { results, count } => (results, count),
            PageEnvelope::Data { data, total } => (data, total),
            PageEnvelope::Bare(items) => (items, None),
        };
        let total = total
            .and_then(|total| usize::try_from(total).ok())
            .unwrap_or(items.len());
        Page { items, total }
    }
}

/// Converts every wire record, dropping (and logging) the ones that cannot
/// be identified rather than failing the whole list.
pub fn normalize_all<W, T>(
    wires: Vec<W>,
    convert: impl Fn(W) -> Result<T, ProtocolError>,
) -> Vec<T> {
    wires
        .into_iter()
        .filter_map(|wire| match convert(wire) {
            Ok(item) => Some(item),
            Err(err) => {
                warn!("protocol: skipping record: {err}");
                None
            }
        })
        .collect()
}

fn first_id(candidates: &[Option<i64>]) -> Option<i64> {
    candidates.iter().flatten().copied().next()
}

#[derive(Debug, Deserialize)]
pub struct BillDetailWire {
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub id: Option<i64>,
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub quantity: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub unit_price: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub total_price: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub insurance_discount: f64,
}

#[derive(Debug, Deserialize)]
pub struct BillWire {
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub bill_id: Option<i64>,
    #[serde(default)]
    pub appointment: Option<Value>,
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub patient: Option<i64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub total_cost: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub insurance_discount: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub amount: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub service_fee: f64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::opt_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bill_details: Vec<BillDetailWire>,
}

/// Only a numeric id or an object with an appointment id is resolvable.
pub fn appointment_ref(value: Option<Value>) -> Option<AppointmentRef> {
    match value? {
        Value::Number(n) => n.as_i64().map(|id| AppointmentRef::Id(AppointmentId(id))),
        Value::Object(mut map) => {
            let id = ["appointmentId", "appointment_id", "id"]
                .iter()
                .find_map(|key| map.get(*key).and_then(lenient::value_as_id))?;
            for key in ["appointmentId", "appointment_id"] {
                map.remove(key);
            }
            Some(AppointmentRef::Embedded {
                appointment_id: AppointmentId(id),
                details: map,
            })
        }
        _ => None,
    }
}

impl BillWire {
    pub fn into_bill(self) -> Result<Bill, ProtocolError> {
        let bill_id = first_id(&[self.bill_id, self.id]).ok_or_else(|| missing("bill", "id"))?;
        Ok(Bill {
            bill_id: BillId(bill_id),
            appointment: appointment_ref(self.appointment),
            patient_id: self.patient.map(PatientId),
            total_cost: self.total_cost,
            insurance_discount: self.insurance_discount,
            amount: self.amount,
            service_fee: self.service_fee,
            status: BillStatus::from_code(self.status.as_deref().unwrap_or_default()),
            created_at: self.created_at,
            updated_at: self.updated_at,
            bill_details: self
                .bill_details
                .into_iter()
                .map(|detail| BillDetail {
                    detail_id: detail.id,
                    item_type: detail.item_type,
                    quantity: detail.quantity,
                    unit_price: detail.unit_price,
                    total_price: detail.total_price,
                    insurance_discount: detail.insurance_discount,
                })
                .collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ServiceOrderWire {
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub order_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub appointment_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub appointment: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub service_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub service: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub room_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub room: Option<i64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub price: f64,
    #[serde(default)]
    pub order_status: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ServiceOrderWire {
    pub fn into_line(self) -> Result<ServiceOrderLine, ProtocolError> {
        let order_id =
            first_id(&[self.order_id, self.id]).ok_or_else(|| missing("service order", "id"))?;
        let service_id = first_id(&[self.service_id, self.service])
            .ok_or_else(|| missing("service order", "service_id"))?;
        Ok(ServiceOrderLine {
            order_id: ServiceOrderId(order_id),
            appointment_id: first_id(&[self.appointment_id, self.appointment]).map(AppointmentId),
            service_id: ServiceId(service_id),
            room_id: first_id(&[self.room_id, self.room]).map(RoomId),
            price: self.price,
            order_status: self.order_status.or(self.status),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ServiceWire {
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub id: Option<i64>,
    #[serde(default, alias = "serviceName")]
    pub service_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub price: f64,
}

impl ServiceWire {
    /// The requested id wins when the payload omits its own.
    pub fn into_service(self, requested: ServiceId) -> ServiceInfo {
        ServiceInfo {
            service_id: self.id.map(ServiceId).unwrap_or(requested),
            service_name: self
                .service_name
                .unwrap_or_else(|| crate::domain::UNKNOWN_SERVICE_NAME.to_string()),
            price: self.price,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DoctorInfoWire {
    #[serde(default, alias = "doctorId", deserialize_with = "lenient::opt_id")]
    pub doctor_id: Option<i64>,
    #[serde(default, alias = "fullName")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub price: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleWire {
    #[serde(default, alias = "scheduleId", deserialize_with = "lenient::opt_id")]
    pub schedule_id: Option<i64>,
    #[serde(default, alias = "workDate")]
    pub work_date: Option<String>,
    #[serde(default)]
    pub shift: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentWire {
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub id: Option<i64>,
    #[serde(default, alias = "appointmentId", deserialize_with = "lenient::opt_id")]
    pub appointment_id: Option<i64>,
    #[serde(default, alias = "doctorId", deserialize_with = "lenient::opt_id")]
    pub doctor_id: Option<i64>,
    #[serde(default, alias = "doctorInfo")]
    pub doctor_info: Option<DoctorInfoWire>,
    #[serde(default)]
    pub schedule: Option<ScheduleWire>,
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default, alias = "slotStart")]
    pub slot_start: Option<String>,
    #[serde(default, alias = "slotEnd")]
    pub slot_end: Option<String>,
    #[serde(default, alias = "appointmentStatus")]
    pub status: Option<String>,
    #[serde(default, alias = "createdAt", deserialize_with = "lenient::opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "prescriptionId", deserialize_with = "lenient::opt_id")]
    pub prescription_id: Option<i64>,
}

impl AppointmentWire {
    pub fn into_appointment(self) -> Result<Appointment, ProtocolError> {
        let appointment_id = first_id(&[self.appointment_id, self.id])
            .ok_or_else(|| missing("appointment", "id"))?;
        let doctor_info = self.doctor_info.map(|info| DoctorInfo {
            doctor_id: info.doctor_id.map(DoctorId),
            full_name: info.full_name,
            specialization: info.specialization,
            price: info.price,
        });
        Ok(Appointment {
            appointment_id: AppointmentId(appointment_id),
            doctor_id: self
                .doctor_id
                .map(DoctorId)
                .or_else(|| doctor_info.as_ref().and_then(|info| info.doctor_id)),
            doctor_info,
            schedule: self.schedule.map(|schedule| Schedule {
                schedule_id: schedule.schedule_id.map(ScheduleId),
                work_date: schedule.work_date,
                shift: schedule.shift,
            }),
            symptoms: self.symptoms,
            slot_start: self.slot_start,
            slot_end: self.slot_end,
            appointment_status: AppointmentStatus::from_code(
                self.status.as_deref().unwrap_or_default(),
            ),
            created_at: self.created_at,
            prescription_id: self.prescription_id.map(PrescriptionId),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct AppointmentStatusUpdate {
    pub status: &'static str,
}

impl From<AppointmentStatus> for AppointmentStatusUpdate {
    fn from(status: AppointmentStatus) -> Self {
        Self {
            status: status.code(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NoteWire {
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub id: Option<i64>,
    #[serde(default, alias = "noteType")]
    pub note_type: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "createdAt", deserialize_with = "lenient::opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl NoteWire {
    pub fn into_note(self) -> Result<AppointmentNote, ProtocolError> {
        Ok(AppointmentNote {
            note_id: NoteId(self.id.ok_or_else(|| missing("appointment note", "id"))?),
            note_type: NoteType::from_code(self.note_type.as_deref().unwrap_or_default()),
            content: self.content.unwrap_or_default(),
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ContactWire {
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub id: Option<i64>,
    #[serde(default, alias = "contactId", deserialize_with = "lenient::opt_id")]
    pub contact_id: Option<i64>,
    #[serde(default, alias = "contactName")]
    pub contact_name: Option<String>,
    #[serde(default, alias = "contactPhone")]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub relationship: Option<String>,
}

impl ContactWire {
    pub fn into_contact(self) -> Result<EmergencyContact, ProtocolError> {
        let contact_id = first_id(&[self.contact_id, self.id])
            .ok_or_else(|| missing("emergency contact", "id"))?;
        Ok(EmergencyContact {
            contact_id: ContactId(contact_id),
            contact_name: self.contact_name.unwrap_or_default(),
            contact_phone: self.contact_phone.unwrap_or_default(),
            relationship: Relationship::from_code(self.relationship.as_deref().unwrap_or_default()),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ContactPayload<'a> {
    pub contact_name: &'a str,
    pub contact_phone: &'a str,
    pub relationship: &'static str,
}

impl<'a> From<&'a ContactDraft> for ContactPayload<'a> {
    fn from(draft: &'a ContactDraft) -> Self {
        Self {
            contact_name: draft.contact_name.trim(),
            contact_phone: draft.contact_phone.trim(),
            relationship: draft.relationship.as_str(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TransactionWire {
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub id: Option<i64>,
    #[serde(default, alias = "bill", deserialize_with = "lenient::opt_id")]
    pub bill_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub amount: f64,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_timestamp")]
    pub transaction_date: Option<DateTime<Utc>>,
}

impl TransactionWire {
    pub fn into_transaction(self) -> Result<Transaction, ProtocolError> {
        Ok(Transaction {
            transaction_id: TransactionId(self.id.ok_or_else(|| missing("transaction", "id"))?),
            bill_id: self.bill_id.map(BillId),
            amount: self.amount,
            payment_method: PaymentMethod::from_code(
                self.payment_method.as_deref().unwrap_or_default(),
            ),
            status: TransactionStatus::from_code(self.status.as_deref().unwrap_or_default()),
            transaction_date: self.transaction_date,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PatientWire {
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub id: Option<i64>,
    #[serde(default, alias = "patientId", deserialize_with = "lenient::opt_id")]
    pub patient_id: Option<i64>,
    #[serde(default, alias = "fullName")]
    pub full_name: Option<String>,
    #[serde(default, alias = "phoneNumber")]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "identityNumber")]
    pub identity_number: Option<String>,
    #[serde(default, alias = "insuranceNumber")]
    pub insurance_number: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

impl PatientWire {
    pub fn into_patient(self) -> Result<PatientSummary, ProtocolError> {
        let patient_id =
            first_id(&[self.patient_id, self.id]).ok_or_else(|| missing("patient", "id"))?;
        Ok(PatientSummary {
            patient_id: PatientId(patient_id),
            full_name: self.full_name.unwrap_or_default(),
            phone: self.phone,
            email: self.email,
            identity_number: self.identity_number,
            insurance_number: self.insurance_number,
            gender: Gender::from_code(self.gender.as_deref().unwrap_or_default()),
        })
    }
}

const CANCELLED_MARKER: &str = "cancel";

#[derive(Debug, Deserialize)]
pub struct MedicineWire {
    #[serde(default, alias = "medicineName")]
    pub medicine_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PrescriptionDetailWire {
    #[serde(default)]
    pub medicine: Option<MedicineWire>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PrescriptionWire {
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub id: Option<i64>,
    #[serde(default, alias = "appointmentId", deserialize_with = "lenient::opt_id")]
    pub appointment: Option<i64>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default, alias = "createdAt", deserialize_with = "lenient::opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "prescriptionDetails")]
    pub prescription_details: Vec<PrescriptionDetailWire>,
}

impl PrescriptionWire {
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some(CANCELLED_MARKER)
    }

    /// Cancelled detail lines are dropped; a missing quantity counts as one.
    pub fn into_prescription(self) -> Result<Prescription, ProtocolError> {
        Ok(Prescription {
            prescription_id: PrescriptionId(self.id.ok_or_else(|| missing("prescription", "id"))?),
            appointment_id: self.appointment.map(AppointmentId),
            diagnosis: self.diagnosis,
            note: self.note,
            created_at: self.created_at,
            details: self
                .prescription_details
                .into_iter()
                .filter(|detail| detail.status.as_deref() != Some(CANCELLED_MARKER))
                .map(|detail| PrescriptionDetail {
                    medicine_name: detail
                        .medicine
                        .and_then(|medicine| medicine.medicine_name)
                        .unwrap_or_default(),
                    quantity: detail.quantity.unwrap_or(1.0),
                    dosage: detail.dosage,
                })
                .collect(),
        })
    }
}

/// Extracts a checkout link from `{data: {checkoutUrl, orderCode}}`, a flat
/// object, or `{data: "<url>"}`.
pub fn checkout_link(body: &Value) -> Option<CheckoutLink> {
    let payload = body.get("data").unwrap_or(body);
    if let Value::String(url) = payload {
        return Some(CheckoutLink {
            checkout_url: url.clone(),
            order_code: None,
        });
    }
    let url = ["checkoutUrl", "checkout_url", "paymentUrl", "payment_url"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))?;
    let order_code = ["orderCode", "order_code"]
        .iter()
        .find_map(|key| payload.get(*key))
        .and_then(|code| match code {
            Value::String(text) => Some(text.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
    Some(CheckoutLink {
        checkout_url: url.to_string(),
        order_code,
    })
}
