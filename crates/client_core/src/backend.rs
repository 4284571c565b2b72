use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use shared::{
    codes::AppointmentStatus,
    domain::{
        Appointment, AppointmentId, AppointmentNote, Bill, BillId, CheckoutLink, ContactDraft,
        ContactId, EmergencyContact, NoteId, Page, PageRequest, PatientId, PatientSummary,
        Prescription, PrescriptionId, ServiceId, ServiceInfo, ServiceOrderId, ServiceOrderLine,
        Transaction,
    },
    protocol::{
        checkout_link, normalize_all, AppointmentStatusUpdate, AppointmentWire, BillWire,
        ContactPayload, ContactWire, NoteWire, PageEnvelope, PatientWire, PrescriptionWire,
        ProtocolError, ServiceOrderWire, ServiceWire, TransactionWire,
    },
};
use tracing::debug;

use crate::transport::{ApiClient, RequestError};

/// Every backend read and write the orchestration layer depends on, already
/// translated into view models.
#[async_trait]
pub trait HospitalBackend: Send + Sync {
    async fn bills_for_patient(&self, patient_id: PatientId) -> Result<Vec<Bill>, RequestError>;
    async fn service_orders_for_appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<Vec<ServiceOrderLine>, RequestError>;
    async fn service(&self, service_id: ServiceId) -> Result<ServiceInfo, RequestError>;
    async fn appointments_for_patient(
        &self,
        patient_id: PatientId,
        page: PageRequest,
    ) -> Result<Page<Appointment>, RequestError>;
    async fn appointment(&self, appointment_id: AppointmentId)
        -> Result<Appointment, RequestError>;
    async fn appointment_notes(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<Vec<AppointmentNote>, RequestError>;
    /// `Ok(None)` when the appointment has no prescription.
    async fn prescription_for_appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<Option<Prescription>, RequestError>;
    async fn prescriptions_for_patient(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<Prescription>, RequestError>;
    async fn emergency_contacts(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<EmergencyContact>, RequestError>;
    async fn patients(&self, page: PageRequest) -> Result<Page<PatientSummary>, RequestError>;
    async fn transactions_for_patient(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<Transaction>, RequestError>;

    async fn update_appointment_status(
        &self,
        appointment_id: AppointmentId,
        status: AppointmentStatus,
    ) -> Result<(), RequestError>;
    async fn create_booking_payment(&self, bill_id: BillId) -> Result<CheckoutLink, RequestError>;
    async fn create_service_payment(&self, bill_id: BillId) -> Result<CheckoutLink, RequestError>;
    async fn cash_payment(&self, bill_id: BillId) -> Result<(), RequestError>;
    async fn create_contact(
        &self,
        patient_id: PatientId,
        draft: &ContactDraft,
    ) -> Result<EmergencyContact, RequestError>;
    async fn update_contact(
        &self,
        patient_id: PatientId,
        contact_id: ContactId,
        draft: &ContactDraft,
    ) -> Result<EmergencyContact, RequestError>;
    async fn delete_contact(
        &self,
        patient_id: PatientId,
        contact_id: ContactId,
    ) -> Result<(), RequestError>;
    async fn delete_patient(&self, patient_id: PatientId) -> Result<(), RequestError>;
    async fn delete_prescription(&self, prescription_id: PrescriptionId)
        -> Result<(), RequestError>;
    async fn delete_service_order(&self, order_id: ServiceOrderId) -> Result<(), RequestError>;
    async fn delete_appointment_note(&self, note_id: NoteId) -> Result<(), RequestError>;
}

#[derive(Clone)]
pub struct HttpBackend {
    api: ApiClient,
}

impl HttpBackend {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    async fn list<W: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Page<W>, RequestError> {
        let envelope: PageEnvelope<W> = if query.is_empty() {
            self.api.get(path).await?
        } else {
            self.api.get_query(path, query).await?
        };
        Ok(envelope.into_page())
    }

    async fn write(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, RequestError> {
        self.api.request::<Value>(method, path, body).await
    }

    async fn checkout(&self, path: &str) -> Result<CheckoutLink, RequestError> {
        let body = self.write(Method::POST, path, None).await?;
        checkout_link(&body).ok_or_else(|| RequestError::Unexpected {
            path: path.to_string(),
            detail: "response carries no checkout url".into(),
        })
    }
}

fn unexpected(path: &str, err: ProtocolError) -> RequestError {
    RequestError::Unexpected {
        path: path.to_string(),
        detail: err.to_string(),
    }
}

/// Single-object responses are sometimes wrapped in `{data: ..}`.
fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn decode<W: DeserializeOwned>(path: &str, body: Value) -> Result<W, RequestError> {
    serde_json::from_value(unwrap_data(body)).map_err(|source| RequestError::Decode {
        path: path.to_string(),
        source,
    })
}

#[async_trait]
impl HospitalBackend for HttpBackend {
    async fn bills_for_patient(&self, patient_id: PatientId) -> Result<Vec<Bill>, RequestError> {
        let page = self
            .list::<BillWire>(&format!("/bills/patient/{patient_id}/"), &[])
            .await?;
        Ok(normalize_all(page.items, BillWire::into_bill))
    }

    async fn service_orders_for_appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<Vec<ServiceOrderLine>, RequestError> {
        let page = self
            .list::<ServiceOrderWire>(
                &format!("/service-orders/appointment/{appointment_id}/"),
                &[],
            )
            .await?;
        Ok(normalize_all(page.items, ServiceOrderWire::into_line))
    }

    async fn service(&self, service_id: ServiceId) -> Result<ServiceInfo, RequestError> {
        let path = format!("/services/{service_id}/");
        let body: Value = self.api.get(&path).await?;
        let wire: ServiceWire = decode(&path, body)?;
        Ok(wire.into_service(service_id))
    }

    async fn appointments_for_patient(
        &self,
        patient_id: PatientId,
        page: PageRequest,
    ) -> Result<Page<Appointment>, RequestError> {
        let raw = self
            .list::<AppointmentWire>(
                &format!("/appointments/patient/{patient_id}/"),
                &[
                    ("page", page.page.to_string()),
                    ("pageSize", page.page_size.to_string()),
                ],
            )
            .await?;
        Ok(Page {
            total: raw.total,
            items: normalize_all(raw.items, AppointmentWire::into_appointment),
        })
    }

    async fn appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<Appointment, RequestError> {
        let path = format!("/appointments/{appointment_id}/");
        let body: Value = self.api.get(&path).await?;
        let wire: AppointmentWire = decode(&path, body)?;
        wire.into_appointment().map_err(|err| unexpected(&path, err))
    }

    async fn appointment_notes(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<Vec<AppointmentNote>, RequestError> {
        let page = self
            .list::<NoteWire>(&format!("/appointments/{appointment_id}/notes/"), &[])
            .await?;
        Ok(normalize_all(page.items, NoteWire::into_note))
    }

    async fn prescription_for_appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<Option<Prescription>, RequestError> {
        let path = format!("/pharmacy/prescriptions/appointment/{appointment_id}/");
        let body: Value = match self.api.get(&path).await {
            Ok(body) => body,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        let wires: Vec<PrescriptionWire> = match unwrap_data(body) {
            Value::Null => Vec::new(),
            Value::Array(items) => decode(&path, Value::Array(items))?,
            single => vec![decode(&path, single)?],
        };
        let live: Vec<PrescriptionWire> = wires
            .into_iter()
            .filter(|wire| !wire.is_cancelled())
            .collect();
        Ok(normalize_all(live, PrescriptionWire::into_prescription)
            .into_iter()
            .next())
    }

    async fn prescriptions_for_patient(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<Prescription>, RequestError> {
        let page = self
            .list::<PrescriptionWire>(
                &format!("/pharmacy/prescriptions/patient/{patient_id}/"),
                &[],
            )
            .await?;
        let live: Vec<PrescriptionWire> = page
            .items
            .into_iter()
            .filter(|wire| !wire.is_cancelled())
            .collect();
        Ok(normalize_all(live, PrescriptionWire::into_prescription))
    }

    async fn emergency_contacts(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<EmergencyContact>, RequestError> {
        let page = self
            .list::<ContactWire>(&format!("/patients/{patient_id}/emergency-contacts/"), &[])
            .await?;
        Ok(normalize_all(page.items, ContactWire::into_contact))
    }

    async fn patients(&self, page: PageRequest) -> Result<Page<PatientSummary>, RequestError> {
        let raw = self
            .list::<PatientWire>(
                "/patients/",
                &[
                    ("page", page.page.to_string()),
                    ("page_size", page.page_size.to_string()),
                ],
            )
            .await?;
        Ok(Page {
            total: raw.total,
            items: normalize_all(raw.items, PatientWire::into_patient),
        })
    }

    async fn transactions_for_patient(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<Transaction>, RequestError> {
        let page = self
            .list::<TransactionWire>("/transactions/", &[("patient_id", patient_id.to_string())])
            .await?;
        Ok(normalize_all(page.items, TransactionWire::into_transaction))
    }

    async fn update_appointment_status(
        &self,
        appointment_id: AppointmentId,
        status: AppointmentStatus,
    ) -> Result<(), RequestError> {
        let body = json!(AppointmentStatusUpdate::from(status));
        self.write(
            Method::PATCH,
            &format!("/appointments/{appointment_id}/"),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn create_booking_payment(&self, bill_id: BillId) -> Result<CheckoutLink, RequestError> {
        self.checkout(&format!("/transactions/create-payment/{bill_id}/"))
            .await
    }

    async fn create_service_payment(&self, bill_id: BillId) -> Result<CheckoutLink, RequestError> {
        self.checkout(&format!("/transactions/create-service-payment/{bill_id}/"))
            .await
    }

    async fn cash_payment(&self, bill_id: BillId) -> Result<(), RequestError> {
        self.write(
            Method::POST,
            &format!("/transactions/cash-payment/{bill_id}/"),
            None,
        )
        .await?;
        Ok(())
    }

    async fn create_contact(
        &self,
        patient_id: PatientId,
        draft: &ContactDraft,
    ) -> Result<EmergencyContact, RequestError> {
        let path = format!("/patients/{patient_id}/emergency-contacts/");
        let body = json!(ContactPayload::from(draft));
        let response = self.write(Method::POST, &path, Some(&body)).await?;
        let wire: ContactWire = decode(&path, response)?;
        wire.into_contact().map_err(|err| unexpected(&path, err))
    }

    async fn update_contact(
        &self,
        patient_id: PatientId,
        contact_id: ContactId,
        draft: &ContactDraft,
    ) -> Result<EmergencyContact, RequestError> {
        let path = format!("/patients/{patient_id}/emergency-contacts/{contact_id}/");
        let body = json!(ContactPayload::from(draft));
        let response = self.write(Method::PUT, &path, Some(&body)).await?;
        let wire: ContactWire = decode(&path, response)?;
        match wire.into_contact() {
            Ok(contact) => Ok(contact),
            Err(err) => {
                debug!("backend: update response lacked an id path={path} err={err}");
                Ok(EmergencyContact {
                    contact_id,
                    contact_name: draft.contact_name.trim().to_string(),
                    contact_phone: draft.contact_phone.trim().to_string(),
                    relationship: draft.relationship,
                })
            }
        }
    }

    async fn delete_contact(
        &self,
        patient_id: PatientId,
        contact_id: ContactId,
    ) -> Result<(), RequestError> {
        self.write(
            Method::DELETE,
            &format!("/patients/{patient_id}/emergency-contacts/{contact_id}/"),
            None,
        )
        .await?;
        Ok(())
    }

    async fn delete_patient(&self, patient_id: PatientId) -> Result<(), RequestError> {
        self.write(Method::DELETE, &format!("/patients/{patient_id}/"), None)
            .await?;
        Ok(())
    }

    async fn delete_prescription(
        &self,
        prescription_id: PrescriptionId,
    ) -> Result<(), RequestError> {
        self.write(
            Method::DELETE,
            &format!("/pharmacy/prescriptions/{prescription_id}/"),
            None,
        )
        .await?;
        Ok(())
    }

    async fn delete_service_order(&self, order_id: ServiceOrderId) -> Result<(), RequestError> {
        self.write(Method::DELETE, &format!("/service-orders/{order_id}/"), None)
            .await?;
        Ok(())
    }

    async fn delete_appointment_note(&self, note_id: NoteId) -> Result<(), RequestError> {
        self.write(Method::DELETE, &format!("/appointment-notes/{note_id}/"), None)
            .await?;
        Ok(())
    }
}
