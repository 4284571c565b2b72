//! In-memory [`HospitalBackend`] with call recording and failure injection.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::json;
use shared::{
    codes::{AppointmentStatus, BillStatus, Gender, Relationship},
    domain::{
        Appointment, AppointmentId, AppointmentNote, AppointmentRef, Bill, BillId, CheckoutLink,
        ContactDraft, ContactId, DoctorInfo, EmergencyContact, NoteId, Page, PageRequest,
        PatientId, PatientSummary, Prescription, PrescriptionId, ServiceId, ServiceInfo,
        ServiceOrderId, ServiceOrderLine, Transaction,
    },
};

use crate::{
    backend::HospitalBackend, dispatcher::CheckoutLauncher, transport::RequestError,
};

pub fn status_error(path: &str, status: u16) -> RequestError {
    RequestError::Status {
        path: path.to_string(),
        status,
        data: json!({"detail": format!("fake failure on {path}")}),
    }
}

pub fn bill(id: i64, status: BillStatus, appointment: Option<i64>) -> Bill {
    Bill {
        bill_id: BillId(id),
        appointment: appointment.map(|id| AppointmentRef::Id(AppointmentId(id))),
        patient_id: Some(PatientId(1)),
        total_cost: 200_000.0,
        insurance_discount: 0.0,
        amount: 200_000.0,
        service_fee: 100_000.0,
        status,
        created_at: None,
        updated_at: None,
        bill_details: Vec::new(),
    }
}

pub fn order_line(order: i64, appointment: i64, service: i64) -> ServiceOrderLine {
    ServiceOrderLine {
        order_id: ServiceOrderId(order),
        appointment_id: Some(AppointmentId(appointment)),
        service_id: ServiceId(service),
        room_id: None,
        price: 50_000.0,
        order_status: Some("O".into()),
    }
}

pub fn service(id: i64, name: &str, price: f64) -> ServiceInfo {
    ServiceInfo {
        service_id: ServiceId(id),
        service_name: name.to_string(),
        price,
    }
}

pub fn appointment(id: i64, status: AppointmentStatus) -> Appointment {
    Appointment {
        appointment_id: AppointmentId(id),
        doctor_id: None,
        doctor_info: Some(DoctorInfo {
            doctor_id: None,
            full_name: Some(format!("BS. {id}")),
            specialization: None,
            price: None,
        }),
        schedule: None,
        symptoms: None,
        slot_start: None,
        slot_end: None,
        appointment_status: status,
        created_at: None,
        prescription_id: None,
    }
}

pub fn patient(id: i64, name: &str) -> PatientSummary {
    PatientSummary {
        patient_id: PatientId(id),
        full_name: name.to_string(),
        phone: Some(format!("09000000{id:02}")),
        email: None,
        identity_number: None,
        insurance_number: None,
        gender: Gender::Other,
    }
}

pub fn contact(id: i64, name: &str) -> EmergencyContact {
    EmergencyContact {
        contact_id: ContactId(id),
        contact_name: name.to_string(),
        contact_phone: "0912345678".into(),
        relationship: Relationship::Family,
    }
}

#[derive(Default)]
struct FakeState {
    bills: Vec<Bill>,
    bills_status: Option<u16>,
    failing_bill_calls: HashSet<usize>,
    paid_after: Option<(BillId, usize)>,
    bill_calls: usize,
    orders: HashMap<AppointmentId, Vec<ServiceOrderLine>>,
    failing_orders: HashSet<AppointmentId>,
    services: HashMap<ServiceId, ServiceInfo>,
    appointments: Vec<Appointment>,
    notes: HashMap<AppointmentId, Vec<AppointmentNote>>,
    prescriptions: Vec<Prescription>,
    contacts: Vec<EmergencyContact>,
    patients: Vec<PatientSummary>,
    transactions: Vec<Transaction>,
    write_status: Option<u16>,
    next_contact_id: i64,
    calls: Vec<String>,
}

/// Backend double. Service metadata that was never registered answers 404.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(self, f: impl FnOnce(&mut FakeState)) -> Self {
        f(&mut self.state.lock().expect("fake state"));
        self
    }

    pub fn with_bills(self, bills: Vec<Bill>) -> Self {
        self.with(|state| state.bills = bills)
    }

    pub fn failing_bills(self, status: u16) -> Self {
        self.with(|state| state.bills_status = Some(status))
    }

    /// The `n`th bill fetch (1-based) fails with a 500.
    pub fn failing_bill_call(self, n: usize) -> Self {
        self.with(|state| {
            state.failing_bill_calls.insert(n);
        })
    }

    /// From the `n`th bill fetch on, `bill_id` reads PAID.
    pub fn paid_after(self, bill_id: BillId, n: usize) -> Self {
        self.with(|state| state.paid_after = Some((bill_id, n)))
    }

    pub fn with_orders(self, appointment: i64, lines: Vec<ServiceOrderLine>) -> Self {
        self.with(|state| {
            state.orders.insert(AppointmentId(appointment), lines);
        })
    }

    pub fn failing_orders(self, appointment: i64) -> Self {
        self.with(|state| {
            state.failing_orders.insert(AppointmentId(appointment));
        })
    }

    pub fn with_service(self, info: ServiceInfo) -> Self {
        self.with(|state| {
            state.services.insert(info.service_id, info);
        })
    }

    pub fn with_appointments(self, appointments: Vec<Appointment>) -> Self {
        self.with(|state| state.appointments = appointments)
    }

    pub fn with_notes(self, appointment: i64, notes: Vec<AppointmentNote>) -> Self {
        self.with(|state| {
            state.notes.insert(AppointmentId(appointment), notes);
        })
    }

    pub fn with_prescriptions(self, prescriptions: Vec<Prescription>) -> Self {
        self.with(|state| state.prescriptions = prescriptions)
    }

    pub fn with_contacts(self, contacts: Vec<EmergencyContact>) -> Self {
        self.with(|state| {
            state.next_contact_id = contacts.iter().map(|c| c.contact_id.0).max().unwrap_or(0) + 1;
            state.contacts = contacts;
        })
    }

    pub fn with_patients(self, patients: Vec<PatientSummary>) -> Self {
        self.with(|state| state.patients = patients)
    }

    pub fn with_transactions(self, transactions: Vec<Transaction>) -> Self {
        self.with(|state| state.transactions = transactions)
    }

    pub fn failing_writes(self, status: u16) -> Self {
        self.with(|state| state.write_status = Some(status))
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().expect("fake state").calls.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub fn set_bill_status(&self, bill_id: BillId, status: BillStatus) {
        let mut state = self.state.lock().expect("fake state");
        for bill in state.bills.iter_mut().filter(|bill| bill.bill_id == bill_id) {
            bill.status = status;
        }
    }

    fn record(&self, call: String) -> std::sync::MutexGuard<'_, FakeState> {
        let mut state = self.state.lock().expect("fake state");
        state.calls.push(call);
        state
    }

    fn write(&self, call: String, path: &str) -> Result<(), RequestError> {
        let state = self.record(call);
        match state.write_status {
            Some(status) => Err(status_error(path, status)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl HospitalBackend for FakeBackend {
    async fn bills_for_patient(&self, patient_id: PatientId) -> Result<Vec<Bill>, RequestError> {
        let path = format!("/bills/patient/{patient_id}/");
        let mut state = self.record(format!("bills:{patient_id}"));
        state.bill_calls += 1;
        let call = state.bill_calls;
        if let Some(status) = state.bills_status {
            return Err(status_error(&path, status));
        }
        if state.failing_bill_calls.contains(&call) {
            return Err(status_error(&path, 500));
        }
        let mut bills = state.bills.clone();
        if let Some((paid_id, from_call)) = state.paid_after {
            if call >= from_call {
                for bill in bills.iter_mut().filter(|bill| bill.bill_id == paid_id) {
                    bill.status = BillStatus::Paid;
                }
            }
        }
        Ok(bills)
    }

    async fn service_orders_for_appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<Vec<ServiceOrderLine>, RequestError> {
        let state = self.record(format!("orders:{appointment_id}"));
        if state.failing_orders.contains(&appointment_id) {
            return Err(status_error("/service-orders/appointment/", 500));
        }
        Ok(state.orders.get(&appointment_id).cloned().unwrap_or_default())
    }

    async fn service(&self, service_id: ServiceId) -> Result<ServiceInfo, RequestError> {
        let state = self.record(format!("service:{service_id}"));
        state
            .services
            .get(&service_id)
            .cloned()
            .ok_or_else(|| status_error(&format!("/services/{service_id}/"), 404))
    }

    async fn appointments_for_patient(
        &self,
        patient_id: PatientId,
        page: PageRequest,
    ) -> Result<Page<Appointment>, RequestError> {
        let state = self.record(format!(
            "appointments:{patient_id}:{}:{}",
            page.page, page.page_size
        ));
        Ok(Page::from_items(state.appointments.clone()))
    }

    async fn appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<Appointment, RequestError> {
        let state = self.record(format!("appointment:{appointment_id}"));
        state
            .appointments
            .iter()
            .find(|appointment| appointment.appointment_id == appointment_id)
            .cloned()
            .ok_or_else(|| status_error("/appointments/", 404))
    }

    async fn appointment_notes(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<Vec<AppointmentNote>, RequestError> {
        let state = self.record(format!("notes:{appointment_id}"));
        state
            .notes
            .get(&appointment_id)
            .cloned()
            .ok_or_else(|| status_error("/appointments/notes/", 500))
    }

    async fn prescription_for_appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<Option<Prescription>, RequestError> {
        let state = self.record(format!("prescription:{appointment_id}"));
        Ok(state
            .prescriptions
            .iter()
            .find(|prescription| prescription.appointment_id == Some(appointment_id))
            .cloned())
    }

    async fn prescriptions_for_patient(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<Prescription>, RequestError> {
        let state = self.record(format!("prescriptions:{patient_id}"));
        Ok(state.prescriptions.clone())
    }

    async fn emergency_contacts(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<EmergencyContact>, RequestError> {
        let state = self.record(format!("contacts:{patient_id}"));
        Ok(state.contacts.clone())
    }

    async fn patients(&self, page: PageRequest) -> Result<Page<PatientSummary>, RequestError> {
        let state = self.record(format!("patients:{}:{}", page.page, page.page_size));
        Ok(Page::from_items(state.patients.clone()))
    }

    async fn transactions_for_patient(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<Transaction>, RequestError> {
        let state = self.record(format!("transactions:{patient_id}"));
        Ok(state.transactions.clone())
    }

    async fn update_appointment_status(
        &self,
        appointment_id: AppointmentId,
        status: AppointmentStatus,
    ) -> Result<(), RequestError> {
        self.write(
            format!("update_status:{appointment_id}:{}", status.code()),
            "/appointments/",
        )?;
        let mut state = self.state.lock().expect("fake state");
        for appointment in state
            .appointments
            .iter_mut()
            .filter(|appointment| appointment.appointment_id == appointment_id)
        {
            appointment.appointment_status = status;
        }
        Ok(())
    }

    async fn create_booking_payment(&self, bill_id: BillId) -> Result<CheckoutLink, RequestError> {
        self.write(format!("booking_payment:{bill_id}"), "/transactions/create-payment/")?;
        Ok(CheckoutLink {
            checkout_url: format!("https://pay.example/booking/{bill_id}"),
            order_code: Some(bill_id.to_string()),
        })
    }

    async fn create_service_payment(&self, bill_id: BillId) -> Result<CheckoutLink, RequestError> {
        self.write(
            format!("service_payment:{bill_id}"),
            "/transactions/create-service-payment/",
        )?;
        Ok(CheckoutLink {
            checkout_url: format!("https://pay.example/services/{bill_id}"),
            order_code: None,
        })
    }

    async fn cash_payment(&self, bill_id: BillId) -> Result<(), RequestError> {
        self.write(format!("cash_payment:{bill_id}"), "/transactions/cash-payment/")?;
        self.set_bill_status(bill_id, BillStatus::Paid);
        Ok(())
    }

    async fn create_contact(
        &self,
        patient_id: PatientId,
        draft: &ContactDraft,
    ) -> Result<EmergencyContact, RequestError> {
        self.write(
            format!("create_contact:{patient_id}"),
            "/patients/emergency-contacts/",
        )?;
        let mut state = self.state.lock().expect("fake state");
        state.next_contact_id = state.next_contact_id.max(1);
        let created = EmergencyContact {
            contact_id: ContactId(state.next_contact_id),
            contact_name: draft.contact_name.clone(),
            contact_phone: draft.contact_phone.clone(),
            relationship: draft.relationship,
        };
        state.next_contact_id += 1;
        state.contacts.push(created.clone());
        Ok(created)
    }

    async fn update_contact(
        &self,
        patient_id: PatientId,
        contact_id: ContactId,
        draft: &ContactDraft,
    ) -> Result<EmergencyContact, RequestError> {
        self.write(
            format!("update_contact:{patient_id}:{contact_id}"),
            "/patients/emergency-contacts/",
        )?;
        Ok(EmergencyContact {
            contact_id,
            contact_name: draft.contact_name.clone(),
            contact_phone: draft.contact_phone.clone(),
            relationship: draft.relationship,
        })
    }

    async fn delete_contact(
        &self,
        patient_id: PatientId,
        contact_id: ContactId,
    ) -> Result<(), RequestError> {
        self.write(
            format!("delete_contact:{patient_id}:{contact_id}"),
            "/patients/emergency-contacts/",
        )
    }

    async fn delete_patient(&self, patient_id: PatientId) -> Result<(), RequestError> {
        self.write(format!("delete_patient:{patient_id}"), "/patients/")
    }

    async fn delete_prescription(
        &self,
        prescription_id: PrescriptionId,
    ) -> Result<(), RequestError> {
        self.write(
            format!("delete_prescription:{prescription_id}"),
            "/pharmacy/prescriptions/",
        )
    }

    async fn delete_service_order(&self, order_id: ServiceOrderId) -> Result<(), RequestError> {
        self.write(format!("delete_order:{order_id}"), "/service-orders/")?;
        let mut state = self.state.lock().expect("fake state");
        for lines in state.orders.values_mut() {
            lines.retain(|line| line.order_id != order_id);
        }
        Ok(())
    }

    async fn delete_appointment_note(&self, note_id: NoteId) -> Result<(), RequestError> {
        self.write(format!("delete_note:{note_id}"), "/appointment-notes/")?;
        let mut state = self.state.lock().expect("fake state");
        for notes in state.notes.values_mut() {
            notes.retain(|note| note.note_id != note_id);
        }
        Ok(())
    }
}

/// Records every checkout link it is asked to open.
#[derive(Default)]
pub struct RecordingLauncher {
    pub opened: Mutex<Vec<CheckoutLink>>,
    pub fail: bool,
}

impl CheckoutLauncher for RecordingLauncher {
    fn open(&self, link: &CheckoutLink) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("no browser available");
        }
        self.opened.lock().expect("launcher").push(link.clone());
        Ok(())
    }
}
