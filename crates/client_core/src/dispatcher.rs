//! Writes against the backend and the reconciliation each one calls for.
//!
//! Nothing here mutates screen state directly. A successful action returns
//! a [`Reconcile`] for the owning screen to apply; a failed one returns a
//! [`DispatchError`] and has already been surfaced through the
//! [`Notifier`], so the screen keeps its last valid state.

use std::sync::Arc;

use shared::{
    codes::{AppointmentStatus, BillStatus},
    domain::{
        Appointment, AppointmentId, Bill, BillId, CheckoutLink, ContactDraft, ContactId,
        EmergencyContact, NoteId, PatientId, PatientSummary, Prescription, PrescriptionId,
        ServiceOrderId, NEW_CONTACT_ID,
    },
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    backend::HospitalBackend,
    error::describe,
    payment_poll::{PaymentWatch, PollSettings},
    records::InvoiceRow,
    transport::RequestError,
    view_state::ViewRecord,
    Notifier,
};

pub const SAME_STATUS_MESSAGE: &str = "Trạng thái mới giống với trạng thái hiện tại!";
pub const NO_ONLINE_PAYMENT_MESSAGE: &str = "Hóa đơn này không cần thanh toán online";

/// How a screen brings its list back in line with the backend after a write.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconcile<R: ViewRecord> {
    /// Re-run the screen's orchestrated fetch.
    Refetch,
    Remove(R::Key),
    Upsert(R),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Rejected locally; no request was sent.
    #[error("{0}")]
    Validation(String),
    #[error("{message}")]
    Backend {
        message: String,
        #[source]
        source: RequestError,
    },
    #[error("{0}")]
    Launch(String),
}

impl DispatchError {
    pub fn is_validation(&self) -> bool {
        matches!(self, DispatchError::Validation(_))
    }
}

/// Opens an external checkout page.
pub trait CheckoutLauncher: Send + Sync {
    fn open(&self, link: &CheckoutLink) -> anyhow::Result<()>;
}

/// Launcher for headless use: records the link in the log and succeeds.
pub struct LoggingLauncher;

impl CheckoutLauncher for LoggingLauncher {
    fn open(&self, link: &CheckoutLink) -> anyhow::Result<()> {
        info!("payment: checkout url={}", link.checkout_url);
        Ok(())
    }
}

#[derive(Clone)]
pub struct ActionDispatcher {
    backend: Arc<dyn HospitalBackend>,
    notifier: Notifier,
    launcher: Arc<dyn CheckoutLauncher>,
    poll: PollSettings,
}

impl ActionDispatcher {
    pub fn new(
        backend: Arc<dyn HospitalBackend>,
        notifier: Notifier,
        launcher: Arc<dyn CheckoutLauncher>,
        poll: PollSettings,
    ) -> Self {
        Self {
            backend,
            notifier,
            launcher,
            poll,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Refuses an action locally: logged, announced, and nothing is sent.
    pub(crate) fn reject(&self, message: &str) -> DispatchError {
        warn!("dispatch: rejected message={message:?}");
        self.notifier.error(message);
        DispatchError::Validation(message.to_string())
    }

    fn failed(&self, context: &str, source: RequestError) -> DispatchError {
        let message = describe(context, &source);
        warn!("dispatch: failed context={context:?} err={source}");
        self.notifier.error(message.clone());
        DispatchError::Backend { message, source }
    }

    /// The new status must differ from the current one. On success the
    /// caller re-fetches, since the backend may cascade other changes.
    pub async fn change_appointment_status(
        &self,
        appointment_id: AppointmentId,
        current: AppointmentStatus,
        new: AppointmentStatus,
    ) -> Result<Reconcile<Appointment>, DispatchError> {
        if new == current {
            return Err(self.reject(SAME_STATUS_MESSAGE));
        }
        self.backend
            .update_appointment_status(appointment_id, new)
            .await
            .map_err(|err| self.failed("Cập nhật trạng thái thất bại", err))?;
        info!("dispatch: appointment status changed appointment_id={appointment_id} status={new}");
        self.notifier.success(format!(
            "Cập nhật trạng thái lịch hẹn thành \"{}\" thành công!",
            new.label()
        ));
        Ok(Reconcile::Refetch)
    }

    pub async fn delete_contact(
        &self,
        patient_id: PatientId,
        contact_id: ContactId,
    ) -> Result<Reconcile<EmergencyContact>, DispatchError> {
        self.backend
            .delete_contact(patient_id, contact_id)
            .await
            .map_err(|err| self.failed("Xóa liên hệ khẩn cấp thất bại", err))?;
        info!("dispatch: contact deleted patient_id={patient_id} contact_id={contact_id}");
        self.notifier.success("Xóa liên hệ khẩn cấp thành công!");
        Ok(Reconcile::Remove(contact_id))
    }

    /// Contact id `0` creates, anything else updates.
    pub async fn save_contact(
        &self,
        patient_id: PatientId,
        contact_id: ContactId,
        draft: &ContactDraft,
    ) -> Result<Reconcile<EmergencyContact>, DispatchError> {
        if draft.contact_name.trim().is_empty() {
            return Err(self.reject("Vui lòng nhập tên người liên hệ"));
        }
        if draft.contact_phone.trim().is_empty() {
            return Err(self.reject("Vui lòng nhập số điện thoại người liên hệ"));
        }

        let is_new = contact_id == NEW_CONTACT_ID;
        let saved = if is_new {
            self.backend.create_contact(patient_id, draft).await
        } else {
            self.backend
                .update_contact(patient_id, contact_id, draft)
                .await
        }
        .map_err(|err| self.failed("Lưu liên hệ khẩn cấp thất bại", err))?;

        info!(
            "dispatch: contact saved patient_id={patient_id} contact_id={} created={is_new}",
            saved.contact_id
        );
        self.notifier.success(if is_new {
            "Thêm liên hệ khẩn cấp thành công!"
        } else {
            "Cập nhật liên hệ khẩn cấp thành công!"
        });
        Ok(Reconcile::Upsert(saved))
    }

    pub async fn delete_patient(
        &self,
        patient_id: PatientId,
    ) -> Result<Reconcile<PatientSummary>, DispatchError> {
        self.backend
            .delete_patient(patient_id)
            .await
            .map_err(|err| self.failed("Xóa bệnh nhân thất bại", err))?;
        info!("dispatch: patient deleted patient_id={patient_id}");
        self.notifier.success("Xóa bệnh nhân thành công!");
        Ok(Reconcile::Remove(patient_id))
    }

    pub async fn delete_prescription(
        &self,
        prescription_id: PrescriptionId,
    ) -> Result<Reconcile<Prescription>, DispatchError> {
        self.backend
            .delete_prescription(prescription_id)
            .await
            .map_err(|err| self.failed("Xóa đơn thuốc thất bại", err))?;
        info!("dispatch: prescription deleted prescription_id={prescription_id}");
        self.notifier.success("Xóa đơn thuốc thành công!");
        Ok(Reconcile::Remove(prescription_id))
    }

    /// The appointment detail must be re-fetched afterwards.
    pub async fn delete_service_order(
        &self,
        order_id: ServiceOrderId,
    ) -> Result<(), DispatchError> {
        self.backend
            .delete_service_order(order_id)
            .await
            .map_err(|err| self.failed("Xóa chỉ định dịch vụ thất bại", err))?;
        info!("dispatch: service order deleted order_id={order_id}");
        self.notifier.success("Xóa chỉ định dịch vụ thành công!");
        Ok(())
    }

    /// The appointment detail must be re-fetched afterwards.
    pub async fn delete_appointment_note(&self, note_id: NoteId) -> Result<(), DispatchError> {
        self.backend
            .delete_appointment_note(note_id)
            .await
            .map_err(|err| self.failed("Xóa ghi chú thất bại", err))?;
        info!("dispatch: appointment note deleted note_id={note_id}");
        self.notifier.success("Xóa ghi chú thành công!");
        Ok(())
    }

    /// Cash is confirmed synchronously, so a plain re-fetch follows.
    pub async fn pay_cash(&self, bill_id: BillId) -> Result<Reconcile<InvoiceRow>, DispatchError> {
        self.backend
            .cash_payment(bill_id)
            .await
            .map_err(|err| self.failed("Không thể thực hiện thanh toán", err))?;
        info!("dispatch: cash payment recorded bill_id={bill_id}");
        self.notifier.success("Thanh toán tiền mặt thành công!");
        Ok(Reconcile::Refetch)
    }

    /// Requests the checkout link matching the bill's stage, opens it, and
    /// starts the bounded poll for the PAID confirmation.
    pub async fn start_online_payment(
        &self,
        patient_id: PatientId,
        bill: &Bill,
    ) -> Result<PaymentWatch, DispatchError> {
        let link = match bill.status {
            BillStatus::Unpaid => self.backend.create_booking_payment(bill.bill_id).await,
            BillStatus::BookingPaid => self.backend.create_service_payment(bill.bill_id).await,
            BillStatus::Paid | BillStatus::Unknown => {
                return Err(self.reject(NO_ONLINE_PAYMENT_MESSAGE))
            }
        }
        .map_err(|err| self.failed("Không thể thực hiện thanh toán", err))?;

        if let Err(err) = self.launcher.open(&link) {
            let message = format!("Không thể mở trang thanh toán: {err}");
            warn!("dispatch: checkout launch failed bill_id={} err={err:#}", bill.bill_id);
            self.notifier.error(message.clone());
            return Err(DispatchError::Launch(message));
        }

        info!(
            "dispatch: online payment started bill_id={} stage={}",
            bill.bill_id, bill.status
        );
        self.notifier
            .info("Đang chờ xác nhận thanh toán từ cổng thanh toán...");
        Ok(PaymentWatch::start(
            self.backend.clone(),
            self.notifier.clone(),
            patient_id,
            bill.bill_id,
            self.poll,
        ))
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
