use chrono::{DateTime, Utc};
use client_core::{
    records::InvoiceRow, view_state::ViewSlice, AppointmentDetail, ClientEvent, NoticeLevel,
    PaymentPollState,
};
use shared::domain::{Appointment, EmergencyContact, PatientSummary, Prescription, Transaction};

/// One printed line per record.
pub trait Row {
    const HEADER: &'static str;

    fn row(&self) -> String;
}

pub fn money(amount: f64) -> String {
    let whole = amount.round() as i64;
    let digits = whole.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    let sign = if whole < 0 { "-" } else { "" };
    format!("{sign}{grouped} ₫")
}

fn date(at: Option<DateTime<Utc>>) -> String {
    at.map(|at| at.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn or_dash(value: Option<&str>) -> &str {
    value.filter(|value| !value.trim().is_empty()).unwrap_or("-")
}

impl Row for InvoiceRow {
    const HEADER: &'static str = "   ID  NGÀY        SỐ TIỀN          TRẠNG THÁI                  DỊCH VỤ";

    fn row(&self) -> String {
        let services = if self.has_services() {
            self.services
                .iter()
                .map(|order| order.service.service_name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            "-".to_string()
        };
        format!(
            "{:>5}  {:<10}  {:>15}  {:<26}  {services}",
            self.bill.bill_id,
            date(self.bill.created_at),
            money(self.bill.expected_amount()),
            self.bill.status.label(),
        )
    }
}

impl Row for Appointment {
    const HEADER: &'static str = "   ID  NGÀY KHÁM         BÁC SĨ                TRẠNG THÁI     TRIỆU CHỨNG";

    fn row(&self) -> String {
        let schedule = self.schedule.as_ref().and_then(|s| s.work_date.as_deref());
        let when = match (schedule, self.slot_start.as_deref()) {
            (Some(day), Some(slot)) => format!("{day} {slot}"),
            (Some(day), None) => day.to_string(),
            _ => date(self.created_at),
        };
        format!(
            "{:>5}  {:<16}  {:<20}  {:<13}  {}",
            self.appointment_id,
            when,
            or_dash(self.doctor_name()),
            self.appointment_status.label(),
            or_dash(self.symptoms.as_deref()),
        )
    }
}

impl Row for EmergencyContact {
    const HEADER: &'static str = "   ID  HỌ TÊN                    SỐ ĐIỆN THOẠI  QUAN HỆ";

    fn row(&self) -> String {
        format!(
            "{:>5}  {:<24}  {:<13}  {}",
            self.contact_id,
            self.contact_name,
            self.contact_phone,
            self.relationship.label()
        )
    }
}

impl Row for Prescription {
    const HEADER: &'static str = "   ID  NGÀY        CHẨN ĐOÁN              THUỐC";

    fn row(&self) -> String {
        let medicines = self
            .details
            .iter()
            .map(|detail| format!("{} x{}", detail.medicine_name, detail.quantity))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{:>5}  {:<10}  {:<21}  {}",
            self.prescription_id,
            date(self.created_at),
            or_dash(self.diagnosis.as_deref()),
            or_dash(Some(medicines.as_str())),
        )
    }
}

impl Row for PatientSummary {
    const HEADER: &'static str = "   ID  HỌ TÊN                    SỐ ĐIỆN THOẠI  GIỚI TÍNH";

    fn row(&self) -> String {
        format!(
            "{:>5}  {:<24}  {:<13}  {}",
            self.patient_id,
            self.full_name,
            or_dash(self.phone.as_deref()),
            self.gender.label()
        )
    }
}

impl Row for Transaction {
    const HEADER: &'static str = "   ID  NGÀY        SỐ TIỀN          PHƯƠNG THỨC    TRẠNG THÁI";

    fn row(&self) -> String {
        format!(
            "{:>5}  {:<10}  {:>15}  {:<13}  {}",
            self.transaction_id,
            date(self.transaction_date),
            money(self.amount),
            self.payment_method.label(),
            self.status.label()
        )
    }
}

pub fn slice<R: Row>(slice: &ViewSlice<R>) {
    if slice.total_filtered == 0 {
        println!("Không có dữ liệu.");
        return;
    }
    println!("{}", R::HEADER);
    for record in &slice.visible {
        println!("{}", record.row());
    }
    let last = slice.first_index() + slice.visible.len() - 1;
    if slice.show_pager() {
        println!(
            "Hiển thị {}-{last} / {} (trang {}/{})",
            slice.first_index(),
            slice.total_filtered,
            slice.page,
            slice.total_pages
        );
    } else {
        println!("Tổng cộng {} mục", slice.total_filtered);
    }
}

pub fn appointment_detail(detail: &AppointmentDetail) {
    println!("{}", Appointment::HEADER);
    println!("{}", detail.appointment.row());

    println!();
    println!("Dịch vụ đã chỉ định:");
    if detail.service_orders.is_empty() {
        println!("  (không có)");
    }
    for order in &detail.service_orders {
        println!(
            "  #{:<5} {:<30} {:>15}  {}",
            order.order_id,
            order.service.service_name,
            money(order.service.price),
            or_dash(order.order_status.as_deref())
        );
    }

    println!();
    println!("Ghi chú:");
    if detail.notes.is_empty() {
        println!("  (không có)");
    }
    for note in &detail.notes {
        println!(
            "  #{:<5} [{}] {}",
            note.note_id,
            note.note_type.label(),
            note.content
        );
    }

    println!();
    match &detail.prescription {
        Some(prescription) => {
            println!("Đơn thuốc:");
            println!("{}", prescription.row());
        }
        None => println!("Chưa có đơn thuốc."),
    }
}

pub fn event(event: &ClientEvent) {
    match event {
        ClientEvent::Notice(notice) => {
            let tag = match notice.level {
                NoticeLevel::Success => "OK",
                NoticeLevel::Info => "..",
                NoticeLevel::Error => "!!",
            };
            eprintln!("[{tag}] {}", notice.message);
        }
        ClientEvent::PaymentStateChanged { bill_id, state } => match state {
            PaymentPollState::AwaitingExternalPayment { attempts } => {
                eprintln!("[..] hóa đơn #{bill_id}: đang chờ thanh toán (lần kiểm tra {attempts})")
            }
            PaymentPollState::Confirmed { .. } => {
                eprintln!("[OK] hóa đơn #{bill_id}: đã xác nhận thanh toán")
            }
            PaymentPollState::TimedOut => {
                eprintln!("[!!] hóa đơn #{bill_id}: hết thời gian chờ xác nhận")
            }
            PaymentPollState::Cancelled => eprintln!("[..] hóa đơn #{bill_id}: đã hủy theo dõi"),
            PaymentPollState::Idle => {}
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_groups_thousands() {
        assert_eq!(money(0.0), "0 ₫");
        assert_eq!(money(999.0), "999 ₫");
        assert_eq!(money(150_000.0), "150.000 ₫");
        assert_eq!(money(1_234_567.4), "1.234.567 ₫");
        assert_eq!(money(-2_500.0), "-2.500 ₫");
    }
}
