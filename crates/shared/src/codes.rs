//! Backend enumeration codes and their display forms.
//!
//! The backend stores enumerations as short codes (`P`, `U`, `X`, ...). Every
//! translation between those codes, the display enumeration words used by
//! view models, and the Vietnamese UI labels lives in this module and nowhere
//! else.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

macro_rules! code_table {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident => ($code:literal, $word:literal, $label:literal)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Short backend code.
            pub fn code(self) -> &'static str {
                match self {
                    $($name::$variant => $code),+
                }
            }

            /// Display enumeration word (`PENDING`, `PAID`, ...).
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $word),+
                }
            }

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Accepts either the backend code or the display word, ignoring
            /// ASCII case and surrounding whitespace.
            pub fn try_from_code(raw: &str) -> Option<Self> {
                let raw = raw.trim();
                $(
                    if raw.eq_ignore_ascii_case($code) || raw.eq_ignore_ascii_case($word) {
                        return Some($name::$variant);
                    }
                )+
                None
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
                Ok($name::from_code(&raw))
            }
        }
    };
}

code_table! {
    AppointmentStatus {
        Pending => ("P", "PENDING", "Chờ xác nhận"),
        Confirmed => ("C", "CONFIRMED", "Đã xác nhận"),
        Cancelled => ("X", "CANCELLED", "Đã hủy"),
        Completed => ("D", "COMPLETED", "Đã khám"),
        NoShow => ("N", "NO_SHOW", "Không đến"),
        InProgress => ("I", "IN_PROGRESS", "Đang khám"),
    }
}

impl AppointmentStatus {
    /// Unrecognized codes are treated as pending.
    pub fn from_code(raw: &str) -> Self {
        Self::try_from_code(raw).unwrap_or_else(|| {
            warn!("codes: unknown appointment status code={raw:?}, using PENDING");
            AppointmentStatus::Pending
        })
    }
}

code_table! {
    BillStatus {
        Paid => ("P", "PAID", "Đã thanh toán"),
        Unpaid => ("U", "UNPAID", "Chưa thanh toán"),
        BookingPaid => ("B", "BOOKING_PAID", "Đã thanh toán phí đặt lịch"),
        Unknown => ("", "UNKNOWN", "Không xác định"),
    }
}

impl BillStatus {
    pub fn from_code(raw: &str) -> Self {
        Self::try_from_code(raw).unwrap_or(BillStatus::Unknown)
    }

    /// Position in the `UNPAID -> BOOKING_PAID -> PAID` progression.
    pub fn progress_rank(self) -> Option<u8> {
        match self {
            BillStatus::Unpaid => Some(0),
            BillStatus::BookingPaid => Some(1),
            BillStatus::Paid => Some(2),
            BillStatus::Unknown => None,
        }
    }
}

code_table! {
    TransactionStatus {
        Pending => ("P", "PENDING", "Đang xử lý"),
        Success => ("S", "SUCCESS", "Thành công"),
        Failed => ("F", "FAILED", "Thất bại"),
    }
}

impl TransactionStatus {
    pub fn from_code(raw: &str) -> Self {
        Self::try_from_code(raw).unwrap_or_else(|| {
            warn!("codes: unknown transaction status code={raw:?}, using PENDING");
            TransactionStatus::Pending
        })
    }
}

code_table! {
    PaymentMethod {
        OnlineBanking => ("O", "ONLINE_BANKING", "Chuyển khoản"),
        Cash => ("C", "CASH", "Tiền mặt"),
    }
}

impl PaymentMethod {
    pub fn from_code(raw: &str) -> Self {
        Self::try_from_code(raw).unwrap_or_else(|| {
            warn!("codes: unknown payment method code={raw:?}, using ONLINE_BANKING");
            PaymentMethod::OnlineBanking
        })
    }
}

code_table! {
    Relationship {
        Family => ("F", "FAMILY", "Gia đình"),
        Friend => ("R", "FRIEND", "Bạn bè"),
        Others => ("O", "OTHERS", "Khác"),
    }
}

impl Relationship {
    pub fn from_code(raw: &str) -> Self {
        Self::try_from_code(raw).unwrap_or(Relationship::Others)
    }
}

code_table! {
    Gender {
        Male => ("M", "MALE", "Nam"),
        Female => ("F", "FEMALE", "Nữ"),
        Other => ("O", "OTHER", "Khác"),
    }
}

impl Gender {
    pub fn from_code(raw: &str) -> Self {
        Self::try_from_code(raw).unwrap_or(Gender::Other)
    }
}

code_table! {
    NoteType {
        Diagnosis => ("D", "DIAGNOSIS", "Chẩn đoán"),
        Prescription => ("P", "PRESCRIPTION", "Đơn thuốc"),
        General => ("G", "GENERAL", "Ghi chú"),
    }
}

impl NoteType {
    pub fn from_code(raw: &str) -> Self {
        Self::try_from_code(raw).unwrap_or(NoteType::General)
    }
}
