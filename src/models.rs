//! Order entity scraped from the portal inbox.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════
// Enums
// ═══════════════════════════════════════════════════════════

/// Which external portal an order came from. One variant today; the
/// capability trait in `portal` is where new platforms would plug in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    Meditlink,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Meditlink => write!(f, "MeditLink"),
        }
    }
}

/// Fabrication status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Shipped,
    Cancelled,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::InProgress => write!(f, "In progress"),
            Self::Completed => write!(f, "Completed"),
            Self::Shipped => write!(f, "Shipped"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Order
// ═══════════════════════════════════════════════════════════

/// One scraped lab order.
///
/// Identity is the portal's `external_id`: equality and hashing use that
/// field alone, so a re-scraped order compares equal to its cached
/// predecessor whatever its other fields say.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub external_id: String,
    pub patient_ref: String,
    pub received_on: Option<NaiveDate>,
    pub due_on: Option<NaiveDate>,
    pub clinic: Option<String>,
    pub comment: Option<String>,
    pub device_type: Option<String>,
    pub tracking_number: Option<String>,
    pub delivery_address: Option<String>,
    pub billing_address: Option<String>,
    pub phone: Option<String>,
    pub treatment_type: Option<String>,
    pub status: OrderStatus,
    pub read: bool,
    pub platform: Platform,
}

impl Order {
    /// New unread pending order for this integration's platform.
    pub fn new(external_id: impl Into<String>, patient_ref: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            patient_ref: patient_ref.into(),
            received_on: None,
            due_on: None,
            clinic: None,
            comment: None,
            device_type: None,
            tracking_number: None,
            delivery_address: None,
            billing_address: None,
            phone: None,
            treatment_type: None,
            status: OrderStatus::Pending,
            read: false,
            platform: Platform::Meditlink,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == OrderStatus::Completed
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == OrderStatus::InProgress
    }

    pub fn is_shipped(&self) -> bool {
        self.status == OrderStatus::Shipped
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == OrderStatus::Cancelled
    }

    pub fn has_tracking_number(&self) -> bool {
        self.tracking_number
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }

    /// Merge prescription data into this order.
    ///
    /// Partial update: supplied fields overwrite, absent fields are left
    /// untouched. Never a full replace.
    pub fn apply_prescription_update(&mut self, update: PrescriptionUpdate) {
        if let Some(patient_ref) = update.patient_ref {
            self.patient_ref = patient_ref;
        }
        if let Some(received_on) = update.received_on {
            self.received_on = Some(received_on);
        }
        if let Some(comment) = update.comment {
            self.comment = Some(comment);
        }
        if let Some(due_on) = update.due_on {
            self.due_on = Some(due_on);
        }
        if let Some(delivery_address) = update.delivery_address {
            self.delivery_address = Some(delivery_address);
        }
        if let Some(clinic) = update.clinic {
            self.clinic = Some(clinic);
        }
        if let Some(phone) = update.phone {
            self.phone = Some(phone);
        }
        if let Some(treatment_type) = update.treatment_type {
            self.treatment_type = Some(treatment_type);
        }
    }
}

impl PartialEq for Order {
    fn eq(&self, other: &Self) -> bool {
        self.external_id == other.external_id
    }
}

impl Eq for Order {}

impl std::hash::Hash for Order {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.external_id.hash(state);
    }
}

// ═══════════════════════════════════════════════════════════
// PrescriptionUpdate
// ═══════════════════════════════════════════════════════════

/// Incoming prescription data for an existing order. Every field is
/// optional; see [`Order::apply_prescription_update`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrescriptionUpdate {
    pub patient_ref: Option<String>,
    pub received_on: Option<NaiveDate>,
    pub comment: Option<String>,
    pub due_on: Option<NaiveDate>,
    pub delivery_address: Option<String>,
    pub clinic: Option<String>,
    pub phone: Option<String>,
    pub treatment_type: Option<String>,
}
