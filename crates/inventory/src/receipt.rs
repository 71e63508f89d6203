//! Supplier delivery receipts.
//!
//! A [`ReceiptDraft`] is what the caller submits after checking a delivery
//! against its document. `plan` validates it and produces the immutable
//! [`Receipt`] together with the stock credits a store must apply in the same
//! transaction.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use supplyledger_core::{
    Actor, Entity, ItemId, LedgerError, LedgerResult, ReceiptId, ReceiptLineId, VendorId,
};

use crate::position::PositionLabel;

pub const DEFAULT_DOCUMENT_KIND: &str = "INVOICE";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConferenceStatus {
    Pending,
    Verified,
}

impl ConferenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConferenceStatus::Pending => "PENDING",
            ConferenceStatus::Verified => "VERIFIED",
        }
    }
}

impl core::str::FromStr for ConferenceStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ConferenceStatus::Pending),
            "VERIFIED" => Ok(ConferenceStatus::Verified),
            other => Err(LedgerError::invalid_id(format!(
                "ConferenceStatus: unknown status {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptLineDraft {
    pub item_id: ItemId,
    pub document_quantity: f64,
    pub verified_quantity: f64,
    pub unit_value: f64,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptDraft {
    pub vendor_id: Option<VendorId>,
    pub document_kind: String,
    pub document_number: String,
    pub delivery_date: NaiveDate,
    pub note: Option<String>,
    pub lines: Vec<ReceiptLineDraft>,
    pub user: String,
}

impl ReceiptDraft {
    pub fn new(
        vendor_id: Option<VendorId>,
        document_number: impl Into<String>,
        delivery_date: NaiveDate,
        user: impl Into<String>,
    ) -> Self {
        Self {
            vendor_id,
            document_kind: DEFAULT_DOCUMENT_KIND.to_string(),
            document_number: document_number.into(),
            delivery_date,
            note: None,
            lines: Vec::new(),
            user: user.into(),
        }
    }

    pub fn line(mut self, line: ReceiptLineDraft) -> Self {
        self.lines.push(line);
        self
    }

    /// Validate the whole draft and build the receipt it finalizes into.
    pub fn plan(self, id: ReceiptId, created_at: DateTime<Utc>) -> LedgerResult<ReceiptPlan> {
        let vendor_id = self
            .vendor_id
            .ok_or_else(|| LedgerError::incomplete("receipt requires a vendor"))?;
        let document_number = self.document_number.trim().to_string();
        if document_number.is_empty() {
            return Err(LedgerError::incomplete("receipt requires a document number"));
        }
        if self.lines.is_empty() {
            return Err(LedgerError::incomplete("receipt requires at least one line"));
        }
        let user = Actor::new(&self.user)?;

        let mut lines = Vec::with_capacity(self.lines.len());
        for (index, draft) in self.lines.into_iter().enumerate() {
            lines.push(plan_line(index, draft)?);
        }
        let total_value: f64 = lines
            .iter()
            .map(|l| l.verified_quantity * l.unit_value)
            .sum();

        let document_kind = match self.document_kind.trim() {
            "" => DEFAULT_DOCUMENT_KIND.to_string(),
            kind => kind.to_string(),
        };

        Ok(ReceiptPlan {
            receipt: Receipt {
                id,
                vendor_id,
                document_kind,
                document_number,
                delivery_date: self.delivery_date,
                total_value,
                user,
                created_at,
                note: self.note.filter(|n| !n.trim().is_empty()),
                lines,
            },
        })
    }
}

fn plan_line(index: usize, draft: ReceiptLineDraft) -> LedgerResult<ReceiptLine> {
    let line_no = index + 1;
    for (what, value) in [
        ("document quantity", draft.document_quantity),
        ("verified quantity", draft.verified_quantity),
        ("unit value", draft.unit_value),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(LedgerError::invalid_quantity(format!(
                "line {line_no}: {what} cannot be negative (got {value})"
            )));
        }
    }
    let destination = PositionLabel::new(&draft.destination).map_err(|_| {
        LedgerError::incomplete(format!("line {line_no}: destination position is required"))
    })?;
    Ok(ReceiptLine {
        id: ReceiptLineId::new(),
        item_id: draft.item_id,
        document_quantity: draft.document_quantity,
        verified_quantity: draft.verified_quantity,
        unit_value: draft.unit_value,
        destination,
        status: ConferenceStatus::Verified,
    })
}

/// Validated receipt ready to be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptPlan {
    pub receipt: Receipt,
}

impl ReceiptPlan {
    /// Position credits: one per line with something actually received.
    pub fn credits(&self) -> impl Iterator<Item = (ItemId, &PositionLabel, f64)> {
        self.receipt
            .lines
            .iter()
            .filter(|l| l.verified_quantity > 0.0)
            .map(|l| (l.item_id, &l.destination, l.verified_quantity))
    }

    /// Unit values to write back to the catalog, in line order (last wins).
    pub fn unit_values(&self) -> impl Iterator<Item = (ItemId, f64)> + '_ {
        self.receipt.lines.iter().map(|l| (l.item_id, l.unit_value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: ReceiptId,
    pub vendor_id: VendorId,
    pub document_kind: String,
    pub document_number: String,
    pub delivery_date: NaiveDate,
    pub total_value: f64,
    pub user: Actor,
    pub created_at: DateTime<Utc>,
    pub note: Option<String>,
    pub lines: Vec<ReceiptLine>,
}

impl Entity for Receipt {
    type Id = ReceiptId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub id: ReceiptLineId,
    pub item_id: ItemId,
    pub document_quantity: f64,
    pub verified_quantity: f64,
    pub unit_value: f64,
    pub destination: PositionLabel,
    pub status: ConferenceStatus,
}
