use serde::{Deserialize, Serialize};

/// Lifecycle of a purchase attempt.
///
/// `Pending` is the only non-terminal state. Once an order leaves it, the
/// status is frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Product snapshot taken when the order is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub product_title: String,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Also the external reference handed to the payment processor.
    pub id: String,
    pub buyer_email: String,
    pub line_items: Vec<LineItem>,
    pub total_cents: i64,
    pub status: OrderStatus,
    /// Processor-side id: checkout preference first, payment id once known.
    pub payment_reference: Option<String>,
    pub linked_identity_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    /// Whether any line item is, or starts with, the given product name.
    pub fn includes_product(&self, product_name: &str) -> bool {
        let name = product_name.trim();
        if name.is_empty() {
            return false;
        }
        self.line_items
            .iter()
            .any(|item| item.product_title == name || item.product_title.starts_with(name))
    }
}

#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub buyer_email: String,
    pub line_items: Vec<LineItem>,
    pub total_cents: i64,
    pub linked_identity_id: Option<String>,
}

/// Result of applying a status to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The order moved out of `pending` (or recorded a new reference while pending).
    Applied { previous: OrderStatus },
    /// The order already had this status and reference.
    Unchanged,
    /// The order is terminal and the requested status differs; nothing written.
    Rejected { current: OrderStatus },
    NotFound,
}
