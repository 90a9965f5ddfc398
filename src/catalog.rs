//! Static product catalog.
//!
//! Prices live here and only here. Requests carry product ids; every amount
//! charged or recorded is read from this table.

use serde::Serialize;

use crate::error::{AppError, Result, msg};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    /// Price in BRL cents.
    pub unit_price_cents: i64,
    /// Base product this add-on must be bought with (unless the buyer is logged in).
    pub requires: Option<&'static str>,
}

static PRODUCTS: &[Product] = &[
    Product {
        id: "pack_1",
        title: "Planilhas 6k Pro - 6.000 Planilhas Excel",
        description: "Pacote com 6.000 planilhas Excel editáveis para finanças, gestão e produtividade",
        unit_price_cents: 1299,
        requires: None,
    },
    Product {
        id: "pack_2",
        title: "Pack Bônus - Dashboards e Planners Premium",
        description: "Dashboards interativos e planners premium, complemento do Planilhas 6k Pro",
        unit_price_cents: 999,
        requires: Some("pack_1"),
    },
];

/// All products, in display order.
pub fn all_products() -> &'static [Product] {
    PRODUCTS
}

pub fn get_product(id: &str) -> Option<&'static Product> {
    PRODUCTS.iter().find(|p| p.id == id)
}

/// Looks up each id, silently dropping the ones that don't exist.
///
/// Callers must compare lengths; use [`resolve_all`] to get that check.
pub fn get_products<S: AsRef<str>>(ids: &[S]) -> Vec<&'static Product> {
    ids.iter().filter_map(|id| get_product(id.as_ref())).collect()
}

/// Resolves every requested id or fails with `InvalidProduct`.
///
/// Duplicate ids collapse into a single entry, keeping first-seen order.
pub fn resolve_all<S: AsRef<str>>(ids: &[S]) -> Result<Vec<&'static Product>> {
    if ids.is_empty() {
        return Err(AppError::InvalidProduct(msg::NO_PRODUCTS.into()));
    }

    let mut unique: Vec<&str> = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.as_ref().trim();
        if !unique.contains(&id) {
            unique.push(id);
        }
    }

    let products = get_products(&unique);
    if products.len() != unique.len() {
        let unknown: Vec<&str> = unique
            .iter()
            .copied()
            .filter(|id| get_product(id).is_none())
            .collect();
        return Err(AppError::InvalidProduct(format!(
            "Unknown product id(s): {}",
            unknown.join(", ")
        )));
    }

    Ok(products)
}

/// Sum of catalog prices for the resolved products.
pub fn total_cents(products: &[&Product]) -> i64 {
    products.iter().map(|p| p.unit_price_cents).sum()
}
