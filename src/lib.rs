//! Storefront - payment-order reconciliation for a digital-goods shop
//!
//! Takes purchases through Mercado Pago (hosted checkout or tokenized card),
//! settles them from processor notifications, provisions buyer accounts and
//! gates downloads on approved orders.

pub mod access;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod rate_limit;
pub mod reconcile;
pub mod util;
