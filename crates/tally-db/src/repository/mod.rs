//! # Repository Module
//!
//! Database repository implementations for the catalog and the ledgers.
//!
//! ## Two Ways In
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Pool-backed repository structs          Connection-scoped functions   │
//! │  ──────────────────────────────          ─────────────────────────────  │
//! │  db.products().get_quantity(id)          product::apply_delta(conn, ..) │
//! │  db.sales().get_record(id)               sale::insert(conn, ..)         │
//! │  db.movements().net_delta(id)            returns::returned_quantities(  │
//! │                                              conn, sale_id)             │
//! │                                                                         │
//! │  Each call is its own statement or      Run on whatever connection the │
//! │  transaction.                            caller passes, usually the     │
//! │                                          engine's open transaction.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Catalog and stock primitives
//! - [`PartyRepository`](party::PartyRepository) - Customers and suppliers
//! - [`SaleRepository`](sale::SaleRepository) - Sale headers and lines
//! - [`PurchaseRepository`](purchase::PurchaseRepository) - Purchase invoices
//! - [`ReturnRepository`](returns::ReturnRepository) - Returns against sales
//! - [`MovementRepository`](movement::MovementRepository) - Stock movement journal

pub mod movement;
pub mod party;
pub mod product;
pub mod purchase;
pub mod returns;
pub mod sale;
