//! Shared domain types for the license-token ledger: persisted entities, wire schemas,
//! auth claims and the error kinds the ledger, agent and client all need to agree on.

pub mod auth;
pub mod entities;
pub mod error;
pub mod product_feature;
pub mod wire;

pub use auth::{IdentityClaims, Scope};
pub use product_feature::ProductFeature;
