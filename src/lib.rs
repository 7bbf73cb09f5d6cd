//! Points ledger for member associations
//!
//! Members earn points through check-ins and tracked activities, spend them in the store, send
//! them to each other, and administrators adjust or refund them. Every change is an immutable
//! transaction appended to the ledger together with an update of the member's cached balance.
//!
//! The engine is [`DomainLogic`], which implements [`tower::Service`] for every request type in
//! [`commands`] and [`queries`]. Storage, the member directory, notifications and points
//! configuration are reached through the traits in [`ports`], with implementations in
//! [`adapters`].

pub mod adapters;
pub mod commands;
pub mod config;
pub mod domain;
pub mod ports;
pub mod queries;
pub mod reporting;

pub use commands::{DomainLogic, Error, ErrorKind};
pub use config::LedgerConfig;
