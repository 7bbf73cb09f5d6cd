//! Read-side services
//!
//! These share [`DomainLogic`](crate::commands::DomainLogic) and its error type with the
//! commands, but never write to the ledger. The only exception is [`get_balance`], which creates
//! a zero balance on first access.

pub mod association_report;
pub mod audit_balance;
pub mod get_balance;
pub mod get_history;
pub mod get_summary;
pub mod recent_recipients;
