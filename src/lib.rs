//! CampusHub - University Community Platform Backend
//!
//! This crate implements the billing core of the CampusHub platform:
//! subscription plans, the order ledger, recurring renewals against a
//! hosted payment gateway, and IPN reconciliation.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
