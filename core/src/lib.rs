//! Live cricket scoring core.
//!
//! The ball-by-ball ledger is the single source of truth. Innings state,
//! player figures and fantasy points are projections over it and can be
//! rebuilt from any checkpoint.

pub mod broadcast;
pub mod checkpoint;
pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod fantasy;
pub mod figures;
pub mod fixture;
pub mod innings;
pub mod ledger;
pub mod projection;
pub mod reconciliation;
pub mod rng;
pub mod service;
pub mod simulator;
pub mod store;
pub mod types;
