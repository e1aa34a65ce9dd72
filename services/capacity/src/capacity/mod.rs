//! Task pool capacity checking.
//!
//! A pool overflows when the accumulated age of its queued tasks passes a
//! fixed capacity (one week by default). Overflowed tasks move to the
//! owner's pending pool and the owner gets a push for each of them.

pub mod boundary;
pub mod checker;
pub mod model;
pub mod notify;
pub mod remediation;
mod worker;

pub use checker::{
    CapacityChecker, CapacityError, CheckerConfig, Delivery, OverflowSummary, PoolOutcome,
    PoolReport, RunReport,
};
pub use worker::CapacityWorker;
