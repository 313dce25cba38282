//! Embedded Controller Interface (ECI) driver.
//!
//! Turns a master-driven SMBus-like serial bus into a tagged
//! request/response and event transport between an application processor
//! acting as slave and a separate embedded controller acting as master. See
//! [`state_machine`] for the slave protocol itself, [`request_path`] for the
//! synchronous caller API, [`dispatcher`] for unsolicited event delivery, and
//! [`lifecycle`] for bring-up/teardown.

#![deny(unused_must_use)]

pub mod attention;
pub mod bus;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod event_pool;
pub mod lifecycle;
pub mod packet;
pub mod queue;
pub mod request_path;
pub mod state_machine;
pub mod tag_pool;

mod error;

pub use error::{BusError, Error, Result};
