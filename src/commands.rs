//! Command/subcommand constants used by [`crate::lifecycle::Lifecycle`].
//!
//! Everything else in the command-code space is opaque to the core and is
//! defined by whatever EC firmware a board pairs with.

/// `CONTROL` command code.
pub const CONTROL: u8 = 0x04;
/// `CONTROL.GET_FIRMWARE_VERSION` subcommand.
pub const CONTROL_GET_FIRMWARE_VERSION: u8 = 0x10;
/// `CONTROL.NO_OP` subcommand, used to synthesize the idle-poll response.
pub const CONTROL_NO_OP: u8 = 0x02;

/// `SLEEP` command code.
pub const SLEEP: u8 = 0x05;
/// `SLEEP.GLOBAL_CONFIG_EVENT_REPORT` subcommand.
pub const SLEEP_GLOBAL_CONFIG_EVENT_REPORT: u8 = 0x01;
/// `SLEEP.AP_SUSPEND` subcommand.
pub const SLEEP_AP_SUSPEND: u8 = 0x02;
/// `SLEEP.AP_POWER_DOWN` subcommand.
pub const SLEEP_AP_POWER_DOWN: u8 = 0x03;

/// Payload byte enabling event reporting.
pub const EVENT_REPORT_ENABLE: u8 = 0x01;
/// Payload byte disabling event reporting.
pub const EVENT_REPORT_DISABLE: u8 = 0x00;
