//! A research harness for ultra-wideband vehicle-to-vehicle proximity
//! warning. Each vehicle carries DWM1001 modules on its front (A) and rear
//! (B) ends: tag modules master the ranging exchange, anchor modules answer
//! foreign vehicles' tags. The modules stream ranging reports over UART;
//! this crate pairs the serial ports with the modules behind them, decodes
//! the report wire format, recovers the mounting positions both vehicles
//! smuggle through label and report fields, corrects raw antenna ranges
//! into bumper-to-bumper clearance, and condenses everything into
//! nearest-first proximity alerts for the driver display and the
//! experiment log.
//!
//! The `uwbranging` binary runs the live pipeline; `replay` runs the same
//! decode and correction stages over a recorded UART capture.

#![warn(missing_docs)]
pub mod accumulator;
pub mod args;
pub mod component;
pub mod config;
pub mod dummy_source;
pub mod geometry;
pub mod label;
pub mod pairing;
pub mod record;
pub mod report;
pub mod safety;
pub mod shell;
pub mod source;
pub mod sysinfo;
