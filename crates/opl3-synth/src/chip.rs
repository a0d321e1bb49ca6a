//! YMF262 (OPL3) chip model.
//!
//! This module holds everything that is about the chip itself rather than
//! about allocating it:
//!
//! - **register**: port-encoded register addresses and the operator layout
//! - **params**: typed channel/operator fields and their register packing
//! - **fnumber**: centihertz to block/F-number conversion
//! - **storage**: a byte-level register file
//! - **monitor**: a passive decoder of bus writes that reports key events
pub mod event;
pub mod fnumber;
pub mod monitor;
pub mod params;
pub mod register;
pub mod storage;
