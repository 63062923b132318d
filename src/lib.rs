// Copyright 2021 Nir H. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![cfg_attr(not(feature = "std"), no_std)]
//! This library provides emulation of the original monochrome handheld's
//! Z80-like CPU and it's peripherals, as described in the publicly available
//! "Game Boy CPU Manual" and the Pan Docs.
//!
//! The crate is the machine core only: the rom loader, the host input
//! adapter, the upscaling presentation layer and the conformance-test
//! harness live outside and talk to the core through the bus, the
//! framebuffer reference and the joypad mask.

#[cfg(any(test, feature = "std"))]
#[macro_use]
extern crate std;
extern crate core;
// The alloc crate is optional, and used for allocating the cartridge
// controller's ram on the heap.
#[cfg(feature = "alloc")]
extern crate alloc;

pub mod bus;
pub mod cpu;
pub mod config;
pub mod emulator;

use core::fmt;

/// The library's exported errors.
pub enum DmgError {
	/// Cartridge operation error.
	Cartridge(&'static str),
	/// Generic IO related error.
	Io(&'static str),
	/// Unexpected address error.
	BadAddress(u16),
	/// Invalid opcode error.
	///
	/// Raised for the documented illegal opcodes; real hardware locks up
	/// on these, so the step that hit one is terminated.
	BadOpcode(u8),
}

impl fmt::Display for DmgError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
            DmgError::Cartridge(ref info) => write!(f, "Cartridge error: {}", info),
            DmgError::Io(ref info) => write!(f, "IO error: {}", info),
            DmgError::BadAddress(address) => write!(f, "Bad address: 0x{:x}", address),
            DmgError::BadOpcode(value) => write!(f, "Bad opcode: 0x{:x}", value),
        }
	}
}

impl fmt::Debug for DmgError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		(self as &dyn fmt::Display).fmt(f)
	}
}
