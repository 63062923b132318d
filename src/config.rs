// Copyright 2021 Nir H. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
//! Emulator hardware emulation configuration and preferences.

/// Emulation settings and preferences goes here.
pub struct Config {
	/// Whether the lcd controller rasterizes scanlines into the
	/// framebuffer. Headless runs (such as the conformance harness)
	/// may turn this off and keep only the timing machine.
	pub render: bool,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			render: true,
		}
	}
}
