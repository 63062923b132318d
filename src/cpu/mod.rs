// Copyright 2021 Nir H. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
//! Gameboy's processor emulation.

pub mod alu;
pub mod state;
pub mod decode;
pub mod interrupts;
pub mod instructions;

use num::PrimInt;
use core::mem::size_of;
use core::ops::{AddAssign, Shl};

use state::*;
use state::registers::*;
use instructions::{Instruction, enter_interrupt};

use crate::DmgError;
use crate::config::Config;

use crate::bus::*;
use crate::bus::cartridge::*;

/// The gameboy's processor.
pub struct Cpu<'a> {
	/// The cpu's registers.
	pub(crate) registers: CpuState,
	/// The devices' memory mapping
	pub mmap: SystemBus<'a>,
	/// The emulator's configuration
	pub config: &'a Config,

	/// Set while the cpu sleeps between a halt and the next interrupt.
	pub halting: bool,
	/// If we halt the cpu when interrupts are disabled while an interrupt
	/// is already pending, the original cpu had a bug in which it fetches
	/// the byte after the halt twice.
	halt_bug: bool,
	/// The processor has a delay of a single instruction after EI before
	/// actually enabling interrupts.
	ime_pending: bool,
}

impl<'a> Cpu<'a> {
	/// Initializes a new virtual cpu
	#[inline(always)]
	pub fn new(config: &'a Config, cartridge: &'a mut Cartridge<'a>) -> Self {
		Cpu {
			registers: CpuState::new(),
			mmap: SystemBus::new(&config, cartridge),
			config,
			halting: false,
			halt_bug: false,
			ime_pending: false,
		}
	}

	/// Halt the cpu.
	pub fn halt(&mut self) {
		self.halting = true;

		// Halting over a pending interrupt with the master enable off
		// triggers the double-fetch hardware bug.
		let pending = self.mmap.interrupt_flag & self.mmap.interrupt_enable & 0x1F;
		if !self.registers.ime() && pending != 0 {
			self.halt_bug = true;
		}
	}

	/// Enable interrupts with a delay of a single instruction.
	pub fn toggle_ime_delayed(&mut self) {
		self.ime_pending = true;
	}

	/// Disable interrupts, cancelling a not-yet-promoted EI.
	pub fn disable_interrupts(&mut self) {
		self.registers.set_ime(false);
		self.ime_pending = false;
	}

	/// Reads the next instruction bytes and increments the program counter appropriately.
	///
	/// The function works in little-endian, that is, when reading 2 bytes,
	/// the first byte will be the least-significant one.
	pub fn fetch<T: PrimInt + AddAssign + Shl<Output=T>>(&mut self) -> Result<T, DmgError> {
		let mut result: T = num::cast(0).unwrap();

		for i in 0..size_of::<T>() {
			// Read the next byte.
			let pc: u16 = self.registers.get(Register::PC);
			let data: T = num::cast::<u8, T>(self.mmap.read(pc)?).unwrap();

			// We're using little-endianity.
			result += data << num::cast::<usize, T>(8 * i).unwrap();

			if self.halt_bug {
				// The halt bug prevents the program counter from being
				// incremented exactly once.
				self.halt_bug = false;
			} else {
				// Move the PC forward.
				self.registers.set(Register::PC, pc.wrapping_add(1));
			}
		}

		Ok(result)
	}

	/// Emulates the execution of a single instruction.
	///	This function also processes the peripherals and enters interrupts if any.
	///
	/// Returns the number of machine cycles the step has taken.
	pub fn execute(&mut self) -> Result<usize, DmgError> {
		// Enter an interrupt if any (and if interrupts are enabled).
		let mut num_cycles = self.handle_interrupts()?;

		if self.halting {
			// Asleep: burn a cycle without fetching.
			num_cycles += 1;
		} else {
			// A pending EI takes effect now, after the arbitration above;
			// this is what delays the first serviceable interrupt by one
			// instruction.
			if self.ime_pending {
				self.registers.set_ime(true);
				self.ime_pending = false;
			}

			num_cycles += self.execute_single()?;
		}

		// Progress the peripherals.
		self.mmap.process(num_cycles);

		Ok(num_cycles)
	}

	/// Emulates the execution of a single instruction.
	///
	/// Returns the number of machine cycles the instruction has taken.
	pub fn execute_single(&mut self) -> Result<usize, DmgError> {
		// Fetch the opcode from the memory.
		let opcode: u8 = self.fetch()?;

		// Decode the given opcode.
		let insn: Instruction = self.decode(opcode)?;

		// Execute and return the number of cycles taken.
		Ok(insn(self)?)
	}

	fn handle_interrupts(&mut self) -> Result<usize, DmgError> {
		let pending = self.mmap.interrupt_flag & self.mmap.interrupt_enable & 0x1F;

		// Any pending interrupt wakes the cpu. We won't enter the ISR
		// if interrupts are disabled, but execution resumes.
		if pending != 0 {
			self.halting = false;
		}

		if !self.registers.ime() {
			return Ok(0);
		}

		if let Some(interrupt) = self.mmap.fetch_interrupt() {
			// Enter the ISR; its first instruction runs within this step.
			return Ok(enter_interrupt(self, interrupt.isr())?);
		}

		Ok(0)
	}
}

#[cfg(test)]
#[cfg(feature = "alloc")]
/// Unit tests for the cpu module.
pub mod tests {
	use super::*;
	use alloc::boxed::Box;

	/// With-closure for running logic with an initialized cpu instance.
	pub fn with_cpu<F>(callback: F) -> Result<(), DmgError>
		where F: FnOnce(&mut Cpu) -> Result<(), DmgError> {
		// Initialize the cpu
		let config = Config::default();
		let rom = cartridge::tests::empty_rom(MbcKind::MBC3);
		let mut ram: Box<[u8]> = Cartridge::make_ram(&rom)?;
		let mut cartridge = Cartridge::new(&rom, &mut ram)?;

		let mut cpu = Cpu::new(&config, &mut cartridge);

		callback(&mut cpu)
	}

	#[test]
	fn test_fetch() -> Result<(), DmgError> {
		with_cpu(|cpu| {
			// Move the program counter to work ram.
			cpu.registers.set(Register::PC, 0xC000);

			// Write arbitrary data to the memory starting from the program counter.
			let data: &[u8] = &[1, 2, 3];
			cpu.mmap.write_all(cpu.registers.get(Register::PC), data)?;

			// Make sure that fetch works as expected.
			assert!(cpu.fetch::<u16>()? == 0x0201);
			assert!(cpu.fetch::<u8>()? == 0x03);

			Ok(())
		})
	}

	#[test]
	fn test_post_boot_state() -> Result<(), DmgError> {
		with_cpu(|cpu| {
			assert_eq!(0x01B0, cpu.registers.get(Register::AF));
			assert_eq!(0x0013, cpu.registers.get(Register::BC));
			assert_eq!(0x00D8, cpu.registers.get(Register::DE));
			assert_eq!(0x014D, cpu.registers.get(Register::HL));
			assert_eq!(0xFFFE, cpu.registers.get(Register::SP));
			assert_eq!(0x0100, cpu.registers.get(Register::PC));

			Ok(())
		})
	}

	#[test]
	fn test_halt_idles_until_interrupt() -> Result<(), DmgError> {
		with_cpu(|cpu| {
			cpu.registers.set(Register::PC, 0xC000);
			cpu.mmap.write_all(0xC000, &[/* HALT */ 0x76])?;

			cpu.execute()?;
			assert!(cpu.halting);

			// With nothing pending the cpu keeps burning single cycles.
			assert_eq!(1, cpu.execute()?);
			assert_eq!(1, cpu.execute()?);
			assert_eq!(0xC001, cpu.registers.get(Register::PC));

			// A pending, enabled interrupt wakes it even with IME off.
			cpu.mmap.interrupt_enable = 0x04;
			cpu.mmap.interrupt_flag = 0x04;
			cpu.execute()?;
			assert!(!cpu.halting);

			// IME was off, so the flag is still waiting for service.
			assert_eq!(0x04, cpu.mmap.interrupt_flag);

			Ok(())
		})
	}

	#[test]
	fn test_halt_bug_refetches_byte() -> Result<(), DmgError> {
		with_cpu(|cpu| {
			cpu.registers.set(Register::PC, 0xC000);
			cpu.registers.set(Register::A, 0x00);
			cpu.mmap.interrupt_enable = 0x01;
			cpu.mmap.interrupt_flag = 0x01;

			// HALT with IME off and an interrupt already pending; the
			// byte after the halt is fetched twice.
			let data: &[u8] = &[/* HALT  */ 0x76,
								/* INC A */ 0x3c,
								/* INC A */ 0x3c];
			cpu.mmap.write_all(0xC000, data)?;

			cpu.execute()?;
			assert!(cpu.halting);

			cpu.execute()?;
			cpu.execute()?;

			// INC A ran twice but only one byte was consumed.
			assert_eq!(0x02, cpu.registers.get(Register::A));
			assert_eq!(0xC002, cpu.registers.get(Register::PC));

			Ok(())
		})
	}

	#[test]
	fn test_ei_delays_one_instruction() -> Result<(), DmgError> {
		with_cpu(|cpu| {
			cpu.registers.set(Register::PC, 0xC000);
			cpu.mmap.interrupt_enable = 0x01;
			cpu.mmap.interrupt_flag = 0x01;

			let data: &[u8] = &[/* EI  */ 0xfb,
								/* NOP */ 0x00,
								/* NOP */ 0x00];
			cpu.mmap.write_all(0xC000, data)?;

			// EI retires; the enable is still pending.
			cpu.execute()?;
			assert!(!cpu.registers.ime());

			// The following instruction runs before any service.
			cpu.execute()?;
			assert_eq!(0xC002, cpu.registers.get(Register::PC));

			// Only now the v-blank handler is entered.
			let cycles = cpu.execute()?;
			assert_eq!(0x0041, cpu.registers.get(Register::PC));
			assert_eq!(0x00, cpu.mmap.interrupt_flag);
			assert!(!cpu.registers.ime());

			// Service costs two cycles on top of the handler's first
			// instruction (a nop in the blank rom).
			assert_eq!(3, cycles);

			// The return address on the stack points at the second nop.
			let sp = cpu.registers.get(Register::SP);
			assert_eq!(0x02, cpu.mmap.read(sp)?);
			assert_eq!(0xC0, cpu.mmap.read(sp.wrapping_add(1))?);

			Ok(())
		})
	}

	#[test]
	fn test_interrupt_priority_dispatch() -> Result<(), DmgError> {
		with_cpu(|cpu| {
			cpu.registers.set(Register::PC, 0xC000);
			cpu.registers.set_ime(true);
			cpu.mmap.interrupt_enable = 0x1F;
			// Timer and serial both pending; timer has priority.
			cpu.mmap.interrupt_flag = 0x0C;

			cpu.execute()?;
			assert_eq!(0x0051, cpu.registers.get(Register::PC));
			// Only the serviced bit was acknowledged.
			assert_eq!(0x08, cpu.mmap.interrupt_flag);

			Ok(())
		})
	}

	#[test]
	fn test_illegal_opcode_is_fatal() -> Result<(), DmgError> {
		with_cpu(|cpu| {
			cpu.registers.set(Register::PC, 0xC000);
			cpu.mmap.write_all(0xC000, &[0xd3])?;

			match cpu.execute() {
				Err(DmgError::BadOpcode(0xd3)) => Ok(()),
				_ => Err(DmgError::Io("expected a bad-opcode error")),
			}
		})
	}
}
