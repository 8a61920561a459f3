// ReplayWired - Process Replay Platform
// Copyright (C) 2026 ReplayWired Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::collections::HashMap;
use std::fs::File;

use tracing::debug;

use crate::image::ProgramImage;
use crate::regs::Register;
use crate::{Environment, Region, ReplayError, ReplayResult};

// Fixed kernel pages on x86-64 Linux; a booted environment carries them
// and the clear stage leaves them alone.
const VVAR_NAME: &str = "[vvar]";
const VVAR_START: u64 = 0xffff_ffff_ff5f_f000;
const VSYSCALL_NAME: &str = "[vsyscall]";
const VSYSCALL_START: u64 = 0xffff_ffff_ff60_0000;
const PAGE_SIZE: u64 = 0x1000;

const PLACEHOLDER_NAME: &str = "placeholder";

struct MappedRegion {
    start: u64,
    end: u64,
    name: String,
    data: Vec<u8>,
}

/// In-memory reference implementation of [`Environment`].
///
/// A pure state container: region table with overlap checking, register
/// file, MSR map, heap boundary and descriptor table. It does not execute
/// instructions; an instruction-level backend implements the same trait
/// and this one stands in wherever reconstruction needs to be driven or
/// inspected without an emulator attached.
pub struct MemEnv {
    regions: Vec<MappedRegion>,
    registers: [u64; Register::COUNT],
    msrs: HashMap<u64, u64>,
    heap_boundary: u64,
    files: HashMap<i32, File>,
}

impl Default for MemEnv {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            registers: [0; Register::COUNT],
            msrs: HashMap::new(),
            heap_boundary: 0,
            files: HashMap::new(),
        }
    }
}

impl MemEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment primed the way a kernel loader would leave it: the
    /// placeholder image mapped, the program counter at its entry point,
    /// and the fixed kernel pages present.
    pub fn boot(image: &ProgramImage) -> ReplayResult<Self> {
        let mut env = Self::new();

        env.map(VVAR_START, VVAR_START + PAGE_SIZE, VVAR_NAME)?;
        env.map(VSYSCALL_START, VSYSCALL_START + PAGE_SIZE, VSYSCALL_NAME)?;

        for segment in &image.segments {
            env.map(segment.start_addr, segment.end_addr(), PLACEHOLDER_NAME)?;
            env.write_memory(segment.start_addr, &segment.data)?;
        }
        env.write_register(Register::Rip, image.entry_point);

        debug!(
            "Environment booted from placeholder image: {} segments, entry {:#x}",
            image.segments.len(),
            image.entry_point
        );
        Ok(env)
    }

    pub fn heap_boundary(&self) -> u64 {
        self.heap_boundary
    }

    pub fn msr(&self, msr: u64) -> Option<u64> {
        self.msrs.get(&msr).copied()
    }

    pub fn file(&self, fd: i32) -> Option<&File> {
        self.files.get(&fd)
    }

    /// Read back mapped memory; the range must fall inside one region.
    pub fn read_memory(&self, addr: u64, len: usize) -> ReplayResult<Vec<u8>> {
        let region = self
            .regions
            .iter()
            .find(|r| addr >= r.start && addr + len as u64 <= r.end)
            .ok_or(ReplayError::MemoryViolation(addr))?;
        let offset = (addr - region.start) as usize;
        Ok(region.data[offset..offset + len].to_vec())
    }
}

impl Environment for MemEnv {
    fn map(&mut self, start: u64, end: u64, name: &str) -> ReplayResult<()> {
        if end <= start {
            return Err(ReplayError::InvalidMappingSize { start, end });
        }
        if self.regions.iter().any(|r| start < r.end && r.start < end) {
            return Err(ReplayError::RegionOverlap { start, end });
        }
        self.regions.push(MappedRegion {
            start,
            end,
            name: name.to_string(),
            data: vec![0; (end - start) as usize],
        });
        Ok(())
    }

    fn unmap(&mut self, start: u64, end: u64) -> ReplayResult<()> {
        let before = self.regions.len();
        self.regions.retain(|r| !(r.start >= start && r.end <= end));
        if self.regions.len() == before {
            return Err(ReplayError::MemoryViolation(start));
        }
        Ok(())
    }

    fn write_memory(&mut self, addr: u64, bytes: &[u8]) -> ReplayResult<()> {
        let region = self
            .regions
            .iter_mut()
            .find(|r| addr >= r.start && addr + bytes.len() as u64 <= r.end)
            .ok_or(ReplayError::MemoryViolation(addr))?;
        let offset = (addr - region.start) as usize;
        region.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read_register(&self, reg: Register) -> u64 {
        self.registers[reg as usize]
    }

    fn write_register(&mut self, reg: Register, value: u64) {
        self.registers[reg as usize] = value;
    }

    fn write_msr(&mut self, msr: u64, value: u64) {
        self.msrs.insert(msr, value);
    }

    fn set_heap_boundary(&mut self, addr: u64) {
        self.heap_boundary = addr;
    }

    fn bind_file(&mut self, fd: i32, file: File) -> ReplayResult<()> {
        self.files.insert(fd, file);
        Ok(())
    }

    fn regions(&self) -> Vec<Region> {
        self.regions
            .iter()
            .map(|r| Region {
                start: r.start,
                end: r.end,
                name: r.name.clone(),
            })
            .collect()
    }
}
