// ReplayWired - Process Replay Platform
// Copyright (C) 2026 ReplayWired Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;

/// General and segment-selector registers the environment can address.
///
/// The first 19 variants are the captured set; RIP exists only as a write
/// target for the call encoding and never appears in a dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rdi,
    Rsi,
    Rbp,
    Rsp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Cs,
    Ds,
    Ss,
    Rip,
}

impl Register {
    pub const COUNT: usize = 20;

    pub fn name(self) -> &'static str {
        match self {
            Register::Rax => "RAX",
            Register::Rbx => "RBX",
            Register::Rcx => "RCX",
            Register::Rdx => "RDX",
            Register::Rdi => "RDI",
            Register::Rsi => "RSI",
            Register::Rbp => "RBP",
            Register::Rsp => "RSP",
            Register::R8 => "R8",
            Register::R9 => "R9",
            Register::R10 => "R10",
            Register::R11 => "R11",
            Register::R12 => "R12",
            Register::R13 => "R13",
            Register::R14 => "R14",
            Register::R15 => "R15",
            Register::Cs => "CS",
            Register::Ds => "DS",
            Register::Ss => "SS",
            Register::Rip => "RIP",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Segment registers whose base address is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentReg {
    Fs,
    Gs,
}

impl SegmentReg {
    pub fn name(self) -> &'static str {
        match self {
            SegmentReg::Fs => "FS",
            SegmentReg::Gs => "GS",
        }
    }
}

impl fmt::Display for SegmentReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Captured general-register state.
///
/// Field order is the fixed capture order of the dump format; `entries`
/// enumerates in that same order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSet {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rbp: u64,
    pub rsp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub cs: u64,
    pub ds: u64,
    pub ss: u64,
}

impl RegisterSet {
    pub const CAPTURED: usize = 19;

    /// Build from values laid out in capture order.
    pub fn from_capture_order(values: [u64; Self::CAPTURED]) -> Self {
        let [rax, rbx, rcx, rdx, rdi, rsi, rbp, rsp, r8, r9, r10, r11, r12, r13, r14, r15, cs, ds, ss] =
            values;
        Self {
            rax,
            rbx,
            rcx,
            rdx,
            rdi,
            rsi,
            rbp,
            rsp,
            r8,
            r9,
            r10,
            r11,
            r12,
            r13,
            r14,
            r15,
            cs,
            ds,
            ss,
        }
    }

    /// Register/value pairs in capture order.
    pub fn entries(&self) -> [(Register, u64); Self::CAPTURED] {
        [
            (Register::Rax, self.rax),
            (Register::Rbx, self.rbx),
            (Register::Rcx, self.rcx),
            (Register::Rdx, self.rdx),
            (Register::Rdi, self.rdi),
            (Register::Rsi, self.rsi),
            (Register::Rbp, self.rbp),
            (Register::Rsp, self.rsp),
            (Register::R8, self.r8),
            (Register::R9, self.r9),
            (Register::R10, self.r10),
            (Register::R11, self.r11),
            (Register::R12, self.r12),
            (Register::R13, self.r13),
            (Register::R14, self.r14),
            (Register::R15, self.r15),
            (Register::Cs, self.cs),
            (Register::Ds, self.ds),
            (Register::Ss, self.ss),
        ]
    }
}

/// Captured FS/GS segment base addresses.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentBases {
    pub fs: u64,
    pub gs: u64,
}

impl SegmentBases {
    pub fn entries(&self) -> [(SegmentReg, u64); 2] {
        [(SegmentReg::Fs, self.fs), (SegmentReg::Gs, self.gs)]
    }
}
