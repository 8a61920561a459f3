pub mod abi;
pub mod env;
pub mod image;
pub mod rebuild;
pub mod regs;
pub mod snapshot;

use std::fs::File;
use std::path::PathBuf;

use crate::regs::Register;


#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Dump magic token mismatch")]
    BadMagic,
    #[error("Truncated dump: {needed} more bytes needed at offset {offset}")]
    Truncated { offset: usize, needed: usize },
    #[error("Invalid mapping bounds: end {end:#x} not above start {start:#x}")]
    InvalidMappingSize { start: u64, end: u64 },
    #[error("Invalid text in {field} at offset {offset}")]
    InvalidText { field: &'static str, offset: usize },
    #[error("No MSR address known for segment register {0}")]
    UnknownSegmentRegister(String),
    #[error("Snapshot file not found: {0:?}")]
    MissingSnapshotFile(PathBuf),
    #[error("Placeholder image unavailable: {0}")]
    BootstrapImageUnavailable(String),
    #[error("Region {start:#x}..{end:#x} overlaps an existing mapping")]
    RegionOverlap { start: u64, end: u64 },
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(u64),
    #[error("I/O failure during reconstruction")]
    Io(#[from] std::io::Error),
}

pub type ReplayResult<T> = Result<T, ReplayError>;

/// One mapped region as reported by [`Environment::regions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub start: u64,
    pub end: u64,
    pub name: String,
}

/// Capability interface of a virtual execution environment.
///
/// Reconstruction talks to the environment exclusively through this trait,
/// so the same pipeline drives the in-memory reference environment and any
/// instruction-level backend. Addresses are absolute; `map` takes an
/// exclusive end bound.
pub trait Environment {
    /// Map a fresh, zero-filled region `[start, end)` under `name`.
    fn map(&mut self, start: u64, end: u64, name: &str) -> ReplayResult<()>;

    /// Remove every region fully contained in `[start, end)`.
    fn unmap(&mut self, start: u64, end: u64) -> ReplayResult<()>;

    /// Copy `bytes` into mapped memory starting at `addr`.
    fn write_memory(&mut self, addr: u64, bytes: &[u8]) -> ReplayResult<()>;

    fn read_register(&self, reg: Register) -> u64;

    fn write_register(&mut self, reg: Register, value: u64);

    /// Write a model-specific register by its architectural address.
    fn write_msr(&mut self, msr: u64, value: u64);

    /// Move the heap boundary (brk) pointer.
    fn set_heap_boundary(&mut self, addr: u64);

    /// Install an already-positioned open file at a descriptor slot. The
    /// environment owns the handle from then on.
    fn bind_file(&mut self, fd: i32, file: File) -> ReplayResult<()>;

    fn regions(&self) -> Vec<Region>;
}
