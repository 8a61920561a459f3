use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;

use crate::regs::{RegisterSet, SegmentBases};

const O_ACCMODE: i32 = 0o3;
const O_WRONLY: i32 = 0o1;
const O_RDWR: i32 = 0o2;

bitflags::bitflags! {
    /// `open(2)` flag bits honored when re-opening captured files. The
    /// access mode is a two-bit field below these and is handled
    /// separately.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: i32 {
        const CREAT = 0o100;
        const EXCL = 0o200;
        const TRUNC = 0o1000;
        const APPEND = 0o2000;
        const CLOEXEC = 0o2000000;
    }
}

/// An open file captured from the dumped process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Host path recorded at capture time.
    pub path: String,
    /// Descriptor number the process held the file under.
    pub fd: i32,
    /// Raw `open(2)` flag word.
    pub flags: i32,
    /// File cursor position; may point past the end of the file.
    pub cursor: u64,
}

impl FileEntry {
    pub fn open_flags(&self) -> OpenFlags {
        OpenFlags::from_bits_truncate(self.flags)
    }

    /// Open options matching the captured flag word, with `mode` applied
    /// should the open create the file.
    pub fn open_options(&self, mode: u32) -> OpenOptions {
        let mut opts = OpenOptions::new();
        match self.flags & O_ACCMODE {
            O_WRONLY => {
                opts.write(true);
            }
            O_RDWR => {
                opts.read(true).write(true);
            }
            _ => {
                opts.read(true);
            }
        }

        let flags = self.open_flags();
        if flags.contains(OpenFlags::APPEND) {
            opts.append(true);
        }
        if flags.contains(OpenFlags::TRUNC) {
            opts.truncate(true);
        }
        if flags.contains(OpenFlags::CREAT) {
            opts.create(true);
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        opts
    }
}

/// One captured memory mapping with its content bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMapping {
    pub start: u64,
    /// Exclusive end address; always above `start`.
    pub end: u64,
    pub name: String,
    /// Exactly `end - start` bytes.
    pub content: Vec<u8>,
}

impl MemoryMapping {
    /// Mapping size in bytes; never zero, end > start is enforced at
    /// decode time.
    pub fn size(&self) -> u64 {
        self.end - self.start
    }
}

/// Decoded process snapshot.
///
/// Produced once by the dump decoder, read-only afterwards, and consumed
/// by the reconstruction pipeline. Mapping and file order is capture
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Address of the intercepted function.
    pub entry: u64,
    pub registers: RegisterSet,
    pub segment_bases: SegmentBases,
    /// Call arguments, at most 255.
    pub params: Vec<u64>,
    /// Heap boundary (brk) at capture time.
    pub heap_boundary: u64,
    pub files: Vec<FileEntry>,
    pub mappings: Vec<MemoryMapping>,
}
