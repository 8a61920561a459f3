use anyhow::{anyhow, Context, Result};
use goblin::elf::program_header::PT_LOAD;
use goblin::elf::Elf;
use replaywired_core::image::ProgramImage;
use replaywired_core::snapshot::Snapshot;
use replaywired_core::{ReplayError, ReplayResult};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

pub mod decode;
pub mod stub;

pub use decode::{decode, DUMP_MAGIC};

/// Read and decode a process dump from disk.
///
/// A missing file is reported as [`ReplayError::MissingSnapshotFile`]
/// before any bytes are read; everything else is the decoder's verdict.
pub fn read_snapshot(path: &Path) -> ReplayResult<Snapshot> {
    if !path.exists() {
        return Err(ReplayError::MissingSnapshotFile(path.to_path_buf()));
    }

    let bytes = fs::read(path)?;
    info!("Decoding snapshot: {:?} ({} bytes)", path, bytes.len());
    decode::decode(&bytes)
}

/// Parse the loadable view of an ELF executable.
///
/// Used for the bootstrap placeholder image: only PT_LOAD segments and
/// the entry point matter, everything else in the file is ignored.
pub fn load_elf(path: &Path) -> Result<ProgramImage> {
    let buffer = fs::read(path).with_context(|| format!("Failed to read ELF file: {:?}", path))?;

    let elf = Elf::parse(&buffer).context("Failed to parse ELF binary")?;

    debug!("ELF Entry Point: {:#x}", elf.entry);

    let mut image = ProgramImage::new(elf.entry);

    for ph in elf.program_headers {
        if ph.p_type != PT_LOAD {
            continue;
        }

        let size = ph.p_filesz as usize;
        let offset = ph.p_offset as usize;
        if size == 0 {
            continue;
        }

        debug!(
            "Found Loadable Segment: Addr={:#x}, Size={} bytes, Offset={:#x}",
            ph.p_vaddr, size, offset
        );

        if offset + size > buffer.len() {
            return Err(anyhow!("Segment out of bounds in ELF file"));
        }

        image.add_segment(ph.p_vaddr, buffer[offset..offset + size].to_vec());
    }

    if image.segments.is_empty() {
        warn!("No loadable segments found in ELF file");
    }

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_snapshot_is_reported_before_decoding() {
        let path = Path::new("/nonexistent/replaywired/capture.dump");
        match read_snapshot(path) {
            Err(ReplayError::MissingSnapshotFile(p)) => assert_eq!(p, path),
            other => panic!("expected MissingSnapshotFile, got {other:?}"),
        }
    }
}
