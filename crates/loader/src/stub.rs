//! Placeholder executable provider.
//!
//! Environment initialization wants a real program to load even though
//! every byte of its state is replaced during reconstruction. Rather than
//! requiring a host toolchain, this emits a canned x86-64 `exit(0)`
//! executable into a fresh temp directory and runs it back through the
//! ELF loader as a sanity check before handing the path out.

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use replaywired_core::{ReplayError, ReplayResult};
use tracing::debug;

const IMAGE_BASE: u64 = 0x40_0000;
// ELF header (64 bytes) plus one program header (56 bytes)
const CODE_OFFSET: u64 = 120;

// mov eax, 60; xor edi, edi; syscall
const STUB_CODE: [u8; 9] = [0xb8, 0x3c, 0x00, 0x00, 0x00, 0x31, 0xff, 0x0f, 0x05];

/// Emit the placeholder executable and return its path.
///
/// The caller initializes its environment from this image once; the
/// reconstruction pipeline then discards all of it. Any failure to emit
/// or re-parse the image is [`ReplayError::BootstrapImageUnavailable`].
pub fn placeholder_image() -> ReplayResult<PathBuf> {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| ReplayError::BootstrapImageUnavailable(e.to_string()))?
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("replaywired-stub-{}", nonce));
    fs::create_dir_all(&dir).map_err(unavailable)?;

    let path = dir.join("placeholder");
    fs::write(&path, build_image()).map_err(unavailable)?;

    crate::load_elf(&path)
        .map_err(|e| ReplayError::BootstrapImageUnavailable(format!("{:#}", e)))?;

    debug!("Placeholder image emitted at {:?}", path);
    Ok(path)
}

fn unavailable(e: std::io::Error) -> ReplayError {
    ReplayError::BootstrapImageUnavailable(e.to_string())
}

/// Hand-assembled static ELF64 executable: one RX PT_LOAD covering the
/// whole file, entry pointing at the exit stub.
fn build_image() -> Vec<u8> {
    let total = CODE_OFFSET as usize + STUB_CODE.len();
    let mut out = Vec::with_capacity(total);

    // e_ident: ELF64, little-endian, current version, SysV ABI
    out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&2u16.to_le_bytes()); // e_type: ET_EXEC
    out.extend_from_slice(&62u16.to_le_bytes()); // e_machine: EM_X86_64
    out.extend_from_slice(&1u32.to_le_bytes()); // e_version
    out.extend_from_slice(&(IMAGE_BASE + CODE_OFFSET).to_le_bytes()); // e_entry
    out.extend_from_slice(&64u64.to_le_bytes()); // e_phoff
    out.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
    out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    out.extend_from_slice(&64u16.to_le_bytes()); // e_ehsize
    out.extend_from_slice(&56u16.to_le_bytes()); // e_phentsize
    out.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
    out.extend_from_slice(&[0u8; 6]); // e_shentsize, e_shnum, e_shstrndx

    // PT_LOAD, R+X, covering the whole file
    out.extend_from_slice(&1u32.to_le_bytes()); // p_type
    out.extend_from_slice(&5u32.to_le_bytes()); // p_flags
    out.extend_from_slice(&0u64.to_le_bytes()); // p_offset
    out.extend_from_slice(&IMAGE_BASE.to_le_bytes()); // p_vaddr
    out.extend_from_slice(&IMAGE_BASE.to_le_bytes()); // p_paddr
    out.extend_from_slice(&(total as u64).to_le_bytes()); // p_filesz
    out.extend_from_slice(&(total as u64).to_le_bytes()); // p_memsz
    out.extend_from_slice(&0x1000u64.to_le_bytes()); // p_align

    out.extend_from_slice(&STUB_CODE);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_image_loads() {
        let path = placeholder_image().unwrap();
        let image = crate::load_elf(&path).unwrap();

        assert_eq!(image.entry_point, IMAGE_BASE + CODE_OFFSET);
        assert_eq!(image.segments.len(), 1);
        assert_eq!(image.segments[0].start_addr, IMAGE_BASE);
        assert_eq!(
            image.segments[0].data.len(),
            CODE_OFFSET as usize + STUB_CODE.len()
        );

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_image_layout() {
        let image = build_image();
        assert_eq!(image.len(), 129);
        // Entry points at the first stub instruction inside the file
        let entry = u64::from_le_bytes(image[24..32].try_into().unwrap());
        assert_eq!(&image[(entry - IMAGE_BASE) as usize..], &STUB_CODE);
    }
}
