// ReplayWired - Process Replay Platform
// Copyright (C) 2026 ReplayWired Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Decoder for the process dump format.
//!
//! The format is little-endian throughout and carries no version field;
//! incompatible changes surface as `BadMagic` or `Truncated`. Layout:
//! magic token, entry address, 19 registers in capture order, FS/GS bases,
//! parameter count plus values, heap boundary, open-file records (a list
//! closed by a single zero byte), then memory mappings until end of input.

use replaywired_core::regs::{RegisterSet, SegmentBases};
use replaywired_core::snapshot::{FileEntry, MemoryMapping, Snapshot};
use replaywired_core::{ReplayError, ReplayResult};
use tracing::debug;

/// Magic token opening every dump file.
pub const DUMP_MAGIC: &[u8; 10] = b"REPLAYDUMP";

/// Scan window for NUL-terminated path fields, and the fixed width of
/// mapping name fields. Names and paths are capped at 255 bytes plus the
/// terminator.
const NAME_WINDOW: usize = 256;

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn offset(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn at_end(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn take(&mut self, n: usize) -> ReplayResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(ReplayError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> ReplayResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> ReplayResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn i32(&mut self) -> ReplayResult<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> ReplayResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    /// NUL-terminated string scanned within a 256-byte window; consumes
    /// the terminator.
    fn path_string(&mut self) -> ReplayResult<String> {
        let offset = self.pos;
        let window_end = self.buf.len().min(self.pos + NAME_WINDOW);
        let window = &self.buf[self.pos..window_end];

        let len = match window.iter().position(|&b| b == 0) {
            Some(len) => len,
            None if window.len() < NAME_WINDOW => {
                // Buffer ended before a terminator could appear
                return Err(ReplayError::Truncated {
                    offset: self.buf.len(),
                    needed: 1,
                });
            }
            None => {
                return Err(ReplayError::InvalidText {
                    field: "file path",
                    offset,
                })
            }
        };

        let text = std::str::from_utf8(&window[..len]).map_err(|_| ReplayError::InvalidText {
            field: "file path",
            offset,
        })?;
        self.pos += len + 1;
        Ok(text.to_string())
    }

    /// Fixed 256-byte NUL-padded name field, decoded up to the first NUL.
    fn padded_name(&mut self) -> ReplayResult<String> {
        let offset = self.pos;
        let field = self.take(NAME_WINDOW)?;

        // A field with no terminator would mean a 256-byte name, over the
        // 255-byte limit of the format.
        let len = field
            .iter()
            .position(|&b| b == 0)
            .ok_or(ReplayError::InvalidText {
                field: "mapping name",
                offset,
            })?;

        let text = std::str::from_utf8(&field[..len]).map_err(|_| ReplayError::InvalidText {
            field: "mapping name",
            offset,
        })?;
        Ok(text.to_string())
    }
}

/// Decode a raw dump buffer into a [`Snapshot`].
///
/// Every read is bounds-checked; a structurally broken buffer yields the
/// matching [`ReplayError`] variant and never a partial snapshot.
pub fn decode(bytes: &[u8]) -> ReplayResult<Snapshot> {
    let mut r = Reader::new(bytes);

    let magic = r.take(DUMP_MAGIC.len()).map_err(|_| ReplayError::BadMagic)?;
    if magic != DUMP_MAGIC {
        return Err(ReplayError::BadMagic);
    }

    let entry = r.u64()?;

    let mut values = [0u64; RegisterSet::CAPTURED];
    for value in values.iter_mut() {
        *value = r.u64()?;
    }
    let registers = RegisterSet::from_capture_order(values);

    let segment_bases = SegmentBases {
        fs: r.u64()?,
        gs: r.u64()?,
    };

    let param_count = r.u8()? as usize;
    let mut params = Vec::with_capacity(param_count);
    for _ in 0..param_count {
        params.push(r.u64()?);
    }

    let heap_boundary = r.u64()?;

    let files = decode_files(&mut r)?;
    let mappings = decode_mappings(&mut r)?;

    debug!(
        "Snapshot decoded: entry {:#x}, {} params, {} files, {} mappings",
        entry,
        params.len(),
        files.len(),
        mappings.len()
    );

    Ok(Snapshot {
        entry,
        registers,
        segment_bases,
        params,
        heap_boundary,
        files,
        mappings,
    })
}

/// Open-file records until the single zero terminator byte, which is
/// consumed and never interpreted as an empty path.
fn decode_files(r: &mut Reader) -> ReplayResult<Vec<FileEntry>> {
    let mut files = Vec::new();
    loop {
        match r.peek() {
            None => {
                return Err(ReplayError::Truncated {
                    offset: r.offset(),
                    needed: 1,
                })
            }
            Some(0) => {
                r.u8()?;
                return Ok(files);
            }
            Some(_) => {}
        }

        let path = r.path_string()?;
        let fd = r.i32()?;
        let flags = r.i32()?;
        let cursor = r.u64()?;
        files.push(FileEntry {
            path,
            fd,
            flags,
            cursor,
        });
    }
}

/// Mapping records until end of buffer.
fn decode_mappings(r: &mut Reader) -> ReplayResult<Vec<MemoryMapping>> {
    let mut mappings = Vec::new();
    while !r.at_end() {
        let name = r.padded_name()?;
        let start = r.u64()?;
        let end = r.u64()?;
        if end <= start {
            return Err(ReplayError::InvalidMappingSize { start, end });
        }

        let size = end - start;
        if size > r.remaining() as u64 {
            return Err(ReplayError::Truncated {
                offset: r.offset(),
                needed: (size - r.remaining() as u64) as usize,
            });
        }

        let content = r.take(size as usize)?.to_vec();
        mappings.push(MemoryMapping {
            start,
            end,
            name,
            content,
        });
    }
    Ok(mappings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use replaywired_core::regs::{RegisterSet, SegmentBases};
    use replaywired_core::snapshot::{FileEntry, MemoryMapping, Snapshot};
    use std::collections::HashSet;

    /// Capture-side serializer, mirrored here for round-trip coverage;
    /// producing dumps is otherwise the injected shim's job.
    fn encode(snapshot: &Snapshot) -> Vec<u8> {
        let mut out = DUMP_MAGIC.to_vec();
        out.extend_from_slice(&snapshot.entry.to_le_bytes());

        for (_, value) in snapshot.registers.entries() {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(&snapshot.segment_bases.fs.to_le_bytes());
        out.extend_from_slice(&snapshot.segment_bases.gs.to_le_bytes());

        out.push(snapshot.params.len() as u8);
        for param in &snapshot.params {
            out.extend_from_slice(&param.to_le_bytes());
        }

        out.extend_from_slice(&snapshot.heap_boundary.to_le_bytes());

        for file in &snapshot.files {
            out.extend_from_slice(file.path.as_bytes());
            out.push(0);
            out.extend_from_slice(&file.fd.to_le_bytes());
            out.extend_from_slice(&file.flags.to_le_bytes());
            out.extend_from_slice(&file.cursor.to_le_bytes());
        }
        out.push(0);

        for mapping in &snapshot.mappings {
            let mut name_field = [0u8; 256];
            name_field[..mapping.name.len()].copy_from_slice(mapping.name.as_bytes());
            out.extend_from_slice(&name_field);
            out.extend_from_slice(&mapping.start.to_le_bytes());
            out.extend_from_slice(&mapping.end.to_le_bytes());
            out.extend_from_slice(&mapping.content);
        }

        out
    }

    fn sample_snapshot(param_count: usize) -> Snapshot {
        let values: [u64; 19] = core::array::from_fn(|i| 0xAA00 + i as u64);
        Snapshot {
            entry: 0x5555_4444_3210,
            registers: RegisterSet::from_capture_order(values),
            segment_bases: SegmentBases {
                fs: 0x7f00_0000_1000,
                gs: 0x7f00_0000_2000,
            },
            params: (0..param_count as u64).map(|i| i * 7 + 1).collect(),
            heap_boundary: 0x2233_0000,
            files: vec![
                FileEntry {
                    path: "/etc/hosts".to_string(),
                    fd: 3,
                    flags: 0,
                    cursor: 12,
                },
                FileEntry {
                    path: "/var/log/app.log".to_string(),
                    fd: 9,
                    flags: 0o2101,
                    cursor: 0xFFFF_0000,
                },
            ],
            mappings: vec![
                MemoryMapping {
                    start: 0x40_0000,
                    end: 0x40_0040,
                    name: "/opt/target/victim".to_string(),
                    content: (0u8..0x40).collect(),
                },
                MemoryMapping {
                    start: 0x7ffc_0000_0000,
                    end: 0x7ffc_0000_0100,
                    name: "[stack]".to_string(),
                    content: vec![0x5a; 0x100],
                },
            ],
        }
    }

    #[test]
    fn test_round_trip() {
        for param_count in [0usize, 6, 7, 255] {
            let snapshot = sample_snapshot(param_count);
            let decoded = decode(&encode(&snapshot)).unwrap();
            assert_eq!(decoded, snapshot, "round trip with {param_count} params");
        }
    }

    #[test]
    fn test_round_trip_minimal() {
        let snapshot = Snapshot {
            files: Vec::new(),
            mappings: Vec::new(),
            ..sample_snapshot(0)
        };
        let encoded = encode(&snapshot);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn test_register_order() {
        let snapshot = Snapshot {
            files: Vec::new(),
            mappings: Vec::new(),
            ..sample_snapshot(0)
        };
        let encoded = encode(&snapshot);

        // RAX is the first register after magic + entry; SS the last.
        let rax_off = DUMP_MAGIC.len() + 8;
        let rax = u64::from_le_bytes(encoded[rax_off..rax_off + 8].try_into().unwrap());
        assert_eq!(decode(&encoded).unwrap().registers.rax, rax);

        let ss_off = rax_off + 18 * 8;
        let ss = u64::from_le_bytes(encoded[ss_off..ss_off + 8].try_into().unwrap());
        assert_eq!(decode(&encoded).unwrap().registers.ss, ss);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = encode(&sample_snapshot(2));
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(ReplayError::BadMagic)));

        // Subsequent garbage does not change the verdict
        let mut wrong = b"WRONGMAGIC".to_vec();
        wrong.extend_from_slice(&[0xFF; 64]);
        assert!(matches!(decode(&wrong), Err(ReplayError::BadMagic)));

        assert!(matches!(decode(b""), Err(ReplayError::BadMagic)));
        assert!(matches!(decode(b"REPLAY"), Err(ReplayError::BadMagic)));
    }

    #[test]
    fn test_every_truncation_point_is_rejected() {
        let snapshot = sample_snapshot(3);
        let full = encode(&snapshot);

        // A cut is legitimate exactly at the fd-list terminator or after
        // a whole mapping record; everywhere else decode must fail and
        // must never read past the buffer.
        let mut clean_cuts = HashSet::new();
        let mut off = DUMP_MAGIC.len() + 8 + 19 * 8 + 16 + 1 + snapshot.params.len() * 8 + 8;
        for file in &snapshot.files {
            off += file.path.len() + 1 + 4 + 4 + 8;
        }
        off += 1; // list terminator
        clean_cuts.insert(off);
        for mapping in &snapshot.mappings {
            off += 256 + 16 + mapping.content.len();
            clean_cuts.insert(off);
        }
        assert_eq!(off, full.len());

        for cut in 0..full.len() {
            let result = decode(&full[..cut]);
            if clean_cuts.contains(&cut) {
                assert!(result.is_ok(), "prefix of {cut} bytes should decode");
            } else if cut < DUMP_MAGIC.len() {
                assert!(matches!(result, Err(ReplayError::BadMagic)));
            } else {
                assert!(
                    matches!(result, Err(ReplayError::Truncated { .. })),
                    "prefix of {cut} bytes should be truncated"
                );
            }
        }
    }

    #[test]
    fn test_mapping_size_must_be_positive() {
        for (start, end) in [(0x5000u64, 0x5000u64), (0x5000, 0x4000)] {
            let mut snapshot = sample_snapshot(0);
            snapshot.files.clear();
            snapshot.mappings = vec![MemoryMapping {
                start,
                end,
                name: "[heap]".to_string(),
                content: Vec::new(),
            }];
            let bytes = encode(&snapshot);
            assert!(
                matches!(
                    decode(&bytes),
                    Err(ReplayError::InvalidMappingSize { .. })
                ),
                "{start:#x}..{end:#x} must be rejected"
            );
        }
    }

    #[test]
    fn test_mapping_content_shorter_than_declared() {
        let mut snapshot = sample_snapshot(0);
        snapshot.files.clear();
        snapshot.mappings = vec![MemoryMapping {
            start: 0x1000,
            end: 0x2000,
            name: "[heap]".to_string(),
            content: vec![1; 0x1000],
        }];
        let mut bytes = encode(&snapshot);
        bytes.truncate(bytes.len() - 0x800);
        assert!(matches!(decode(&bytes), Err(ReplayError::Truncated { .. })));
    }

    #[test]
    fn test_non_utf8_path_is_invalid_text() {
        let mut snapshot = sample_snapshot(0);
        snapshot.mappings.clear();
        snapshot.files = vec![FileEntry {
            path: "@@@@".to_string(),
            fd: 1,
            flags: 0,
            cursor: 0,
        }];
        let mut bytes = encode(&snapshot);
        let path_off = bytes.len() - (4 + 1 + 4 + 4 + 8 + 1);
        bytes[path_off] = 0xFF;
        bytes[path_off + 1] = 0xFE;
        assert!(matches!(
            decode(&bytes),
            Err(ReplayError::InvalidText {
                field: "file path",
                ..
            })
        ));
    }

    #[test]
    fn test_unterminated_path_is_invalid_text() {
        let mut snapshot = sample_snapshot(0);
        snapshot.mappings.clear();
        snapshot.files.clear();
        let mut bytes = encode(&snapshot);
        bytes.pop(); // drop the fd-list terminator
        bytes.extend_from_slice(&[b'a'; 256]);
        bytes.extend_from_slice(&[0u8; 64]); // enough trailing bytes to rule out truncation
        assert!(matches!(
            decode(&bytes),
            Err(ReplayError::InvalidText {
                field: "file path",
                ..
            })
        ));
    }

    #[test]
    fn test_mapping_name_without_terminator_is_invalid_text() {
        let mut snapshot = sample_snapshot(0);
        snapshot.files.clear();
        snapshot.mappings.clear();
        let mut bytes = encode(&snapshot);
        bytes.extend_from_slice(&[b'n'; 256]);
        bytes.extend_from_slice(&0x1000u64.to_le_bytes());
        bytes.extend_from_slice(&0x2000u64.to_le_bytes());
        bytes.extend_from_slice(&vec![0u8; 0x1000]);
        assert!(matches!(
            decode(&bytes),
            Err(ReplayError::InvalidText {
                field: "mapping name",
                ..
            })
        ));
    }

    #[test]
    fn test_max_path_length_accepted() {
        let mut snapshot = sample_snapshot(0);
        snapshot.mappings.clear();
        snapshot.files = vec![FileEntry {
            path: "p".repeat(255),
            fd: 2,
            flags: 0,
            cursor: 0,
        }];
        let decoded = decode(&encode(&snapshot)).unwrap();
        assert_eq!(decoded.files[0].path.len(), 255);
    }
}
