// ReplayWired - Process Replay Platform
// Copyright (C) 2026 ReplayWired Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Ordered reconstruction of a captured process state into an environment.

use std::io::{Seek, SeekFrom};
use std::path::Path;

use replaywired_config::ReplayProfile;
use tracing::{debug, info, warn};

use crate::abi;
use crate::regs::SegmentReg;
use crate::snapshot::{FileEntry, MemoryMapping, Snapshot};
use crate::{Environment, ReplayError, ReplayResult};

/// Drives the staged reconstruction of a [`Snapshot`] into an
/// [`Environment`].
///
/// Stage order is a hard contract: stale regions must be gone before new
/// mappings land, and the auxiliary gap region can only be placed once the
/// stack and vDSO mappings exist. Any stage failure aborts the run; there
/// is no rollback and the environment must be discarded by the caller.
pub struct Rebuilder<'a> {
    env: &'a mut dyn Environment,
    profile: &'a ReplayProfile,
}

impl<'a> Rebuilder<'a> {
    pub fn new(env: &'a mut dyn Environment, profile: &'a ReplayProfile) -> Self {
        Self { env, profile }
    }

    /// Run all stages in order.
    pub fn build(&mut self, snapshot: &Snapshot) -> ReplayResult<()> {
        self.clear_regions()?;
        self.apply_call_state(snapshot)?;
        self.apply_memory_state(snapshot)?;
        self.reopen_files(&snapshot.files)?;

        info!(
            "Reconstruction complete: entry {:#x}, {} mappings",
            snapshot.entry,
            snapshot.mappings.len()
        );
        Ok(())
    }

    /// Unmap every region except the protected kernel pages. Must run
    /// before any new mapping is created to avoid address collisions.
    pub fn clear_regions(&mut self) -> ReplayResult<()> {
        for region in self.env.regions() {
            if self.profile.is_protected(&region.name) {
                debug!("Leaving protected region {} mapped", region.name);
                continue;
            }
            self.env.unmap(region.start, region.end)?;
        }
        Ok(())
    }

    /// Entry point, registers, segment bases, call parameters and heap
    /// boundary. Idempotent: each write targets a fixed location.
    pub fn apply_call_state(&mut self, snapshot: &Snapshot) -> ReplayResult<()> {
        abi::set_entry(self.env, snapshot.entry);

        for (reg, value) in snapshot.registers.entries() {
            self.env.write_register(reg, value);
        }

        for (seg, base) in snapshot.segment_bases.entries() {
            self.restore_segment_base(seg, base)?;
        }

        abi::set_parameters(self.env, &snapshot.params)?;

        self.env.set_heap_boundary(snapshot.heap_boundary);
        Ok(())
    }

    /// Recreate the captured mappings in capture order, then synthesize
    /// the auxiliary region between stack and vDSO.
    pub fn apply_memory_state(&mut self, snapshot: &Snapshot) -> ReplayResult<()> {
        self.recreate_mappings(&snapshot.mappings)?;
        self.fill_marker_gap()
    }

    fn restore_segment_base(&mut self, seg: SegmentReg, base: u64) -> ReplayResult<()> {
        let msr = self
            .profile
            .msr_address(seg.name())
            .ok_or_else(|| ReplayError::UnknownSegmentRegister(seg.name().to_string()))?;
        self.env.write_msr(msr, base);
        Ok(())
    }

    fn recreate_mappings(&mut self, mappings: &[MemoryMapping]) -> ReplayResult<()> {
        for mapping in mappings {
            debug!(
                "Recreating mapping {:#x}..{:#x} {}",
                mapping.start, mapping.end, mapping.name
            );
            self.env.map(mapping.start, mapping.end, &mapping.name)?;
            self.env.write_memory(mapping.start, &mapping.content)?;
        }
        Ok(())
    }

    /// The capture shim cannot read the vvar page, so it is absent from
    /// the mapping list; the environment still expects one between the
    /// stack and the vDSO. Fill that gap when both markers are present.
    fn fill_marker_gap(&mut self) -> ReplayResult<()> {
        let mut stack_end = None;
        let mut vdso_start = None;
        for region in self.env.regions() {
            if region.name == self.profile.stack_region {
                stack_end = Some(region.end);
            } else if region.name == self.profile.vdso_region && vdso_start.is_none() {
                vdso_start = Some(region.start);
            }
        }

        let (Some(stack_end), Some(vdso_start)) = (stack_end, vdso_start) else {
            debug!("Stack or vdso marker absent, no auxiliary region synthesized");
            return Ok(());
        };
        if stack_end >= vdso_start {
            warn!(
                "No gap between stack end {:#x} and vdso start {:#x}, auxiliary region skipped",
                stack_end, vdso_start
            );
            return Ok(());
        }

        self.env.map(stack_end, vdso_start, &self.profile.gap_region)
    }

    /// Re-open the captured files, restore their cursors and bind them at
    /// their original descriptor numbers. Files that no longer exist on
    /// the host are skipped without error; replay of the call may then
    /// touch an unbound descriptor, which is the analyst's trade-off.
    pub fn reopen_files(&mut self, files: &[FileEntry]) -> ReplayResult<()> {
        for entry in files {
            if !Path::new(&entry.path).exists() {
                debug!(
                    "Host file {} missing, descriptor {} left unbound",
                    entry.path, entry.fd
                );
                continue;
            }

            let mut file = entry
                .open_options(self.profile.file_mode)
                .open(&entry.path)?;
            file.seek(SeekFrom::Start(entry.cursor))?;
            self.env.bind_file(entry.fd, file)?;
            debug!(
                "Descriptor {} rebound to {} at cursor {}",
                entry.fd, entry.path, entry.cursor
            );
        }
        Ok(())
    }
}
