use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

fn default_protected_regions() -> Vec<String> {
    vec!["[vvar]".to_string(), "[vsyscall]".to_string()]
}

fn default_segment_msrs() -> HashMap<String, u64> {
    let mut msrs = HashMap::new();
    msrs.insert("FS".to_string(), 0xC000_0100);
    msrs.insert("GS".to_string(), 0xC000_0101);
    msrs
}

fn default_stack_region() -> String {
    "[stack]".to_string()
}

fn default_vdso_region() -> String {
    "[vdso]".to_string()
}

fn default_gap_region() -> String {
    "[vvar]".to_string()
}

fn default_file_mode() -> u32 {
    0o644
}

/// Architecture and policy knobs for reconstruction.
///
/// The defaults describe x86-64 Linux; a YAML profile can override any
/// subset of them, e.g. to protect additional kernel regions or to replay
/// dumps produced with unusual region naming.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ReplayProfile {
    /// Region names the clear stage must never unmap.
    #[serde(default = "default_protected_regions")]
    pub protected_regions: Vec<String>,

    /// MSR address backing each restorable segment register.
    #[serde(default = "default_segment_msrs")]
    pub segment_msrs: HashMap<String, u64>,

    /// Name of the captured process stack mapping.
    #[serde(default = "default_stack_region")]
    pub stack_region: String,

    /// Name of the captured vDSO mapping.
    #[serde(default = "default_vdso_region")]
    pub vdso_region: String,

    /// Name given to the region synthesized between stack and vDSO.
    #[serde(default = "default_gap_region")]
    pub gap_region: String,

    /// Permission bits used when re-opening captured files.
    #[serde(default = "default_file_mode")]
    pub file_mode: u32,

    /// Refuse dump files larger than this (e.g. "2GB"). Unlimited when unset.
    #[serde(default)]
    pub max_snapshot_size: Option<String>,
}

impl Default for ReplayProfile {
    fn default() -> Self {
        Self {
            protected_regions: default_protected_regions(),
            segment_msrs: default_segment_msrs(),
            stack_region: default_stack_region(),
            vdso_region: default_vdso_region(),
            gap_region: default_gap_region(),
            file_mode: default_file_mode(),
            max_snapshot_size: None,
        }
    }
}

impl ReplayProfile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open replay profile at {:?}", path.as_ref()))?;
        let profile: Self =
            serde_yaml::from_reader(f).context("Failed to parse replay profile YAML")?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<()> {
        if self.file_mode > 0o7777 {
            anyhow::bail!(
                "file_mode {:#o} is not a valid permission word",
                self.file_mode
            );
        }

        if self.stack_region.trim().is_empty()
            || self.vdso_region.trim().is_empty()
            || self.gap_region.trim().is_empty()
        {
            anyhow::bail!("Region marker names cannot be empty");
        }

        if let Some(cap) = &self.max_snapshot_size {
            parse_size(cap).context("Invalid max_snapshot_size")?;
        }

        Ok(())
    }

    pub fn is_protected(&self, region_name: &str) -> bool {
        self.protected_regions.iter().any(|p| p == region_name)
    }

    pub fn msr_address(&self, segment_name: &str) -> Option<u64> {
        self.segment_msrs.get(segment_name).copied()
    }

    /// Size cap in bytes, if one is configured.
    pub fn snapshot_size_cap(&self) -> Result<Option<u64>> {
        self.max_snapshot_size.as_deref().map(parse_size).transpose()
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
