use anyhow::{bail, Context, Result};
use clap::Parser;
use replaywired_core::env::MemEnv;
use replaywired_core::rebuild::Rebuilder;
use replaywired_core::regs::{RegisterSet, SegmentBases};
use replaywired_core::snapshot::{FileEntry, Snapshot};
use replaywired_core::Environment;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the process dump file
    dump: PathBuf,

    /// Path to a replay profile (YAML); built-in defaults otherwise
    #[arg(short, long)]
    profile: Option<PathBuf>,

    /// Enable stage-level reconstruction tracing
    #[arg(short, long)]
    trace: bool,

    /// Write a JSON summary of the decoded snapshot to this path
    #[arg(long)]
    inspect: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    info!("Starting ReplayWired");

    let profile = if let Some(profile_path) = &args.profile {
        info!("Loading replay profile: {:?}", profile_path);
        replaywired_config::ReplayProfile::from_file(profile_path)?
    } else {
        info!("Using built-in replay profile");
        replaywired_config::ReplayProfile::default()
    };

    if let Some(cap) = profile.snapshot_size_cap()? {
        if let Ok(meta) = std::fs::metadata(&args.dump) {
            if meta.len() > cap {
                bail!(
                    "Snapshot is {} bytes, over the configured cap of {} bytes",
                    meta.len(),
                    cap
                );
            }
        }
    }

    if let Ok(mut dump_file) = std::fs::File::open(&args.dump) {
        let mut hasher = Sha256::new();
        std::io::copy(&mut dump_file, &mut hasher)?;
        info!("Snapshot digest: sha256:{:x}", hasher.finalize());
    }

    let snapshot = replaywired_loader::read_snapshot(&args.dump)?;
    info!(
        "Decoded snapshot: entry {:#x}, {} parameters, {} files, {} mappings",
        snapshot.entry,
        snapshot.params.len(),
        snapshot.files.len(),
        snapshot.mappings.len()
    );

    if let Some(inspect_path) = &args.inspect {
        write_summary(inspect_path, &snapshot).context("Failed to write snapshot summary")?;
        info!("Snapshot summary written to {:?}", inspect_path);
    }

    let stub_path = replaywired_loader::stub::placeholder_image()?;
    let image = replaywired_loader::load_elf(&stub_path)?;
    let mut env = MemEnv::boot(&image)?;

    Rebuilder::new(&mut env, &profile).build(&snapshot)?;

    info!("Environment ready to resume at {:#x}", snapshot.entry);
    for region in env.regions() {
        info!("  {:#014x}..{:#014x}  {}", region.start, region.end, region.name);
    }

    Ok(())
}

fn write_summary(path: &Path, snapshot: &Snapshot) -> Result<()> {
    #[derive(serde::Serialize)]
    struct MappingSummary<'a> {
        name: &'a str,
        start: u64,
        end: u64,
        size: u64,
    }

    #[derive(serde::Serialize)]
    struct Summary<'a> {
        r#type: &'static str,
        entry: u64,
        registers: &'a RegisterSet,
        segment_bases: &'a SegmentBases,
        params: &'a [u64],
        heap_boundary: u64,
        files: &'a [FileEntry],
        mappings: Vec<MappingSummary<'a>>,
    }

    let summary = Summary {
        r#type: "process_dump",
        entry: snapshot.entry,
        registers: &snapshot.registers,
        segment_bases: &snapshot.segment_bases,
        params: &snapshot.params,
        heap_boundary: snapshot.heap_boundary,
        files: &snapshot.files,
        mappings: snapshot
            .mappings
            .iter()
            .map(|m| MappingSummary {
                name: &m.name,
                start: m.start,
                end: m.end,
                size: m.size(),
            })
            .collect(),
    };

    let json = serde_json::to_string_pretty(&summary)?;
    std::fs::write(path, json)?;
    Ok(())
}
