// src/main.rs

//! dbulk - CLI entry point

use anyhow::{Context as _, Result};
use clap::Parser;
use dbulk::{layout, planner, pool, template, Config, Context};
use std::path::PathBuf;
use tracing::info;

/// Architecture of the machine the driver runs on.
const NATIVE_ARCH: &str = std::env::consts::ARCH;

#[derive(Parser)]
#[command(name = "dbulk")]
#[command(version)]
#[command(about = "Incremental parallel builder for source package templates", long_about = None)]
struct Cli {
    /// Explain every staleness decision on stderr
    #[arg(short = 'd', long = "explain")]
    explain: bool,

    /// Source distribution root (default: $HOME/void-packages)
    #[arg(short = 'D', long = "distdir", value_name = "DIR")]
    distdir: Option<PathBuf>,

    /// Maximum number of concurrent jobs
    #[arg(short = 'j', long = "jobs", value_name = "N", default_value_t = 1)]
    jobs: usize,

    /// Plan and mark builds finished without spawning anything
    #[arg(short = 'n', long = "dry-run")]
    dryrun: bool,

    /// Alternate tool mode (reserved; skips the build loop)
    #[arg(short = 't', long = "tool", value_name = "NAME")]
    tool: Option<String>,

    /// Cross-compile for this target architecture
    #[arg(short = 'a', long = "arch", value_name = "ARCH")]
    arch: Option<String>,

    /// Package names to build (all of srcpkgs/ when empty)
    targets: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let distdir = match cli.distdir {
        Some(dir) => dir,
        None => {
            let home = std::env::var_os("HOME")
                .context("HOME is not set and no -D distdir was given")?;
            PathBuf::from(home).join("void-packages")
        }
    };

    let mut config = Config::new(distdir);
    config.maxjobs = cli.jobs.max(1);
    config.dryrun = cli.dryrun;
    config.explain = cli.explain;
    config.tool = cli.tool;
    let mut ctx = Context::new(config);

    let native = ctx.store.intern_builder(NATIVE_ARCH);
    let builder = match cli.arch {
        Some(arch) if arch != NATIVE_ARCH => {
            let cross = ctx.store.intern_builder(&arch);
            ctx.store.builder_mut(cross).host = Some(native);
            cross
        }
        _ => native,
    };

    layout::create_state_dirs(&ctx.config, &ctx.store)?;

    if cli.targets.is_empty() {
        let names = template::scan(&mut ctx.store, &ctx.config.distdir)?;
        for name in names {
            planner::plan(&mut ctx, name, builder)?;
        }
    } else {
        for target in &cli.targets {
            let name = ctx.store.intern_name(target);
            planner::plan(&mut ctx, name, builder)?;
        }
    }

    if ctx.config.tool.is_none() {
        pool::drive(&mut ctx)?;
    }

    info!(
        total = ctx.counters.total,
        finished = ctx.counters.finished,
        failed = ctx.counters.failed,
        "run complete"
    );
    Ok(())
}
