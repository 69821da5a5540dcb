// src/context.rs

//! Run configuration and the process-wide driver state.

use std::path::PathBuf;

use crate::store::{BuildId, Store};

/// Configuration for one driver run
#[derive(Debug, Clone)]
pub struct Config {
    /// Source distribution root containing `srcpkgs/` and the build tool
    pub distdir: PathBuf,
    /// Root of the `deps/` and `logs/` state trees, normally the current
    /// directory
    pub statedir: PathBuf,
    /// Maximum number of concurrent child processes
    pub maxjobs: usize,
    /// Mark builds finished without spawning anything
    pub dryrun: bool,
    /// Explain every staleness decision on stderr
    pub explain: bool,
    /// Alternate tool mode; any value skips the build loop
    pub tool: Option<String>,
}

impl Config {
    pub fn new(distdir: impl Into<PathBuf>) -> Self {
        Self {
            distdir: distdir.into(),
            statedir: PathBuf::from("."),
            maxjobs: 1,
            dryrun: false,
            explain: false,
            tool: None,
        }
    }
}

/// Progress counters reported in the `[done/total]` lines
#[derive(Debug, Default)]
pub struct Counters {
    /// Queue admissions this run
    pub total: usize,
    /// Jobs that finished, successfully or not
    pub finished: usize,
    /// Jobs that failed or could not be started
    pub failed: usize,
}

/// Everything a run mutates: the graph tables, the work queue, and the
/// counters. Passed explicitly through the planner and job handlers.
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    pub store: Store,
    /// Ready builds, most recently enqueued first
    pub queue: Vec<BuildId>,
    pub counters: Counters,
}

impl Context {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: Store::new(),
            queue: Vec::new(),
            counters: Counters::default(),
        }
    }

    /// Admit a build whose prerequisites are all settled.
    pub fn enqueue(&mut self, build: BuildId) {
        self.queue.push(build);
    }
}
