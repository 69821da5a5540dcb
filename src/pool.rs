// src/pool.rs

//! The work queue and job pool.
//!
//! A single-threaded driver orchestrating up to `maxjobs` concurrent
//! external child processes. All graph and queue mutation happens on this
//! thread; the only blocking point is the wait-for-any child reap. Each
//! popped build runs either the dependency extractor or the package
//! build, decided by whether its dependency metadata is already loaded.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use tracing::debug;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::layout;
use crate::planner;
use crate::store::{BuildId, Flags, NameId};

/// What a child process is doing for a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    /// Extract dependency metadata
    Extract,
    /// Run the package build
    Build,
}

impl JobKind {
    fn action(self) -> &'static str {
        match self {
            JobKind::Extract => "generated dependencies for",
            JobKind::Build => "build package",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Running {
    pid: Pid,
    kind: JobKind,
    build: BuildId,
}

/// One slot of the fixed-capacity job table.
#[derive(Debug)]
struct Slot {
    /// Chains free slots; `slots.len()` terminates the list
    next_free: usize,
    job: Option<Running>,
}

#[derive(Debug)]
struct Pool {
    slots: Vec<Slot>,
    free: usize,
    running: usize,
}

impl Pool {
    fn new(maxjobs: usize) -> Self {
        let slots = (0..maxjobs)
            .map(|i| Slot {
                next_free: i + 1,
                job: None,
            })
            .collect();
        Pool {
            slots,
            free: 0,
            running: 0,
        }
    }

    fn has_free(&self) -> bool {
        self.free < self.slots.len()
    }

    fn insert(&mut self, job: Running) {
        let slot = self.free;
        self.free = self.slots[slot].next_free;
        self.slots[slot].job = Some(job);
        self.running += 1;
    }

    fn take(&mut self, pid: Pid) -> Option<Running> {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.job.map(|j| j.pid) == Some(pid) {
                let job = slot.job.take();
                slot.next_free = self.free;
                self.free = i;
                self.running -= 1;
                return job;
            }
        }
        None
    }
}

enum Exit {
    Success,
    Failed,
    Signaled(i32),
}

/// Block until one of our children exits and release its slot.
fn reap(pool: &mut Pool) -> Result<(Running, Exit)> {
    loop {
        match waitpid(Pid::from_raw(-1), None) {
            Ok(WaitStatus::Exited(pid, code)) => {
                if let Some(job) = pool.take(pid) {
                    let exit = if code == 0 { Exit::Success } else { Exit::Failed };
                    return Ok((job, exit));
                }
            }
            Ok(WaitStatus::Signaled(pid, signal, _)) => {
                if let Some(job) = pool.take(pid) {
                    return Ok((job, Exit::Signaled(signal as i32)));
                }
            }
            Ok(_) => {}
            Err(Errno::EINTR) => {}
            Err(e) => return Err(Error::Wait(e)),
        }
    }
}

/// Spawn the child for one job. File-creation errors are fatal; a failed
/// spawn is reported as a per-job failure.
fn start(ctx: &Context, build: BuildId, kind: JobKind) -> Result<Pid> {
    let store = &ctx.store;
    let b = store.build(build);
    let name = store.name(b.name).name.clone();
    let builder = store.builder(b.builder);

    let mut cmd = Command::new(ctx.config.distdir.join("xbps-src"));
    if builder.host.is_some() {
        cmd.arg("-a").arg(&builder.arch);
    }

    match kind {
        JobKind::Extract => {
            cmd.arg("dbulk-dump").arg(&name);
            let stdout_path = layout::dep_path(&ctx.config, store, build, "dep.tmp");
            let stderr_path = layout::dep_path(&ctx.config, store, build, "err.tmp");
            let stdout = File::create(&stdout_path).map_err(|e| Error::io(&stdout_path, e))?;
            let stderr = File::create(&stderr_path).map_err(|e| Error::io(&stderr_path, e))?;
            cmd.stdout(stdout).stderr(stderr);
        }
        JobKind::Build => {
            cmd.args(["-1Et", "-j", "4", "pkg"]).arg(&name);
            let Some(path) = layout::log_path(&ctx.config, store, build, "tmp") else {
                return Err(Error::BuildFailed(
                    name,
                    "dependency file carries no version/revision".to_string(),
                ));
            };
            let log = File::create(&path).map_err(|e| Error::io(&path, e))?;
            let combined = log.try_clone().map_err(|e| Error::io(&path, e))?;
            cmd.stdout(log).stderr(combined);
        }
    }
    cmd.stdin(Stdio::null());

    let child = cmd.spawn().map_err(|e| match kind {
        JobKind::Extract => Error::ExtractorFailed(name.clone(), e.to_string()),
        JobKind::Build => Error::BuildFailed(name.clone(), e.to_string()),
    })?;
    // reaped through waitpid, not through the Child handle
    Ok(Pid::from_raw(child.id() as i32))
}

fn unlink_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

fn commit(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|e| Error::io(from, e))
}

/// A name was produced: dependents waiting on it lose one blocker, and
/// any that reach zero are admitted.
fn done(ctx: &mut Context, name: NameId) {
    ctx.store.name_mut(name).dirty = false;
    let users = ctx.store.name(name).uses.clone();
    for user in users {
        let b = ctx.store.build_mut(user);
        if !b.flags.has(Flags::WORK) || b.nblock == 0 {
            continue;
        }
        b.nblock -= 1;
        if b.nblock == 0 {
            ctx.enqueue(user);
        }
    }
}

/// Extractor completion. Success commits the `.dep` file and re-enters
/// the planner at this build so the freshly revealed dependencies are
/// walked; failure commits the `.err` marker and leaves dependents
/// blocked.
fn extract_done(ctx: &mut Context, build: BuildId, failed: bool) -> Result<()> {
    if failed {
        unlink_stale(&layout::dep_path(&ctx.config, &ctx.store, build, "dep.tmp"))?;
        commit(
            &layout::dep_path(&ctx.config, &ctx.store, build, "err.tmp"),
            &layout::dep_path(&ctx.config, &ctx.store, build, "err"),
        )?;
        return Ok(());
    }

    unlink_stale(&layout::dep_path(&ctx.config, &ctx.store, build, "err.tmp"))?;
    commit(
        &layout::dep_path(&ctx.config, &ctx.store, build, "dep.tmp"),
        &layout::dep_path(&ctx.config, &ctx.store, build, "dep"),
    )?;

    let (name, builder) = {
        let b = ctx.store.build_mut(build);
        b.flags.clear(Flags::WORK);
        (b.name, b.builder)
    };
    layout::stat_deps(&ctx.config, &mut ctx.store, build)?;
    planner::plan(ctx, name, builder)
}

/// Builder completion. Success commits the log, clears DIRTY and settles
/// the build's own name and every sub-package name; failure commits the
/// `.err` log and leaves dependents blocked.
fn build_done(ctx: &mut Context, build: BuildId, failed: bool) -> Result<()> {
    // a build job only starts once version and revision are known
    let Some(tmp) = layout::log_path(&ctx.config, &ctx.store, build, "tmp") else {
        return Ok(());
    };
    let ext = if failed { "err" } else { "log" };
    let Some(dst) = layout::log_path(&ctx.config, &ctx.store, build, ext) else {
        return Ok(());
    };
    commit(&tmp, &dst)?;
    if failed {
        return Ok(());
    }

    ctx.store.build_mut(build).flags.clear(Flags::DIRTY);
    let name = ctx.store.build(build).name;
    let subpkgs = ctx.store.build(build).subpkgs.clone();
    done(ctx, name);
    for sub in subpkgs {
        done(ctx, sub);
    }
    Ok(())
}

/// Drain the work queue, keeping up to `maxjobs` children running until
/// no job is queued or outstanding. Job failures are counted, not fatal.
pub fn drive(ctx: &mut Context) -> Result<()> {
    let mut pool = Pool::new(ctx.config.maxjobs.max(1));

    loop {
        while pool.has_free() {
            let Some(build) = ctx.queue.pop() else { break };
            let name = ctx.store.name(ctx.store.build(build).name).name.clone();

            if ctx.config.dryrun {
                ctx.counters.finished += 1;
                eprintln!(
                    "[{}/{}] build {}",
                    ctx.counters.finished, ctx.counters.total, name
                );
                let pkg = ctx.store.build(build).name;
                let subpkgs = ctx.store.build(build).subpkgs.clone();
                done(ctx, pkg);
                for sub in subpkgs {
                    done(ctx, sub);
                }
                continue;
            }

            let kind = if ctx.store.build(build).flags.has(Flags::DEPS) {
                JobKind::Build
            } else {
                JobKind::Extract
            };
            match start(ctx, build, kind) {
                Ok(pid) => {
                    debug!(pid = pid.as_raw(), "{} {}", kind.action(), name);
                    pool.insert(Running { pid, kind, build });
                }
                Err(err @ (Error::ExtractorFailed(..) | Error::BuildFailed(..))) => {
                    eprintln!("job failed to start: {err}");
                    ctx.counters.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if pool.running == 0 {
            break;
        }

        let (job, exit) = reap(&mut pool)?;
        let name = ctx.store.name(ctx.store.build(job.build).name).name.clone();
        let failed = match exit {
            Exit::Success => false,
            Exit::Failed => {
                eprintln!("job failed: {name}");
                true
            }
            Exit::Signaled(signal) => {
                eprintln!("job terminated due to signal {signal}: {name}");
                true
            }
        };

        ctx.counters.finished += 1;
        if failed {
            ctx.counters.failed += 1;
        }
        match job.kind {
            JobKind::Extract => extract_done(ctx, job.build, failed)?,
            JobKind::Build => build_done(ctx, job.build, failed)?,
        }
        eprintln!(
            "[{}/{}] {} {}",
            ctx.counters.finished,
            ctx.counters.total,
            job.kind.action(),
            name
        );
    }

    Ok(())
}
