// src/planner.rs

//! The staleness planner.
//!
//! A depth-first walk over the package graph that classifies every build
//! it reaches: up to date, buildable, skip after a prior recorded error,
//! or cycle victim. The decision procedure compares template mtimes
//! against the recorded dependency files, error markers and build logs.
//! Dirty builds whose prerequisites are all settled are enqueued; the
//! rest wait on their `nblock` counters, decremented as prerequisite
//! builds complete.
//!
//! Dependency extraction is itself a job: a build with a stale dependency
//! file is enqueued before its dependency lists are known, and the walk
//! is re-entered at that build once extraction succeeds.

use tracing::warn;

use crate::context::Context;
use crate::depfile;
use crate::error::{Error, Result};
use crate::layout;
use crate::store::{BuildId, BuilderId, Flags, NameId};
use crate::template;

/// Outcome of walking one node, as seen by its parent.
#[derive(Debug, Clone, Copy)]
pub struct Visit {
    /// The node needs action this run; the parent counts it in `nblock`
    pub dirty: bool,
    /// The walk hit a cycle at or below this node; the parent marks
    /// itself SKIP|DIRTY and keeps unwinding
    pub cycle: bool,
}

/// Plan the build of `name` under `builder`, enqueueing every ready dirty
/// build in its dependency closure.
pub fn plan(ctx: &mut Context, name: NameId, builder: BuilderId) -> Result<()> {
    let visit = walk(ctx, name, builder)?;
    if visit.cycle {
        // terminate the " <- a <- b" unwind trace
        eprintln!();
    }
    Ok(())
}

fn explain(ctx: &Context, build: BuildId, msg: &str) {
    if !ctx.config.explain {
        return;
    }
    let b = ctx.store.build(build);
    eprintln!(
        "explain {}@{}: {}",
        ctx.store.name(b.name).name,
        ctx.store.builder(b.builder).arch,
        msg
    );
}

fn walk(ctx: &mut Context, name: NameId, builder: BuilderId) -> Result<Visit> {
    match template::probe(&mut ctx.store, &ctx.config.distdir, name) {
        Ok(_) | Err(Error::TemplateMissing(_)) => {}
        Err(e) => return Err(e),
    }

    let src = ctx.store.resolve_source(name);
    let build = match ctx.store.find_build(src, builder) {
        Some(build) => build,
        None => ctx.store.add_build(src, builder),
    };

    // no template to build from: a sentinel that is skipped but still
    // dirties its dependents
    if ctx.store.name(src).mtime.is_missing() {
        ctx.store
            .build_mut(build)
            .flags
            .set(Flags::SKIP | Flags::DIRTY);
        if ctx.config.explain {
            eprintln!(
                "explain: {}: skipping, no template to build package",
                ctx.store.name(name).name
            );
        }
        return Ok(epilogue(ctx, build, false));
    }

    if ctx.store.build(build).flags.has(Flags::CYCLE) {
        // re-entered a node on the walk stack; the trace unwinds from here
        ctx.store
            .build_mut(build)
            .flags
            .set(Flags::SKIP | Flags::DIRTY);
        if ctx.config.explain {
            eprint!(
                "explain: {0}: skipping, dependency cycle involving: {0}",
                ctx.store.name(name).name
            );
        }
        return Ok(Visit {
            dirty: true,
            cycle: true,
        });
    }
    if ctx.store.build(build).flags.has(Flags::WORK) {
        // already planned this run; dirtiness decides whether the parent
        // has to wait for it
        return Ok(Visit {
            dirty: ctx.store.build(build).flags.has(Flags::DIRTY),
            cycle: false,
        });
    }

    {
        let b = ctx.store.build_mut(build);
        b.flags.set(Flags::CYCLE | Flags::WORK);
        b.flags.clear(Flags::DIRTY);
    }

    if ctx.store.build(build).depmtime.is_unknown() {
        layout::stat_deps(&ctx.config, &mut ctx.store, build)?;
    }

    let template_mtime = ctx.store.name(src).mtime;

    if ctx.store.build(build).depmtime < template_mtime {
        if ctx.store.build(build).deperrmtime < template_mtime {
            // dep file missing or outdated and no recent extraction
            // error: regenerate it
            explain(
                ctx,
                build,
                if ctx.store.build(build).depmtime.is_missing() {
                    "dependency file missing"
                } else {
                    "dependency file older than template"
                },
            );
            let b = ctx.store.build_mut(build);
            b.flags.set(Flags::DIRTY);
            b.nblock = 0;
            return Ok(epilogue(ctx, build, false));
        }
        ctx.store
            .build_mut(build)
            .flags
            .set(Flags::SKIP | Flags::DIRTY);
        explain(ctx, build, "skipping, template unchanged since previous error");
        return Ok(epilogue(ctx, build, false));
    }

    // dep file is fresh; bring the dependency lists in
    match depfile::load_deps(&ctx.config, &mut ctx.store, build) {
        Ok(()) => {}
        Err(err @ Error::Parse { .. }) => {
            warn!("{err}");
            ctx.store
                .build_mut(build)
                .flags
                .set(Flags::SKIP | Flags::DIRTY);
            explain(ctx, build, "skipping, malformed dependency file");
            return Ok(epilogue(ctx, build, false));
        }
        Err(e) => return Err(e),
    }

    layout::stat_logs(&ctx.config, &mut ctx.store, build)?;
    let logmtime = ctx.store.build(build).logmtime;
    let logerrmtime = ctx.store.build(build).logerrmtime;
    if logmtime.is_missing() {
        if logerrmtime.is_missing() {
            // never built
            explain(ctx, build, "missing");
            ctx.store.build_mut(build).flags.set(Flags::DIRTY);
        } else if logerrmtime < template_mtime {
            explain(ctx, build, "reattempt, template changed since previous error");
            ctx.store.build_mut(build).flags.set(Flags::DIRTY);
        } else {
            ctx.store
                .build_mut(build)
                .flags
                .set(Flags::SKIP | Flags::DIRTY);
            explain(ctx, build, "skipping, template unchanged since previous error");
            return Ok(epilogue(ctx, build, false));
        }
    }

    // host deps build under the host builder, target deps under this one
    ctx.store.build_mut(build).nblock = 0;
    let host_builder = ctx.store.builder(builder).host.unwrap_or(builder);

    let hostdeps = ctx.store.build(build).hostdeps.clone();
    for dep in hostdeps {
        let visit = walk(ctx, dep, host_builder)?;
        if visit.cycle {
            ctx.store
                .build_mut(build)
                .flags
                .set(Flags::SKIP | Flags::DIRTY);
            eprint!(" <- {}", ctx.store.name(name).name);
            return Ok(epilogue(ctx, build, true));
        }
        if visit.dirty {
            ctx.store.build_mut(build).nblock += 1;
        }
    }

    let targetdeps = ctx.store.build(build).targetdeps.clone();
    for dep in targetdeps {
        let visit = walk(ctx, dep, builder)?;
        if visit.cycle {
            ctx.store
                .build_mut(build)
                .flags
                .set(Flags::SKIP | Flags::DIRTY);
            eprint!(" <- {}", ctx.store.name(name).name);
            return Ok(epilogue(ctx, build, true));
        }
        if visit.dirty {
            ctx.store.build_mut(build).nblock += 1;
        }
    }

    Ok(epilogue(ctx, build, false))
}

/// Leave a node: take it off the walk stack and, if dirty, propagate the
/// dirtiness to every name this build produces and admit it when ready.
fn epilogue(ctx: &mut Context, build: BuildId, cycle: bool) -> Visit {
    let b = ctx.store.build_mut(build);
    b.flags.clear(Flags::CYCLE);
    let dirty = b.flags.has(Flags::DIRTY);
    if dirty {
        let skip = b.flags.has(Flags::SKIP);
        let ready = b.nblock == 0;
        let name = b.name;
        let subpkgs = b.subpkgs.clone();

        ctx.store.name_mut(name).dirty = true;
        for sub in subpkgs {
            ctx.store.name_mut(sub).dirty = true;
        }
        if !skip {
            if ready {
                ctx.enqueue(build);
            }
            ctx.counters.total += 1;
        }
    }
    Visit { dirty, cycle }
}
