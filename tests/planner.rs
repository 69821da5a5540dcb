// tests/planner.rs

//! Integration tests for the staleness planner and the dry-run queue.
//!
//! These tests verify that:
//! 1. The mtime comparisons classify builds the way a make-style tool would
//! 2. Prior error markers suppress pointless re-runs until the template changes
//! 3. Cycles are detected, skipped, and leave no walk-state behind
//! 4. Blocked builds unblock in dependency order as prerequisites settle

use dbulk::{layout, planner, pool, BuilderId, Config, Context, Flags, Mtime, NameId};
use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::symlink;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Fixture timestamps, offset from a fixed base so tests are hermetic.
fn t(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000 + secs)
}

struct Fixture {
    _tmp: TempDir,
    ctx: Context,
    builder: BuilderId,
}

/// A distdir and state tree in a TempDir, planned in dry-run mode.
fn setup() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("srcpkgs")).unwrap();

    let mut config = Config::new(tmp.path());
    config.statedir = tmp.path().to_path_buf();
    config.dryrun = true;
    let mut ctx = Context::new(config);
    let builder = ctx.store.intern_builder("x86_64");
    layout::create_state_dirs(&ctx.config, &ctx.store).unwrap();

    Fixture {
        _tmp: tmp,
        ctx,
        builder,
    }
}

fn write_file(path: &Path, contents: &str, mtime: SystemTime) {
    let mut file = File::create(path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.set_modified(mtime).unwrap();
}

impl Fixture {
    fn template(&self, name: &str, mtime: SystemTime) {
        let dir = self.ctx.config.distdir.join("srcpkgs").join(name);
        fs::create_dir_all(&dir).unwrap();
        write_file(&dir.join("template"), "", mtime);
    }

    fn depfile(&self, name: &str, contents: &str, mtime: SystemTime) {
        let path = self
            .ctx
            .config
            .statedir
            .join("deps/x86_64")
            .join(format!("{name}.dep"));
        write_file(&path, contents, mtime);
    }

    fn deperr(&self, name: &str, mtime: SystemTime) {
        let path = self
            .ctx
            .config
            .statedir
            .join("deps/x86_64")
            .join(format!("{name}.err"));
        write_file(&path, "", mtime);
    }

    fn log(&self, file: &str, mtime: SystemTime) {
        let path = self.ctx.config.statedir.join("logs/x86_64").join(file);
        write_file(&path, "", mtime);
    }

    fn plan(&mut self, name: &str) -> NameId {
        let id = self.ctx.store.intern_name(name);
        planner::plan(&mut self.ctx, id, self.builder).unwrap();
        id
    }

    fn build_of(&self, name: &str) -> dbulk::BuildId {
        let id = self.ctx.store.lookup_name(name).expect("name was interned");
        let src = self.ctx.store.resolve_source(id);
        self.ctx
            .store
            .find_build(src, self.builder)
            .expect("build exists")
    }

    fn flags_of(&self, name: &str) -> Flags {
        self.ctx.store.build(self.build_of(name)).flags
    }
}

fn depfile_basic(name: &str) -> String {
    format!("pkgname: {name}\nversion: 1\nrevision: 1\n")
}

#[test]
fn test_fresh_package_schedules_extraction() {
    let mut f = setup();
    f.template("foo", t(100));

    f.plan("foo");

    let flags = f.flags_of("foo");
    assert!(flags.has(Flags::DIRTY));
    assert!(!flags.has(Flags::SKIP));
    assert!(!flags.has(Flags::DEPS));
    assert_eq!(f.ctx.queue, vec![f.build_of("foo")]);
    assert_eq!(f.ctx.counters.total, 1);
}

#[test]
fn test_prior_extract_error_with_unchanged_template_skips() {
    let mut f = setup();
    f.template("foo", t(100));
    f.deperr("foo", t(200));

    f.plan("foo");

    let flags = f.flags_of("foo");
    assert!(flags.has(Flags::SKIP));
    assert!(flags.has(Flags::DIRTY));
    assert!(f.ctx.queue.is_empty());
    assert_eq!(f.ctx.counters.total, 0);
}

#[test]
fn test_prior_extract_error_with_newer_template_retries() {
    let mut f = setup();
    f.template("foo", t(200));
    f.deperr("foo", t(100));

    f.plan("foo");

    let flags = f.flags_of("foo");
    assert!(flags.has(Flags::DIRTY));
    assert!(!flags.has(Flags::SKIP));
    assert_eq!(f.ctx.queue.len(), 1);
}

#[test]
fn test_fresh_dep_file_schedules_build() {
    let mut f = setup();
    f.template("foo", t(100));
    f.depfile("foo", &depfile_basic("foo"), t(200));

    f.plan("foo");

    let build = f.build_of("foo");
    let b = f.ctx.store.build(build);
    assert!(b.flags.has(Flags::DEPS));
    assert!(b.flags.has(Flags::DIRTY));
    assert_eq!(b.version.as_deref(), Some("1"));
    assert_eq!(b.revision.as_deref(), Some("1"));
    assert_eq!(f.ctx.queue, vec![build]);
}

#[test]
fn test_log_newer_than_template_is_up_to_date() {
    let mut f = setup();
    f.template("foo", t(100));
    f.depfile("foo", &depfile_basic("foo"), t(200));
    f.log("foo-1_1.log", t(300));

    f.plan("foo");

    let flags = f.flags_of("foo");
    assert!(!flags.has(Flags::DIRTY));
    assert!(f.ctx.queue.is_empty());
    assert_eq!(f.ctx.counters.total, 0);
}

#[test]
fn test_prior_build_error_with_unchanged_template_skips() {
    let mut f = setup();
    f.template("foo", t(100));
    f.depfile("foo", &depfile_basic("foo"), t(150));
    f.log("foo-1_1.err", t(200));

    f.plan("foo");

    let flags = f.flags_of("foo");
    assert!(flags.has(Flags::SKIP));
    assert!(flags.has(Flags::DIRTY));
    assert!(f.ctx.queue.is_empty());
}

#[test]
fn test_prior_build_error_with_newer_template_reattempts() {
    let mut f = setup();
    f.template("foo", t(300));
    f.depfile("foo", &depfile_basic("foo"), t(350));
    f.log("foo-1_1.err", t(200));

    f.plan("foo");

    let flags = f.flags_of("foo");
    assert!(flags.has(Flags::DIRTY));
    assert!(!flags.has(Flags::SKIP));
    assert_eq!(f.ctx.queue.len(), 1);
}

#[test]
fn test_malformed_dep_file_skips() {
    let mut f = setup();
    f.template("foo", t(100));
    f.depfile("foo", "not a valid line\n", t(200));

    f.plan("foo");

    let flags = f.flags_of("foo");
    assert!(flags.has(Flags::SKIP));
    assert!(flags.has(Flags::DIRTY));
    assert!(f.ctx.queue.is_empty());
}

#[test]
fn test_chain_unblocks_in_dependency_order() {
    let mut f = setup();
    for name in ["a", "b", "c"] {
        f.template(name, t(100));
    }
    f.depfile("a", &format!("{}depends:\n b\n", depfile_basic("a")), t(200));
    f.depfile("b", &format!("{}depends:\n c\n", depfile_basic("b")), t(200));
    f.depfile("c", &depfile_basic("c"), t(200));

    f.plan("a");

    assert_eq!(f.ctx.store.build(f.build_of("a")).nblock, 1);
    assert_eq!(f.ctx.store.build(f.build_of("b")).nblock, 1);
    assert_eq!(f.ctx.store.build(f.build_of("c")).nblock, 0);
    assert_eq!(f.ctx.queue, vec![f.build_of("c")]);
    assert_eq!(f.ctx.counters.total, 3);

    pool::drive(&mut f.ctx).unwrap();

    assert_eq!(f.ctx.counters.finished, 3);
    assert!(f.ctx.queue.is_empty());
    for name in ["a", "b", "c"] {
        assert_eq!(f.ctx.store.build(f.build_of(name)).nblock, 0);
        let id = f.ctx.store.lookup_name(name).unwrap();
        assert!(!f.ctx.store.name(id).dirty);
    }
}

#[test]
fn test_shared_dependency_blocks_both_users() {
    let mut f = setup();
    for name in ["a", "b", "c", "d"] {
        f.template(name, t(100));
    }
    f.depfile(
        "a",
        &format!("{}depends:\n b\n c\n", depfile_basic("a")),
        t(200),
    );
    f.depfile("b", &format!("{}depends:\n d\n", depfile_basic("b")), t(200));
    f.depfile("c", &format!("{}depends:\n d\n", depfile_basic("c")), t(200));
    f.depfile("d", &depfile_basic("d"), t(200));

    f.plan("a");

    // both b and c wait for d, even though d was walked under b
    assert_eq!(f.ctx.store.build(f.build_of("b")).nblock, 1);
    assert_eq!(f.ctx.store.build(f.build_of("c")).nblock, 1);
    assert_eq!(f.ctx.store.build(f.build_of("a")).nblock, 2);
    assert_eq!(f.ctx.queue, vec![f.build_of("d")]);

    pool::drive(&mut f.ctx).unwrap();
    assert_eq!(f.ctx.counters.finished, 4);
}

#[test]
fn test_two_node_cycle_skips_both() {
    let mut f = setup();
    f.template("a", t(100));
    f.template("b", t(100));
    f.depfile("a", &format!("{}depends:\n b\n", depfile_basic("a")), t(200));
    f.depfile("b", &format!("{}depends:\n a\n", depfile_basic("b")), t(200));

    f.plan("a");

    for name in ["a", "b"] {
        let flags = f.flags_of(name);
        assert!(flags.has(Flags::SKIP), "{name} is a cycle victim");
        assert!(flags.has(Flags::DIRTY));
        assert!(!flags.has(Flags::CYCLE), "{name} keeps no walk state");
    }
    assert!(f.ctx.queue.is_empty());
    assert_eq!(f.ctx.counters.total, 0);
}

#[test]
fn test_self_cycle_skips() {
    let mut f = setup();
    f.template("a", t(100));
    f.depfile("a", &format!("{}depends:\n a\n", depfile_basic("a")), t(200));

    f.plan("a");

    let flags = f.flags_of("a");
    assert!(flags.has(Flags::SKIP));
    assert!(flags.has(Flags::DIRTY));
    assert!(!flags.has(Flags::CYCLE));
    assert!(f.ctx.queue.is_empty());
}

#[test]
fn test_missing_template_skips_without_stopping_the_run() {
    let mut f = setup();
    f.template("foo", t(100));

    f.plan("ghost");
    f.plan("foo");

    let flags = f.flags_of("ghost");
    assert!(flags.has(Flags::SKIP));
    assert!(flags.has(Flags::DIRTY));
    assert_eq!(f.ctx.queue, vec![f.build_of("foo")]);
}

#[test]
fn test_dependent_of_missing_template_stays_blocked() {
    let mut f = setup();
    f.template("foo", t(100));
    f.depfile(
        "foo",
        &format!("{}depends:\n ghost\n", depfile_basic("foo")),
        t(200),
    );

    f.plan("foo");

    assert_eq!(f.ctx.store.build(f.build_of("foo")).nblock, 1);
    assert!(f.ctx.queue.is_empty());

    // skipped prerequisites never complete, so nothing ever runs
    pool::drive(&mut f.ctx).unwrap();
    assert_eq!(f.ctx.counters.finished, 0);
    assert!(f.flags_of("foo").has(Flags::DIRTY));
}

#[test]
fn test_virtual_variant_resolves_to_base_build() {
    let mut f = setup();
    f.template("foo", t(100));

    let dbg = f.plan("foo-dbg");

    // the variant aliases the base and adopts its template mtime
    assert_eq!(f.ctx.store.name(dbg).mtime, Mtime::At(t(100)));
    let base = f.ctx.store.lookup_name("foo").unwrap();
    assert_eq!(f.ctx.store.resolve_source(dbg), base);
    assert_eq!(f.ctx.queue, vec![f.build_of("foo")]);
}

#[test]
fn test_subpackage_alias_attaches_build_to_source() {
    let mut f = setup();
    f.template("foo", t(100));
    symlink("foo", f.ctx.config.distdir.join("srcpkgs/foo-lib")).unwrap();

    f.plan("foo-lib");

    let lib = f.ctx.store.lookup_name("foo-lib").unwrap();
    let foo = f.ctx.store.lookup_name("foo").unwrap();
    assert!(f.ctx.store.name(lib).builds.is_empty());
    assert_eq!(f.ctx.store.name(foo).builds.len(), 1);
}

#[test]
fn test_subpackage_completion_unblocks_alias_users() {
    let mut f = setup();
    f.template("foo", t(100));
    f.template("bar", t(100));
    symlink("foo", f.ctx.config.distdir.join("srcpkgs/foo-lib")).unwrap();
    f.depfile(
        "foo",
        &format!("{}subpackages:\n foo-lib\n", depfile_basic("foo")),
        t(200),
    );
    f.depfile(
        "bar",
        &format!("{}depends:\n foo-lib\n", depfile_basic("bar")),
        t(200),
    );

    f.plan("bar");

    assert_eq!(f.ctx.store.build(f.build_of("bar")).nblock, 1);
    assert_eq!(f.ctx.queue, vec![f.build_of("foo")]);

    pool::drive(&mut f.ctx).unwrap();

    // foo's completion settles foo-lib too, releasing bar
    assert_eq!(f.ctx.counters.finished, 2);
    assert_eq!(f.ctx.store.build(f.build_of("bar")).nblock, 0);
    assert!(f.ctx.queue.is_empty());
}

#[test]
fn test_replanning_is_idempotent() {
    let mut f = setup();
    f.template("foo", t(100));

    f.plan("foo");
    f.plan("foo");

    // a build is admitted and enqueued at most once per run
    assert_eq!(f.ctx.queue.len(), 1);
    assert_eq!(f.ctx.counters.total, 1);
}

#[test]
fn test_cross_build_recurses_host_deps_natively() {
    let mut f = setup();
    let host = f.builder;
    let cross = f.ctx.store.intern_builder("aarch64");
    f.ctx.store.builder_mut(cross).host = Some(host);
    layout::create_state_dirs(&f.ctx.config, &f.ctx.store).unwrap();

    f.template("foo", t(100));
    f.template("hostthing", t(100));
    f.template("tgtthing", t(100));

    // the cross dep file lives under <arch>@<host>
    let path = f.ctx.config.statedir.join("deps/aarch64@x86_64/foo.dep");
    write_file(
        &path,
        &format!(
            "{}hostmakedepends:\n hostthing\ndepends:\n tgtthing\n",
            depfile_basic("foo")
        ),
        t(200),
    );

    let id = f.ctx.store.intern_name("foo");
    planner::plan(&mut f.ctx, id, cross).unwrap();

    let foo = f.ctx.store.lookup_name("foo").unwrap();
    let hostthing = f.ctx.store.lookup_name("hostthing").unwrap();
    let tgtthing = f.ctx.store.lookup_name("tgtthing").unwrap();

    // host deps plan under the native builder, target deps under cross
    let foo_build = f.ctx.store.find_build(foo, cross).expect("cross build");
    assert!(f.ctx.store.find_build(hostthing, host).is_some());
    assert!(f.ctx.store.find_build(hostthing, cross).is_none());
    assert!(f.ctx.store.find_build(tgtthing, cross).is_some());
    assert!(f.ctx.store.find_build(tgtthing, host).is_none());
    assert_eq!(f.ctx.store.build(foo_build).nblock, 2);
}

#[test]
fn test_clean_tree_plans_nothing() {
    let mut f = setup();
    f.template("foo", t(100));
    f.depfile("foo", &depfile_basic("foo"), t(200));
    f.log("foo-1_1.log", t(300));

    f.plan("foo");
    pool::drive(&mut f.ctx).unwrap();

    assert_eq!(f.ctx.counters.total, 0);
    assert_eq!(f.ctx.counters.finished, 0);
}
