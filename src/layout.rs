// src/layout.rs

//! On-disk layout of the `deps/` and `logs/` state trees.
//!
//! Both trees are keyed by builder: `<arch>` for native builds and
//! `<arch>@<host>` for cross builds. Dependency files are keyed by package
//! name, logs additionally by version and revision. Jobs write `.tmp`
//! files and rename them into place on completion.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::context::Config;
use crate::error::{Error, Result};
use crate::mtime::Mtime;
use crate::store::{BuildId, BuilderId, Store};

/// The per-builder subtree name: `<arch>` or `<arch>@<host>`.
pub fn builder_tree(store: &Store, builder: BuilderId) -> String {
    let b = store.builder(builder);
    match b.host {
        Some(host) => format!("{}@{}", b.arch, store.builder(host).arch),
        None => b.arch.clone(),
    }
}

/// Path of a dependency-state file: `deps/<tree>/<name>.<ext>`.
pub fn dep_path(cfg: &Config, store: &Store, build: BuildId, ext: &str) -> PathBuf {
    let b = store.build(build);
    cfg.statedir
        .join("deps")
        .join(builder_tree(store, b.builder))
        .join(format!("{}.{}", store.name(b.name).name, ext))
}

/// Path of a build-log file: `logs/<tree>/<name>-<version>_<revision>.<ext>`,
/// or `None` while version or revision is still unknown.
pub fn log_path(cfg: &Config, store: &Store, build: BuildId, ext: &str) -> Option<PathBuf> {
    let b = store.build(build);
    let version = b.version.as_deref()?;
    let revision = b.revision.as_deref()?;
    Some(
        cfg.statedir
            .join("logs")
            .join(builder_tree(store, b.builder))
            .join(format!(
                "{}-{}_{}.{}",
                store.name(b.name).name,
                version,
                revision,
                ext
            )),
    )
}

/// Create the state directories for every interned builder.
pub fn create_state_dirs(cfg: &Config, store: &Store) -> Result<()> {
    for (id, _) in store.builders() {
        let tree = builder_tree(store, id);
        for top in ["deps", "logs"] {
            let dir = cfg.statedir.join(top).join(&tree);
            fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        }
    }
    Ok(())
}

fn stat_mtime(path: &Path) -> Result<Mtime> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Mtime::At(meta.modified().map_err(|e| Error::io(path, e))?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Mtime::Missing),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Record the mtimes of the `.dep` file and the `.err` marker.
pub fn stat_deps(cfg: &Config, store: &mut Store, build: BuildId) -> Result<()> {
    let dep = stat_mtime(&dep_path(cfg, store, build, "dep"))?;
    let err = stat_mtime(&dep_path(cfg, store, build, "err"))?;
    let b = store.build_mut(build);
    b.depmtime = dep;
    b.deperrmtime = err;
    Ok(())
}

/// Record the mtimes of the `.log` file and the `.err` marker. A no-op
/// while version or revision is unknown; both stay `Missing`.
pub fn stat_logs(cfg: &Config, store: &mut Store, build: BuildId) -> Result<()> {
    let log = match log_path(cfg, store, build, "log") {
        Some(path) => stat_mtime(&path)?,
        None => Mtime::Missing,
    };
    let err = match log_path(cfg, store, build, "err") {
        Some(path) => stat_mtime(&path)?,
        None => Mtime::Missing,
    };
    let b = store.build_mut(build);
    b.logmtime = log;
    b.logerrmtime = err;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cross_store() -> (Store, BuildId, BuildId) {
        let mut store = Store::new();
        let host = store.intern_builder("x86_64");
        let cross = store.intern_builder("aarch64");
        store.builder_mut(cross).host = Some(host);
        let name = store.intern_name("foo");
        let native_build = store.add_build(name, host);
        let cross_build = store.add_build(name, cross);
        (store, native_build, cross_build)
    }

    #[test]
    fn test_native_paths() {
        let (store, native, _) = cross_store();
        let cfg = Config::new("/dist");
        assert_eq!(
            dep_path(&cfg, &store, native, "dep"),
            PathBuf::from("./deps/x86_64/foo.dep")
        );
        assert_eq!(
            dep_path(&cfg, &store, native, "err.tmp"),
            PathBuf::from("./deps/x86_64/foo.err.tmp")
        );
    }

    #[test]
    fn test_cross_paths() {
        let (mut store, _, cross) = cross_store();
        let cfg = Config::new("/dist");
        assert_eq!(
            dep_path(&cfg, &store, cross, "dep"),
            PathBuf::from("./deps/aarch64@x86_64/foo.dep")
        );

        let b = store.build_mut(cross);
        b.version = Some("1.2".to_string());
        b.revision = Some("3".to_string());
        assert_eq!(
            log_path(&cfg, &store, cross, "log").unwrap(),
            PathBuf::from("./logs/aarch64@x86_64/foo-1.2_3.log")
        );
    }

    #[test]
    fn test_log_path_requires_version_and_revision() {
        let (store, native, _) = cross_store();
        let cfg = Config::new("/dist");
        assert!(log_path(&cfg, &store, native, "log").is_none());
    }

    #[test]
    fn test_stat_deps_records_missing() {
        let (mut store, native, _) = cross_store();
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = Config::new("/dist");
        cfg.statedir = tmp.path().to_path_buf();

        stat_deps(&cfg, &mut store, native).unwrap();
        assert!(store.build(native).depmtime.is_missing());
        assert!(store.build(native).deperrmtime.is_missing());

        create_state_dirs(&cfg, &store).unwrap();
        fs::write(dep_path(&cfg, &store, native, "dep"), "x").unwrap();
        stat_deps(&cfg, &mut store, native).unwrap();
        assert!(matches!(store.build(native).depmtime, Mtime::At(_)));
        assert!(store.build(native).deperrmtime.is_missing());
    }
}
