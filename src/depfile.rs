// src/depfile.rs

//! Parser for extracted dependency metadata.
//!
//! The extractor's output is line-oriented. Scalar lines are
//! `key: value`; a line `key:` opens an array whose entries follow on
//! space-prefixed continuation lines. Recognized scalars are `pkgname`,
//! `version` and `revision`; recognized arrays are `hostmakedepends`
//! (host dependencies), `makedepends` and `depends` (both target
//! dependencies), and `subpackages`. Unrecognized keys and arrays are
//! skipped; a non-space line without a colon is a parse error.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::context::Config;
use crate::error::{Error, Result};
use crate::layout;
use crate::store::{BuildId, Flags, Store};

#[derive(Debug, Clone, Copy)]
enum Section {
    None,
    /// Inside an unrecognized array; entries are consumed and dropped
    Skipped,
    HostDeps,
    TargetDeps,
    SubPkgs,
}

/// Dependency metadata parsed for one build.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DepFile {
    pub version: Option<String>,
    pub revision: Option<String>,
    pub hostdeps: Vec<String>,
    pub targetdeps: Vec<String>,
    pub subpkgs: Vec<String>,
}

/// Parse the dependency-file grammar. `path` is only used for error
/// reporting.
pub fn parse(reader: impl BufRead, path: &Path) -> Result<DepFile> {
    let mut out = DepFile::default();
    let mut section = Section::None;

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| Error::io(path, e))?;

        if !matches!(section, Section::None) {
            if let Some(entry) = line.strip_prefix(' ') {
                match section {
                    Section::HostDeps => out.hostdeps.push(entry.to_string()),
                    Section::TargetDeps => out.targetdeps.push(entry.to_string()),
                    Section::SubPkgs => out.subpkgs.push(entry.to_string()),
                    Section::Skipped | Section::None => {}
                }
                continue;
            }
            section = Section::None;
        }

        let Some((key, value)) = line.split_once(':') else {
            return Err(Error::Parse {
                path: path.to_path_buf(),
                line: index + 1,
            });
        };

        if value.is_empty() {
            section = match key {
                "hostmakedepends" => Section::HostDeps,
                "makedepends" | "depends" => Section::TargetDeps,
                "subpackages" => Section::SubPkgs,
                _ => Section::Skipped,
            };
            continue;
        }

        let value = value.strip_prefix(' ').unwrap_or(value);
        match key {
            "pkgname" => {}
            "version" => out.version = Some(value.to_string()),
            "revision" => out.revision = Some(value.to_string()),
            _ => {}
        }
    }

    Ok(out)
}

/// Load the `.dep` file for a build and populate its dependency arrays,
/// registering the reverse `uses` edges. Sets `DEPS`; a second call is a
/// no-op.
pub fn load_deps(cfg: &Config, store: &mut Store, build: BuildId) -> Result<()> {
    if store.build(build).flags.has(Flags::DEPS) {
        return Ok(());
    }

    let path = layout::dep_path(cfg, store, build, "dep");
    let file = File::open(&path).map_err(|e| Error::io(&path, e))?;
    let parsed = parse(BufReader::new(file), &path)?;

    {
        let b = store.build_mut(build);
        b.version = parsed.version;
        b.revision = parsed.revision;
    }
    for dep in &parsed.hostdeps {
        let dep = store.intern_name(dep);
        store.add_host_dep(build, dep);
    }
    for dep in &parsed.targetdeps {
        let dep = store.intern_name(dep);
        store.add_target_dep(build, dep);
    }
    for sub in &parsed.subpkgs {
        let sub = store.intern_name(sub);
        store.add_subpkg(build, sub);
    }

    store.build_mut(build).flags.set(Flags::DEPS);
    Ok(())
}
