// src/template.rs

//! Resolving package names to their on-disk templates.
//!
//! An entry under `srcpkgs/` is either a directory holding a `template`
//! file (a source package), a symlink to a sibling entry (a sub-package
//! alias), or absent with a `-dbg`/`-32bit` suffix (a virtual variant of
//! the base package). The template's modification time is the
//! authoritative "source changed" signal for every staleness decision.

use std::fs;
use std::io;
use std::path::Path;

use tracing::warn;

use crate::error::{Error, Result};
use crate::mtime::Mtime;
use crate::store::{NameId, Store};

/// Strip a virtual-variant suffix, if any.
fn virtual_base(name: &str) -> Option<&str> {
    name.strip_suffix("-dbg")
        .or_else(|| name.strip_suffix("-32bit"))
}

fn missing_or(store: &Store, id: NameId, mtime: Mtime) -> Result<Mtime> {
    if mtime.is_missing() {
        Err(Error::TemplateMissing(store.name(id).name.clone()))
    } else {
        Ok(mtime)
    }
}

/// Probe the template for `id`, recording its mtime and `srcpkg` alias.
///
/// Idempotent: once the mtime is known, the filesystem is not touched
/// again. Returns `Error::TemplateMissing` whenever the name ends up with
/// no template to build from; other filesystem errors are fatal.
pub fn probe(store: &mut Store, distdir: &Path, id: NameId) -> Result<Mtime> {
    let cur = store.name(id).mtime;
    if !cur.is_unknown() {
        return missing_or(store, id, cur);
    }

    let path = distdir.join("srcpkgs").join(&store.name(id).name);
    let meta = match fs::symlink_metadata(&path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if let Some(base) = virtual_base(&store.name(id).name).map(str::to_string) {
                // virtual variant: alias the base package and adopt its
                // template mtime
                let src = store.intern_name(&base);
                match probe(store, distdir, src) {
                    Ok(_) | Err(Error::TemplateMissing(_)) => {}
                    Err(e) => return Err(e),
                }
                store.name_mut(id).srcpkg = Some(src);
                let mtime = store.name(src).mtime;
                store.name_mut(id).mtime = mtime;
                return missing_or(store, id, mtime);
            }
            store.name_mut(id).mtime = Mtime::Missing;
            return missing_or(store, id, Mtime::Missing);
        }
        Err(e) => return Err(Error::io(&path, e)),
    };

    if meta.file_type().is_symlink() {
        // sub-package alias; the symlink's own mtime is the signal, set
        // before following the target so alias loops terminate
        let mtime = Mtime::At(meta.modified().map_err(|e| Error::io(&path, e))?);
        store.name_mut(id).mtime = mtime;

        let target = fs::read_link(&path).map_err(|e| Error::io(&path, e))?;
        let mut target = target.to_string_lossy().into_owned();
        if target.ends_with('/') {
            warn!("symlink {} contains trailing slash", path.display());
            target.pop();
        }
        let src = store.intern_name(&target);
        if src != id {
            match probe(store, distdir, src) {
                Ok(_) | Err(Error::TemplateMissing(_)) => {}
                Err(e) => return Err(e),
            }
            store.name_mut(id).srcpkg = Some(src);
        }
        return Ok(mtime);
    }

    if meta.is_dir() {
        let template = path.join("template");
        return match fs::metadata(&template) {
            Ok(meta) => {
                let mtime = Mtime::At(meta.modified().map_err(|e| Error::io(&template, e))?);
                store.name_mut(id).mtime = mtime;
                Ok(mtime)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                store.name_mut(id).mtime = Mtime::Missing;
                missing_or(store, id, Mtime::Missing)
            }
            Err(e) => Err(Error::io(&template, e)),
        };
    }

    // neither symlink nor directory: nothing to build from
    store.name_mut(id).mtime = Mtime::Missing;
    missing_or(store, id, Mtime::Missing)
}

/// Intern every entry under `srcpkgs/`, skipping dot entries. Returned in
/// name order so full runs are deterministic.
pub fn scan(store: &mut Store, distdir: &Path) -> Result<Vec<NameId>> {
    let dir = distdir.join("srcpkgs");
    let mut names: Vec<String> = Vec::new();
    for entry in fs::read_dir(&dir).map_err(|e| Error::io(&dir, e))? {
        let entry = entry.map_err(|e| Error::io(&dir, e))?;
        match entry.file_name().into_string() {
            Ok(name) => {
                if !name.starts_with('.') {
                    names.push(name);
                }
            }
            Err(raw) => {
                warn!("skipping non-unicode entry {:?} under {}", raw, dir.display());
            }
        }
    }
    names.sort();
    Ok(names.iter().map(|name| store.intern_name(name)).collect())
}
