// src/store.rs

//! Interned package names, builders, and the build store.
//!
//! The dependency relation is a potentially cyclic multi-graph, so nodes
//! refer to each other through indices into the store's vectors instead of
//! owned pointers. Back-references (`PackageName::uses`) are lookup tables,
//! not ownership.

use std::collections::HashMap;

use crate::mtime::Mtime;

/// Alias chains (`-dbg` variant of a sub-package symlink, broken symlink
/// loops) are followed at most this far.
const ALIAS_CHAIN_MAX: usize = 40;

/// Handle of an interned package name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameId(pub(crate) usize);

/// Handle of an interned builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuilderId(pub(crate) usize);

/// Handle of a build in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuildId(pub(crate) usize);

/// Per-build state bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags(u8);

impl Flags {
    /// Admitted to the current run's plan
    pub const WORK: Flags = Flags(1 << 0);
    /// On the planner's walk stack; re-entry signals a cycle
    pub const CYCLE: Flags = Flags(1 << 1);
    /// Dependency metadata has been parsed into the dep arrays
    pub const DEPS: Flags = Flags(1 << 2);
    /// Needs action in this run
    pub const DIRTY: Flags = Flags(1 << 3);
    /// Known unactionable this run; still dirty for propagation
    pub const SKIP: Flags = Flags(1 << 4);

    pub fn has(self, other: Flags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn set(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    pub fn clear(&mut self, other: Flags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// An interned package name and everything known about it.
///
/// A name is created the first time anything mentions it: a command-line
/// target, a directory scan, a dependency list, or a sub-package list.
#[derive(Debug)]
pub struct PackageName {
    /// The unique name string
    pub name: String,
    /// Template modification time (symlink mtime for sub-package aliases)
    pub mtime: Mtime,
    /// Source package this name aliases (sub-package symlink or virtual
    /// `-dbg`/`-32bit` variant)
    pub srcpkg: Option<NameId>,
    /// Builds attached to this name; only ever non-empty for a resolved
    /// source name (sub-package aliases are unblocked via `uses`, not here)
    pub builds: Vec<BuildId>,
    /// Builds depending on this name
    pub uses: Vec<BuildId>,
    /// Some build producing this name needs action in this run
    pub dirty: bool,
}

/// A target architecture, optionally cross-compiled from a host one.
///
/// Builders are interned by architecture; the `(target, host)` pair is the
/// axis along which the same source package produces distinct artifacts.
#[derive(Debug)]
pub struct Builder {
    pub arch: String,
    pub host: Option<BuilderId>,
}

/// The unit of work: one source package compiled by one builder.
#[derive(Debug)]
pub struct Build {
    /// Owning source package (never an alias)
    pub name: NameId,
    pub builder: BuilderId,
    /// Populated from the extracted dependency metadata
    pub version: Option<String>,
    pub revision: Option<String>,
    pub hostdeps: Vec<NameId>,
    pub targetdeps: Vec<NameId>,
    pub subpkgs: Vec<NameId>,
    pub depmtime: Mtime,
    pub deperrmtime: Mtime,
    pub logmtime: Mtime,
    pub logerrmtime: Mtime,
    /// Prerequisites still outstanding before this build may run
    pub nblock: usize,
    pub flags: Flags,
}

/// Process-wide tables: names, builders, and builds, all index-addressed.
#[derive(Debug, Default)]
pub struct Store {
    names: Vec<PackageName>,
    by_name: HashMap<String, NameId>,
    builders: Vec<Builder>,
    by_arch: HashMap<String, BuilderId>,
    builds: Vec<Build>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a package name; two lookups of the same string return the
    /// same handle.
    pub fn intern_name(&mut self, name: &str) -> NameId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = NameId(self.names.len());
        self.names.push(PackageName {
            name: name.to_string(),
            mtime: Mtime::Unknown,
            srcpkg: None,
            builds: Vec::new(),
            uses: Vec::new(),
            dirty: false,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Look up an already-interned name.
    pub fn lookup_name(&self, name: &str) -> Option<NameId> {
        self.by_name.get(name).copied()
    }

    /// Intern a builder by target architecture; at most one exists per
    /// architecture.
    pub fn intern_builder(&mut self, arch: &str) -> BuilderId {
        if let Some(&id) = self.by_arch.get(arch) {
            return id;
        }
        let id = BuilderId(self.builders.len());
        self.builders.push(Builder {
            arch: arch.to_string(),
            host: None,
        });
        self.by_arch.insert(arch.to_string(), id);
        id
    }

    pub fn name(&self, id: NameId) -> &PackageName {
        &self.names[id.0]
    }

    pub fn name_mut(&mut self, id: NameId) -> &mut PackageName {
        &mut self.names[id.0]
    }

    pub fn builder(&self, id: BuilderId) -> &Builder {
        &self.builders[id.0]
    }

    pub fn builder_mut(&mut self, id: BuilderId) -> &mut Builder {
        &mut self.builders[id.0]
    }

    pub fn builders(&self) -> impl Iterator<Item = (BuilderId, &Builder)> {
        self.builders.iter().enumerate().map(|(i, b)| (BuilderId(i), b))
    }

    pub fn build(&self, id: BuildId) -> &Build {
        &self.builds[id.0]
    }

    pub fn build_mut(&mut self, id: BuildId) -> &mut Build {
        &mut self.builds[id.0]
    }

    /// Follow `srcpkg` aliases to the name a build attaches to.
    pub fn resolve_source(&self, mut id: NameId) -> NameId {
        for _ in 0..ALIAS_CHAIN_MAX {
            match self.name(id).srcpkg {
                Some(next) if next != id => id = next,
                _ => return id,
            }
        }
        id
    }

    /// Find the build for `(name, builder)` among the builds attached to
    /// the name.
    pub fn find_build(&self, name: NameId, builder: BuilderId) -> Option<BuildId> {
        self.name(name)
            .builds
            .iter()
            .copied()
            .find(|&b| self.build(b).builder == builder)
    }

    /// Create a build for `(name, builder)` and attach it to the name.
    pub fn add_build(&mut self, name: NameId, builder: BuilderId) -> BuildId {
        let id = BuildId(self.builds.len());
        self.builds.push(Build {
            name,
            builder,
            version: None,
            revision: None,
            hostdeps: Vec::new(),
            targetdeps: Vec::new(),
            subpkgs: Vec::new(),
            depmtime: Mtime::Unknown,
            deperrmtime: Mtime::Unknown,
            logmtime: Mtime::Unknown,
            logerrmtime: Mtime::Unknown,
            nblock: 0,
            flags: Flags::default(),
        });
        self.name_mut(name).builds.push(id);
        id
    }

    /// Record a host dependency and the reverse `uses` edge.
    pub fn add_host_dep(&mut self, build: BuildId, dep: NameId) {
        self.build_mut(build).hostdeps.push(dep);
        self.name_mut(dep).uses.push(build);
    }

    /// Record a target dependency and the reverse `uses` edge.
    pub fn add_target_dep(&mut self, build: BuildId, dep: NameId) {
        self.build_mut(build).targetdeps.push(dep);
        self.name_mut(dep).uses.push(build);
    }

    /// Record a sub-package produced by this build. Sub-packages are not
    /// dependencies; no `uses` edge is made.
    pub fn add_subpkg(&mut self, build: BuildId, sub: NameId) {
        self.build_mut(build).subpkgs.push(sub);
    }
}
