// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module resolution and the cache behind `import`.
//!
//! A module runs once, in its own [`Vm`], and the importer receives a copy
//! of its globals. The cache is shared by every VM of one engine so a module
//! imported from several files still runs once.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::compiler::Compiler;
use crate::error::{Error, NativeError, Result};
use crate::parser::Parser;
use crate::runtime::{Promise, Value};
use crate::runtime::value::DictRef;
use crate::vm::Vm;

/// State of one cached module.
#[derive(Debug, Clone)]
pub enum ModuleState {
    /// Currently executing; settled with its globals when done
    Loading(Rc<Promise>),
    /// Finished; holds the module's globals
    Loaded(DictRef),
}

/// Cache mapping canonical paths to modules.
///
/// Alongside the modules it records which loading module waits for which,
/// so an import that would wait on itself is reported instead of hanging.
#[derive(Debug, Default)]
pub struct ModuleCache {
    modules: FxHashMap<PathBuf, ModuleState>,
    imports: FxHashMap<PathBuf, Vec<PathBuf>>,
}

impl ModuleCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached module by path
    pub fn get(&self, path: &Path) -> Option<ModuleState> {
        self.modules.get(path).cloned()
    }

    /// Mark a module as executing; `promise` settles when it is done
    pub fn begin(&mut self, path: PathBuf, promise: Rc<Promise>) {
        self.modules.insert(path, ModuleState::Loading(promise));
    }

    /// Record a module's globals
    pub fn finish(&mut self, path: PathBuf, globals: DictRef) {
        self.imports.remove(&path);
        self.modules.insert(path, ModuleState::Loaded(globals));
    }

    /// Remove a module from the cache
    pub fn delete(&mut self, path: &Path) -> Option<ModuleState> {
        self.imports.remove(path);
        self.modules.remove(path)
    }

    /// Record that the loading module `importer` waits for `target`.
    pub fn add_import(&mut self, importer: &Path, target: &Path) {
        let targets = self.imports.entry(importer.to_path_buf()).or_default();
        if !targets.iter().any(|t| t == target) {
            targets.push(target.to_path_buf());
        }
    }

    /// True if `importer` waiting for the loading module `target` would
    /// close a cycle: `target` already waits, directly or through other
    /// loading modules, for `importer`.
    pub fn closes_cycle(&self, importer: &Path, target: &Path) -> bool {
        let mut pending = vec![target];
        let mut seen: Vec<&Path> = Vec::new();
        while let Some(path) = pending.pop() {
            if path == importer {
                return true;
            }
            if seen.contains(&path) {
                continue;
            }
            seen.push(path);
            if let Some(targets) = self.imports.get(path) {
                pending.extend(targets.iter().map(PathBuf::as_path));
            }
        }
        false
    }

    /// Get all cached module paths
    pub fn keys(&self) -> Vec<PathBuf> {
        self.modules.keys().cloned().collect()
    }

    /// Get the number of cached modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Resolves an import request against the importing file's directory.
///
/// A request without an extension gets `extension` appended. The result is
/// canonical, so different spellings of one file share a cache entry.
pub fn resolve(base_dir: &Path, request: &str, extension: &str) -> std::result::Result<PathBuf, String> {
    let mut path = base_dir.join(request);
    if path.extension().is_none() {
        path.set_extension(extension);
    }
    std::fs::canonicalize(&path).map_err(|err| format!("Cannot import '{}': {}", request, err))
}

/// Runs a module to completion in `vm` and caches its globals.
///
/// The cache entry is removed again when the module fails, so a later
/// import retries it.
pub(crate) async fn load(mut vm: Vm, path: PathBuf) -> std::result::Result<Value, NativeError> {
    let cache = vm.module_cache();
    match execute(&mut vm, &path).await {
        Ok(globals) => {
            debug!(module = %path.display(), "module loaded");
            cache.borrow_mut().finish(path, globals.clone());
            Ok(Value::Dict(globals))
        }
        Err(err) => {
            cache.borrow_mut().delete(&path);
            match err {
                Error::Exit(code) => Err(NativeError::Exit(code)),
                other => Err(NativeError::Message(format!(
                    "{} (in module '{}')",
                    other,
                    path.display()
                ))),
            }
        }
    }
}

async fn execute(vm: &mut Vm, path: &Path) -> Result<DictRef> {
    let source = tokio::fs::read_to_string(path).await?;
    let program = Parser::new(&source).parse_program()?;
    let compiled = Compiler::new().compile(&program)?;
    vm.run(&compiled).await?;
    Ok(vm.globals_dict())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;

    #[test]
    fn test_cache_lifecycle() {
        let mut cache = ModuleCache::new();
        let path = PathBuf::from("/lib.mn");
        assert!(cache.get(&path).is_none());

        cache.begin(path.clone(), Rc::new(Promise::new()));
        assert!(matches!(cache.get(&path), Some(ModuleState::Loading(_))));

        let globals = std::rc::Rc::new(std::cell::RefCell::new(BTreeMap::new()));
        cache.finish(path.clone(), globals);
        assert!(matches!(cache.get(&path), Some(ModuleState::Loaded(_))));
        assert_eq!(cache.len(), 1);

        cache.delete(&path);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cycle_detection_follows_waits() {
        let mut cache = ModuleCache::new();
        let (main, a, b, lib) = (
            PathBuf::from("/main.mn"),
            PathBuf::from("/a.mn"),
            PathBuf::from("/b.mn"),
            PathBuf::from("/lib.mn"),
        );
        cache.add_import(&main, &a);
        cache.add_import(&a, &b);

        // b importing main or a closes a loop; importing lib does not.
        assert!(cache.closes_cycle(&b, &main));
        assert!(cache.closes_cycle(&b, &a));
        assert!(cache.closes_cycle(&a, &a));
        assert!(!cache.closes_cycle(&b, &lib));
        // A second importer of `a` from outside the chain just waits.
        assert!(!cache.closes_cycle(&lib, &a));

        // Finished modules no longer take part.
        cache.finish(a.clone(), std::rc::Rc::new(std::cell::RefCell::new(BTreeMap::new())));
        assert!(!cache.closes_cycle(&b, &main));
    }

    #[test]
    fn test_resolve_appends_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("util.mn"), "x = 1").unwrap();

        let resolved = resolve(dir.path(), "util", "mn").unwrap();
        assert_eq!(resolved, fs::canonicalize(dir.path().join("util.mn")).unwrap());

        let explicit = resolve(dir.path(), "./util.mn", "mn").unwrap();
        assert_eq!(resolved, explicit);
    }

    #[test]
    fn test_resolve_missing_module() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve(dir.path(), "nope", "mn").unwrap_err();
        assert!(err.starts_with("Cannot import 'nope'"));
    }
}
