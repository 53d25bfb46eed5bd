//! Module loading, cross-module resolution and persistence

use crate::config::WeaveConfig;
use crate::error::{Result, WeaveError};
use rustc_hash::{FxHashMap, FxHashSet};
use semweave_bytecode::{FieldRef, Instruction, MethodRef, Module, TypeSig};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File extension of semweave module images
pub const MODULE_EXTENSION: &str = "swm";

/// Registry of modules the target module refers to
///
/// Modules are either registered in memory or loaded on demand from the
/// search directories as `<name>.swm`. Decoded modules are cached for the
/// lifetime of the resolver.
#[derive(Debug, Default)]
pub struct ModuleResolver {
    search_paths: Vec<PathBuf>,
    modules: FxHashMap<String, Module>,
}

impl ModuleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory searched for referenced modules
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.add_search_path(path);
        self
    }

    /// Register an in-memory module under its own name
    pub fn register(&mut self, module: Module) {
        self.modules.insert(module.name.clone(), module);
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Load a module by name, consulting the cache first
    pub fn load(&mut self, name: &str) -> Result<&Module> {
        if !self.modules.contains_key(name) {
            let path = self.locate(name)?;
            let module = ModuleFile::open(&path)?.into_module();
            debug!(module = name, path = %path.display(), "loaded referenced module");
            self.modules.insert(name.to_string(), module);
        }
        self.modules
            .get(name)
            .ok_or_else(|| WeaveError::ModuleNotFound {
                name: name.to_string(),
                searched: self.search_paths.clone(),
            })
    }

    fn locate(&self, name: &str) -> Result<PathBuf> {
        let file_name = format!("{}.{}", name, MODULE_EXTENSION);
        self.search_paths
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| WeaveError::ModuleNotFound {
                name: name.to_string(),
                searched: self.search_paths.clone(),
            })
    }

    /// Load every module reachable from `target`'s references, plus the
    /// runtime and core modules named in the configuration
    pub fn preload_for(&mut self, target: &Module, config: &WeaveConfig) -> Result<()> {
        let mut pending: Vec<String> = target.references.clone();
        pending.push(config.runtime.module.clone());
        pending.push(config.runtime.core_module.clone());

        let mut seen = FxHashSet::default();
        while let Some(name) = pending.pop() {
            if name == target.name || !seen.insert(name.clone()) {
                continue;
            }
            let module = self.load(&name)?;
            pending.extend(module.references.iter().cloned());
        }
        Ok(())
    }
}

/// A module image opened from disk for read-write access
#[derive(Debug)]
pub struct ModuleFile {
    path: PathBuf,
    pub module: Module,
}

impl ModuleFile {
    /// Read and decode a module image
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = fs::read(&path).map_err(|e| WeaveError::io(&path, e))?;
        let module = Module::decode(&bytes)?;
        Ok(Self { path, module })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_module(self) -> Module {
        self.module
    }

    /// Encode the module and replace the original file
    ///
    /// The image is written to a sibling temporary file first and then
    /// renamed over the original, so a failed write leaves the original intact.
    pub fn save(&self) -> Result<()> {
        let bytes = self.module.encode();
        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        fs::write(&tmp_path, &bytes).map_err(|e| WeaveError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| WeaveError::io(&self.path, e))?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "module written");
        Ok(())
    }
}

fn register_scopes(module: &mut Module, scopes: Vec<String>) {
    for scope in scopes {
        if module.add_reference(&scope) {
            debug!(module = %module.name, scope = %scope, "imported module reference");
        }
    }
}

/// Record the modules a type signature refers to in the target's reference table
pub fn import_type(module: &mut Module, sig: &TypeSig) {
    let mut scopes = Vec::new();
    sig.collect_scopes(&mut scopes);
    register_scopes(module, scopes);
}

pub fn import_field(module: &mut Module, field: &FieldRef) {
    let mut scopes = Vec::new();
    field.collect_scopes(&mut scopes);
    register_scopes(module, scopes);
}

pub fn import_method(module: &mut Module, method: &MethodRef) {
    let mut scopes = Vec::new();
    method.collect_scopes(&mut scopes);
    register_scopes(module, scopes);
}

/// Import every member referenced by a synthesized instruction sequence
pub fn import_instructions(module: &mut Module, instructions: &[Instruction]) {
    let mut scopes = Vec::new();
    for instr in instructions {
        instr.collect_scopes(&mut scopes);
    }
    register_scopes(module, scopes);
}
