//! Generation context shared by the generator tasks

use crate::config::WeaveConfig;
use crate::error::{Result, WeaveError};
use crate::query::{MetadataView, TypeHandle};
use crate::resolver::ModuleResolver;
use semweave_bytecode::Module;

/// Read-only state a task plans its edits against
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    pub view: MetadataView<'a>,
    pub config: &'a WeaveConfig,
}

impl<'a> GenerationContext<'a> {
    pub fn new(module: &'a Module, resolver: &'a ModuleResolver, config: &'a WeaveConfig) -> Self {
        Self {
            view: MetadataView::new(module, resolver, &config.runtime.core_module),
            config,
        }
    }

    pub fn module(&self) -> &'a Module {
        self.view.target()
    }

    pub fn target_type(&self, index: usize) -> Result<TypeHandle<'a>> {
        self.view
            .target_type(index)
            .ok_or_else(|| WeaveError::TypeNotFound(format!("#{} in {}", index, self.module().name)))
    }

    /// Type declared by the runtime module
    pub fn runtime_type(&self, full_name: &str) -> Result<TypeHandle<'a>> {
        let runtime = &self.config.runtime.module;
        self.view
            .find_type(Some(runtime), full_name)
            .ok_or_else(|| WeaveError::TypeNotFound(format!("[{}]{}", runtime, full_name)))
    }

    /// Generic mapping-field type definition
    pub fn mapping_type(&self) -> Result<TypeHandle<'a>> {
        self.runtime_type(&self.config.runtime.mapping_type)
    }

    /// Wrapper type returned by the type-hierarchy query
    pub fn identifier_type(&self) -> Result<TypeHandle<'a>> {
        self.runtime_type(&self.config.runtime.identifier_type)
    }
}
