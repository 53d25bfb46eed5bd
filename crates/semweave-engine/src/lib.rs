//! Semweave Engine
//!
//! Post-compilation weaver for data-mapping classes. It inspects the
//! metadata of a compiled `.swm` module, finds annotated types and
//! properties, and synthesizes their method bodies:
//!
//! - change-notification setters guarded by an equality check
//! - mapped properties whose accessors delegate to the runtime mapping API
//! - the type-hierarchy query override listing a type's class identifiers
//!
//! ```no_run
//! use semweave_engine::{weave_file, ModuleResolver, WeaveConfig};
//!
//! let config = WeaveConfig::default();
//! let mut resolver = ModuleResolver::new().with_search_path("build/modules");
//! let report = weave_file("build/App.swm", &mut resolver, &config)?;
//! println!("{} members rewritten", report.members.len());
//! # Ok::<(), semweave_engine::WeaveError>(())
//! ```

#![warn(rust_2018_idioms)]

pub mod config;
pub mod context;
pub mod driver;
pub mod emit;
pub mod error;
pub mod query;
pub mod resolver;
pub mod tasks;

pub use config::{AnnotationKind, AnnotationNames, RuntimeNames, WeaveConfig};
pub use context::GenerationContext;
pub use driver::{base_first_order, plan_type, weave_file, weave_module, WeaveReport};
pub use emit::{has_opcode, is_load_int32, push_constant, push_int32, InstructionList, Label};
pub use error::{Result, WeaveError};
pub use query::{
    instantiate_generic_method, resolve_backing_field, resolve_constructor,
    resolve_inherited_generic_method, resolve_inherited_method, MetadataView, MethodHandle,
    TypeHandle,
};
pub use resolver::{ModuleFile, ModuleResolver};
pub use tasks::{
    ChangeNotificationTask, Edit, GeneratorTask, MappedPropertyTask, RewrittenMember, TaskKind,
    TypeEdit, TypeHierarchyTask,
};
