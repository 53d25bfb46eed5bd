//! Generator tasks
//!
//! Each task owns one rewriting concern for one type or property. A task
//! never touches the module directly: it inspects the metadata through a
//! [`GenerationContext`] and returns a [`TypeEdit`] describing the bodies,
//! fields and methods to swap in. The driver commits edits in order.

mod mapped_property;
mod notify;
mod type_hierarchy;

pub use mapped_property::MappedPropertyTask;
pub use notify::ChangeNotificationTask;
pub use type_hierarchy::TypeHierarchyTask;

use crate::context::GenerationContext;
use crate::error::{Result, WeaveError};
use semweave_bytecode::{Constant, FieldDef, Instruction, MethodBody, MethodDef, PropertyDef, TypeDef};
use serde::Serialize;

/// Rewriting concern a task implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Synthesize the type-hierarchy query override
    TypeHierarchy,
    /// Route a property through a mapping field
    MappedProperty,
    /// Equality-guarded setter with a change callback
    ChangeNotification,
}

/// One unit of synthesis work
pub trait GeneratorTask {
    fn kind(&self) -> TaskKind;

    /// Whether the task applies at all; `false` means it is skipped silently
    fn can_execute(&self, ctx: &GenerationContext<'_>) -> bool;

    /// Plan the edits for this task
    fn execute(&self, ctx: &GenerationContext<'_>) -> Result<TypeEdit>;
}

/// A single change to a type of the target module
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    /// Swap a method body for a synthesized one
    ReplaceBody { method: usize, body: MethodBody },
    /// Insert a field initialization block at the start of a constructor
    PrependToConstructor {
        method: usize,
        prelude: Vec<Instruction>,
        max_stack: u16,
    },
    AddField(FieldDef),
    RemoveField(String),
    AddMethod(MethodDef),
}

/// Member reported as rewritten by a task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewrittenMember {
    pub type_name: String,
    pub member: String,
    pub task: TaskKind,
    /// Identifier, identifier list or `notify`
    pub detail: String,
}

/// Edits planned by one task against one type
#[derive(Debug, Clone, PartialEq)]
pub struct TypeEdit {
    pub type_index: usize,
    pub edits: Vec<Edit>,
    pub rewritten: Option<RewrittenMember>,
}

impl TypeEdit {
    pub fn new(type_index: usize) -> Self {
        Self {
            type_index,
            edits: Vec::new(),
            rewritten: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn push(&mut self, edit: Edit) {
        self.edits.push(edit);
    }

    pub(crate) fn report(&mut self, ty: &TypeDef, member: &str, task: TaskKind, detail: String) {
        self.rewritten = Some(RewrittenMember {
            type_name: ty.full_name(),
            member: member.to_string(),
            task,
            detail,
        });
    }
}

/// Accessor emitted by the compiler rather than written by hand
pub(crate) fn is_synthesized_accessor(method: &MethodDef) -> bool {
    method.is_compiler_generated() || method.is_compiler_controlled()
}

/// Refuse to rewrite an accessor the compiler did not synthesize
pub(crate) fn check_generated_accessor(
    ty: &TypeDef,
    property: &PropertyDef,
    method: usize,
    accessor: &'static str,
) -> Result<()> {
    let generated = ty
        .methods
        .get(method)
        .is_some_and(is_synthesized_accessor);
    if generated {
        Ok(())
    } else {
        Err(WeaveError::HandWrittenAccessor {
            type_name: ty.full_name(),
            member: property.name.clone(),
            accessor,
        })
    }
}

fn invalid_annotation(ty: &TypeDef, member: &str, annotation: &str, reason: &str) -> WeaveError {
    WeaveError::InvalidAnnotation {
        type_name: ty.full_name(),
        member: member.to_string(),
        annotation: annotation.to_string(),
        reason: reason.to_string(),
    }
}

/// Identifier strings declared on `ty` itself, in declaration order
pub(crate) fn type_identifiers(ctx: &GenerationContext<'_>, ty: &TypeDef) -> Result<Vec<String>> {
    let annotation = &ctx.config.annotations.type_identifiers;
    ty.attributes_named(annotation)
        .map(|attr| match attr.args.as_slice() {
            [Constant::String(id)] => Ok(id.clone()),
            _ => Err(invalid_annotation(
                ty,
                &ty.name,
                annotation,
                "expected a single string argument",
            )),
        })
        .collect()
}

/// Persistent identifier of a property, if it carries the annotation
pub(crate) fn persistent_identifier(
    ctx: &GenerationContext<'_>,
    ty: &TypeDef,
    property: &PropertyDef,
) -> Result<Option<String>> {
    let annotation = &ctx.config.annotations.persistent_identifier;
    let Some(attr) = property.find_attribute(annotation) else {
        return Ok(None);
    };
    match attr.args.as_slice() {
        [Constant::String(id)] | [Constant::String(id), Constant::Bool(_)] => Ok(Some(id.clone())),
        _ => Err(invalid_annotation(
            ty,
            &property.name,
            annotation,
            "expected a string and an optional bool",
        )),
    }
}

/// Default value of a property, if it carries the annotation
pub(crate) fn default_value<'p>(
    ctx: &GenerationContext<'_>,
    ty: &TypeDef,
    property: &'p PropertyDef,
) -> Result<Option<&'p Constant>> {
    let annotation = &ctx.config.annotations.default_value;
    let Some(attr) = property.find_attribute(annotation) else {
        return Ok(None);
    };
    match attr.args.as_slice() {
        [value] => Ok(Some(value)),
        _ => Err(invalid_annotation(
            ty,
            &property.name,
            annotation,
            "expected exactly one argument",
        )),
    }
}
