//! Type-hierarchy query override

use super::{type_identifiers, Edit, GeneratorTask, TaskKind, TypeEdit};
use crate::context::GenerationContext;
use crate::emit::{load_local, load_string, push_int32, store_local, InstructionList};
use crate::error::{Result, WeaveError};
use crate::query::{resolve_constructor, MethodHandle, TypeHandle};
use semweave_bytecode::module::method_attrs;
use semweave_bytecode::{MethodBody, MethodDef, Opcode, Operand};
use tracing::debug;

/// Synthesizes `GetTypes()` returning one identifier wrapper per class
/// identifier, the type's own identifiers first and then its ancestors'
#[derive(Debug, Clone, Copy)]
pub struct TypeHierarchyTask {
    pub type_index: usize,
}

impl TypeHierarchyTask {
    pub fn new(type_index: usize) -> Self {
        Self { type_index }
    }
}

impl GeneratorTask for TypeHierarchyTask {
    fn kind(&self) -> TaskKind {
        TaskKind::TypeHierarchy
    }

    /// False once the type declares the query method itself
    fn can_execute(&self, ctx: &GenerationContext<'_>) -> bool {
        let query = &ctx.config.runtime.type_query;
        ctx.module().types.get(self.type_index).is_some_and(|ty| {
            !ty.methods
                .iter()
                .any(|m| &m.name == query && m.parameters.is_empty() && !m.is_static())
        })
    }

    fn execute(&self, ctx: &GenerationContext<'_>) -> Result<TypeEdit> {
        let ty = ctx.target_type(self.type_index)?;
        let query = &ctx.config.runtime.type_query;
        let mut edit = TypeEdit::new(self.type_index);

        if type_identifiers(ctx, ty.def)?.is_empty() {
            if has_override(ctx, ty, query) {
                debug!(type_name = %ty.full_name(), "query override inherited, nothing to do");
                return Ok(edit);
            }
            return Err(WeaveError::MissingTypeIdentifiers {
                type_name: ty.full_name(),
                method: query.clone(),
            });
        }

        let mut identifiers = Vec::new();
        for level in ctx.view.chain(ty) {
            identifiers.extend(type_identifiers(ctx, level.def)?);
        }

        let template = ctx
            .view
            .chain(ty)
            .skip(1)
            .find_map(|base| query_declaration(base, query))
            .ok_or_else(|| WeaveError::QueryMethodNotFound {
                type_name: ty.full_name(),
                method: query.clone(),
            })?;

        let wrapper = ctx.identifier_type()?;
        let ctor = resolve_constructor(&ctx.view, wrapper, &["System.String"]).ok_or_else(|| {
            WeaveError::IdentifierConstructorNotFound {
                type_name: ty.full_name(),
                identifier_type: wrapper.full_name(),
            }
        })?;
        let ctor = ctor.method_ref();
        let element = wrapper.sig();

        // newarr; (dup; index; ldstr; newobj; stelem.ref)*; stloc.0; br; ldloc.0; ret
        let mut list = InstructionList::new();
        let exit = list.define_label();
        list.push(push_int32(identifiers.len() as i32))
            .emit_with(Opcode::Newarr, Operand::Type(element));
        for (index, id) in identifiers.iter().enumerate() {
            list.emit(Opcode::Dup)
                .push(push_int32(index as i32))
                .push(load_string(id))
                .emit_with(Opcode::Newobj, Operand::Method(ctor.clone()))
                .emit(Opcode::StelemRef);
        }
        list.push(store_local(0))
            .branch(Opcode::Br, exit)
            .mark(exit)
            .push(load_local(0))
            .emit(Opcode::Ret);

        let return_type = template.def.return_type.rebase(template.owner.scope);
        let flags = (template.def.flags & !(method_attrs::NEW_SLOT | method_attrs::ABSTRACT))
            | method_attrs::VIRTUAL
            | method_attrs::HIDE_BY_SIG;
        let mut method = MethodDef::new(query, flags, return_type.clone());
        let mut body = MethodBody::new(list.finish()?, 4);
        body.locals.push(return_type);
        body.init_locals = true;
        method.body = Some(body);

        edit.push(Edit::AddMethod(method));
        edit.report(ty.def, query, self.kind(), format!("[{}]", identifiers.join(", ")));
        Ok(edit)
    }
}

/// Virtual, parameterless query method declared directly on `ty`
fn query_declaration<'a>(ty: TypeHandle<'a>, query: &str) -> Option<MethodHandle<'a>> {
    ty.def
        .methods
        .iter()
        .enumerate()
        .find(|(_, m)| m.name == query && m.parameters.is_empty() && m.is_virtual())
        .map(|(index, def)| MethodHandle {
            owner: ty,
            index,
            def,
        })
}

/// Whether any type in the chain already overrides the query method
fn has_override<'a>(ctx: &GenerationContext<'a>, ty: TypeHandle<'a>, query: &str) -> bool {
    ctx.view.chain(ty).any(|level| {
        level
            .def
            .methods
            .iter()
            .any(|m| m.name == query && m.parameters.is_empty() && m.is_override())
    })
}
