//! Change-notification setters

use super::{check_generated_accessor, Edit, GeneratorTask, TaskKind, TypeEdit};
use crate::context::GenerationContext;
use crate::emit::{load_string, push_int32, InstructionList};
use crate::error::{Result, WeaveError};
use crate::query::{resolve_backing_field, resolve_equality, resolve_inherited_method, Equality, TypeHandle};
use semweave_bytecode::{FieldRef, MethodBody, MethodRef, Opcode, Operand, PropertyDef};

/// Where a property's current value is read from and written to
#[derive(Debug, Clone)]
pub(crate) enum ValueSource {
    /// Compiler-generated backing field
    Field(FieldRef),
    /// Mapping field accessed through the runtime API
    Mapping {
        field: FieldRef,
        get_value: MethodRef,
        set_value: MethodRef,
    },
}

impl ValueSource {
    fn max_stack(&self) -> u16 {
        match self {
            ValueSource::Field(_) => 2,
            ValueSource::Mapping { .. } => 4,
        }
    }
}

/// Rewrites one property setter into an equality-guarded store followed by
/// a change callback
#[derive(Debug, Clone, Copy)]
pub struct ChangeNotificationTask {
    pub type_index: usize,
    pub property: usize,
}

impl ChangeNotificationTask {
    pub fn new(type_index: usize, property: usize) -> Self {
        Self {
            type_index,
            property,
        }
    }
}

impl GeneratorTask for ChangeNotificationTask {
    fn kind(&self) -> TaskKind {
        TaskKind::ChangeNotification
    }

    fn can_execute(&self, ctx: &GenerationContext<'_>) -> bool {
        ctx.module()
            .types
            .get(self.type_index)
            .and_then(|ty| ty.properties.get(self.property))
            .is_some_and(|p| p.setter.is_some())
    }

    fn execute(&self, ctx: &GenerationContext<'_>) -> Result<TypeEdit> {
        let ty = ctx.target_type(self.type_index)?;
        let property = property_of(ty, self.property)?;
        let mut edit = TypeEdit::new(self.type_index);
        let Some(setter) = property.setter else {
            return Ok(edit);
        };
        check_generated_accessor(ty.def, property, setter, "set")?;

        let field = resolve_backing_field(ty.def, property).ok_or_else(|| {
            WeaveError::MissingBackingField {
                type_name: ty.full_name(),
                member: property.name.clone(),
            }
        })?;
        let body = synthesize_setter(ctx, ty, property, &ValueSource::Field(field.clone()))?;

        edit.push(Edit::ReplaceBody {
            method: setter,
            body,
        });
        edit.report(ty.def, &property.name, self.kind(), "notify".to_string());
        Ok(edit)
    }
}

pub(crate) fn property_of<'a>(ty: TypeHandle<'a>, index: usize) -> Result<&'a PropertyDef> {
    ty.def
        .properties
        .get(index)
        .ok_or_else(|| WeaveError::TypeNotFound(format!("{} property #{}", ty.full_name(), index)))
}

/// Build the guarded setter body
///
/// ```text
///     <load current>; ldarg.1; <equal?>; ldc.i4.0; ceq
///     brtrue STORE
///     br RET
/// STORE:
///     <store ldarg.1>
///     ldarg.0; ldstr "<name>"; callvirt RaisePropertyChanged
/// RET:
///     ret
/// ```
pub(crate) fn synthesize_setter<'a>(
    ctx: &GenerationContext<'a>,
    ty: TypeHandle<'a>,
    property: &PropertyDef,
    source: &ValueSource,
) -> Result<MethodBody> {
    let names = &ctx.config.runtime;
    let value_type = match source {
        ValueSource::Field(field) => &field.field_type,
        ValueSource::Mapping { .. } => &property.property_type,
    };
    let equality = resolve_equality(&ctx.view, value_type, &names.equals, &names.root_object)
        .ok_or_else(|| WeaveError::EqualityNotResolvable {
            type_name: ty.full_name(),
            member: property.name.clone(),
            value_type: value_type.full_name(),
        })?;
    let notify = resolve_inherited_method(
        &ctx.view,
        ty,
        &names.raise_property_changed,
        &["System.String"],
    )
    .ok_or_else(|| WeaveError::NotificationMethodNotFound {
        type_name: ty.full_name(),
        member: property.name.clone(),
        method: names.raise_property_changed.clone(),
    })?
    .method_ref();

    let mut list = InstructionList::new();
    let store = list.define_label();
    let ret = list.define_label();

    match source {
        ValueSource::Field(field) => {
            list.emit(Opcode::Ldarg0)
                .emit_with(Opcode::Ldfld, Operand::Field(field.clone()));
        }
        ValueSource::Mapping {
            field, get_value, ..
        } => {
            list.emit(Opcode::Ldarg0)
                .emit(Opcode::Ldarg0)
                .emit_with(Opcode::Ldfld, Operand::Field(field.clone()))
                .emit_with(Opcode::Callvirt, Operand::Method(get_value.clone()));
        }
    }
    list.emit(Opcode::Ldarg1);
    match equality {
        Equality::Primitive => list.emit(Opcode::Ceq),
        Equality::Method(equals) => list.emit_with(Opcode::Call, Operand::Method(equals)),
    };
    list.push(push_int32(0))
        .emit(Opcode::Ceq)
        .branch(Opcode::Brtrue, store)
        .branch(Opcode::Br, ret);

    list.mark(store);
    match source {
        ValueSource::Field(field) => {
            list.emit(Opcode::Ldarg0)
                .emit(Opcode::Ldarg1)
                .emit_with(Opcode::Stfld, Operand::Field(field.clone()));
        }
        ValueSource::Mapping {
            field, set_value, ..
        } => {
            list.emit(Opcode::Ldarg0)
                .emit(Opcode::Ldarg0)
                .emit_with(Opcode::Ldfld, Operand::Field(field.clone()))
                .emit(Opcode::Ldarg1)
                .emit_with(Opcode::Callvirt, Operand::Method(set_value.clone()));
        }
    }
    list.emit(Opcode::Ldarg0)
        .push(load_string(&property.name))
        .emit_with(Opcode::Callvirt, Operand::Method(notify));

    list.mark(ret).emit(Opcode::Ret);

    Ok(MethodBody::new(list.finish()?, source.max_stack()))
}
