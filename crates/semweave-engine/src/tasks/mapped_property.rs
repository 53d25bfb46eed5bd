//! Mapped-property implementation
//!
//! A property annotated with a persistent identifier stops using its
//! compiler-generated backing field. Instead a private mapping field is
//! injected, every instance constructor initializes it, and both accessors
//! delegate to the runtime's `GetValue<T>` / `SetValue<T>`.

use super::notify::{property_of, synthesize_setter, ValueSource};
use super::{
    check_generated_accessor, default_value, persistent_identifier, Edit, GeneratorTask, TaskKind,
    TypeEdit,
};
use crate::context::GenerationContext;
use crate::emit::{load_string, push_constant};
use crate::error::{Result, WeaveError};
use crate::query::{
    bind_to_host, instantiate_generic_method, resolve_backing_field, resolve_constructor,
    resolve_inherited_generic_method, MethodHandle, TypeHandle,
};
use semweave_bytecode::module::field_attrs;
use semweave_bytecode::{
    FieldDef, FieldRef, Instruction, MethodBody, Opcode, Operand, PropertyDef, TypeDef, TypeSig,
};
use tracing::debug;

/// Routes one annotated property through a mapping field
#[derive(Debug, Clone, Copy)]
pub struct MappedPropertyTask {
    pub type_index: usize,
    pub property: usize,
}

impl MappedPropertyTask {
    pub fn new(type_index: usize, property: usize) -> Self {
        Self {
            type_index,
            property,
        }
    }
}

impl GeneratorTask for MappedPropertyTask {
    fn kind(&self) -> TaskKind {
        TaskKind::MappedProperty
    }

    fn can_execute(&self, ctx: &GenerationContext<'_>) -> bool {
        ctx.module()
            .types
            .get(self.type_index)
            .and_then(|ty| ty.properties.get(self.property))
            .is_some_and(|p| p.getter.is_some() || p.setter.is_some())
    }

    fn execute(&self, ctx: &GenerationContext<'_>) -> Result<TypeEdit> {
        let ty = ctx.target_type(self.type_index)?;
        let property = property_of(ty, self.property)?;
        let mut edit = TypeEdit::new(self.type_index);

        let Some(identifier) = persistent_identifier(ctx, ty.def, property)? else {
            return Ok(edit);
        };
        if let Some(getter) = property.getter {
            check_generated_accessor(ty.def, property, getter, "get")?;
        }
        if let Some(setter) = property.setter {
            check_generated_accessor(ty.def, property, setter, "set")?;
        }

        let mapping = ctx.mapping_type()?;
        let field_name = ctx.config.mapping_field_name(&property.name);
        let field_type = TypeSig::GenericInst {
            base: mapping.type_ref(),
            value_type: false,
            args: vec![property.property_type.clone()],
        };
        if let Some(existing) = ty.def.find_field(&field_name) {
            if existing.field_type == field_type {
                debug!(
                    property = %property.name,
                    field = %field_name,
                    "mapping field already present, skipping"
                );
                return Ok(edit);
            }
            return Err(WeaveError::FieldNameCollision {
                type_name: ty.full_name(),
                field: field_name,
                existing: existing.field_type.full_name(),
            });
        }

        let api = MappingApi::resolve(ctx, ty, property, mapping)?;
        let value_args = [property.property_type.clone()];
        let field = FieldRef::new(ty.sig(), &field_name, field_type.clone());
        let get_value = instantiate_generic_method(&api.get_value, &value_args);
        let set_value = instantiate_generic_method(&api.set_value, &value_args);

        edit.push(Edit::AddField(FieldDef::new(
            &field_name,
            field_attrs::PRIVATE,
            field_type.clone(),
        )));

        if let Some(getter) = property.getter {
            let body = MethodBody::new(
                vec![
                    Instruction::new(Opcode::Ldarg0),
                    Instruction::new(Opcode::Ldarg0),
                    Instruction::with(Opcode::Ldfld, Operand::Field(field.clone())),
                    Instruction::with(Opcode::Callvirt, Operand::Method(get_value.clone())),
                    Instruction::new(Opcode::Ret),
                ],
                2,
            );
            edit.push(Edit::ReplaceBody {
                method: getter,
                body,
            });
        }
        if let Some(setter) = property.setter {
            let source = ValueSource::Mapping {
                field: field.clone(),
                get_value,
                set_value,
            };
            let body = synthesize_setter(ctx, ty, property, &source)?;
            edit.push(Edit::ReplaceBody {
                method: setter,
                body,
            });
        }

        if let Some(backing) = removable_backing_field(ty.def, property) {
            edit.push(Edit::RemoveField(backing));
        }

        let (prelude, max_stack) =
            constructor_prelude(ctx, ty, property, mapping, &identifier, &field, field_type)?;
        for ctor in ty.def.constructors() {
            edit.push(Edit::PrependToConstructor {
                method: ctor,
                prelude: prelude.clone(),
                max_stack,
            });
        }

        edit.report(ty.def, &property.name, self.kind(), identifier);
        Ok(edit)
    }
}

/// `GetValue` / `SetValue` definitions found on the type hierarchy
struct MappingApi<'a> {
    get_value: MethodHandle<'a>,
    set_value: MethodHandle<'a>,
}

impl<'a> MappingApi<'a> {
    fn resolve(
        ctx: &GenerationContext<'a>,
        ty: TypeHandle<'a>,
        property: &PropertyDef,
        mapping: TypeHandle<'a>,
    ) -> Result<Self> {
        let names = &ctx.config.runtime;
        let mapping_def = mapping.sig();
        let value_param = mapping_value_param(mapping)?;
        let not_found = |method: &str| WeaveError::MappingApiNotFound {
            type_name: ty.full_name(),
            member: property.name.clone(),
            method: method.to_string(),
            mapping_type: mapping_def.full_name(),
        };

        let get_value = resolve_inherited_generic_method(
            &ctx.view,
            ty,
            &names.get_value,
            std::slice::from_ref(&mapping_def),
        )
        .ok_or_else(|| not_found(&names.get_value))?;
        let set_value = resolve_inherited_generic_method(
            &ctx.view,
            ty,
            &names.set_value,
            &[mapping_def.clone(), value_param],
        )
        .ok_or_else(|| not_found(&names.set_value))?;

        Ok(Self {
            get_value,
            set_value,
        })
    }
}

/// The mapping type's single generic parameter
fn mapping_value_param(mapping: TypeHandle<'_>) -> Result<TypeSig> {
    match mapping.def.generic_params.as_slice() {
        [param] => Ok(TypeSig::Var(param.clone())),
        _ => Err(WeaveError::TypeNotFound(format!(
            "{} with one generic parameter",
            mapping.full_name()
        ))),
    }
}

/// Backing field to drop once both accessors go through the mapping field
///
/// Only compiler-generated fields that no other method touches are removed;
/// a field still written by, say, a constructor initializer is kept.
fn removable_backing_field(ty: &TypeDef, property: &PropertyDef) -> Option<String> {
    let backing = resolve_backing_field(ty, property)?;
    let def = ty.find_field(&backing.name)?;
    if !def.is_compiler_generated() {
        return None;
    }
    let accessors = [property.getter, property.setter];
    let used_elsewhere = ty
        .methods
        .iter()
        .enumerate()
        .filter(|(index, _)| !accessors.contains(&Some(*index)))
        .filter_map(|(_, m)| m.body.as_ref())
        .flat_map(|body| body.instructions.iter())
        .filter_map(Instruction::field)
        .any(|f| f.name == backing.name);
    if used_elsewhere {
        debug!(field = %backing.name, "backing field still referenced, keeping it");
        return None;
    }
    Some(backing.name.clone())
}

/// Field initialization prepended to every instance constructor
///
/// ```text
/// ldarg.0; ldstr "<name>"; ldstr "<identifier>"; [<default>]
/// newobj PropertyMapping`1<T>::.ctor(...)
/// stfld <Name>Mapping
/// ```
fn constructor_prelude<'a>(
    ctx: &GenerationContext<'a>,
    ty: TypeHandle<'a>,
    property: &PropertyDef,
    mapping: TypeHandle<'a>,
    identifier: &str,
    field: &FieldRef,
    field_type: TypeSig,
) -> Result<(Vec<Instruction>, u16)> {
    let default = default_value(ctx, ty.def, property)?
        .map(|value| {
            push_constant(value).ok_or_else(|| WeaveError::UnsupportedDefaultValue {
                type_name: ty.full_name(),
                member: property.name.clone(),
                kind: value.kind_name(),
            })
        })
        .transpose()?;

    let value_param = mapping_value_param(mapping)?.full_name();
    let mut signature = vec!["System.String", "System.String"];
    if default.is_some() {
        signature.push(value_param.as_str());
    }
    let ctor = resolve_constructor(&ctx.view, mapping, &signature).ok_or_else(|| {
        WeaveError::MappingConstructorNotFound {
            type_name: ty.full_name(),
            mapping_type: mapping.full_name(),
            signature: signature.join(","),
        }
    })?;

    let mut prelude = vec![
        Instruction::new(Opcode::Ldarg0),
        load_string(&property.name),
        load_string(identifier),
    ];
    let max_stack = if default.is_some() { 4 } else { 3 };
    prelude.extend(default.into_iter().flatten());
    prelude.push(Instruction::with(
        Opcode::Newobj,
        Operand::Method(bind_to_host(ctor.method_ref(), field_type)),
    ));
    prelude.push(Instruction::with(Opcode::Stfld, Operand::Field(field.clone())));
    Ok((prelude, max_stack))
}
