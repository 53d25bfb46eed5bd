//! Shared fixtures for the engine integration tests
//!
//! Builds a minimal core library and runtime module, helpers to declare
//! auto-implemented properties the way a compiler emits them, and a tiny
//! interpreter able to run the bodies the weaver synthesizes.

#![allow(dead_code)]

use semweave_bytecode::module::{field_attrs, method_attrs, type_attrs, COMPILER_GENERATED_ATTRIBUTE};
use semweave_bytecode::{
    Constant, CustomAttribute, FieldDef, FieldRef, Instruction, MethodBody, MethodDef, Module,
    Opcode, Operand, ParamDef, PropertyDef, TypeDef, TypeRef, TypeSig,
};
use semweave_engine::{ModuleResolver, WeaveConfig};
use std::collections::HashMap;

pub const CORE: &str = "System.Runtime";
pub const RUNTIME: &str = "Semweave.Runtime";
pub const APP: &str = "App";

pub const TYPE_IDENTIFIERS: &str = "Semweave.Mapping.RdfClassAttribute";
pub const PERSISTENT_IDENTIFIER: &str = "Semweave.Mapping.RdfPropertyAttribute";
pub const DEFAULT_VALUE: &str = "System.ComponentModel.DefaultValueAttribute";
pub const NOTIFY: &str = "Semweave.Mapping.NotifyPropertyChangedAttribute";

pub fn object() -> TypeSig {
    TypeSig::class(Some(CORE), "System.Object")
}

pub fn resource() -> TypeSig {
    TypeSig::class(Some(RUNTIME), "Semweave.Resource")
}

fn method(name: &str, flags: u32, ret: TypeSig, params: &[TypeSig]) -> MethodDef {
    let mut m = MethodDef::new(name, flags, ret);
    for (i, p) in params.iter().enumerate() {
        m.parameters.push(ParamDef::new(&format!("arg{}", i), p.clone()));
    }
    m
}

fn ctor(params: &[TypeSig]) -> MethodDef {
    method(
        ".ctor",
        method_attrs::PUBLIC | method_attrs::SPECIAL_NAME | method_attrs::RT_SPECIAL_NAME,
        TypeSig::Void,
        params,
    )
}

pub fn core_module() -> Module {
    let mut core = Module::new(CORE);
    let mut object = TypeDef::new("System", "Object", type_attrs::PUBLIC, None);
    object.add_method(ctor(&[]));
    object.add_method(method(
        "Equals",
        method_attrs::PUBLIC | method_attrs::STATIC,
        TypeSig::Bool,
        &[TypeSig::Object, TypeSig::Object],
    ));
    core.types.push(object);

    let mut string = TypeDef::new("System", "String", type_attrs::PUBLIC, Some(TypeSig::Object));
    string.add_method(method(
        "Equals",
        method_attrs::PUBLIC | method_attrs::STATIC,
        TypeSig::Bool,
        &[TypeSig::String, TypeSig::String],
    ));
    core.types.push(string);
    core
}

fn mapping_of(arg: TypeSig) -> TypeSig {
    TypeSig::GenericInst {
        base: TypeRef::parse(None, "Semweave.Mapping.PropertyMapping`1"),
        value_type: false,
        args: vec![arg],
    }
}

pub fn runtime_module() -> Module {
    let mut runtime = Module::new(RUNTIME);
    runtime.add_reference(CORE);

    let mut mapping = TypeDef::new("Semweave.Mapping", "PropertyMapping`1", type_attrs::PUBLIC, Some(object()));
    mapping.generic_params.push("T".into());
    mapping.add_method(ctor(&[TypeSig::String, TypeSig::String]));
    mapping.add_method(ctor(&[TypeSig::String, TypeSig::String, TypeSig::Var("T".into())]));
    runtime.types.push(mapping);

    let mut class = TypeDef::new("Semweave", "Class", type_attrs::PUBLIC, Some(object()));
    class.add_method(ctor(&[TypeSig::String]));
    runtime.types.push(class);

    let virtual_public = method_attrs::PUBLIC | method_attrs::VIRTUAL | method_attrs::HIDE_BY_SIG;
    let mut resource = TypeDef::new("Semweave", "Resource", type_attrs::PUBLIC, Some(object()));
    resource.add_method(ctor(&[]));
    let t = TypeSig::MVar("T".into());
    let mut get_value = method("GetValue", virtual_public, t.clone(), &[mapping_of(t.clone())]);
    get_value.generic_params.push("T".into());
    resource.add_method(get_value);
    let mut set_value = method(
        "SetValue",
        virtual_public,
        TypeSig::Void,
        &[mapping_of(t.clone()), t],
    );
    set_value.generic_params.push("T".into());
    resource.add_method(set_value);
    resource.add_method(method(
        "RaisePropertyChanged",
        virtual_public,
        TypeSig::Void,
        &[TypeSig::String],
    ));
    resource.add_method(method(
        "GetTypes",
        virtual_public | method_attrs::NEW_SLOT,
        TypeSig::Array(Box::new(TypeSig::class(None, "Semweave.Class"))),
        &[],
    ));
    runtime.types.push(resource);
    runtime
}

pub fn resolver() -> ModuleResolver {
    let mut resolver = ModuleResolver::new();
    resolver.register(core_module());
    resolver.register(runtime_module());
    resolver
}

pub fn config() -> WeaveConfig {
    WeaveConfig::default()
}

pub fn app_module() -> Module {
    let mut module = Module::new(APP);
    module.add_reference(CORE);
    module.add_reference(RUNTIME);
    module
}

pub fn app_type(name: &str, base: TypeSig) -> TypeDef {
    TypeDef::new(APP, name, type_attrs::PUBLIC, Some(base))
}

pub fn type_sig(ty: &TypeDef) -> TypeSig {
    TypeSig::class(None, &ty.full_name())
}

pub fn generated() -> CustomAttribute {
    CustomAttribute::named(COMPILER_GENERATED_ATTRIBUTE, vec![])
}

pub fn annotate_type(ty: &mut TypeDef, identifier: &str) {
    ty.attributes.push(CustomAttribute::named(
        TYPE_IDENTIFIERS,
        vec![Constant::String(identifier.into())],
    ));
}

pub fn persistent(identifier: &str) -> CustomAttribute {
    CustomAttribute::named(PERSISTENT_IDENTIFIER, vec![Constant::String(identifier.into())])
}

pub fn default_value(value: Constant) -> CustomAttribute {
    CustomAttribute::named(DEFAULT_VALUE, vec![value])
}

pub fn notify() -> CustomAttribute {
    CustomAttribute::named(NOTIFY, vec![])
}

pub fn backing_field_name(property: &str) -> String {
    format!("<{}>k__BackingField", property)
}

/// Declare an auto-implemented property with compiler-generated accessors
pub fn auto_property(
    ty: &mut TypeDef,
    name: &str,
    value_type: TypeSig,
    attributes: Vec<CustomAttribute>,
) -> usize {
    let field_name = backing_field_name(name);
    let mut field = FieldDef::new(&field_name, field_attrs::PRIVATE, value_type.clone());
    field.attributes.push(generated());
    ty.fields.push(field);
    let field = FieldRef::new(type_sig(ty), &field_name, value_type.clone());

    let accessor_flags = method_attrs::PUBLIC | method_attrs::HIDE_BY_SIG | method_attrs::SPECIAL_NAME;
    let mut getter = method(&format!("get_{}", name), accessor_flags, value_type.clone(), &[]);
    getter.attributes.push(generated());
    getter.body = Some(MethodBody::new(
        vec![
            Instruction::new(Opcode::Ldarg0),
            Instruction::with(Opcode::Ldfld, Operand::Field(field.clone())),
            Instruction::new(Opcode::Ret),
        ],
        1,
    ));
    let mut setter = method(&format!("set_{}", name), accessor_flags, TypeSig::Void, &[value_type.clone()]);
    setter.attributes.push(generated());
    setter.body = Some(MethodBody::new(
        vec![
            Instruction::new(Opcode::Ldarg0),
            Instruction::new(Opcode::Ldarg1),
            Instruction::with(Opcode::Stfld, Operand::Field(field)),
            Instruction::new(Opcode::Ret),
        ],
        2,
    ));

    let mut property = PropertyDef::new(name, value_type);
    property.getter = Some(ty.add_method(getter));
    property.setter = Some(ty.add_method(setter));
    property.attributes = attributes;
    ty.properties.push(property);
    ty.properties.len() - 1
}

/// Add a constructor chaining to the base type's parameterless constructor
pub fn add_constructor(ty: &mut TypeDef, params: &[TypeSig]) -> usize {
    let base = ty.base_type.clone().unwrap_or(TypeSig::Object);
    let base_ctor = semweave_bytecode::MethodRef {
        declaring_type: base,
        name: ".ctor".to_string(),
        has_this: true,
        return_type: TypeSig::Void,
        parameters: Vec::new(),
        generic_args: Vec::new(),
    };
    let mut def = ctor(params);
    def.body = Some(MethodBody::new(
        vec![
            Instruction::new(Opcode::Ldarg0),
            Instruction::with(Opcode::Call, Operand::Method(base_ctor)),
            Instruction::new(Opcode::Ret),
        ],
        1,
    ));
    ty.add_method(def)
}

pub fn find_method<'a>(module: &'a Module, type_name: &str, method: &str) -> &'a MethodDef {
    let ty = module.find_type(type_name).expect("type should exist");
    let index = ty.find_method(method).expect("method should exist");
    &ty.methods[index]
}

pub fn opcodes(method: &MethodDef) -> Vec<Opcode> {
    method
        .body
        .as_ref()
        .expect("method should have a body")
        .instructions
        .iter()
        .map(|i| i.opcode)
        .collect()
}

/// Runtime value in the test interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    This,
    Int(i64),
    Float(f64),
    Str(String),
    /// A constructed mapping field
    Mapping {
        name: String,
        identifier: String,
        default: Option<Box<Value>>,
    },
    /// A constructed identifier wrapper
    Wrapper(String),
    /// Index into the interpreter's array heap
    Array(usize),
}

/// Single-object interpreter for synthesized bodies
///
/// Models one instance (`this`) with its fields, the runtime's mapped value
/// store, and the notifications raised.
#[derive(Debug, Default)]
pub struct Machine {
    pub fields: HashMap<String, Value>,
    pub mapped: HashMap<String, Value>,
    pub notifications: Vec<String>,
    pub arrays: Vec<Vec<Value>>,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a body with `this` as argument 0 followed by `args`
    pub fn run(&mut self, method: &MethodDef, args: &[Value]) -> Option<Value> {
        let body = method.body.as_ref().expect("method should have a body");
        let mut arguments = vec![Value::This];
        arguments.extend_from_slice(args);
        let mut locals = vec![Value::Null; body.locals.len()];
        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0;

        loop {
            let instr = &body.instructions[pc];
            pc += 1;
            match instr.opcode {
                Opcode::Nop => {}
                Opcode::Ldarg0 => stack.push(arguments[0].clone()),
                Opcode::Ldarg1 => stack.push(arguments[1].clone()),
                Opcode::Ldarg2 => stack.push(arguments[2].clone()),
                Opcode::Ldloc0 => stack.push(locals[0].clone()),
                Opcode::Stloc0 => locals[0] = stack.pop().unwrap(),
                Opcode::Dup => {
                    let top = stack.last().unwrap().clone();
                    stack.push(top);
                }
                Opcode::Ldnull => stack.push(Value::Null),
                Opcode::LdcI4_0 => stack.push(Value::Int(0)),
                Opcode::LdcI4_1 => stack.push(Value::Int(1)),
                Opcode::LdcI4_2 => stack.push(Value::Int(2)),
                Opcode::LdcI4_3 => stack.push(Value::Int(3)),
                Opcode::LdcI4_4 => stack.push(Value::Int(4)),
                Opcode::LdcI4_5 => stack.push(Value::Int(5)),
                Opcode::LdcI4_6 => stack.push(Value::Int(6)),
                Opcode::LdcI4_7 => stack.push(Value::Int(7)),
                Opcode::LdcI4_8 => stack.push(Value::Int(8)),
                Opcode::LdcI4S | Opcode::LdcI4 => match instr.operand {
                    Operand::Int32(v) => stack.push(Value::Int(i64::from(v))),
                    _ => panic!("bad literal operand"),
                },
                Opcode::LdcI8 => match instr.operand {
                    Operand::Int64(v) => stack.push(Value::Int(v)),
                    _ => panic!("bad literal operand"),
                },
                Opcode::LdcR8 => match instr.operand {
                    Operand::Float64(v) => stack.push(Value::Float(v)),
                    _ => panic!("bad literal operand"),
                },
                Opcode::ConvI8 | Opcode::ConvU8 => {}
                Opcode::Ldstr => match &instr.operand {
                    Operand::String(s) => stack.push(Value::Str(s.clone())),
                    _ => panic!("bad string operand"),
                },
                Opcode::Ceq => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(Value::Int(i64::from(a == b)));
                }
                Opcode::Br => pc = instr.branch_target().unwrap(),
                Opcode::Brtrue | Opcode::Brfalse => {
                    let taken = stack.pop().unwrap() != Value::Int(0);
                    if taken == (instr.opcode == Opcode::Brtrue) {
                        pc = instr.branch_target().unwrap();
                    }
                }
                Opcode::Ret => return stack.pop(),
                Opcode::Ldfld => {
                    let field = instr.field().unwrap();
                    assert_eq!(stack.pop(), Some(Value::This));
                    stack.push(self.fields.get(&field.name).cloned().unwrap_or(Value::Null));
                }
                Opcode::Stfld => {
                    let field = instr.field().unwrap();
                    let value = stack.pop().unwrap();
                    assert_eq!(stack.pop(), Some(Value::This));
                    self.fields.insert(field.name.clone(), value);
                }
                Opcode::Call | Opcode::Callvirt => {
                    let method = instr.method().unwrap();
                    let mut call_args = stack.split_off(stack.len() - method.pop_count());
                    match method.name.as_str() {
                        "Equals" => {
                            let b = call_args.pop().unwrap();
                            let a = call_args.pop().unwrap();
                            stack.push(Value::Int(i64::from(a == b)));
                        }
                        "GetValue" => match &call_args[1] {
                            Value::Mapping { name, default, .. } => {
                                let value = self
                                    .mapped
                                    .get(name)
                                    .cloned()
                                    .or_else(|| default.as_deref().cloned())
                                    .unwrap_or(Value::Null);
                                stack.push(value);
                            }
                            other => panic!("GetValue on {:?}", other),
                        },
                        "SetValue" => match (&call_args[1], &call_args[2]) {
                            (Value::Mapping { name, .. }, value) => {
                                self.mapped.insert(name.clone(), value.clone());
                            }
                            other => panic!("SetValue on {:?}", other),
                        },
                        "RaisePropertyChanged" => match &call_args[1] {
                            Value::Str(name) => self.notifications.push(name.clone()),
                            other => panic!("RaisePropertyChanged with {:?}", other),
                        },
                        ".ctor" => {}
                        other => panic!("unexpected call to {}", other),
                    }
                }
                Opcode::Newobj => {
                    let method = instr.method().unwrap();
                    let mut ctor_args = stack.split_off(stack.len() - method.parameters.len());
                    if method.declaring_type.full_name().starts_with("Semweave.Mapping.PropertyMapping`1") {
                        let default = (ctor_args.len() == 3).then(|| Box::new(ctor_args.pop().unwrap()));
                        let identifier = ctor_args.pop().unwrap();
                        let name = ctor_args.pop().unwrap();
                        match (name, identifier) {
                            (Value::Str(name), Value::Str(identifier)) => stack.push(Value::Mapping {
                                name,
                                identifier,
                                default,
                            }),
                            other => panic!("bad mapping arguments {:?}", other),
                        }
                    } else {
                        match ctor_args.pop() {
                            Some(Value::Str(id)) => stack.push(Value::Wrapper(id)),
                            other => panic!("bad wrapper argument {:?}", other),
                        }
                    }
                }
                Opcode::Newarr => match stack.pop() {
                    Some(Value::Int(len)) => {
                        self.arrays.push(vec![Value::Null; len as usize]);
                        stack.push(Value::Array(self.arrays.len() - 1));
                    }
                    other => panic!("bad array length {:?}", other),
                },
                Opcode::StelemRef => {
                    let value = stack.pop().unwrap();
                    let index = stack.pop().unwrap();
                    let array = stack.pop().unwrap();
                    match (array, index) {
                        (Value::Array(a), Value::Int(i)) => self.arrays[a][i as usize] = value,
                        other => panic!("bad array store {:?}", other),
                    }
                }
                other => panic!("opcode {} not supported by the test machine", other.name()),
            }
        }
    }

    /// Contents of an array returned by [`Machine::run`]
    pub fn array(&self, value: &Value) -> Vec<Value> {
        match value {
            Value::Array(index) => self.arrays[*index].clone(),
            other => panic!("not an array: {:?}", other),
        }
    }
}
