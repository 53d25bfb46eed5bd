//! Integration tests for the module format and verifier

use semweave_bytecode::module::{field_attrs, method_attrs, type_attrs};
use semweave_bytecode::{
    verify_module, FieldDef, FieldRef, Instruction, MethodBody, MethodDef, Module, ModuleError,
    Opcode, Operand, ParamDef, PropertyDef, TypeDef, TypeSig,
};

fn person_module() -> Module {
    let mut module = Module::new("Demo");
    let this = TypeSig::class(None, "Demo.Person");
    let name_field = FieldRef::new(this.clone(), "_name", TypeSig::String);

    let mut person = TypeDef::new("Demo", "Person", type_attrs::PUBLIC, Some(TypeSig::Object));
    person
        .fields
        .push(FieldDef::new("_name", field_attrs::PRIVATE, TypeSig::String));

    let mut getter = MethodDef::new("get_Name", method_attrs::PUBLIC, TypeSig::String);
    getter.body = Some(MethodBody::new(
        vec![
            Instruction::new(Opcode::Ldarg0),
            Instruction::with(Opcode::Ldfld, Operand::Field(name_field.clone())),
            Instruction::new(Opcode::Ret),
        ],
        1,
    ));
    let mut setter = MethodDef::new("set_Name", method_attrs::PUBLIC, TypeSig::Void);
    setter.parameters.push(ParamDef::new("value", TypeSig::String));
    setter.body = Some(MethodBody::new(
        vec![
            Instruction::new(Opcode::Ldarg0),
            Instruction::new(Opcode::Ldarg1),
            Instruction::with(Opcode::Stfld, Operand::Field(name_field)),
            Instruction::new(Opcode::Ret),
        ],
        2,
    ));

    let mut prop = PropertyDef::new("Name", TypeSig::String);
    prop.getter = Some(person.add_method(getter));
    prop.setter = Some(person.add_method(setter));
    person.properties.push(prop);
    module.types.push(person);
    module
}

#[test]
fn test_encode_decode_and_verify() {
    let module = person_module();
    verify_module(&module).expect("Should be valid");

    let bytes = module.encode();
    assert_eq!(&bytes[..4], b"SWMD");
    let decoded = Module::decode(&bytes).expect("Failed to decode");
    verify_module(&decoded).expect("Decoded module should be valid");

    let person = decoded.find_type("Demo.Person").unwrap();
    assert_eq!(person.properties[0].getter, Some(0));
    assert_eq!(person.properties[0].setter, Some(1));
    assert_eq!(person.methods[1].parameters[0].param_type, TypeSig::String);
}

#[test]
fn test_verify_rejects_understated_max_stack() {
    let mut module = person_module();
    module.types[0].methods[1].body.as_mut().unwrap().max_stack = 1;
    let err = verify_module(&module).unwrap_err();
    assert!(err.to_string().starts_with("Demo.Person::set_Name"));
}

#[test]
fn test_truncated_image() {
    let bytes = person_module().encode();
    let result = Module::decode(&bytes[..bytes.len() / 2]);
    assert!(matches!(result, Err(ModuleError::ChecksumMismatch { .. })));
}

#[test]
fn test_checksum_changes_with_content() {
    let a = person_module().encode();
    let mut module = person_module();
    module.types[0].name = "Human".into();
    let b = module.encode();
    assert_ne!(a[16..48], b[16..48]);
}
