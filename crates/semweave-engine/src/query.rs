//! Metadata query layer
//!
//! Read-only lookups over the target module and the modules it refers to.
//! Every lookup returns `None` when nothing matches; callers decide whether
//! a miss is fatal.

use crate::resolver::ModuleResolver;
use semweave_bytecode::{
    FieldRef, Instruction, MethodDef, MethodRef, Module, Opcode, PropertyDef, TypeDef, TypeRef,
    TypeSig,
};

/// Read-only view over the target module and its resolved references
#[derive(Debug, Clone, Copy)]
pub struct MetadataView<'a> {
    target: &'a Module,
    resolver: &'a ModuleResolver,
    core_module: &'a str,
}

/// A resolved type definition together with the scope it lives in
#[derive(Debug, Clone, Copy)]
pub struct TypeHandle<'a> {
    pub def: &'a TypeDef,
    /// Declaring module name, `None` for the target module
    pub scope: Option<&'a str>,
}

impl<'a> TypeHandle<'a> {
    /// Reference to this type usable from the target module
    pub fn type_ref(&self) -> TypeRef {
        TypeRef::new(self.scope, &self.def.namespace, &self.def.name)
    }

    /// Signature of this type as seen from the target module
    ///
    /// Generic definitions are instantiated over their own parameters.
    pub fn sig(&self) -> TypeSig {
        let base = self.type_ref();
        if !self.def.generic_params.is_empty() {
            TypeSig::GenericInst {
                base,
                value_type: self.def.is_value_type(),
                args: self
                    .def
                    .generic_params
                    .iter()
                    .map(|p| TypeSig::Var(p.clone()))
                    .collect(),
            }
        } else if self.def.is_value_type() {
            TypeSig::ValueType(base)
        } else {
            TypeSig::Class(base)
        }
    }

    pub fn full_name(&self) -> String {
        self.def.full_name()
    }

    pub fn is_local(&self) -> bool {
        self.scope.is_none()
    }
}

/// A method definition found on some type
#[derive(Debug, Clone, Copy)]
pub struct MethodHandle<'a> {
    pub owner: TypeHandle<'a>,
    pub index: usize,
    pub def: &'a MethodDef,
}

impl<'a> MethodHandle<'a> {
    /// Reference to this method usable from the target module
    pub fn method_ref(&self) -> MethodRef {
        let origin = self.owner.scope;
        MethodRef {
            declaring_type: self.owner.sig(),
            name: self.def.name.clone(),
            has_this: !self.def.is_static(),
            return_type: self.def.return_type.rebase(origin),
            parameters: self
                .def
                .parameters
                .iter()
                .map(|p| p.param_type.rebase(origin))
                .collect(),
            generic_args: Vec::new(),
        }
    }
}

impl<'a> MetadataView<'a> {
    pub fn new(target: &'a Module, resolver: &'a ModuleResolver, core_module: &'a str) -> Self {
        Self {
            target,
            resolver,
            core_module,
        }
    }

    pub fn target(&self) -> &'a Module {
        self.target
    }

    fn module(&self, scope: Option<&str>) -> Option<(&'a Module, Option<&'a str>)> {
        match scope {
            None => Some((self.target, None)),
            Some(name) if name == self.target.name => Some((self.target, None)),
            Some(name) => self
                .resolver
                .get(name)
                .map(|m| (m, Some(m.name.as_str()))),
        }
    }

    /// Handle to a type of the target module by index
    pub fn target_type(&self, index: usize) -> Option<TypeHandle<'a>> {
        self.target
            .types
            .get(index)
            .map(|def| TypeHandle { def, scope: None })
    }

    /// Find a type by full name in the given module (`None` = target)
    pub fn find_type(&self, scope: Option<&str>, full_name: &str) -> Option<TypeHandle<'a>> {
        let (module, scope) = self.module(scope)?;
        let def = module.find_type(full_name)?;
        Some(TypeHandle { def, scope })
    }

    /// Resolve a type reference stored in the module named by `origin`
    pub fn resolve(&self, origin: Option<&str>, r: &TypeRef) -> Option<TypeHandle<'a>> {
        self.find_type(r.scope.as_deref().or(origin), &r.full_name())
    }

    /// Resolve the type behind a signature; built-in types live in the core module
    pub fn resolve_sig(&self, origin: Option<&str>, sig: &TypeSig) -> Option<TypeHandle<'a>> {
        match sig.type_ref() {
            Some(r) => self.resolve(origin, r),
            None if sig.is_generic_parameter() => None,
            None => self.find_type(Some(self.core_module), &sig.full_name()),
        }
    }

    pub fn base_of(&self, ty: TypeHandle<'a>) -> Option<TypeHandle<'a>> {
        let base = ty.def.base_type.as_ref()?;
        self.resolve_sig(ty.scope, base)
    }

    /// The type itself followed by its base types, most derived first
    pub fn chain(&self, start: TypeHandle<'a>) -> impl Iterator<Item = TypeHandle<'a>> + 'a {
        let view = *self;
        std::iter::successors(Some(start), move |ty| view.base_of(*ty))
    }
}

fn methods_of<'a>(ty: TypeHandle<'a>) -> impl Iterator<Item = MethodHandle<'a>> + 'a {
    ty.def
        .methods
        .iter()
        .enumerate()
        .map(move |(index, def)| MethodHandle {
            owner: ty,
            index,
            def,
        })
}

/// Find a method by name and exact parameter type names, walking the
/// type itself and then its base types
pub fn resolve_inherited_method<'a>(
    view: &MetadataView<'a>,
    ty: TypeHandle<'a>,
    name: &str,
    param_types: &[&str],
) -> Option<MethodHandle<'a>> {
    view.chain(ty)
        .flat_map(methods_of)
        .find(|m| m.def.name == name && m.def.parameters_match(param_types))
}

/// Find a method whose parameters line up with `generic_args`
///
/// Parameter `i` matches when it is a generic parameter with the same name
/// as `generic_args[i]`, or when its element type has the same full name as
/// the element type of `generic_args[i]`.
pub fn resolve_inherited_generic_method<'a>(
    view: &MetadataView<'a>,
    ty: TypeHandle<'a>,
    name: &str,
    generic_args: &[TypeSig],
) -> Option<MethodHandle<'a>> {
    view.chain(ty).flat_map(methods_of).find(|m| {
        m.def.name == name
            && m.def.parameters.len() == generic_args.len()
            && m.def
                .parameters
                .iter()
                .zip(generic_args)
                .all(|(p, arg)| generic_param_matches(&p.param_type, arg))
    })
}

fn generic_param_matches(param: &TypeSig, arg: &TypeSig) -> bool {
    if param.is_generic_parameter() && param.full_name() == arg.full_name() {
        return true;
    }
    param.element_type().full_name() == arg.element_type().full_name()
}

/// Field written by the first `stfld` of a compiler-generated setter
pub fn resolve_backing_field<'a>(ty: &'a TypeDef, property: &PropertyDef) -> Option<&'a FieldRef> {
    let setter = ty.methods.get(property.setter?)?;
    if !(setter.is_compiler_generated() || setter.is_compiler_controlled()) {
        return None;
    }
    setter
        .body
        .as_ref()?
        .instructions
        .iter()
        .find(|i| i.opcode == Opcode::Stfld)
        .and_then(Instruction::field)
}

/// Find an instance constructor by exact parameter type names
pub fn resolve_constructor<'a>(
    view: &MetadataView<'a>,
    ty: TypeHandle<'a>,
    param_type_names: &[&str],
) -> Option<MethodHandle<'a>> {
    view.chain(ty)
        .flat_map(methods_of)
        .find(|m| m.def.is_constructor() && m.def.parameters_match(param_type_names))
}

/// Bind a generic method definition to concrete type arguments
pub fn instantiate_generic_method(method: &MethodHandle<'_>, type_args: &[TypeSig]) -> MethodRef {
    let mut bound = method.method_ref();
    bound.generic_args = type_args.to_vec();
    bound
}

/// Rebind a method reference to an instantiation of its declaring type
pub fn bind_to_host(mut method: MethodRef, host: TypeSig) -> MethodRef {
    method.declaring_type = host;
    method
}

/// How two values of a type are compared for equality
#[derive(Debug, Clone, PartialEq)]
pub enum Equality {
    /// `ceq`
    Primitive,
    /// Call to a static two-argument `Equals`
    Method(MethodRef),
}

/// Resolve the equality check used by change-notification setters
///
/// Value types compare with `ceq`. Reference types use a static
/// `Equals(T,T)` declared on `T`, falling back to the root object's
/// `Equals(object,object)`.
pub fn resolve_equality(
    view: &MetadataView<'_>,
    value_type: &TypeSig,
    equals: &str,
    root_object: &str,
) -> Option<Equality> {
    if value_type.is_value_type() {
        return Some(Equality::Primitive);
    }
    let name = value_type.full_name();
    if let Some(ty) = view.resolve_sig(None, value_type) {
        let own = methods_of(ty).find(|m| {
            m.def.name == equals
                && m.def.is_static()
                && m.def.parameters_match(&[name.as_str(), name.as_str()])
        });
        if let Some(m) = own {
            return Some(Equality::Method(m.method_ref()));
        }
    }
    let root = view.find_type(Some(view.core_module), root_object)?;
    methods_of(root)
        .find(|m| {
            m.def.name == equals && m.def.is_static() && m.def.parameters_match(&[root_object, root_object])
        })
        .map(|m| Equality::Method(m.method_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use semweave_bytecode::module::{method_attrs, COMPILER_GENERATED_ATTRIBUTE};
    use semweave_bytecode::{CustomAttribute, MethodBody, Operand, ParamDef};

    fn method(name: &str, flags: u32, params: &[TypeSig]) -> MethodDef {
        let mut m = MethodDef::new(name, flags, TypeSig::Void);
        for (i, p) in params.iter().enumerate() {
            m.parameters.push(ParamDef::new(&format!("p{}", i), p.clone()));
        }
        m
    }

    fn core() -> Module {
        let mut core = Module::new("Core");
        let mut object = TypeDef::new("System", "Object", 0, None);
        object.add_method(method(
            "Equals",
            method_attrs::PUBLIC | method_attrs::STATIC,
            &[TypeSig::Object, TypeSig::Object],
        ));
        object.add_method(method(".ctor", method_attrs::PUBLIC, &[]));
        core.types.push(object);
        let mut string = TypeDef::new("System", "String", 0, Some(TypeSig::Object));
        string.add_method(method(
            "Equals",
            method_attrs::PUBLIC | method_attrs::STATIC,
            &[TypeSig::String, TypeSig::String],
        ));
        core.types.push(string);
        core
    }

    /// A -> B -> C inside the target, A derives from the core object
    fn target() -> Module {
        let mut module = Module::new("App");
        let object = TypeSig::class(Some("Core"), "System.Object");
        let mut a = TypeDef::new("App", "A", 0, Some(object));
        a.add_method(method("Describe", method_attrs::PUBLIC, &[TypeSig::String]));
        a.add_method(method("Touch", method_attrs::PUBLIC, &[]));
        let mut generic = method("Read", method_attrs::PUBLIC, &[TypeSig::GenericInst {
            base: TypeRef::parse(None, "App.Box`1"),
            value_type: false,
            args: vec![TypeSig::MVar("T".into())],
        }]);
        generic.generic_params.push("T".into());
        a.add_method(generic);
        module.types.push(a);

        let mut b = TypeDef::new("App", "B", 0, Some(TypeSig::class(None, "App.A")));
        b.add_method(method("Touch", method_attrs::PUBLIC | method_attrs::VIRTUAL, &[]));
        module.types.push(b);

        let c = TypeDef::new("App", "C", 0, Some(TypeSig::class(None, "App.B")));
        module.types.push(c);
        module
    }

    fn resolver() -> ModuleResolver {
        let mut resolver = ModuleResolver::new();
        resolver.register(core());
        resolver
    }

    #[test]
    fn test_chain_crosses_modules() {
        let module = target();
        let resolver = resolver();
        let view = MetadataView::new(&module, &resolver, "Core");
        let c = view.find_type(None, "App.C").unwrap();
        let names: Vec<_> = view.chain(c).map(|t| t.full_name()).collect();
        assert_eq!(names, vec!["App.C", "App.B", "App.A", "System.Object"]);
        assert_eq!(view.chain(c).last().unwrap().scope, Some("Core"));
    }

    #[test]
    fn test_inherited_method_two_levels_up() {
        let module = target();
        let resolver = resolver();
        let view = MetadataView::new(&module, &resolver, "Core");
        let c = view.find_type(None, "App.C").unwrap();
        let found = resolve_inherited_method(&view, c, "Describe", &["System.String"]).unwrap();
        assert_eq!(found.owner.full_name(), "App.A");
        assert!(resolve_inherited_method(&view, c, "Describe", &["System.Int32"]).is_none());
    }

    #[test]
    fn test_inherited_method_prefers_most_derived() {
        let module = target();
        let resolver = resolver();
        let view = MetadataView::new(&module, &resolver, "Core");
        let c = view.find_type(None, "App.C").unwrap();
        let found = resolve_inherited_method(&view, c, "Touch", &[]).unwrap();
        assert_eq!(found.owner.full_name(), "App.B");
    }

    #[test]
    fn test_generic_method_by_element_type() {
        let module = target();
        let resolver = resolver();
        let view = MetadataView::new(&module, &resolver, "Core");
        let c = view.find_type(None, "App.C").unwrap();
        let arg = TypeSig::GenericInst {
            base: TypeRef::parse(None, "App.Box`1"),
            value_type: false,
            args: vec![TypeSig::Var("T".into())],
        };
        let found = resolve_inherited_generic_method(&view, c, "Read", &[arg]).unwrap();
        assert_eq!(found.owner.full_name(), "App.A");

        let bound = instantiate_generic_method(&found, &[TypeSig::I32]);
        assert_eq!(bound.generic_args, vec![TypeSig::I32]);
        assert!(bound.has_this);
    }

    #[test]
    fn test_generic_method_prefers_most_derived() {
        let mut module = target();
        let mut shadow = method("Read", method_attrs::PUBLIC, &[TypeSig::GenericInst {
            base: TypeRef::parse(None, "App.Box`1"),
            value_type: false,
            args: vec![TypeSig::MVar("T".into())],
        }]);
        shadow.generic_params.push("T".into());
        module.types[1].add_method(shadow);

        let resolver = resolver();
        let view = MetadataView::new(&module, &resolver, "Core");
        let arg = TypeSig::GenericInst {
            base: TypeRef::parse(None, "App.Box`1"),
            value_type: false,
            args: vec![TypeSig::Var("T".into())],
        };
        let c = view.find_type(None, "App.C").unwrap();
        let found = resolve_inherited_generic_method(&view, c, "Read", std::slice::from_ref(&arg)).unwrap();
        assert_eq!(found.owner.full_name(), "App.B");

        let a = view.find_type(None, "App.A").unwrap();
        let found = resolve_inherited_generic_method(&view, a, "Read", &[arg]).unwrap();
        assert_eq!(found.owner.full_name(), "App.A");
    }

    #[test]
    fn test_constructor_found_on_base() {
        let module = target();
        let resolver = resolver();
        let view = MetadataView::new(&module, &resolver, "Core");
        let c = view.find_type(None, "App.C").unwrap();
        let ctor = resolve_constructor(&view, c, &[]).unwrap();
        assert_eq!(ctor.owner.full_name(), "System.Object");
        assert_eq!(
            ctor.method_ref().declaring_type,
            TypeSig::class(Some("Core"), "System.Object")
        );
        assert!(resolve_constructor(&view, c, &["System.String"]).is_none());
    }

    #[test]
    fn test_backing_field_requires_generated_setter() {
        let this = TypeSig::class(None, "App.A");
        let field = FieldRef::new(this, "<Name>k__BackingField", TypeSig::String);
        let mut ty = TypeDef::new("App", "A", 0, None);
        let mut setter = method("set_Name", method_attrs::PUBLIC, &[TypeSig::String]);
        setter.body = Some(MethodBody::new(
            vec![
                Instruction::new(Opcode::Ldarg0),
                Instruction::new(Opcode::Ldarg1),
                Instruction::with(Opcode::Stfld, Operand::Field(field.clone())),
                Instruction::new(Opcode::Ret),
            ],
            2,
        ));
        let index = ty.add_method(setter);
        let mut prop = PropertyDef::new("Name", TypeSig::String);
        prop.setter = Some(index);

        assert!(resolve_backing_field(&ty, &prop).is_none());
        ty.methods[index]
            .attributes
            .push(CustomAttribute::named(COMPILER_GENERATED_ATTRIBUTE, vec![]));
        assert_eq!(resolve_backing_field(&ty, &prop), Some(&field));
    }

    #[test]
    fn test_equality_resolution() {
        let module = target();
        let resolver = resolver();
        let view = MetadataView::new(&module, &resolver, "Core");

        assert_eq!(
            resolve_equality(&view, &TypeSig::I32, "Equals", "System.Object"),
            Some(Equality::Primitive)
        );
        match resolve_equality(&view, &TypeSig::String, "Equals", "System.Object") {
            Some(Equality::Method(m)) => {
                assert_eq!(m.declaring_type.full_name(), "System.String");
                assert!(!m.has_this);
            }
            other => panic!("unexpected {:?}", other),
        }
        match resolve_equality(&view, &TypeSig::class(None, "App.A"), "Equals", "System.Object") {
            Some(Equality::Method(m)) => {
                assert_eq!(m.declaring_type.full_name(), "System.Object");
                assert_eq!(m.parameters, vec![TypeSig::Object, TypeSig::Object]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
