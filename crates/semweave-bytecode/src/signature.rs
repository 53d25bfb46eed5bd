//! Type signatures and member references
//!
//! A [`TypeRef`] names a type, optionally qualified by the module that
//! declares it. A scope of `None` always means "the module this reference
//! is stored in".

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use std::fmt;

/// Reference to a named type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    /// Declaring module, or `None` for the module holding the reference
    pub scope: Option<String>,
    /// Namespace, possibly empty
    pub namespace: String,
    /// Simple name, including any generic arity suffix
    pub name: String,
}

impl TypeRef {
    /// Create a reference from its parts
    pub fn new(scope: Option<&str>, namespace: &str, name: &str) -> Self {
        Self {
            scope: scope.map(str::to_string),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Build a reference from a dotted full name, splitting at the last dot
    pub fn parse(scope: Option<&str>, full_name: &str) -> Self {
        match full_name.rsplit_once('.') {
            Some((namespace, name)) => Self::new(scope, namespace, name),
            None => Self::new(scope, "", full_name),
        }
    }

    /// Namespace-qualified name, without the scope
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Same reference with a missing scope filled in from `origin`
    pub fn rebase(&self, origin: Option<&str>) -> Self {
        let mut out = self.clone();
        if out.scope.is_none() {
            out.scope = origin.map(str::to_string);
        }
        out
    }

    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        match &self.scope {
            Some(scope) => {
                writer.emit_bool(true);
                writer.emit_string(scope);
            }
            None => writer.emit_bool(false),
        }
        writer.emit_string(&self.namespace);
        writer.emit_string(&self.name);
    }

    pub(crate) fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let scope = if reader.read_bool()? {
            Some(reader.read_string()?)
        } else {
            None
        };
        Ok(Self {
            scope,
            namespace: reader.read_string()?,
            name: reader.read_string()?,
        })
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "[{}]{}", scope, self.full_name()),
            None => f.write_str(&self.full_name()),
        }
    }
}

/// Type signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSig {
    /// No value
    Void,
    /// Boolean
    Bool,
    /// UTF-16 code unit
    Char,
    /// Signed 8-bit integer
    I8,
    /// Unsigned 8-bit integer
    U8,
    /// Signed 16-bit integer
    I16,
    /// Unsigned 16-bit integer
    U16,
    /// Signed 32-bit integer
    I32,
    /// Unsigned 32-bit integer
    U32,
    /// Signed 64-bit integer
    I64,
    /// Unsigned 64-bit integer
    U64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
    /// `System.String`
    String,
    /// `System.Object`
    Object,
    /// Reference type
    Class(TypeRef),
    /// User defined value type
    ValueType(TypeRef),
    /// Instantiation of a generic type definition
    GenericInst {
        /// Generic type definition
        base: TypeRef,
        /// Definition is a value type
        value_type: bool,
        /// Type arguments, one per generic parameter
        args: Vec<TypeSig>,
    },
    /// Generic parameter of the enclosing type
    Var(String),
    /// Generic parameter of the enclosing method
    MVar(String),
    /// Single-dimensional array
    Array(Box<TypeSig>),
}

impl TypeSig {
    /// Reference type signature for a type defined in `scope`
    pub fn class(scope: Option<&str>, full_name: &str) -> Self {
        Self::Class(TypeRef::parse(scope, full_name))
    }

    /// Full name as it appears in metadata, e.g. `System.Int32`,
    /// `Ns.PropertyMapping`1<System.String>`, `T` or `Ns.Class[]`
    pub fn full_name(&self) -> String {
        match self {
            Self::Void => "System.Void".to_string(),
            Self::Bool => "System.Boolean".to_string(),
            Self::Char => "System.Char".to_string(),
            Self::I8 => "System.SByte".to_string(),
            Self::U8 => "System.Byte".to_string(),
            Self::I16 => "System.Int16".to_string(),
            Self::U16 => "System.UInt16".to_string(),
            Self::I32 => "System.Int32".to_string(),
            Self::U32 => "System.UInt32".to_string(),
            Self::I64 => "System.Int64".to_string(),
            Self::U64 => "System.UInt64".to_string(),
            Self::F32 => "System.Single".to_string(),
            Self::F64 => "System.Double".to_string(),
            Self::String => "System.String".to_string(),
            Self::Object => "System.Object".to_string(),
            Self::Class(r) | Self::ValueType(r) => r.full_name(),
            Self::GenericInst { base, args, .. } => {
                let args: Vec<_> = args.iter().map(TypeSig::full_name).collect();
                format!("{}<{}>", base.full_name(), args.join(","))
            }
            Self::Var(name) | Self::MVar(name) => name.clone(),
            Self::Array(element) => format!("{}[]", element.full_name()),
        }
    }

    /// Element type with generic arguments and array dimensions stripped
    pub fn element_type(&self) -> TypeSig {
        match self {
            Self::GenericInst {
                base,
                value_type: true,
                ..
            } => Self::ValueType(base.clone()),
            Self::GenericInst { base, .. } => Self::Class(base.clone()),
            Self::Array(element) => element.element_type(),
            other => other.clone(),
        }
    }

    /// Named type behind this signature, if any
    pub fn type_ref(&self) -> Option<&TypeRef> {
        match self {
            Self::Class(r) | Self::ValueType(r) => Some(r),
            Self::GenericInst { base, .. } => Some(base),
            _ => None,
        }
    }

    /// Check if values of this type are stored inline
    pub fn is_value_type(&self) -> bool {
        match self {
            Self::Bool
            | Self::Char
            | Self::I8
            | Self::U8
            | Self::I16
            | Self::U16
            | Self::I32
            | Self::U32
            | Self::I64
            | Self::U64
            | Self::F32
            | Self::F64
            | Self::ValueType(_) => true,
            Self::GenericInst { value_type, .. } => *value_type,
            _ => false,
        }
    }

    /// Built-in numeric or boolean type comparable with `ceq`
    pub fn is_primitive(&self) -> bool {
        self.is_value_type() && !matches!(self, Self::ValueType(_) | Self::GenericInst { .. })
    }

    /// Check for a type or method generic parameter
    pub fn is_generic_parameter(&self) -> bool {
        matches!(self, Self::Var(_) | Self::MVar(_))
    }

    /// Check for `void`
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// Replace generic parameters with concrete arguments
    ///
    /// `type_params` and `method_params` give the parameter names in
    /// declaration order; parameters without a matching argument are kept.
    pub fn substitute(
        &self,
        type_params: &[String],
        type_args: &[TypeSig],
        method_params: &[String],
        method_args: &[TypeSig],
    ) -> TypeSig {
        let lookup = |params: &[String], args: &[TypeSig], name: &str| {
            params
                .iter()
                .position(|p| p == name)
                .and_then(|i| args.get(i))
                .cloned()
        };
        match self {
            Self::Var(name) => lookup(type_params, type_args, name).unwrap_or_else(|| self.clone()),
            Self::MVar(name) => {
                lookup(method_params, method_args, name).unwrap_or_else(|| self.clone())
            }
            Self::GenericInst {
                base,
                value_type,
                args,
            } => Self::GenericInst {
                base: base.clone(),
                value_type: *value_type,
                args: args
                    .iter()
                    .map(|a| a.substitute(type_params, type_args, method_params, method_args))
                    .collect(),
            },
            Self::Array(element) => Self::Array(Box::new(element.substitute(
                type_params,
                type_args,
                method_params,
                method_args,
            ))),
            other => other.clone(),
        }
    }

    /// Fill in missing scopes with `origin`, recursively
    pub fn rebase(&self, origin: Option<&str>) -> TypeSig {
        match self {
            Self::Class(r) => Self::Class(r.rebase(origin)),
            Self::ValueType(r) => Self::ValueType(r.rebase(origin)),
            Self::GenericInst {
                base,
                value_type,
                args,
            } => Self::GenericInst {
                base: base.rebase(origin),
                value_type: *value_type,
                args: args.iter().map(|a| a.rebase(origin)).collect(),
            },
            Self::Array(element) => Self::Array(Box::new(element.rebase(origin))),
            other => other.clone(),
        }
    }

    /// Append every module scope this signature refers to
    pub fn collect_scopes(&self, out: &mut Vec<String>) {
        match self {
            Self::Class(r) | Self::ValueType(r) => push_scope(r, out),
            Self::GenericInst { base, args, .. } => {
                push_scope(base, out);
                for arg in args {
                    arg.collect_scopes(out);
                }
            }
            Self::Array(element) => element.collect_scopes(out),
            _ => {}
        }
    }

    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        match self {
            Self::Void => writer.emit_u8(0x01),
            Self::Bool => writer.emit_u8(0x02),
            Self::Char => writer.emit_u8(0x03),
            Self::I8 => writer.emit_u8(0x04),
            Self::U8 => writer.emit_u8(0x05),
            Self::I16 => writer.emit_u8(0x06),
            Self::U16 => writer.emit_u8(0x07),
            Self::I32 => writer.emit_u8(0x08),
            Self::U32 => writer.emit_u8(0x09),
            Self::I64 => writer.emit_u8(0x0A),
            Self::U64 => writer.emit_u8(0x0B),
            Self::F32 => writer.emit_u8(0x0C),
            Self::F64 => writer.emit_u8(0x0D),
            Self::String => writer.emit_u8(0x0E),
            Self::Object => writer.emit_u8(0x0F),
            Self::Class(r) => {
                writer.emit_u8(0x10);
                r.encode(writer);
            }
            Self::ValueType(r) => {
                writer.emit_u8(0x11);
                r.encode(writer);
            }
            Self::GenericInst {
                base,
                value_type,
                args,
            } => {
                writer.emit_u8(0x12);
                base.encode(writer);
                writer.emit_bool(*value_type);
                writer.emit_seq(args, |w, a| a.encode(w));
            }
            Self::Var(name) => {
                writer.emit_u8(0x13);
                writer.emit_string(name);
            }
            Self::MVar(name) => {
                writer.emit_u8(0x14);
                writer.emit_string(name);
            }
            Self::Array(element) => {
                writer.emit_u8(0x15);
                element.encode(writer);
            }
        }
    }

    pub(crate) fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let offset = reader.position();
        let tag = reader.read_u8()?;
        Ok(match tag {
            0x01 => Self::Void,
            0x02 => Self::Bool,
            0x03 => Self::Char,
            0x04 => Self::I8,
            0x05 => Self::U8,
            0x06 => Self::I16,
            0x07 => Self::U16,
            0x08 => Self::I32,
            0x09 => Self::U32,
            0x0A => Self::I64,
            0x0B => Self::U64,
            0x0C => Self::F32,
            0x0D => Self::F64,
            0x0E => Self::String,
            0x0F => Self::Object,
            0x10 => Self::Class(TypeRef::decode(reader)?),
            0x11 => Self::ValueType(TypeRef::decode(reader)?),
            0x12 => {
                let base = TypeRef::decode(reader)?;
                let value_type = reader.read_bool()?;
                let args = reader.read_seq(TypeSig::decode)?;
                Self::GenericInst {
                    base,
                    value_type,
                    args,
                }
            }
            0x13 => Self::Var(reader.read_string()?),
            0x14 => Self::MVar(reader.read_string()?),
            0x15 => Self::Array(Box::new(TypeSig::decode(reader)?)),
            _ => {
                return Err(DecodeError::InvalidTag {
                    what: "type signature",
                    tag,
                    offset,
                })
            }
        })
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

fn push_scope(r: &TypeRef, out: &mut Vec<String>) {
    if let Some(scope) = &r.scope {
        if !out.contains(scope) {
            out.push(scope.clone());
        }
    }
}

/// Reference to a field, as used by `ldfld`/`stfld` operands
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Type declaring the field
    pub declaring_type: TypeSig,
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: TypeSig,
}

impl FieldRef {
    /// Create a field reference
    pub fn new(declaring_type: TypeSig, name: &str, field_type: TypeSig) -> Self {
        Self {
            declaring_type,
            name: name.to_string(),
            field_type,
        }
    }

    /// Append every module scope the reference mentions
    pub fn collect_scopes(&self, out: &mut Vec<String>) {
        self.declaring_type.collect_scopes(out);
        self.field_type.collect_scopes(out);
    }

    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        self.declaring_type.encode(writer);
        writer.emit_string(&self.name);
        self.field_type.encode(writer);
    }

    pub(crate) fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            declaring_type: TypeSig::decode(reader)?,
            name: reader.read_string()?,
            field_type: TypeSig::decode(reader)?,
        })
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.field_type, self.declaring_type, self.name)
    }
}

/// Reference to a method, as used by call operands
///
/// Parameter and return types keep the generic parameters of the
/// definition; `generic_args` binds the method's own generic parameters
/// at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Type declaring the method
    pub declaring_type: TypeSig,
    /// Method name
    pub name: String,
    /// Instance method
    pub has_this: bool,
    /// Return type
    pub return_type: TypeSig,
    /// Parameter types, excluding `this`
    pub parameters: Vec<TypeSig>,
    /// Bound method generic arguments
    pub generic_args: Vec<TypeSig>,
}

impl MethodRef {
    /// Number of stack slots consumed by a call
    pub fn pop_count(&self) -> usize {
        self.parameters.len() + usize::from(self.has_this)
    }

    /// Check if a call pushes a result
    pub fn returns_value(&self) -> bool {
        !self.return_type.is_void()
    }

    /// Append every module scope the reference mentions
    pub fn collect_scopes(&self, out: &mut Vec<String>) {
        self.declaring_type.collect_scopes(out);
        self.return_type.collect_scopes(out);
        for param in &self.parameters {
            param.collect_scopes(out);
        }
        for arg in &self.generic_args {
            arg.collect_scopes(out);
        }
    }

    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        self.declaring_type.encode(writer);
        writer.emit_string(&self.name);
        writer.emit_bool(self.has_this);
        self.return_type.encode(writer);
        writer.emit_seq(&self.parameters, |w, p| p.encode(w));
        writer.emit_seq(&self.generic_args, |w, a| a.encode(w));
    }

    pub(crate) fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            declaring_type: TypeSig::decode(reader)?,
            name: reader.read_string()?,
            has_this: reader.read_bool()?,
            return_type: TypeSig::decode(reader)?,
            parameters: reader.read_seq(TypeSig::decode)?,
            generic_args: reader.read_seq(TypeSig::decode)?,
        })
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.return_type, self.declaring_type, self.name)?;
        if !self.generic_args.is_empty() {
            let args: Vec<_> = self.generic_args.iter().map(TypeSig::full_name).collect();
            write!(f, "<{}>", args.join(","))?;
        }
        let params: Vec<_> = self.parameters.iter().map(TypeSig::full_name).collect();
        write!(f, "({})", params.join(","))
    }
}
