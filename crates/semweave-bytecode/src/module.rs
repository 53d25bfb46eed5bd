//! Module metadata model and binary module format

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::instruction::{Instruction, Operand};
use crate::signature::{TypeRef, TypeSig};
use thiserror::Error;

/// Magic number for semweave module files: "SWMD"
pub const MAGIC: [u8; 4] = *b"SWMD";

/// Current module format version
pub const VERSION: u32 = 1;

/// Size of the fixed header: magic + version + flags + crc32 + sha256
pub const HEADER_SIZE: usize = 48;

/// Attribute marking members synthesized by a compiler
pub const COMPILER_GENERATED_ATTRIBUTE: &str =
    "System.Runtime.CompilerServices.CompilerGeneratedAttribute";

/// Name of instance constructors
pub const CONSTRUCTOR_NAME: &str = ".ctor";

/// Name of type initializers
pub const TYPE_INITIALIZER_NAME: &str = ".cctor";

/// Module encoding/decoding errors
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Decode error
    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected SWMD, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// CRC32 mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Stored checksum value
        expected: u32,
        /// Computed checksum value
        actual: u32,
    },

    /// SHA-256 digest mismatch
    #[error("Content hash mismatch")]
    DigestMismatch,

    /// Trailing bytes after the last table
    #[error("{0} trailing bytes after module payload")]
    TrailingBytes(usize),

    /// Structural inconsistency
    #[error("Malformed module: {0}")]
    Malformed(String),
}

/// Module flags
pub mod flags {
    /// Module has already been rewritten by the weaver
    pub const INSTRUMENTED: u32 = 1 << 0;
}

/// Type attributes
pub mod type_attrs {
    /// Visible outside the module
    pub const PUBLIC: u32 = 0x0001;
    /// Interface type
    pub const INTERFACE: u32 = 0x0020;
    /// Cannot be instantiated
    pub const ABSTRACT: u32 = 0x0080;
    /// Cannot be derived from
    pub const SEALED: u32 = 0x0100;
    /// Value type
    pub const VALUE_TYPE: u32 = 0x0200;
}

/// Method attributes
pub mod method_attrs {
    /// Mask for the member access bits
    pub const ACCESS_MASK: u32 = 0x0007;
    /// Member not referenceable from source code
    pub const COMPILER_CONTROLLED: u32 = 0x0000;
    /// Accessible only within the declaring type
    pub const PRIVATE: u32 = 0x0001;
    /// Accessible from derived types
    pub const FAMILY: u32 = 0x0004;
    /// Accessible everywhere
    pub const PUBLIC: u32 = 0x0006;
    /// No `this` argument
    pub const STATIC: u32 = 0x0010;
    /// Cannot be overridden
    pub const FINAL: u32 = 0x0020;
    /// Dispatched through a virtual slot
    pub const VIRTUAL: u32 = 0x0040;
    /// Hides by name and signature
    pub const HIDE_BY_SIG: u32 = 0x0080;
    /// Virtual method introduces a new slot instead of overriding
    pub const NEW_SLOT: u32 = 0x0100;
    /// No implementation
    pub const ABSTRACT: u32 = 0x0400;
    /// Name is special to tools, e.g. property accessors
    pub const SPECIAL_NAME: u32 = 0x0800;
    /// Name is special to the runtime, e.g. constructors
    pub const RT_SPECIAL_NAME: u32 = 0x1000;
}

/// Field attributes
pub mod field_attrs {
    /// Mask for the field access bits
    pub const ACCESS_MASK: u32 = 0x0007;
    /// Accessible only within the declaring type
    pub const PRIVATE: u32 = 0x0001;
    /// Accessible everywhere
    pub const PUBLIC: u32 = 0x0006;
    /// Shared by all instances
    pub const STATIC: u32 = 0x0010;
    /// Assignable only in a constructor
    pub const INIT_ONLY: u32 = 0x0020;
}

/// Constant value stored in a custom attribute
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Null reference
    Null,
    /// Boolean
    Bool(bool),
    /// UTF-16 code unit
    Char(u16),
    /// Signed 8-bit integer
    I8(i8),
    /// Unsigned 8-bit integer
    U8(u8),
    /// Signed 16-bit integer
    I16(i16),
    /// Unsigned 16-bit integer
    U16(u16),
    /// Signed 32-bit integer
    I32(i32),
    /// Unsigned 32-bit integer
    U32(u32),
    /// Signed 64-bit integer
    I64(i64),
    /// Unsigned 64-bit integer
    U64(u64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// String
    String(String),
    /// Type token
    Type(TypeSig),
    /// Array of constants
    Array(Vec<Constant>),
}

impl Constant {
    /// String payload, if this is a string constant
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::String(s) => Some(s),
            _ => None,
        }
    }

    /// Short type label used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Constant::Null => "null",
            Constant::Bool(_) => "bool",
            Constant::Char(_) => "char",
            Constant::I8(_) => "int8",
            Constant::U8(_) => "uint8",
            Constant::I16(_) => "int16",
            Constant::U16(_) => "uint16",
            Constant::I32(_) => "int32",
            Constant::U32(_) => "uint32",
            Constant::I64(_) => "int64",
            Constant::U64(_) => "uint64",
            Constant::F32(_) => "float32",
            Constant::F64(_) => "float64",
            Constant::String(_) => "string",
            Constant::Type(_) => "type",
            Constant::Array(_) => "array",
        }
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        match self {
            Constant::Null => writer.emit_u8(0x00),
            Constant::Bool(v) => {
                writer.emit_u8(0x01);
                writer.emit_bool(*v);
            }
            Constant::Char(v) => {
                writer.emit_u8(0x02);
                writer.emit_u16(*v);
            }
            Constant::I8(v) => {
                writer.emit_u8(0x03);
                writer.emit_u8(*v as u8);
            }
            Constant::U8(v) => {
                writer.emit_u8(0x04);
                writer.emit_u8(*v);
            }
            Constant::I16(v) => {
                writer.emit_u8(0x05);
                writer.emit_u16(*v as u16);
            }
            Constant::U16(v) => {
                writer.emit_u8(0x06);
                writer.emit_u16(*v);
            }
            Constant::I32(v) => {
                writer.emit_u8(0x07);
                writer.emit_i32(*v);
            }
            Constant::U32(v) => {
                writer.emit_u8(0x08);
                writer.emit_u32(*v);
            }
            Constant::I64(v) => {
                writer.emit_u8(0x09);
                writer.emit_i64(*v);
            }
            Constant::U64(v) => {
                writer.emit_u8(0x0A);
                writer.emit_u64(*v);
            }
            Constant::F32(v) => {
                writer.emit_u8(0x0B);
                writer.emit_f32(*v);
            }
            Constant::F64(v) => {
                writer.emit_u8(0x0C);
                writer.emit_f64(*v);
            }
            Constant::String(s) => {
                writer.emit_u8(0x0D);
                writer.emit_string(s);
            }
            Constant::Type(sig) => {
                writer.emit_u8(0x0E);
                sig.encode(writer);
            }
            Constant::Array(items) => {
                writer.emit_u8(0x0F);
                writer.emit_seq(items, |w, c| c.encode(w));
            }
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let offset = reader.position();
        let tag = reader.read_u8()?;
        Ok(match tag {
            0x00 => Constant::Null,
            0x01 => Constant::Bool(reader.read_bool()?),
            0x02 => Constant::Char(reader.read_u16()?),
            0x03 => Constant::I8(reader.read_u8()? as i8),
            0x04 => Constant::U8(reader.read_u8()?),
            0x05 => Constant::I16(reader.read_u16()? as i16),
            0x06 => Constant::U16(reader.read_u16()?),
            0x07 => Constant::I32(reader.read_i32()?),
            0x08 => Constant::U32(reader.read_u32()?),
            0x09 => Constant::I64(reader.read_i64()?),
            0x0A => Constant::U64(reader.read_u64()?),
            0x0B => Constant::F32(reader.read_f32()?),
            0x0C => Constant::F64(reader.read_f64()?),
            0x0D => Constant::String(reader.read_string()?),
            0x0E => Constant::Type(TypeSig::decode(reader)?),
            0x0F => Constant::Array(reader.read_seq(Constant::decode)?),
            _ => {
                return Err(DecodeError::InvalidTag {
                    what: "constant",
                    tag,
                    offset,
                })
            }
        })
    }
}

/// Custom attribute attached to a type or member
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttribute {
    /// Type of the attribute
    pub attribute_type: TypeRef,
    /// Positional constructor arguments
    pub args: Vec<Constant>,
}

impl CustomAttribute {
    /// Create an attribute instance
    pub fn new(attribute_type: TypeRef, args: Vec<Constant>) -> Self {
        Self {
            attribute_type,
            args,
        }
    }

    /// Attribute with a type name in the referencing module's own scope
    pub fn named(full_name: &str, args: Vec<Constant>) -> Self {
        Self::new(TypeRef::parse(None, full_name), args)
    }

    /// Full name of the attribute type
    pub fn full_name(&self) -> String {
        self.attribute_type.full_name()
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        self.attribute_type.encode(writer);
        writer.emit_seq(&self.args, |w, c| c.encode(w));
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            attribute_type: TypeRef::decode(reader)?,
            args: reader.read_seq(Constant::decode)?,
        })
    }
}

fn find_attribute<'a>(attrs: &'a [CustomAttribute], full_name: &str) -> Option<&'a CustomAttribute> {
    attrs.iter().find(|a| a.full_name() == full_name)
}

/// Field definition
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field attributes, see [`field_attrs`]
    pub flags: u32,
    /// Declared type
    pub field_type: TypeSig,
    /// Custom attributes
    pub attributes: Vec<CustomAttribute>,
}

impl FieldDef {
    /// Create a field definition
    pub fn new(name: &str, flags: u32, field_type: TypeSig) -> Self {
        Self {
            name: name.to_string(),
            flags,
            field_type,
            attributes: Vec::new(),
        }
    }

    /// Check if the field is static
    pub fn is_static(&self) -> bool {
        self.flags & field_attrs::STATIC != 0
    }

    /// Check for the compiler-generated marker attribute
    pub fn is_compiler_generated(&self) -> bool {
        find_attribute(&self.attributes, COMPILER_GENERATED_ATTRIBUTE).is_some()
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_u32(self.flags);
        self.field_type.encode(writer);
        writer.emit_seq(&self.attributes, |w, a| a.encode(w));
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            name: reader.read_string()?,
            flags: reader.read_u32()?,
            field_type: TypeSig::decode(reader)?,
            attributes: reader.read_seq(CustomAttribute::decode)?,
        })
    }
}

/// Method parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub param_type: TypeSig,
}

impl ParamDef {
    /// Create a parameter
    pub fn new(name: &str, param_type: TypeSig) -> Self {
        Self {
            name: name.to_string(),
            param_type,
        }
    }
}

/// Method body
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodBody {
    /// Declared evaluation stack depth
    pub max_stack: u16,
    /// Local variable types, indexed by slot
    pub locals: Vec<TypeSig>,
    /// Zero-initialize locals on entry
    pub init_locals: bool,
    /// Instruction sequence; branch operands index into it
    pub instructions: Vec<Instruction>,
}

impl MethodBody {
    /// Body without locals
    pub fn new(instructions: Vec<Instruction>, max_stack: u16) -> Self {
        Self {
            max_stack,
            locals: Vec::new(),
            init_locals: false,
            instructions,
        }
    }

    /// Insert instructions before index `at`
    ///
    /// Branch targets at or after `at` in the existing instructions are
    /// shifted so that they keep pointing at the same instruction. The
    /// inserted block must not branch outside itself.
    pub fn insert(&mut self, at: usize, block: Vec<Instruction>) {
        let count = block.len();
        for instr in &mut self.instructions {
            if let Operand::Branch(target) = &mut instr.operand {
                if *target >= at {
                    *target += count;
                }
            }
        }
        self.instructions.splice(at..at, block);
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u16(self.max_stack);
        writer.emit_bool(self.init_locals);
        writer.emit_seq(&self.locals, |w, l| l.encode(w));
        writer.emit_seq(&self.instructions, |w, i| i.encode(w));
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            max_stack: reader.read_u16()?,
            init_locals: reader.read_bool()?,
            locals: reader.read_seq(TypeSig::decode)?,
            instructions: reader.read_seq(Instruction::decode)?,
        })
    }
}

/// Method definition
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Method attributes, see [`method_attrs`]
    pub flags: u32,
    /// Return type
    pub return_type: TypeSig,
    /// Declared parameters, excluding `this`
    pub parameters: Vec<ParamDef>,
    /// Names of the method's own generic parameters
    pub generic_params: Vec<String>,
    /// Custom attributes
    pub attributes: Vec<CustomAttribute>,
    /// Body, or `None` for abstract and extern methods
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// Create a method without parameters or body
    pub fn new(name: &str, flags: u32, return_type: TypeSig) -> Self {
        Self {
            name: name.to_string(),
            flags,
            return_type,
            parameters: Vec::new(),
            generic_params: Vec::new(),
            attributes: Vec::new(),
            body: None,
        }
    }

    /// Access bits of the flags
    pub fn access(&self) -> u32 {
        self.flags & method_attrs::ACCESS_MASK
    }

    /// Check if the method is static
    pub fn is_static(&self) -> bool {
        self.flags & method_attrs::STATIC != 0
    }

    /// Check if the method is virtual
    pub fn is_virtual(&self) -> bool {
        self.flags & method_attrs::VIRTUAL != 0
    }

    /// Check if the method introduces a new virtual slot
    pub fn is_new_slot(&self) -> bool {
        self.flags & method_attrs::NEW_SLOT != 0
    }

    /// Check if the method is abstract
    pub fn is_abstract(&self) -> bool {
        self.flags & method_attrs::ABSTRACT != 0
    }

    /// Virtual method that overrides an inherited slot
    pub fn is_override(&self) -> bool {
        self.is_virtual() && !self.is_new_slot()
    }

    /// Instance constructor
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME && !self.is_static()
    }

    /// Check if the access bits are compiler-controlled
    pub fn is_compiler_controlled(&self) -> bool {
        self.access() == method_attrs::COMPILER_CONTROLLED
    }

    /// Check for the compiler-generated marker attribute
    pub fn is_compiler_generated(&self) -> bool {
        self.has_attribute(COMPILER_GENERATED_ATTRIBUTE)
    }

    /// Check for an attribute by full type name
    pub fn has_attribute(&self, full_name: &str) -> bool {
        find_attribute(&self.attributes, full_name).is_some()
    }

    /// Number of argument slots, including `this`
    pub fn arg_count(&self) -> usize {
        self.parameters.len() + usize::from(!self.is_static())
    }

    /// Check parameter types by full name
    pub fn parameters_match(&self, param_type_names: &[&str]) -> bool {
        self.parameters.len() == param_type_names.len()
            && self
                .parameters
                .iter()
                .zip(param_type_names)
                .all(|(p, name)| p.param_type.full_name() == *name)
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_u32(self.flags);
        self.return_type.encode(writer);
        writer.emit_seq(&self.parameters, |w, p| {
            w.emit_string(&p.name);
            p.param_type.encode(w);
        });
        writer.emit_seq(&self.generic_params, |w, g| w.emit_string(g));
        writer.emit_seq(&self.attributes, |w, a| a.encode(w));
        match &self.body {
            Some(body) => {
                writer.emit_bool(true);
                body.encode(writer);
            }
            None => writer.emit_bool(false),
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let flags = reader.read_u32()?;
        let return_type = TypeSig::decode(reader)?;
        let parameters = reader.read_seq(|r| {
            Ok(ParamDef {
                name: r.read_string()?,
                param_type: TypeSig::decode(r)?,
            })
        })?;
        let generic_params = reader.read_seq(BytecodeReader::read_string)?;
        let attributes = reader.read_seq(CustomAttribute::decode)?;
        let body = if reader.read_bool()? {
            Some(MethodBody::decode(reader)?)
        } else {
            None
        };
        Ok(Self {
            name,
            flags,
            return_type,
            parameters,
            generic_params,
            attributes,
            body,
        })
    }
}

/// Property definition
///
/// Accessors are stored as indices into the declaring type's method table.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    /// Property name
    pub name: String,
    /// Property value type
    pub property_type: TypeSig,
    /// Getter method index
    pub getter: Option<usize>,
    /// Setter method index
    pub setter: Option<usize>,
    /// Custom attributes
    pub attributes: Vec<CustomAttribute>,
}

impl PropertyDef {
    /// Create a property without accessors
    pub fn new(name: &str, property_type: TypeSig) -> Self {
        Self {
            name: name.to_string(),
            property_type,
            getter: None,
            setter: None,
            attributes: Vec::new(),
        }
    }

    /// First attribute with the given full type name
    pub fn find_attribute(&self, full_name: &str) -> Option<&CustomAttribute> {
        find_attribute(&self.attributes, full_name)
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        self.property_type.encode(writer);
        for accessor in [self.getter, self.setter] {
            // u32::MAX marks a missing accessor
            writer.emit_u32(accessor.map_or(u32::MAX, |i| i as u32));
        }
        writer.emit_seq(&self.attributes, |w, a| a.encode(w));
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let accessor = |raw: u32| (raw != u32::MAX).then_some(raw as usize);
        Ok(Self {
            name: reader.read_string()?,
            property_type: TypeSig::decode(reader)?,
            getter: accessor(reader.read_u32()?),
            setter: accessor(reader.read_u32()?),
            attributes: reader.read_seq(CustomAttribute::decode)?,
        })
    }
}

/// Type definition
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    /// Namespace, possibly empty
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Type attributes, see [`type_attrs`]
    pub flags: u32,
    /// Base type; `None` only for the root object type
    pub base_type: Option<TypeSig>,
    /// Names of the type's generic parameters
    pub generic_params: Vec<String>,
    /// Declared fields
    pub fields: Vec<FieldDef>,
    /// Declared methods
    pub methods: Vec<MethodDef>,
    /// Declared properties
    pub properties: Vec<PropertyDef>,
    /// Custom attributes
    pub attributes: Vec<CustomAttribute>,
}

impl TypeDef {
    /// Create an empty type definition
    pub fn new(namespace: &str, name: &str, flags: u32, base_type: Option<TypeSig>) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            flags,
            base_type,
            generic_params: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Namespace-qualified name
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Check if the type is a value type
    pub fn is_value_type(&self) -> bool {
        self.flags & type_attrs::VALUE_TYPE != 0
    }

    /// Field with the given name
    pub fn find_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Index of the first method named `name`
    pub fn find_method(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.name == name)
    }

    /// Indices of all instance constructors
    pub fn constructors(&self) -> impl Iterator<Item = usize> + '_ {
        self.methods
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_constructor())
            .map(|(i, _)| i)
    }

    /// First attribute with the given full type name
    pub fn find_attribute(&self, full_name: &str) -> Option<&CustomAttribute> {
        find_attribute(&self.attributes, full_name)
    }

    /// All attributes of the given type, in declaration order
    pub fn attributes_named<'a>(
        &'a self,
        full_name: &'a str,
    ) -> impl Iterator<Item = &'a CustomAttribute> + 'a {
        self.attributes
            .iter()
            .filter(move |a| a.full_name() == full_name)
    }

    /// Add a method and return its index
    pub fn add_method(&mut self, method: MethodDef) -> usize {
        self.methods.push(method);
        self.methods.len() - 1
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.namespace);
        writer.emit_string(&self.name);
        writer.emit_u32(self.flags);
        match &self.base_type {
            Some(base) => {
                writer.emit_bool(true);
                base.encode(writer);
            }
            None => writer.emit_bool(false),
        }
        writer.emit_seq(&self.generic_params, |w, g| w.emit_string(g));
        writer.emit_seq(&self.fields, |w, f| f.encode(w));
        writer.emit_seq(&self.methods, |w, m| m.encode(w));
        writer.emit_seq(&self.properties, |w, p| p.encode(w));
        writer.emit_seq(&self.attributes, |w, a| a.encode(w));
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let namespace = reader.read_string()?;
        let name = reader.read_string()?;
        let flags = reader.read_u32()?;
        let base_type = if reader.read_bool()? {
            Some(TypeSig::decode(reader)?)
        } else {
            None
        };
        Ok(Self {
            namespace,
            name,
            flags,
            base_type,
            generic_params: reader.read_seq(BytecodeReader::read_string)?,
            fields: reader.read_seq(FieldDef::decode)?,
            methods: reader.read_seq(MethodDef::decode)?,
            properties: reader.read_seq(PropertyDef::decode)?,
            attributes: reader.read_seq(CustomAttribute::decode)?,
        })
    }
}

/// A loaded semweave module
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Magic number (must be "SWMD")
    pub magic: [u8; 4],
    /// Format version
    pub version: u32,
    /// Module flags
    pub flags: u32,
    /// Module name; other modules use it as the scope of their type references
    pub name: String,
    /// Names of the modules this module refers to
    pub references: Vec<String>,
    /// Type definitions
    pub types: Vec<TypeDef>,
    /// SHA-256 of the payload, filled in by encode/decode
    pub checksum: [u8; 32],
}

impl Module {
    /// Create a new empty module
    pub fn new(name: &str) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            name: name.to_string(),
            references: Vec::new(),
            types: Vec::new(),
            checksum: [0; 32],
        }
    }

    /// Check if the weaver has already processed this module
    pub fn is_instrumented(&self) -> bool {
        self.flags & flags::INSTRUMENTED != 0
    }

    /// Set the instrumented flag
    pub fn mark_instrumented(&mut self) {
        self.flags |= flags::INSTRUMENTED;
    }

    /// Index of the type with the given full name
    pub fn type_index(&self, full_name: &str) -> Option<usize> {
        self.types.iter().position(|t| t.full_name() == full_name)
    }

    /// Type with the given full name
    pub fn find_type(&self, full_name: &str) -> Option<&TypeDef> {
        self.type_index(full_name).map(|i| &self.types[i])
    }

    /// Add a module reference; returns false if already present
    pub fn add_reference(&mut self, scope: &str) -> bool {
        if scope == self.name || self.references.iter().any(|r| r == scope) {
            return false;
        }
        self.references.push(scope.to_string());
        true
    }

    /// Validate module structure
    pub fn validate(&self) -> Result<(), ModuleError> {
        if self.magic != MAGIC {
            return Err(ModuleError::InvalidMagic(self.magic));
        }
        if self.version != VERSION {
            return Err(ModuleError::UnsupportedVersion(self.version));
        }
        for ty in &self.types {
            for prop in &ty.properties {
                for accessor in [prop.getter, prop.setter].into_iter().flatten() {
                    if accessor >= ty.methods.len() {
                        return Err(ModuleError::Malformed(format!(
                            "property {}.{} refers to missing method {}",
                            ty.full_name(),
                            prop.name,
                            accessor
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Encode the module to binary format
    ///
    /// Format:
    /// - Header: magic (4 bytes) + version (u32) + flags (u32) + crc32 (u32) + checksum (32 bytes SHA-256)
    /// - Name
    /// - Reference table
    /// - Type table
    pub fn encode(&self) -> Vec<u8> {
        use sha2::{Digest, Sha256};

        let mut writer = BytecodeWriter::new();
        writer.emit_bytes(&self.magic);
        writer.emit_u32(self.version);
        writer.emit_u32(self.flags);
        let crc32_offset = writer.reserve(4);
        let sha256_offset = writer.reserve(32);

        writer.emit_string(&self.name);
        writer.emit_seq(&self.references, |w, r| w.emit_string(r));
        writer.emit_seq(&self.types, |w, t| t.encode(w));

        let payload = &writer.buffer()[HEADER_SIZE..];
        let crc32 = crc32fast::hash(payload);
        let digest: [u8; 32] = Sha256::digest(payload).into();

        writer.patch_u32(crc32_offset, crc32);
        writer.patch_bytes(sha256_offset, &digest);
        writer.into_bytes()
    }

    /// Decode a module from binary format
    pub fn decode(data: &[u8]) -> Result<Self, ModuleError> {
        use sha2::{Digest, Sha256};

        let mut reader = BytecodeReader::new(data);

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&reader.read_bytes(4)?);
        if magic != MAGIC {
            return Err(ModuleError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(ModuleError::UnsupportedVersion(version));
        }

        let flags = reader.read_u32()?;
        let stored_crc32 = reader.read_u32()?;
        let mut checksum = [0u8; 32];
        checksum.copy_from_slice(&reader.read_bytes(32)?);

        let payload = &data[HEADER_SIZE..];
        let calculated_crc32 = crc32fast::hash(payload);
        if stored_crc32 != calculated_crc32 {
            return Err(ModuleError::ChecksumMismatch {
                expected: stored_crc32,
                actual: calculated_crc32,
            });
        }
        if Sha256::digest(payload).as_slice() != checksum {
            return Err(ModuleError::DigestMismatch);
        }

        let name = reader.read_string()?;
        let references = reader.read_seq(BytecodeReader::read_string)?;
        let types = reader.read_seq(TypeDef::decode)?;

        if reader.has_more() {
            return Err(ModuleError::TrailingBytes(reader.remaining()));
        }

        let module = Self {
            magic,
            version,
            flags,
            name,
            references,
            types,
            checksum,
        };
        module.validate()?;
        Ok(module)
    }
}
