//! Method signatures and method bodies.

use bitflags::bitflags;

use crate::{
    abc::{
        pool::{ConstantKind, ConstantPool, ConstantRef},
        traits::{read_traits, write_traits, Trait},
    },
    assembly::Code,
    file::{parser::Parser, writer::Writer},
    Result,
};

bitflags! {
    /// Flags byte of a method signature.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodFlags: u8 {
        /// Allocates an `arguments` object
        const NEED_ARGUMENTS = 0x01;
        /// Allocates an activation object
        const NEED_ACTIVATION = 0x02;
        /// Collects extra arguments into a rest array
        const NEED_REST = 0x04;
        /// Optional parameter defaults follow the parameter types
        const HAS_OPTIONAL = 0x08;
        /// Ignores extra arguments
        const IGNORE_REST = 0x10;
        /// Implemented natively
        const NATIVE = 0x20;
        /// Changes the default XML namespace
        const SET_DXNS = 0x40;
        /// Parameter names follow the optional defaults
        const HAS_PARAM_NAMES = 0x80;
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Multiname index of the declared type, 0 for `*`
    pub type_name: u32,
    /// String index of the name, present when the signature carries names
    pub name: Option<u32>,
    /// Default value of an optional parameter
    pub default: Option<ConstantRef>,
}

impl Parameter {
    /// A required, unnamed parameter of the given type.
    #[must_use]
    pub fn new(type_name: u32) -> Self {
        Parameter {
            type_name,
            name: None,
            default: None,
        }
    }

    /// Returns true if the parameter has a default value.
    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.default.is_some()
    }
}

/// A method signature (`method_info`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// Parameters in declaration order
    pub parameters: Vec<Parameter>,
    /// Multiname index of the return type, 0 for `*`
    pub return_type: u32,
    /// String index of the debug name
    pub name: u32,
    /// Signature flags
    pub flags: MethodFlags,
}

impl MethodInfo {
    /// Decode one method signature.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] if more optional values than parameters are
    /// declared, or the input is truncated.
    pub fn read(parser: &mut Parser) -> Result<Self> {
        let param_count = parser.read_u30()? as usize;
        let return_type = parser.read_u30()?;

        let mut parameters = Vec::with_capacity(param_count.min(64));
        for _ in 0..param_count {
            parameters.push(Parameter::new(parser.read_u30()?));
        }

        let name = parser.read_u30()?;
        let flags = MethodFlags::from_bits_retain(parser.read_le::<u8>()?);

        if flags.contains(MethodFlags::HAS_OPTIONAL) {
            let option_count = parser.read_u30()? as usize;
            if option_count > param_count {
                return Err(corrupt_error!(
                    "{} optional values declared for {} parameters",
                    option_count,
                    param_count
                ));
            }
            for parameter in &mut parameters[param_count - option_count..] {
                let index = parser.read_u30()?;
                let kind = ConstantKind::from_byte(parser.read_le::<u8>()?)?;
                parameter.default = Some(ConstantRef { kind, index });
            }
        }

        if flags.contains(MethodFlags::HAS_PARAM_NAMES) {
            for parameter in &mut parameters {
                parameter.name = Some(parser.read_u30()?);
            }
        }

        Ok(MethodInfo {
            parameters,
            return_type,
            name,
            flags,
        })
    }

    /// Encode this signature. The flags decide which optional sections are written.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(&self, writer: &mut Writer) {
        writer.write_u30(self.parameters.len() as u32);
        writer.write_u30(self.return_type);
        for parameter in &self.parameters {
            writer.write_u30(parameter.type_name);
        }
        writer.write_u30(self.name);
        writer.write_u8(self.flags.bits());

        if self.flags.contains(MethodFlags::HAS_OPTIONAL) {
            let defaults: Vec<&ConstantRef> = self
                .parameters
                .iter()
                .filter_map(|p| p.default.as_ref())
                .collect();
            writer.write_u30(defaults.len() as u32);
            for constant in defaults {
                writer.write_u30(constant.index);
                writer.write_u8(constant.kind as u8);
            }
        }

        if self.flags.contains(MethodFlags::HAS_PARAM_NAMES) {
            for parameter in &self.parameters {
                writer.write_u30(parameter.name.unwrap_or(0));
            }
        }
    }
}

/// One entry of a method body's exception table. Offsets are byte positions in the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ExceptionInfo {
    pub from: u32,
    pub to: u32,
    pub target: u32,
    pub exception_type: u32,
    pub variable_name: u32,
}

/// The implementation of a method (`method_body_info`).
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    /// Index of the method this body implements
    pub method: u32,
    /// Maximum operand stack depth
    pub max_stack: u32,
    /// Number of local registers, including `this` and the parameters
    pub local_count: u32,
    /// Scope depth on entry
    pub init_scope_depth: u32,
    /// Maximum scope depth
    pub max_scope_depth: u32,
    /// Raw bytecode
    pub code: Vec<u8>,
    /// Exception ranges
    pub exceptions: Vec<ExceptionInfo>,
    /// Activation traits
    pub traits: Vec<Trait>,
}

impl MethodBody {
    /// Decode one method body.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the code or tables are truncated.
    pub fn read(parser: &mut Parser) -> Result<Self> {
        let method = parser.read_u30()?;
        let max_stack = parser.read_u30()?;
        let local_count = parser.read_u30()?;
        let init_scope_depth = parser.read_u30()?;
        let max_scope_depth = parser.read_u30()?;

        let code_length = parser.read_u30()? as usize;
        let code = parser.read_bytes(code_length)?.to_vec();

        let exception_count = parser.read_u30()?;
        let mut exceptions = Vec::with_capacity(exception_count.min(64) as usize);
        for _ in 0..exception_count {
            exceptions.push(ExceptionInfo {
                from: parser.read_u30()?,
                to: parser.read_u30()?,
                target: parser.read_u30()?,
                exception_type: parser.read_u30()?,
                variable_name: parser.read_u30()?,
            });
        }

        Ok(MethodBody {
            method,
            max_stack,
            local_count,
            init_scope_depth,
            max_scope_depth,
            code,
            exceptions,
            traits: read_traits(parser)?,
        })
    }

    /// Encode this body.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(&self, writer: &mut Writer) {
        writer.write_u30(self.method);
        writer.write_u30(self.max_stack);
        writer.write_u30(self.local_count);
        writer.write_u30(self.init_scope_depth);
        writer.write_u30(self.max_scope_depth);
        writer.write_u30(self.code.len() as u32);
        writer.write_bytes(&self.code);

        writer.write_u30(self.exceptions.len() as u32);
        for exception in &self.exceptions {
            writer.write_u30(exception.from);
            writer.write_u30(exception.to);
            writer.write_u30(exception.target);
            writer.write_u30(exception.exception_type);
            writer.write_u30(exception.variable_name);
        }

        write_traits(&self.traits, writer);
    }

    /// Returns true if the body declares any exception range.
    #[must_use]
    pub fn has_exceptions(&self) -> bool {
        !self.exceptions.is_empty()
    }

    /// Decode the bytecode into a mutable [`Code`] container.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] for unknown opcodes or unresolvable branches.
    pub fn parse_code(&self) -> Result<Code> {
        Code::decode(&self.code)
    }

    /// Re-encode `code` into this body and raise the capacity fields to cover it.
    ///
    /// Capacities are never lowered. Exception offsets are not remapped, so bodies
    /// with exception ranges should only receive code of identical layout.
    ///
    /// # Errors
    /// Returns the errors of [`Code::encode_with_limit`].
    pub fn set_code_with_limit(
        &mut self,
        code: &Code,
        pool: &ConstantPool,
        max_iterations: usize,
    ) -> Result<()> {
        self.code = code.encode_with_limit(max_iterations)?;

        self.max_stack = self.max_stack.max(code.max_stack(pool));
        self.local_count = self.local_count.max(code.max_register().map_or(0, |r| r + 1));
        self.max_scope_depth = self
            .max_scope_depth
            .max(self.init_scope_depth + code.max_scope_depth());
        Ok(())
    }

    /// [`MethodBody::set_code_with_limit`] with the default layout iteration bound.
    ///
    /// # Errors
    /// Returns the errors of [`Code::encode_with_limit`].
    pub fn set_code(&mut self, code: &Code, pool: &ConstantPool) -> Result<()> {
        self.set_code_with_limit(code, pool, Code::MAX_LAYOUT_ITERATIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_with_optional_and_names() {
        let info = MethodInfo {
            parameters: vec![
                Parameter {
                    type_name: 1,
                    name: Some(2),
                    default: None,
                },
                Parameter {
                    type_name: 1,
                    name: Some(3),
                    default: Some(ConstantRef {
                        kind: ConstantKind::True,
                        index: 11,
                    }),
                },
            ],
            return_type: 4,
            name: 0,
            flags: MethodFlags::HAS_OPTIONAL | MethodFlags::HAS_PARAM_NAMES,
        };

        let mut writer = Writer::new();
        info.write(&mut writer);
        let data = writer.into_inner();
        let decoded = MethodInfo::read(&mut Parser::new(&data)).unwrap();
        assert_eq!(decoded, info);
        assert!(decoded.parameters[1].is_optional());
    }

    #[test]
    fn too_many_optionals() {
        // 1 param, HAS_OPTIONAL with 2 values
        let data = [0x01, 0x00, 0x00, 0x00, 0x08, 0x02];
        let error = MethodInfo::read(&mut Parser::new(&data)).unwrap_err();
        assert!(error.is_corrupt());
    }

    #[test]
    fn body_roundtrip_and_capacity() {
        let mut body = MethodBody {
            method: 0,
            max_stack: 1,
            local_count: 1,
            init_scope_depth: 3,
            max_scope_depth: 4,
            code: vec![0xD0, 0x30, 0x47],
            exceptions: Vec::new(),
            traits: Vec::new(),
        };

        let mut writer = Writer::new();
        body.write(&mut writer);
        let data = writer.into_inner();
        let decoded = MethodBody::read(&mut Parser::new(&data)).unwrap();
        assert_eq!(decoded, body);

        // getlocal_0, pushscope, getlocal 4, pushtrue, pushfalse, pop, pop, pop, returnvoid
        let code = Code::decode(&[0xD0, 0x30, 0x62, 0x04, 0x26, 0x27, 0x29, 0x29, 0x29, 0x47])
            .unwrap();
        body.set_code(&code, &ConstantPool::default()).unwrap();
        assert_eq!(body.max_stack, 3);
        assert_eq!(body.local_count, 5);
        assert_eq!(body.max_scope_depth, 4);
    }
}
