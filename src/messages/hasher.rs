//! Rename-resistant message fingerprints.

use md5::{Digest, Md5};

use crate::{
    abc::{AbcFile, ConstantKind, ConstantRef, ConstantValue, Multiname},
    deobfuscation::is_valid_identifier,
    file::writer::Writer,
    messages::{MessageItem, MessageReference},
    Result,
};

/// Nesting bound for parameterized type names.
const MAX_TYPE_DEPTH: usize = 8;

/// Serializes the shape of a message and its call sites into an MD5 digest.
///
/// Identifiers are only written when they look like real source names, so two builds of
/// the same client that differ in obfuscated names produce the same fingerprint.
///
/// # Examples
///
/// ```rust
/// use swfscope::messages::FingerprintWriter;
///
/// let mut writer = FingerprintWriter::new();
/// writer.write_bool(true);
/// writer.write_str("RoomUserTalkComposer");
/// assert_eq!(writer.finish().len(), 32);
/// ```
#[derive(Debug, Default)]
pub struct FingerprintWriter {
    writer: Writer,
}

impl FingerprintWriter {
    /// An empty fingerprint.
    #[must_use]
    pub fn new() -> Self {
        FingerprintWriter {
            writer: Writer::new(),
        }
    }

    /// Lowercase hex MD5 of everything written so far.
    #[must_use]
    pub fn finish(self) -> String {
        format!("{:x}", Md5::digest(self.writer.data()))
    }

    /// Write a boolean as one byte.
    pub fn write_bool(&mut self, value: bool) {
        self.writer.write_u8(u8::from(value));
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.writer.write_u8(value);
    }

    /// Write a count or rank as a little-endian `u32`.
    pub fn write_count(&mut self, value: usize) {
        self.writer
            .write_le::<u32>(u32::try_from(value).unwrap_or(u32::MAX));
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn write_str(&mut self, value: &str) {
        self.writer.write_string(value);
    }

    /// Write a multiname: `*` for the sentinel, type names structurally, anything else
    /// by its name when that name is a real identifier.
    pub fn write_multiname(&mut self, abc: &AbcFile, index: u32) {
        self.write_multiname_at(abc, index, 0);
    }

    fn write_multiname_at(&mut self, abc: &AbcFile, index: u32, depth: usize) {
        if index == 0 {
            self.write_str("*");
            return;
        }
        match abc.pool.multiname(index) {
            Some(Multiname::TypeName { qname, parameters }) if depth < MAX_TYPE_DEPTH => {
                self.write_multiname_at(abc, *qname, depth + 1);
                self.write_count(parameters.len());
                for &parameter in parameters {
                    self.write_multiname_at(abc, parameter, depth + 1);
                }
            }
            _ => {
                if let Some(name) = abc.pool.multiname_name(index) {
                    if is_valid_identifier(name, true) {
                        self.write_str(name);
                    }
                }
            }
        }
    }

    /// Write a constant's kind and value.
    pub fn write_constant(&mut self, abc: &AbcFile, constant: ConstantRef) {
        self.write_u8(constant.kind as u8);
        match abc.pool.constant(constant) {
            ConstantValue::Undefined => {}
            ConstantValue::Null => self.write_str("null"),
            ConstantValue::Boolean(value) => self.write_bool(value),
            ConstantValue::Integer(value) => self.writer.write_le::<i32>(value),
            ConstantValue::UInteger(value) => self.writer.write_le::<u32>(value),
            ConstantValue::Double(value) => self.writer.write_d64(value),
            ConstantValue::String(value) => self.write_str(value),
            ConstantValue::Namespace(index) => {
                let name = abc.pool.namespace_name(index).unwrap_or_default();
                if constant.kind == ConstantKind::PrivateNs || !is_valid_identifier(name, true) {
                    return;
                }
                self.write_str(name);
            }
        }
    }

    /// Write a method's signature followed by its opcode histogram.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] if the body does not decode.
    pub fn write_method(&mut self, abc: &AbcFile, method: u32) -> Result<()> {
        let owner = abc.method_owner(method);
        let is_constructor = owner.is_some_and(|owner| owner.is_constructor());
        self.write_bool(is_constructor);

        let Some(info) = abc.methods.get(method as usize) else {
            return Err(out_of_bounds_error!());
        };
        if !is_constructor {
            self.write_multiname(abc, info.return_type);
            let name = owner
                .and_then(|owner| {
                    abc.traits_of(owner.container)
                        .get(owner.trait_index?)
                        .map(|entry| entry.name)
                })
                .unwrap_or(0);
            self.write_multiname(abc, name);
        }

        self.write_count(info.parameters.len());
        for parameter in &info.parameters {
            self.write_multiname(abc, parameter.type_name);
            if let Some(name) = parameter.name.and_then(|name| abc.pool.string(name)) {
                if is_valid_identifier(name, true) {
                    self.write_str(name);
                }
            }
            self.write_bool(parameter.is_optional());
            if let Some(default) = parameter.default {
                self.write_constant(abc, default);
            }
        }

        if let Some(body) = abc.body(method) {
            for (op, count) in body.parse_code()?.op_groups() {
                self.write_u8(op.byte());
                self.write_count(count);
            }
        }
        Ok(())
    }

    /// Write a class by its name and the side it was referenced from.
    pub fn write_class(&mut self, abc: &AbcFile, class: usize, is_static: bool) {
        let name = abc.instances.get(class).map_or(0, |instance| instance.name);
        self.write_multiname(abc, name);
        self.write_bool(is_static);
    }

    fn write_reference(
        &mut self,
        abc: &AbcFile,
        reference: &MessageReference,
        outgoing: bool,
    ) -> Result<()> {
        self.write_bool(reference.is_static);
        self.write_count(reference.group_count);
        if let Some(method) = reference.from_method {
            self.write_method(abc, method)?;
        }
        self.write_bool(reference.is_anonymous);
        self.write_count(reference.class_rank);
        self.write_count(reference.method_rank);
        if outgoing {
            self.write_count(reference.instruction_rank);
        }
        if let Some(class) = reference.from_class {
            self.write_class(abc, class, reference.is_static);
        }
        Ok(())
    }
}

/// Fingerprint of `message`.
///
/// A message whose class kept a real name is identified by that name alone; otherwise
/// the shape of every call site is digested.
///
/// # Errors
/// Returns [`crate::Error::Corrupt`] if a referencing body does not decode.
pub(crate) fn hash_message(abc: &AbcFile, message: &MessageItem) -> Result<String> {
    let mut writer = FingerprintWriter::new();
    writer.write_bool(message.is_outgoing());

    if let Some(name) = abc.class_name(message.class) {
        if is_valid_identifier(name, true) {
            writer.write_str(name);
            return Ok(writer.finish());
        }
    }

    writer.write_count(message.references.len());
    for reference in &message.references {
        writer.write_reference(abc, reference, message.is_outgoing())?;
    }
    Ok(writer.finish())
}
