//! Multiname entries of the constant pool.

use strum::{Display, FromRepr};

use crate::{
    file::{parser::Parser, writer::Writer},
    Result,
};

/// Kind byte of a multiname entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum MultinameKind {
    QName = 0x07,
    QNameA = 0x0D,
    RTQName = 0x0F,
    RTQNameA = 0x10,
    RTQNameL = 0x11,
    RTQNameLA = 0x12,
    Multiname = 0x09,
    MultinameA = 0x0E,
    MultinameL = 0x1B,
    MultinameLA = 0x1C,
    TypeName = 0x1D,
}

/// A name reference. Operands are pool indices, never inline strings.
///
/// The `attribute` flag selects the `...A` kinds used for XML attribute names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Multiname {
    /// Namespace and name known statically
    QName {
        /// Namespace index
        namespace: u32,
        /// String index
        name: u32,
        /// Attribute name
        attribute: bool,
    },
    /// Name known statically, namespace taken from the operand stack
    RtqName {
        /// String index
        name: u32,
        /// Attribute name
        attribute: bool,
    },
    /// Namespace and name both taken from the operand stack
    RtqNameL {
        /// Attribute name
        attribute: bool,
    },
    /// Name resolved against a set of namespaces
    Multiname {
        /// String index
        name: u32,
        /// Namespace set index
        namespace_set: u32,
        /// Attribute name
        attribute: bool,
    },
    /// Name taken from the operand stack, resolved against a set of namespaces
    MultinameL {
        /// Namespace set index
        namespace_set: u32,
        /// Attribute name
        attribute: bool,
    },
    /// A parameterized type such as `Vector.<int>`
    TypeName {
        /// Multiname index of the generic base
        qname: u32,
        /// Multiname indices of the type arguments
        parameters: Vec<u32>,
    },
}

impl Multiname {
    /// A plain qualified name.
    #[must_use]
    pub fn qname(namespace: u32, name: u32) -> Self {
        Multiname::QName {
            namespace,
            name,
            attribute: false,
        }
    }

    /// A plain namespace-set name.
    #[must_use]
    pub fn multiname(name: u32, namespace_set: u32) -> Self {
        Multiname::Multiname {
            name,
            namespace_set,
            attribute: false,
        }
    }

    /// The kind byte this entry encodes to.
    #[must_use]
    pub fn kind(&self) -> MultinameKind {
        match self {
            Multiname::QName { attribute: false, .. } => MultinameKind::QName,
            Multiname::QName { attribute: true, .. } => MultinameKind::QNameA,
            Multiname::RtqName { attribute: false, .. } => MultinameKind::RTQName,
            Multiname::RtqName { attribute: true, .. } => MultinameKind::RTQNameA,
            Multiname::RtqNameL { attribute: false } => MultinameKind::RTQNameL,
            Multiname::RtqNameL { attribute: true } => MultinameKind::RTQNameLA,
            Multiname::Multiname { attribute: false, .. } => MultinameKind::Multiname,
            Multiname::Multiname { attribute: true, .. } => MultinameKind::MultinameA,
            Multiname::MultinameL { attribute: false, .. } => MultinameKind::MultinameL,
            Multiname::MultinameL { attribute: true, .. } => MultinameKind::MultinameLA,
            Multiname::TypeName { .. } => MultinameKind::TypeName,
        }
    }

    /// String index of the local name, if it is known statically.
    #[must_use]
    pub fn name_index(&self) -> Option<u32> {
        match self {
            Multiname::QName { name, .. }
            | Multiname::RtqName { name, .. }
            | Multiname::Multiname { name, .. } => Some(*name),
            _ => None,
        }
    }

    /// Repoint the local name. Kinds without a static name are left untouched.
    pub fn set_name_index(&mut self, index: u32) {
        match self {
            Multiname::QName { name, .. }
            | Multiname::RtqName { name, .. }
            | Multiname::Multiname { name, .. } => *name = index,
            _ => {}
        }
    }

    /// Namespace index of a qualified name.
    #[must_use]
    pub fn namespace_index(&self) -> Option<u32> {
        match self {
            Multiname::QName { namespace, .. } => Some(*namespace),
            _ => None,
        }
    }

    /// Namespace set index of an unqualified name.
    #[must_use]
    pub fn namespace_set_index(&self) -> Option<u32> {
        match self {
            Multiname::Multiname { namespace_set, .. }
            | Multiname::MultinameL { namespace_set, .. } => Some(*namespace_set),
            _ => None,
        }
    }

    /// Number of operand stack entries consumed at runtime to complete this name.
    #[must_use]
    pub fn runtime_pops(&self) -> u32 {
        match self {
            Multiname::RtqName { .. } | Multiname::MultinameL { .. } => 1,
            Multiname::RtqNameL { .. } => 2,
            _ => 0,
        }
    }

    /// Decode one multiname entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] for unknown kinds.
    pub fn read(parser: &mut Parser) -> Result<Self> {
        let kind_byte = parser.read_le::<u8>()?;
        let Some(kind) = MultinameKind::from_repr(kind_byte) else {
            return Err(corrupt_error!("Unknown multiname kind - {:#04x}", kind_byte));
        };

        let multiname = match kind {
            MultinameKind::QName | MultinameKind::QNameA => Multiname::QName {
                namespace: parser.read_u30()?,
                name: parser.read_u30()?,
                attribute: kind == MultinameKind::QNameA,
            },
            MultinameKind::RTQName | MultinameKind::RTQNameA => Multiname::RtqName {
                name: parser.read_u30()?,
                attribute: kind == MultinameKind::RTQNameA,
            },
            MultinameKind::RTQNameL | MultinameKind::RTQNameLA => Multiname::RtqNameL {
                attribute: kind == MultinameKind::RTQNameLA,
            },
            MultinameKind::Multiname | MultinameKind::MultinameA => Multiname::Multiname {
                name: parser.read_u30()?,
                namespace_set: parser.read_u30()?,
                attribute: kind == MultinameKind::MultinameA,
            },
            MultinameKind::MultinameL | MultinameKind::MultinameLA => Multiname::MultinameL {
                namespace_set: parser.read_u30()?,
                attribute: kind == MultinameKind::MultinameLA,
            },
            MultinameKind::TypeName => {
                let qname = parser.read_u30()?;
                let count = parser.read_u30()?;
                let mut parameters = Vec::with_capacity(count.min(16) as usize);
                for _ in 0..count {
                    parameters.push(parser.read_u30()?);
                }
                Multiname::TypeName { qname, parameters }
            }
        };

        Ok(multiname)
    }

    /// Encode this entry in declaration order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(&self, writer: &mut Writer) {
        writer.write_u8(self.kind() as u8);
        match self {
            Multiname::QName {
                namespace, name, ..
            } => {
                writer.write_u30(*namespace);
                writer.write_u30(*name);
            }
            Multiname::RtqName { name, .. } => writer.write_u30(*name),
            Multiname::RtqNameL { .. } => {}
            Multiname::Multiname {
                name,
                namespace_set,
                ..
            } => {
                writer.write_u30(*name);
                writer.write_u30(*namespace_set);
            }
            Multiname::MultinameL { namespace_set, .. } => writer.write_u30(*namespace_set),
            Multiname::TypeName { qname, parameters } => {
                writer.write_u30(*qname);
                writer.write_u30(parameters.len() as u32);
                for parameter in parameters {
                    writer.write_u30(*parameter);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_roundtrip() {
        let entries = [
            Multiname::qname(1, 2),
            Multiname::QName {
                namespace: 1,
                name: 2,
                attribute: true,
            },
            Multiname::RtqName {
                name: 3,
                attribute: false,
            },
            Multiname::RtqNameL { attribute: true },
            Multiname::multiname(4, 1),
            Multiname::MultinameL {
                namespace_set: 1,
                attribute: false,
            },
            Multiname::TypeName {
                qname: 1,
                parameters: vec![2, 3],
            },
        ];

        for entry in entries {
            let mut writer = Writer::new();
            entry.write(&mut writer);
            let data = writer.into_inner();
            let decoded = Multiname::read(&mut Parser::new(&data)).unwrap();
            assert_eq!(decoded, entry);
        }
    }

    #[test]
    fn runtime_pops() {
        assert_eq!(Multiname::qname(1, 1).runtime_pops(), 0);
        assert_eq!(Multiname::RtqName { name: 1, attribute: false }.runtime_pops(), 1);
        assert_eq!(Multiname::RtqNameL { attribute: false }.runtime_pops(), 2);
        assert_eq!(
            Multiname::MultinameL {
                namespace_set: 1,
                attribute: false
            }
            .runtime_pops(),
            1
        );
    }

    #[test]
    fn rename() {
        let mut name = Multiname::multiname(4, 1);
        name.set_name_index(9);
        assert_eq!(name.name_index(), Some(9));

        let mut late = Multiname::RtqNameL { attribute: false };
        late.set_name_index(9);
        assert_eq!(late.name_index(), None);
    }

    #[test]
    fn unknown_kind() {
        let data = [0x42, 0x00];
        assert!(Multiname::read(&mut Parser::new(&data)).is_err());
    }
}
