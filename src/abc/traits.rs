//! Traits: the named members of classes, instances, scripts and activation scopes.

use bitflags::bitflags;
use strum::{Display, FromRepr};

use crate::{
    abc::pool::{ConstantKind, ConstantRef},
    file::{parser::Parser, writer::Writer},
    Result,
};

/// Low nibble of a trait's kind byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum TraitKind {
    Slot = 0,
    Method = 1,
    Getter = 2,
    Setter = 3,
    Class = 4,
    Function = 5,
    Const = 6,
}

bitflags! {
    /// High nibble of a trait's kind byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TraitAttributes: u8 {
        /// Cannot be overridden
        const FINAL = 0x1;
        /// Overrides a base class member
        const OVERRIDE = 0x2;
        /// A metadata index list follows the trait data
        const METADATA = 0x4;
    }
}

/// Kind specific payload of a trait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraitData {
    /// `Slot` and `Const` traits
    Slot {
        /// Multiname index of the declared type, 0 for `*`
        type_name: u32,
        /// Initial value, absent when the value index is 0
        value: Option<ConstantRef>,
    },
    /// `Class` traits
    Class {
        /// Index into the class table
        class: u32,
    },
    /// `Function` traits
    Function {
        /// Index into the method table
        function: u32,
    },
    /// `Method`, `Getter` and `Setter` traits
    Method {
        /// Index into the method table
        method: u32,
    },
}

/// A named member declared on a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trait {
    /// Multiname index of the member name
    pub name: u32,
    /// Member kind
    pub kind: TraitKind,
    /// Attribute bits
    pub attributes: TraitAttributes,
    /// Slot id for data traits, dispatch id for method traits
    pub id: u32,
    /// Kind specific payload
    pub data: TraitData,
    /// Metadata indices, written only when [`TraitAttributes::METADATA`] is set
    pub metadata: Vec<u32>,
}

impl Trait {
    /// Method index of a method, getter, setter or function trait.
    #[must_use]
    pub fn method(&self) -> Option<u32> {
        match self.data {
            TraitData::Method { method } => Some(method),
            TraitData::Function { function } => Some(function),
            _ => None,
        }
    }

    /// Declared type of a slot or const trait.
    #[must_use]
    pub fn type_name(&self) -> Option<u32> {
        match self.data {
            TraitData::Slot { type_name, .. } => Some(type_name),
            _ => None,
        }
    }

    /// Decode one trait.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] for unknown kinds and
    /// [`crate::Error::OutOfBounds`] for truncated input.
    pub fn read(parser: &mut Parser) -> Result<Self> {
        let name = parser.read_u30()?;
        let kind_byte = parser.read_le::<u8>()?;
        let Some(kind) = TraitKind::from_repr(kind_byte & 0x0F) else {
            return Err(corrupt_error!("Unknown trait kind - {:#04x}", kind_byte));
        };
        let attributes = TraitAttributes::from_bits_retain(kind_byte >> 4);

        let id = parser.read_u30()?;
        let data = match kind {
            TraitKind::Slot | TraitKind::Const => {
                let type_name = parser.read_u30()?;
                let index = parser.read_u30()?;
                let value = if index == 0 {
                    None
                } else {
                    let kind = ConstantKind::from_byte(parser.read_le::<u8>()?)?;
                    Some(ConstantRef { kind, index })
                };
                TraitData::Slot { type_name, value }
            }
            TraitKind::Class => TraitData::Class {
                class: parser.read_u30()?,
            },
            TraitKind::Function => TraitData::Function {
                function: parser.read_u30()?,
            },
            TraitKind::Method | TraitKind::Getter | TraitKind::Setter => TraitData::Method {
                method: parser.read_u30()?,
            },
        };

        let mut metadata = Vec::new();
        if attributes.contains(TraitAttributes::METADATA) {
            for _ in 0..parser.read_u30()? {
                metadata.push(parser.read_u30()?);
            }
        }

        Ok(Trait {
            name,
            kind,
            attributes,
            id,
            data,
            metadata,
        })
    }

    /// Encode this trait.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(&self, writer: &mut Writer) {
        writer.write_u30(self.name);
        writer.write_u8((self.attributes.bits() << 4) | self.kind as u8);
        writer.write_u30(self.id);
        match &self.data {
            TraitData::Slot { type_name, value } => {
                writer.write_u30(*type_name);
                match value {
                    Some(constant) => {
                        writer.write_u30(constant.index);
                        writer.write_u8(constant.kind as u8);
                    }
                    None => writer.write_u30(0),
                }
            }
            TraitData::Class { class } => writer.write_u30(*class),
            TraitData::Function { function } => writer.write_u30(*function),
            TraitData::Method { method } => writer.write_u30(*method),
        }

        if self.attributes.contains(TraitAttributes::METADATA) {
            writer.write_u30(self.metadata.len() as u32);
            for index in &self.metadata {
                writer.write_u30(*index);
            }
        }
    }
}

/// Decode a `u30` counted list of traits.
///
/// # Errors
/// Propagates errors from [`Trait::read`].
pub fn read_traits(parser: &mut Parser) -> Result<Vec<Trait>> {
    let count = parser.read_u30()?;
    let mut traits = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        traits.push(Trait::read(parser)?);
    }
    Ok(traits)
}

/// Encode a `u30` counted list of traits.
#[allow(clippy::cast_possible_truncation)]
pub fn write_traits(traits: &[Trait], writer: &mut Writer) {
    writer.write_u30(traits.len() as u32);
    for entry in traits {
        entry.write(writer);
    }
}
