//! Instance, class and script definitions.

use bitflags::bitflags;

use crate::{
    abc::traits::{read_traits, write_traits, Trait},
    file::{parser::Parser, writer::Writer},
    Result,
};

bitflags! {
    /// Flags byte of an instance definition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClassFlags: u8 {
        /// No dynamic properties may be added
        const SEALED = 0x01;
        /// Cannot be subclassed
        const FINAL = 0x02;
        /// Declares an interface
        const INTERFACE = 0x04;
        /// A protected namespace index follows the flags
        const PROTECTED_NS = 0x08;
    }
}

/// The instance side of a class (`instance_info`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Multiname index of the class name
    pub name: u32,
    /// Multiname index of the base class, 0 for none
    pub super_name: u32,
    /// Definition flags
    pub flags: ClassFlags,
    /// Namespace index of the protected namespace
    pub protected_namespace: Option<u32>,
    /// Multiname indices of the implemented interfaces
    pub interfaces: Vec<u32>,
    /// Method index of the constructor
    pub initializer: u32,
    /// Instance members
    pub traits: Vec<Trait>,
}

impl Instance {
    /// Returns true if this definition declares an interface.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags.contains(ClassFlags::INTERFACE)
    }

    /// Decode one instance definition.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated input.
    pub fn read(parser: &mut Parser) -> Result<Self> {
        let name = parser.read_u30()?;
        let super_name = parser.read_u30()?;
        let flags = ClassFlags::from_bits_retain(parser.read_le::<u8>()?);
        let protected_namespace = if flags.contains(ClassFlags::PROTECTED_NS) {
            Some(parser.read_u30()?)
        } else {
            None
        };

        let interface_count = parser.read_u30()?;
        let mut interfaces = Vec::with_capacity(interface_count.min(64) as usize);
        for _ in 0..interface_count {
            interfaces.push(parser.read_u30()?);
        }

        Ok(Instance {
            name,
            super_name,
            flags,
            protected_namespace,
            interfaces,
            initializer: parser.read_u30()?,
            traits: read_traits(parser)?,
        })
    }

    /// Encode this definition.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(&self, writer: &mut Writer) {
        writer.write_u30(self.name);
        writer.write_u30(self.super_name);
        writer.write_u8(self.flags.bits());
        if self.flags.contains(ClassFlags::PROTECTED_NS) {
            writer.write_u30(self.protected_namespace.unwrap_or(0));
        }
        writer.write_u30(self.interfaces.len() as u32);
        for interface in &self.interfaces {
            writer.write_u30(*interface);
        }
        writer.write_u30(self.initializer);
        write_traits(&self.traits, writer);
    }
}

/// The static side of a class (`class_info`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Class {
    /// Method index of the static initializer
    pub initializer: u32,
    /// Static members
    pub traits: Vec<Trait>,
}

impl Class {
    /// Decode one class definition.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated input.
    pub fn read(parser: &mut Parser) -> Result<Self> {
        Ok(Class {
            initializer: parser.read_u30()?,
            traits: read_traits(parser)?,
        })
    }

    /// Encode this definition.
    pub fn write(&self, writer: &mut Writer) {
        writer.write_u30(self.initializer);
        write_traits(&self.traits, writer);
    }
}

/// A script entry point (`script_info`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    /// Method index of the script initializer
    pub initializer: u32,
    /// Global members
    pub traits: Vec<Trait>,
}

impl Script {
    /// Decode one script definition.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated input.
    pub fn read(parser: &mut Parser) -> Result<Self> {
        Ok(Script {
            initializer: parser.read_u30()?,
            traits: read_traits(parser)?,
        })
    }

    /// Encode this definition.
    pub fn write(&self, writer: &mut Writer) {
        writer.write_u30(self.initializer);
        write_traits(&self.traits, writer);
    }
}
