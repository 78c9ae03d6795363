//! The ABC constant pool.
//!
//! Every table reserves index 0 as the "undefined / any" sentinel, which is never
//! serialized. A table holding only the sentinel may be declared with a count of 0 or 1;
//! the declared form is written back. Entries are only ever appended, so an index handed
//! out once stays valid for the lifetime of the pool; edits change the value stored at an
//! index, never the index itself.
//!
//! # Examples
//!
//! ```rust
//! use swfscope::abc::{ConstantPool, Multiname, NamespaceKind};
//!
//! let mut pool = ConstantPool::default();
//! let package = pool.add_namespace(NamespaceKind::Package, "com.example");
//! let name = pool.add_string("Widget");
//! let qname = pool.add_multiname(Multiname::qname(package, name));
//!
//! assert_eq!(pool.multiname_name(qname), Some("Widget"));
//! assert_eq!(pool.add_string("Widget"), name);
//! ```

use std::collections::HashMap;

use strum::{Display, FromRepr};

use crate::{
    abc::multiname::Multiname,
    file::{parser::Parser, writer::Writer},
    Result,
};

/// Kind byte of a namespace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum NamespaceKind {
    Private = 0x05,
    Namespace = 0x08,
    Package = 0x16,
    PackageInternal = 0x17,
    Protected = 0x18,
    Explicit = 0x19,
    StaticProtected = 0x1A,
}

/// A namespace: a kind plus a name in the string table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Namespace {
    /// What kind of namespace this is
    pub kind: NamespaceKind,
    /// Index into the string table
    pub name: u32,
}

/// An ordered set of namespace indices, used by unqualified multinames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NamespaceSet {
    /// Indices into the namespace table
    pub namespaces: Vec<u32>,
}

/// Kind byte of a constant value reference (trait initializers and optional parameters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ConstantKind {
    Undefined = 0x00,
    String = 0x01,
    Integer = 0x03,
    UInteger = 0x04,
    PrivateNs = 0x05,
    Double = 0x06,
    Namespace = 0x08,
    False = 0x0A,
    True = 0x0B,
    Null = 0x0C,
    PackageNs = 0x16,
    PackageInternalNs = 0x17,
    ProtectedNs = 0x18,
    ExplicitNs = 0x19,
    StaticProtectedNs = 0x1A,
}

impl ConstantKind {
    /// Decode a constant kind byte.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] for unknown kinds.
    pub fn from_byte(value: u8) -> Result<Self> {
        ConstantKind::from_repr(value)
            .ok_or_else(|| corrupt_error!("Unknown constant kind - {:#04x}", value))
    }
}

/// A constant reference: a kind plus an index into the table that kind selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstantRef {
    /// Which table `index` refers to
    pub kind: ConstantKind,
    /// Index into that table
    pub index: u32,
}

/// A resolved constant value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(missing_docs)]
pub enum ConstantValue<'a> {
    Undefined,
    Null,
    Boolean(bool),
    Integer(i32),
    UInteger(u32),
    Double(f64),
    String(&'a str),
    /// A namespace constant, by namespace index
    Namespace(u32),
}

/// Deduplicated, index-addressed tables referenced throughout an ABC unit.
///
/// Strings that are not valid UTF-8 resolve to a lossy rendition, but their original
/// bytes are what gets encoded.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    integers: Vec<i32>,
    uintegers: Vec<u32>,
    doubles: Vec<f64>,
    strings: Vec<String>,
    raw_strings: HashMap<u32, Box<[u8]>>,
    namespaces: Vec<Namespace>,
    namespace_sets: Vec<NamespaceSet>,
    multinames: Vec<Multiname>,
    // declared counts of tables read with only the sentinel, in encoding order
    empty_counts: [u32; TABLE_COUNT],
}

const TABLE_COUNT: usize = 7;

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool {
            integers: vec![0],
            uintegers: vec![0],
            doubles: vec![f64::NAN],
            strings: vec![String::new()],
            raw_strings: HashMap::new(),
            namespaces: vec![Namespace {
                kind: NamespaceKind::Namespace,
                name: 0,
            }],
            namespace_sets: vec![NamespaceSet::default()],
            multinames: vec![Multiname::qname(0, 0)],
            empty_counts: [0; TABLE_COUNT],
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn next_index<T>(table: &[T]) -> u32 {
    table.len() as u32
}

impl ConstantPool {
    /// Decode the constant pool section of an ABC unit.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] for unknown kinds or dangling indices and
    /// [`crate::Error::OutOfBounds`] for truncated input.
    pub fn read(parser: &mut Parser) -> Result<Self> {
        let mut pool = ConstantPool::default();
        let mut counts = [0; TABLE_COUNT];

        counts[0] = parser.read_u30()?;
        for _ in 1..counts[0] {
            pool.integers.push(parser.read_s32()?);
        }
        counts[1] = parser.read_u30()?;
        for _ in 1..counts[1] {
            pool.uintegers.push(parser.read_u32()?);
        }
        counts[2] = parser.read_u30()?;
        for _ in 1..counts[2] {
            pool.doubles.push(parser.read_d64()?);
        }
        counts[3] = parser.read_u30()?;
        for _ in 1..counts[3] {
            let start = parser.pos();
            let bytes = parser.read_string_bytes()?;
            match std::str::from_utf8(bytes) {
                Ok(value) => pool.strings.push(value.to_string()),
                Err(error) => {
                    log::debug!("Keeping raw bytes of string at offset {start}: {error}");
                    let index = next_index(&pool.strings);
                    pool.raw_strings.insert(index, bytes.into());
                    pool.strings.push(String::from_utf8_lossy(bytes).into_owned());
                }
            }
        }

        counts[4] = parser.read_u30()?;
        for _ in 1..counts[4] {
            let kind_byte = parser.read_le::<u8>()?;
            let Some(kind) = NamespaceKind::from_repr(kind_byte) else {
                return Err(corrupt_error!("Unknown namespace kind - {:#04x}", kind_byte));
            };
            let name = parser.read_u30()?;
            pool.check_string(name)?;
            pool.namespaces.push(Namespace { kind, name });
        }

        counts[5] = parser.read_u30()?;
        for _ in 1..counts[5] {
            let count = parser.read_u30()?;
            let mut namespaces = Vec::with_capacity(count.min(256) as usize);
            for _ in 0..count {
                let namespace = parser.read_u30()?;
                pool.check_namespace(namespace)?;
                namespaces.push(namespace);
            }
            pool.namespace_sets.push(NamespaceSet { namespaces });
        }

        counts[6] = parser.read_u30()?;
        for _ in 1..counts[6] {
            let multiname = Multiname::read(parser)?;
            pool.multinames.push(multiname);
        }
        for multiname in &pool.multinames {
            pool.check_multiname_operands(multiname)?;
        }

        for (declared, count) in pool.empty_counts.iter_mut().zip(counts) {
            *declared = count.min(1);
        }
        Ok(pool)
    }

    /// Encode the constant pool section.
    ///
    /// Tables that only hold the sentinel are written with the count they were read
    /// with, zero for a new pool.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(&self, writer: &mut Writer) {
        let counts = &self.empty_counts;
        let count = |writer: &mut Writer, table: usize, len: usize| {
            if len <= 1 {
                writer.write_u30(counts[table]);
            } else {
                writer.write_u30(len as u32);
            }
        };

        count(writer, 0, self.integers.len());
        for value in &self.integers[1..] {
            writer.write_s32(*value);
        }
        count(writer, 1, self.uintegers.len());
        for value in &self.uintegers[1..] {
            writer.write_u32(*value);
        }
        count(writer, 2, self.doubles.len());
        for value in &self.doubles[1..] {
            writer.write_d64(*value);
        }
        count(writer, 3, self.strings.len());
        for (index, value) in (1..).zip(&self.strings[1..]) {
            match self.raw_strings.get(&index) {
                Some(bytes) => writer.write_string_bytes(bytes),
                None => writer.write_string(value),
            }
        }
        count(writer, 4, self.namespaces.len());
        for namespace in &self.namespaces[1..] {
            writer.write_u8(namespace.kind as u8);
            writer.write_u30(namespace.name);
        }
        count(writer, 5, self.namespace_sets.len());
        for set in &self.namespace_sets[1..] {
            writer.write_u30(next_index(&set.namespaces));
            for namespace in &set.namespaces {
                writer.write_u30(*namespace);
            }
        }
        count(writer, 6, self.multinames.len());
        for multiname in &self.multinames[1..] {
            multiname.write(writer);
        }
    }

    fn check_string(&self, index: u32) -> Result<()> {
        if index as usize >= self.strings.len() {
            return Err(corrupt_error!("String index {} out of range", index));
        }
        Ok(())
    }

    fn check_namespace(&self, index: u32) -> Result<()> {
        if index as usize >= self.namespaces.len() {
            return Err(corrupt_error!("Namespace index {} out of range", index));
        }
        Ok(())
    }

    fn check_multiname_operands(&self, multiname: &Multiname) -> Result<()> {
        if let Some(name) = multiname.name_index() {
            self.check_string(name)?;
        }
        if let Some(namespace) = multiname.namespace_index() {
            self.check_namespace(namespace)?;
        }
        if let Some(set) = multiname.namespace_set_index() {
            if set as usize >= self.namespace_sets.len() {
                return Err(corrupt_error!("Namespace set index {} out of range", set));
            }
        }
        if let Multiname::TypeName { qname, parameters } = multiname {
            for index in std::iter::once(qname).chain(parameters) {
                self.check_multiname(*index)?;
            }
        }
        Ok(())
    }

    /// Verify that `index` addresses an existing multiname.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] if it does not.
    pub fn check_multiname(&self, index: u32) -> Result<()> {
        if index as usize >= self.multinames.len() {
            return Err(corrupt_error!("Multiname index {} out of range", index));
        }
        Ok(())
    }

    /// Signed integer table, sentinel included.
    #[must_use]
    pub fn integers(&self) -> &[i32] {
        &self.integers
    }

    /// Unsigned integer table, sentinel included.
    #[must_use]
    pub fn uintegers(&self) -> &[u32] {
        &self.uintegers
    }

    /// Double table, sentinel included.
    #[must_use]
    pub fn doubles(&self) -> &[f64] {
        &self.doubles
    }

    /// String table, sentinel included.
    #[must_use]
    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    /// Namespace table, sentinel included.
    #[must_use]
    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    /// Namespace set table, sentinel included.
    #[must_use]
    pub fn namespace_sets(&self) -> &[NamespaceSet] {
        &self.namespace_sets
    }

    /// Multiname table, sentinel included.
    #[must_use]
    pub fn multinames(&self) -> &[Multiname] {
        &self.multinames
    }

    /// Signed integer at `index`; the sentinel and missing entries yield `None`.
    #[must_use]
    pub fn int(&self, index: u32) -> Option<i32> {
        self.integers.get(index as usize).filter(|_| index != 0).copied()
    }

    /// Unsigned integer at `index`.
    #[must_use]
    pub fn uint(&self, index: u32) -> Option<u32> {
        self.uintegers.get(index as usize).filter(|_| index != 0).copied()
    }

    /// Double at `index`.
    #[must_use]
    pub fn double(&self, index: u32) -> Option<f64> {
        self.doubles.get(index as usize).filter(|_| index != 0).copied()
    }

    /// String at `index`.
    #[must_use]
    pub fn string(&self, index: u32) -> Option<&str> {
        self.strings
            .get(index as usize)
            .filter(|_| index != 0)
            .map(String::as_str)
    }

    /// Namespace at `index`.
    #[must_use]
    pub fn namespace(&self, index: u32) -> Option<&Namespace> {
        self.namespaces.get(index as usize).filter(|_| index != 0)
    }

    /// Mutable namespace at `index`.
    pub fn namespace_mut(&mut self, index: u32) -> Option<&mut Namespace> {
        if index == 0 {
            return None;
        }
        self.namespaces.get_mut(index as usize)
    }

    /// Name of the namespace at `index`.
    #[must_use]
    pub fn namespace_name(&self, index: u32) -> Option<&str> {
        self.namespace(index).and_then(|ns| self.string(ns.name))
    }

    /// Namespace set at `index`.
    #[must_use]
    pub fn namespace_set(&self, index: u32) -> Option<&NamespaceSet> {
        self.namespace_sets.get(index as usize).filter(|_| index != 0)
    }

    /// Multiname at `index`; the sentinel resolves to `None`.
    #[must_use]
    pub fn multiname(&self, index: u32) -> Option<&Multiname> {
        self.multinames.get(index as usize).filter(|_| index != 0)
    }

    /// Mutable multiname at `index`.
    pub fn multiname_mut(&mut self, index: u32) -> Option<&mut Multiname> {
        if index == 0 {
            return None;
        }
        self.multinames.get_mut(index as usize)
    }

    /// Local name of the multiname at `index`.
    ///
    /// A `TypeName` resolves to the name of its generic base. Runtime names have none.
    #[must_use]
    pub fn multiname_name(&self, index: u32) -> Option<&str> {
        match self.multiname(index)? {
            Multiname::TypeName { qname, .. } => self.multiname_name(*qname),
            multiname => self.string(multiname.name_index()?),
        }
    }

    /// Namespace name of a qualified multiname.
    #[must_use]
    pub fn multiname_namespace_name(&self, index: u32) -> Option<&str> {
        let namespace = self.multiname(index)?.namespace_index()?;
        self.namespace_name(namespace)
    }

    /// Extra operand stack entries an instruction referencing `index` pops at runtime.
    #[must_use]
    pub fn multiname_runtime_pops(&self, index: u32) -> u32 {
        self.multinames
            .get(index as usize)
            .map_or(0, Multiname::runtime_pops)
    }

    /// All multiname indices whose local name equals `name`, in pool order.
    pub fn multiname_indices<'a>(&'a self, name: &'a str) -> impl Iterator<Item = u32> + 'a {
        (1..next_index(&self.multinames))
            .filter(move |&index| self.multiname_name(index) == Some(name))
    }

    /// First multiname index whose local name equals `name`.
    #[must_use]
    pub fn multiname_index(&self, name: &str) -> Option<u32> {
        self.multiname_indices(name).next()
    }

    /// Resolve a constant reference as used by trait initializers and optional parameters.
    #[must_use]
    pub fn constant(&self, constant: ConstantRef) -> ConstantValue<'_> {
        let ConstantRef { kind, index } = constant;
        match kind {
            ConstantKind::Undefined => ConstantValue::Undefined,
            ConstantKind::Null => ConstantValue::Null,
            ConstantKind::True => ConstantValue::Boolean(true),
            ConstantKind::False => ConstantValue::Boolean(false),
            ConstantKind::Integer => ConstantValue::Integer(self.int(index).unwrap_or(0)),
            ConstantKind::UInteger => ConstantValue::UInteger(self.uint(index).unwrap_or(0)),
            ConstantKind::Double => {
                ConstantValue::Double(self.double(index).unwrap_or(f64::NAN))
            }
            ConstantKind::String => ConstantValue::String(self.string(index).unwrap_or("")),
            ConstantKind::PrivateNs
            | ConstantKind::Namespace
            | ConstantKind::PackageNs
            | ConstantKind::PackageInternalNs
            | ConstantKind::ProtectedNs
            | ConstantKind::ExplicitNs
            | ConstantKind::StaticProtectedNs => ConstantValue::Namespace(index),
        }
    }

    /// Overwrite the string stored at `index`.
    ///
    /// Every reference to `index` observes the new value.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for the sentinel or a missing entry.
    pub fn set_string(&mut self, index: u32, value: impl Into<String>) -> Result<()> {
        if index == 0 {
            return Err(out_of_bounds_error!());
        }
        let slot = self
            .strings
            .get_mut(index as usize)
            .ok_or(out_of_bounds_error!())?;
        *slot = value.into();
        self.raw_strings.remove(&index);
        Ok(())
    }

    /// Original bytes of the string at `index` when they are not valid UTF-8.
    #[must_use]
    pub fn raw_string(&self, index: u32) -> Option<&[u8]> {
        self.raw_strings.get(&index).map(AsRef::as_ref)
    }

    /// Index of `value` in the string table, appending it when absent.
    ///
    /// Entries kept as raw bytes never match, since `value` is valid UTF-8 and they are not.
    pub fn add_string(&mut self, value: &str) -> u32 {
        let found = (1..next_index(&self.strings)).find(|index| {
            !self.raw_strings.contains_key(index) && self.strings[*index as usize] == value
        });
        match found {
            Some(index) => index,
            None => self.push_string(value),
        }
    }

    /// Append `value` to the string table even if an equal entry exists.
    pub fn push_string(&mut self, value: &str) -> u32 {
        let index = next_index(&self.strings);
        self.strings.push(value.to_string());
        index
    }

    /// Index of `value` in the integer table, appending it when absent.
    pub fn add_int(&mut self, value: i32) -> u32 {
        match self.integers[1..].iter().position(|v| *v == value) {
            Some(position) => next_index(&self.integers[..=position]),
            None => {
                let index = next_index(&self.integers);
                self.integers.push(value);
                index
            }
        }
    }

    /// Index of `value` in the unsigned integer table, appending it when absent.
    pub fn add_uint(&mut self, value: u32) -> u32 {
        match self.uintegers[1..].iter().position(|v| *v == value) {
            Some(position) => next_index(&self.uintegers[..=position]),
            None => {
                let index = next_index(&self.uintegers);
                self.uintegers.push(value);
                index
            }
        }
    }

    /// Index of `value` in the double table, appending it when absent.
    ///
    /// Doubles are compared bitwise.
    pub fn add_double(&mut self, value: f64) -> u32 {
        match self.doubles[1..]
            .iter()
            .position(|v| v.to_bits() == value.to_bits())
        {
            Some(position) => next_index(&self.doubles[..=position]),
            None => {
                let index = next_index(&self.doubles);
                self.doubles.push(value);
                index
            }
        }
    }

    /// Index of a namespace with the given kind and name, appending it when absent.
    pub fn add_namespace(&mut self, kind: NamespaceKind, name: &str) -> u32 {
        let name = self.add_string(name);
        let namespace = Namespace { kind, name };
        match self.namespaces[1..].iter().position(|ns| *ns == namespace) {
            Some(position) => next_index(&self.namespaces[..=position]),
            None => {
                let index = next_index(&self.namespaces);
                self.namespaces.push(namespace);
                index
            }
        }
    }

    /// Index of a namespace set, appending it when absent.
    pub fn add_namespace_set(&mut self, namespaces: Vec<u32>) -> u32 {
        let set = NamespaceSet { namespaces };
        match self.namespace_sets[1..].iter().position(|s| *s == set) {
            Some(position) => next_index(&self.namespace_sets[..=position]),
            None => {
                let index = next_index(&self.namespace_sets);
                self.namespace_sets.push(set);
                index
            }
        }
    }

    /// Index of `multiname`, appending it when absent.
    pub fn add_multiname(&mut self, multiname: Multiname) -> u32 {
        match self.multinames[1..].iter().position(|m| *m == multiname) {
            Some(position) => next_index(&self.multinames[..=position]),
            None => {
                let index = next_index(&self.multinames);
                self.multinames.push(multiname);
                index
            }
        }
    }
}
