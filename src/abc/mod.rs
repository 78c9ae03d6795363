//! The ABC bytecode unit: constant pool, method signatures, class definitions, scripts
//! and method bodies.
//!
//! [`AbcFile`] decodes a unit eagerly but keeps every method body's bytecode as raw bytes,
//! so a unit that is never touched re-encodes byte for byte. Bodies are decoded into a
//! [`crate::assembly::Code`] container on demand.
//!
//! Besides the tables, the unit keeps two derived lookups: the body that implements each
//! method and the container that declares each method. Both are rebuilt by
//! [`AbcFile::rebuild_cache`] after edits that change names or add bodies.
//!
//! # Examples
//!
//! ```rust,no_run
//! use swfscope::abc::AbcFile;
//!
//! let data = std::fs::read("unit.abc")?;
//! let abc = AbcFile::from_bytes(&data)?;
//! for (index, instance) in abc.instances.iter().enumerate() {
//!     println!("{}: {:?}", index, abc.pool.multiname_name(instance.name));
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod class;
mod method;
mod multiname;
mod pool;
mod traits;

pub use class::{Class, ClassFlags, Instance, Script};
pub use method::{ExceptionInfo, MethodBody, MethodFlags, MethodInfo, Parameter};
pub use multiname::{Multiname, MultinameKind};
pub use pool::{
    ConstantKind, ConstantPool, ConstantRef, ConstantValue, Namespace, NamespaceKind,
    NamespaceSet,
};
pub use traits::{read_traits, write_traits, Trait, TraitAttributes, TraitData, TraitKind};

use std::collections::HashMap;

use crate::{
    file::{parser::Parser, writer::Writer},
    Error, Result,
};

/// Default bound for superclass walks.
pub const DEFAULT_HIERARCHY_DEPTH: usize = 64;

/// A metadata entry: a name and its key/value string pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// String index of the tag name
    pub name: u32,
    /// `(key, value)` string indices; a key of 0 marks a keyless value
    pub items: Vec<(u32, u32)>,
}

/// A trait-bearing definition. Instance and class sides share their index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    /// Instance side of the class at this index
    Instance(usize),
    /// Static side of the class at this index
    Class(usize),
    /// Script at this index
    Script(usize),
}

impl Container {
    /// Class index of an instance or class container.
    #[must_use]
    pub fn class_index(self) -> Option<usize> {
        match self {
            Container::Instance(index) | Container::Class(index) => Some(index),
            Container::Script(_) => None,
        }
    }
}

/// Where a method is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodOwner {
    /// Declaring container
    pub container: Container,
    /// Index of the declaring trait, `None` for initializers
    pub trait_index: Option<usize>,
}

impl MethodOwner {
    /// Returns true if the method is the container's initializer.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.trait_index.is_none()
    }
}

/// Selects method traits by name, parameter count and return type.
///
/// Unset fields match anything. Return types compare against the resolved local name,
/// with `*` for the untyped sentinel.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodFilter<'a> {
    /// Trait name
    pub name: Option<&'a str>,
    /// Declared parameter count
    pub param_count: Option<usize>,
    /// Return type name
    pub return_type: Option<&'a str>,
}

impl<'a> MethodFilter<'a> {
    /// Match on signature only.
    #[must_use]
    pub fn signature(param_count: usize, return_type: &'a str) -> Self {
        MethodFilter {
            name: None,
            param_count: Some(param_count),
            return_type: Some(return_type),
        }
    }

    /// Match on name and signature.
    #[must_use]
    pub fn named(name: &'a str, param_count: usize, return_type: &'a str) -> Self {
        MethodFilter {
            name: Some(name),
            param_count: Some(param_count),
            return_type: Some(return_type),
        }
    }
}

/// One decoded ABC unit.
#[derive(Debug, Clone)]
pub struct AbcFile {
    /// Minor format version
    pub minor_version: u16,
    /// Major format version
    pub major_version: u16,
    /// Constant pool shared by every other section
    pub pool: ConstantPool,
    /// Method signatures
    pub methods: Vec<MethodInfo>,
    /// Metadata entries
    pub metadata: Vec<Metadata>,
    /// Instance sides, parallel to `classes`
    pub instances: Vec<Instance>,
    /// Static sides, parallel to `instances`
    pub classes: Vec<Class>,
    /// Scripts
    pub scripts: Vec<Script>,
    /// Method bodies
    pub bodies: Vec<MethodBody>,

    hierarchy_limit: usize,
    body_index: HashMap<u32, usize>,
    owners: HashMap<u32, MethodOwner>,
    class_names: HashMap<String, Vec<usize>>,
}

impl Default for AbcFile {
    fn default() -> Self {
        Self::new()
    }
}

impl AbcFile {
    /// An empty unit of format version 46.16.
    #[must_use]
    pub fn new() -> Self {
        AbcFile {
            minor_version: 16,
            major_version: 46,
            pool: ConstantPool::default(),
            methods: Vec::new(),
            metadata: Vec::new(),
            instances: Vec::new(),
            classes: Vec::new(),
            scripts: Vec::new(),
            bodies: Vec::new(),
            hierarchy_limit: DEFAULT_HIERARCHY_DEPTH,
            body_index: HashMap::new(),
            owners: HashMap::new(),
            class_names: HashMap::new(),
        }
    }

    /// Decode a complete ABC unit. The unit must span `data` exactly.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] for trailing bytes or dangling indices and
    /// [`crate::Error::OutOfBounds`] for truncated input.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        let abc = Self::read(&mut parser)?;
        if parser.has_more_data() {
            return Err(corrupt_error!(
                "{} trailing bytes after ABC unit",
                parser.remaining()
            ));
        }
        Ok(abc)
    }

    /// Decode an ABC unit from the parser's current position.
    ///
    /// # Errors
    /// See [`AbcFile::from_bytes`].
    pub fn read(parser: &mut Parser) -> Result<Self> {
        let minor_version = parser.read_le::<u16>()?;
        let major_version = parser.read_le::<u16>()?;
        let pool = ConstantPool::read(parser)?;

        let method_count = parser.read_u30()?;
        let mut methods = Vec::with_capacity(method_count.min(0x10000) as usize);
        for _ in 0..method_count {
            methods.push(MethodInfo::read(parser)?);
        }

        let metadata_count = parser.read_u30()?;
        let mut metadata = Vec::with_capacity(metadata_count.min(0x1000) as usize);
        for _ in 0..metadata_count {
            let name = parser.read_u30()?;
            let item_count = parser.read_u30()? as usize;
            let mut keys = Vec::with_capacity(item_count.min(256));
            for _ in 0..item_count {
                keys.push(parser.read_u30()?);
            }
            let mut items = Vec::with_capacity(keys.len());
            for key in keys {
                items.push((key, parser.read_u30()?));
            }
            metadata.push(Metadata { name, items });
        }

        let class_count = parser.read_u30()?;
        let mut instances = Vec::with_capacity(class_count.min(0x10000) as usize);
        for _ in 0..class_count {
            instances.push(Instance::read(parser)?);
        }
        let mut classes = Vec::with_capacity(instances.len());
        for _ in 0..class_count {
            classes.push(Class::read(parser)?);
        }

        let script_count = parser.read_u30()?;
        let mut scripts = Vec::with_capacity(script_count.min(0x1000) as usize);
        for _ in 0..script_count {
            scripts.push(Script::read(parser)?);
        }

        let body_count = parser.read_u30()?;
        let mut bodies = Vec::with_capacity(body_count.min(0x10000) as usize);
        for _ in 0..body_count {
            bodies.push(MethodBody::read(parser)?);
        }

        let mut abc = AbcFile {
            minor_version,
            major_version,
            pool,
            methods,
            metadata,
            instances,
            classes,
            scripts,
            bodies,
            hierarchy_limit: DEFAULT_HIERARCHY_DEPTH,
            body_index: HashMap::new(),
            owners: HashMap::new(),
            class_names: HashMap::new(),
        };
        abc.validate()?;
        abc.rebuild_cache();
        Ok(abc)
    }

    /// Encode the unit.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::with_capacity(self.bodies.len() * 64);
        self.write(&mut writer);
        writer.into_inner()
    }

    /// Encode the unit into `writer`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(&self, writer: &mut Writer) {
        writer.write_le(self.minor_version);
        writer.write_le(self.major_version);
        self.pool.write(writer);

        writer.write_u30(self.methods.len() as u32);
        for method in &self.methods {
            method.write(writer);
        }

        writer.write_u30(self.metadata.len() as u32);
        for entry in &self.metadata {
            writer.write_u30(entry.name);
            writer.write_u30(entry.items.len() as u32);
            for (key, _) in &entry.items {
                writer.write_u30(*key);
            }
            for (_, value) in &entry.items {
                writer.write_u30(*value);
            }
        }

        writer.write_u30(self.instances.len() as u32);
        for instance in &self.instances {
            instance.write(writer);
        }
        for class in &self.classes {
            class.write(writer);
        }

        writer.write_u30(self.scripts.len() as u32);
        for script in &self.scripts {
            script.write(writer);
        }

        writer.write_u30(self.bodies.len() as u32);
        for body in &self.bodies {
            body.write(writer);
        }
    }

    /// Check every cross-table index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] naming the first dangling index.
    pub fn validate(&self) -> Result<()> {
        let method_count = self.methods.len();
        let check_method = |index: u32| -> Result<()> {
            if index as usize >= method_count {
                return Err(corrupt_error!("Method index {} out of range", index));
            }
            Ok(())
        };
        let check_traits = |traits: &[Trait]| -> Result<()> {
            for entry in traits {
                self.pool.check_multiname(entry.name)?;
                match entry.data {
                    TraitData::Slot { type_name, .. } => self.pool.check_multiname(type_name)?,
                    TraitData::Class { class } => {
                        if class as usize >= self.classes.len() {
                            return Err(corrupt_error!("Class index {} out of range", class));
                        }
                    }
                    TraitData::Function { function: method } | TraitData::Method { method } => {
                        check_method(method)?;
                    }
                }
            }
            Ok(())
        };

        for method in &self.methods {
            self.pool.check_multiname(method.return_type)?;
            for parameter in &method.parameters {
                self.pool.check_multiname(parameter.type_name)?;
            }
        }
        for instance in &self.instances {
            self.pool.check_multiname(instance.name)?;
            self.pool.check_multiname(instance.super_name)?;
            for interface in &instance.interfaces {
                self.pool.check_multiname(*interface)?;
            }
            check_method(instance.initializer)?;
            check_traits(&instance.traits)?;
        }
        for class in &self.classes {
            check_method(class.initializer)?;
            check_traits(&class.traits)?;
        }
        for script in &self.scripts {
            check_method(script.initializer)?;
            check_traits(&script.traits)?;
        }
        for body in &self.bodies {
            check_method(body.method)?;
            check_traits(&body.traits)?;
        }
        Ok(())
    }

    /// Rebuild the body, owner and class-name lookups.
    #[allow(clippy::cast_possible_truncation)]
    pub fn rebuild_cache(&mut self) {
        self.body_index.clear();
        for (index, body) in self.bodies.iter().enumerate() {
            self.body_index.entry(body.method).or_insert(index);
        }

        self.owners.clear();
        let mut register = |container: Container, initializer: u32, traits: &[Trait]| {
            self.owners.entry(initializer).or_insert(MethodOwner {
                container,
                trait_index: None,
            });
            for (trait_index, entry) in traits.iter().enumerate() {
                if let TraitData::Method { method } = entry.data {
                    self.owners.entry(method).or_insert(MethodOwner {
                        container,
                        trait_index: Some(trait_index),
                    });
                }
            }
        };
        for (index, instance) in self.instances.iter().enumerate() {
            register(Container::Instance(index), instance.initializer, &instance.traits);
        }
        for (index, class) in self.classes.iter().enumerate() {
            register(Container::Class(index), class.initializer, &class.traits);
        }
        for (index, script) in self.scripts.iter().enumerate() {
            register(Container::Script(index), script.initializer, &script.traits);
        }

        self.class_names.clear();
        for (index, instance) in self.instances.iter().enumerate() {
            if let Some(name) = self.pool.multiname_name(instance.name) {
                self.class_names
                    .entry(name.to_string())
                    .or_default()
                    .push(index);
            }
        }
    }

    /// Bound superclass walks to `depth` steps.
    pub fn set_hierarchy_limit(&mut self, depth: usize) {
        self.hierarchy_limit = depth;
    }

    /// Current superclass walk bound.
    #[must_use]
    pub fn hierarchy_limit(&self) -> usize {
        self.hierarchy_limit
    }

    /// Index into `bodies` of the body implementing `method`.
    #[must_use]
    pub fn body_index(&self, method: u32) -> Option<usize> {
        self.body_index.get(&method).copied()
    }

    /// Body implementing `method`.
    #[must_use]
    pub fn body(&self, method: u32) -> Option<&MethodBody> {
        self.bodies.get(self.body_index(method)?)
    }

    /// Mutable body implementing `method`.
    pub fn body_mut(&mut self, method: u32) -> Option<&mut MethodBody> {
        let index = self.body_index(method)?;
        self.bodies.get_mut(index)
    }

    /// Pool and body of `method`, borrowed disjointly for in-place rewriting.
    pub fn pool_and_body_mut(&mut self, method: u32) -> Option<(&mut ConstantPool, &mut MethodBody)> {
        let index = self.body_index(method)?;
        let body = self.bodies.get_mut(index)?;
        Some((&mut self.pool, body))
    }

    /// Declaring container of `method`.
    #[must_use]
    pub fn method_owner(&self, method: u32) -> Option<MethodOwner> {
        self.owners.get(&method).copied()
    }

    /// Trait list of a container.
    #[must_use]
    pub fn traits_of(&self, container: Container) -> &[Trait] {
        let traits = match container {
            Container::Instance(index) => self.instances.get(index).map(|i| &i.traits),
            Container::Class(index) => self.classes.get(index).map(|c| &c.traits),
            Container::Script(index) => self.scripts.get(index).map(|s| &s.traits),
        };
        traits.map_or(&[], Vec::as_slice)
    }

    /// Mutable trait list of a container.
    pub fn traits_of_mut(&mut self, container: Container) -> Option<&mut Vec<Trait>> {
        match container {
            Container::Instance(index) => self.instances.get_mut(index).map(|i| &mut i.traits),
            Container::Class(index) => self.classes.get_mut(index).map(|c| &mut c.traits),
            Container::Script(index) => self.scripts.get_mut(index).map(|s| &mut s.traits),
        }
    }

    /// Declare `info` as method trait `name` of `container`, implemented by `body`.
    ///
    /// The body is bound to the new method index, which is returned. `None` if the
    /// container does not exist.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_method(
        &mut self,
        container: Container,
        name: u32,
        info: MethodInfo,
        mut body: MethodBody,
    ) -> Option<u32> {
        let method = self.methods.len() as u32;
        self.traits_of_mut(container)?.push(Trait {
            name,
            kind: TraitKind::Method,
            attributes: TraitAttributes::empty(),
            id: 0,
            data: TraitData::Method { method },
            metadata: Vec::new(),
        });
        self.methods.push(info);
        body.method = method;
        self.bodies.push(body);
        self.rebuild_cache();
        Some(method)
    }

    /// Initializer method of a container.
    #[must_use]
    pub fn initializer_of(&self, container: Container) -> Option<u32> {
        match container {
            Container::Instance(index) => self.instances.get(index).map(|i| i.initializer),
            Container::Class(index) => self.classes.get(index).map(|c| c.initializer),
            Container::Script(index) => self.scripts.get(index).map(|s| s.initializer),
        }
    }

    /// Local name of the class at `class`.
    #[must_use]
    pub fn class_name(&self, class: usize) -> Option<&str> {
        self.pool.multiname_name(self.instances.get(class)?.name)
    }

    /// Every class whose local name is `name`, in declaration order.
    #[must_use]
    pub fn classes_named(&self, name: &str) -> &[usize] {
        self.class_names.get(name).map_or(&[], Vec::as_slice)
    }

    /// First class whose local name is `name`.
    #[must_use]
    pub fn find_class(&self, name: &str) -> Option<usize> {
        self.classes_named(name).first().copied()
    }

    /// Class declared by the multiname at `index`, matching the namespace when it is
    /// qualified.
    #[must_use]
    pub fn class_by_multiname(&self, index: u32) -> Option<usize> {
        let name = self.pool.multiname_name(index)?;
        let namespace = self.pool.multiname_namespace_name(index);
        let candidates = self.classes_named(name);
        candidates
            .iter()
            .copied()
            .find(|&class| {
                namespace.is_none()
                    || self.pool.multiname_namespace_name(self.instances[class].name) == namespace
            })
            .or_else(|| candidates.first().copied())
    }

    /// Superclass of `class`, if it is declared in this unit.
    #[must_use]
    pub fn super_class(&self, class: usize) -> Option<usize> {
        let super_name = self.instances.get(class)?.super_name;
        self.class_by_multiname(super_name)
            .filter(|&parent| parent != class)
    }

    /// `class` followed by its in-unit superclasses, nearest first.
    ///
    /// # Errors
    /// Returns [`crate::Error::RecursionLimit`] if the chain exceeds the hierarchy limit.
    pub fn hierarchy(&self, class: usize) -> Result<Vec<usize>> {
        let mut chain = vec![class];
        let mut current = class;
        while let Some(parent) = self.super_class(current) {
            if chain.len() > self.hierarchy_limit {
                return Err(Error::RecursionLimit(self.hierarchy_limit));
            }
            chain.push(parent);
            current = parent;
        }
        Ok(chain)
    }

    /// Method traits of `container` matching `filter`, as `(trait index, method index)`.
    pub fn find_methods<'a>(
        &'a self,
        container: Container,
        filter: MethodFilter<'a>,
    ) -> impl Iterator<Item = (usize, u32)> + 'a {
        self.traits_of(container)
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.kind == TraitKind::Method)
            .filter_map(move |(trait_index, entry)| {
                let method = entry.method()?;
                if let Some(name) = filter.name {
                    if self.pool.multiname_name(entry.name) != Some(name) {
                        return None;
                    }
                }
                let info = self.methods.get(method as usize)?;
                if let Some(count) = filter.param_count {
                    if info.parameters.len() != count {
                        return None;
                    }
                }
                if let Some(return_type) = filter.return_type {
                    if self.type_name(info.return_type) != return_type {
                        return None;
                    }
                }
                Some((trait_index, method))
            })
    }

    /// First method trait of `container` matching `filter`.
    #[must_use]
    pub fn find_method(&self, container: Container, filter: MethodFilter) -> Option<u32> {
        self.find_methods(container, filter).next().map(|(_, method)| method)
    }

    /// Method of the getter named `name` on `container`.
    #[must_use]
    pub fn getter(&self, container: Container, name: &str) -> Option<u32> {
        self.traits_of(container)
            .iter()
            .filter(|entry| entry.kind == TraitKind::Getter)
            .find(|entry| self.pool.multiname_name(entry.name) == Some(name))
            .and_then(Trait::method)
    }

    /// Trait name of `method`, or `None` for initializers.
    #[must_use]
    pub fn method_name(&self, method: u32) -> Option<&str> {
        let owner = self.method_owner(method)?;
        let entry = self.traits_of(owner.container).get(owner.trait_index?)?;
        self.pool.multiname_name(entry.name)
    }

    /// Resolved type name with `*` for the untyped sentinel.
    #[must_use]
    pub fn type_name(&self, multiname: u32) -> &str {
        if multiname == 0 {
            return "*";
        }
        self.pool.multiname_name(multiname).unwrap_or("*")
    }

    /// Declared type of the member named `name`, looked up on the class side, then the
    /// instance side, then each superclass.
    ///
    /// Slots yield their declared type and getters their return type.
    ///
    /// # Errors
    /// Returns [`crate::Error::RecursionLimit`] if the superclass chain is too deep.
    pub fn trait_type(&self, class: usize, name: &str) -> Result<Option<u32>> {
        for current in self.hierarchy(class)? {
            for container in [Container::Class(current), Container::Instance(current)] {
                for entry in self.traits_of(container) {
                    if self.pool.multiname_name(entry.name) != Some(name) {
                        continue;
                    }
                    match (&entry.data, entry.kind) {
                        (TraitData::Slot { type_name, .. }, _) => return Ok(Some(*type_name)),
                        (TraitData::Method { method }, TraitKind::Getter) => {
                            return Ok(self.methods.get(*method as usize).map(|m| m.return_type));
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(None)
    }

    /// Returns true if the instance side of `class` lists an interface named `interface`.
    #[must_use]
    pub fn implements(&self, class: usize, interface: &str) -> bool {
        self.instances.get(class).is_some_and(|instance| {
            instance
                .interfaces
                .iter()
                .any(|&index| self.pool.multiname_name(index) == Some(interface))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::AbcBuilder;

    #[test]
    fn untouched_unit_roundtrips() {
        let mut builder = AbcBuilder::new();
        let class = builder.class("Widget", None);
        builder.method(class, "describe", &[], "String", &[0xD0, 0x30, 0x2C, 0x01, 0x48]);
        let data = builder.build().to_bytes();

        let abc = AbcFile::from_bytes(&data).unwrap();
        assert_eq!(abc.to_bytes(), data);
    }

    #[test]
    fn trailing_bytes_are_corrupt() {
        let mut data = AbcBuilder::new().build().to_bytes();
        data.push(0);
        assert!(AbcFile::from_bytes(&data).unwrap_err().is_corrupt());
    }

    #[test]
    fn dangling_method_index() {
        let mut abc = AbcBuilder::new().build();
        abc.scripts.push(Script {
            initializer: 99,
            traits: Vec::new(),
        });
        let data = abc.to_bytes();
        assert!(AbcFile::from_bytes(&data).unwrap_err().is_corrupt());
    }

    #[test]
    fn owners_and_lookups() {
        let mut builder = AbcBuilder::new();
        let base = builder.class("Base", None);
        builder.slot(base, "count", "int");
        let derived = builder.class("Derived", Some("Base"));
        let method = builder.method(derived, "items", &[], "Array", &[0xD0, 0x30, 0x20, 0x48]);
        let abc = builder.build();

        assert_eq!(abc.find_class("Derived"), Some(derived));
        assert_eq!(abc.super_class(derived), Some(base));
        assert_eq!(abc.hierarchy(derived).unwrap(), vec![derived, base]);

        let owner = abc.method_owner(method).unwrap();
        assert_eq!(owner.container, Container::Instance(derived));
        assert!(!owner.is_constructor());
        assert_eq!(abc.method_name(method), Some("items"));

        let found = abc.find_method(Container::Instance(derived), MethodFilter::signature(0, "Array"));
        assert_eq!(found, Some(method));
        assert!(abc
            .find_method(Container::Instance(derived), MethodFilter::signature(1, "Array"))
            .is_none());

        let count = abc.trait_type(derived, "count").unwrap().unwrap();
        assert_eq!(abc.type_name(count), "int");
        assert!(abc.body(method).is_some());
    }

    #[test]
    fn added_methods_are_declared_and_bound() {
        let mut builder = AbcBuilder::new();
        let class = builder.class("Widget", None);
        let name = builder.qname("resize");
        let mut abc = builder.build();
        let info = MethodInfo {
            parameters: Vec::new(),
            return_type: 0,
            name: 0,
            flags: MethodFlags::empty(),
        };
        let body = MethodBody {
            method: 0,
            max_stack: 1,
            local_count: 1,
            init_scope_depth: 0,
            max_scope_depth: 1,
            code: vec![0x47],
            exceptions: Vec::new(),
            traits: Vec::new(),
        };

        let method = abc
            .add_method(Container::Instance(class), name, info.clone(), body.clone())
            .unwrap();
        assert_eq!(abc.method_name(method), Some("resize"));
        assert_eq!(abc.body(method).map(|b| b.method), Some(method));
        assert!(abc.add_method(Container::Instance(9), name, info, body).is_none());

        let decoded = AbcFile::from_bytes(&abc.to_bytes()).unwrap();
        assert_eq!(decoded.method_name(method), Some("resize"));
    }

    #[test]
    fn cyclic_hierarchy_is_bounded() {
        let mut builder = AbcBuilder::new();
        let a = builder.class("A", Some("B"));
        builder.class("B", Some("A"));
        let mut abc = builder.build();
        abc.set_hierarchy_limit(8);
        assert!(matches!(abc.hierarchy(a), Err(Error::RecursionLimit(8))));
    }
}
