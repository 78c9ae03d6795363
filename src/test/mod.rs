//! Shared fixtures for the inline tests.

use crate::{
    abc::{
        AbcFile, Class, ClassFlags, ExceptionInfo, Instance, MethodBody, MethodFlags, MethodInfo,
        Multiname, NamespaceKind, Parameter, Trait, TraitAttributes, TraitData, TraitKind,
    },
    assembly::{Code, Instruction},
    file::writer::Writer,
    swf::{SwfFile, DO_ABC, SYMBOL_CLASS},
};

/// Constructor body: `getlocal_0, pushscope, getlocal_0, constructsuper 0, returnvoid`
pub const CONSTRUCTOR: &[u8] = &[0xD0, 0x30, 0xD0, 0x49, 0x00, 0x47];

/// Builds small ABC units with every name in the public package.
pub struct AbcBuilder {
    abc: AbcFile,
    package: u32,
}

impl AbcBuilder {
    pub fn new() -> Self {
        let mut abc = AbcFile::new();
        let package = abc.pool.add_namespace(NamespaceKind::Package, "");
        AbcBuilder { abc, package }
    }

    pub fn abc(&mut self) -> &mut AbcFile {
        &mut self.abc
    }

    pub fn string(&mut self, value: &str) -> u32 {
        self.abc.pool.add_string(value)
    }

    // Public QName for `name`, 0 for `*`
    pub fn qname(&mut self, name: &str) -> u32 {
        if name == "*" {
            return 0;
        }
        let name = self.abc.pool.add_string(name);
        self.abc
            .pool
            .add_multiname(Multiname::qname(self.package, name))
    }

    pub fn int(&mut self, value: i32) -> u32 {
        self.abc.pool.add_int(value)
    }

    // Method signature plus a body with generous capacities
    pub fn add_method(&mut self, params: &[&str], return_type: &str, code: &[u8]) -> u32 {
        let parameters = params
            .iter()
            .map(|param| Parameter::new(self.qname(param)))
            .collect::<Vec<_>>();
        let return_type = self.qname(return_type);

        let method = self.abc.methods.len() as u32;
        self.abc.methods.push(MethodInfo {
            parameters,
            return_type,
            name: 0,
            flags: MethodFlags::empty(),
        });
        self.abc.bodies.push(MethodBody {
            method,
            max_stack: 8,
            local_count: params.len() as u32 + 4,
            init_scope_depth: 0,
            max_scope_depth: 2,
            code: code.to_vec(),
            exceptions: Vec::new(),
            traits: Vec::new(),
        });
        method
    }

    pub fn class(&mut self, name: &str, super_name: Option<&str>) -> usize {
        self.declare(name, super_name, ClassFlags::SEALED)
    }

    pub fn interface(&mut self, name: &str) -> usize {
        self.declare(name, None, ClassFlags::INTERFACE)
    }

    fn declare(&mut self, name: &str, super_name: Option<&str>, flags: ClassFlags) -> usize {
        let name = self.qname(name);
        let super_name = match super_name {
            Some(super_name) => self.qname(super_name),
            None if flags.contains(ClassFlags::INTERFACE) => 0,
            None => self.qname("Object"),
        };
        let constructor = self.add_method(&[], "*", CONSTRUCTOR);
        let static_initializer = self.add_method(&[], "*", &[0x47]);

        self.abc.instances.push(Instance {
            name,
            super_name,
            flags,
            protected_namespace: None,
            interfaces: Vec::new(),
            initializer: constructor,
            traits: Vec::new(),
        });
        self.abc.classes.push(Class {
            initializer: static_initializer,
            traits: Vec::new(),
        });
        self.abc.instances.len() - 1
    }

    pub fn implement(&mut self, class: usize, interface: &str) {
        let interface = self.qname(interface);
        self.abc.instances[class].interfaces.push(interface);
    }

    fn method_trait(&mut self, name: &str, kind: TraitKind, method: u32) -> Trait {
        Trait {
            name: self.qname(name),
            kind,
            attributes: TraitAttributes::empty(),
            id: 0,
            data: TraitData::Method { method },
            metadata: Vec::new(),
        }
    }

    fn slot_trait(&mut self, name: &str, type_name: &str) -> Trait {
        Trait {
            name: self.qname(name),
            kind: TraitKind::Slot,
            attributes: TraitAttributes::empty(),
            id: 0,
            data: TraitData::Slot {
                type_name: self.qname(type_name),
                value: None,
            },
            metadata: Vec::new(),
        }
    }

    pub fn method(
        &mut self,
        class: usize,
        name: &str,
        params: &[&str],
        return_type: &str,
        code: &[u8],
    ) -> u32 {
        let method = self.add_method(params, return_type, code);
        let entry = self.method_trait(name, TraitKind::Method, method);
        self.abc.instances[class].traits.push(entry);
        method
    }

    pub fn static_method(
        &mut self,
        class: usize,
        name: &str,
        params: &[&str],
        return_type: &str,
        code: &[u8],
    ) -> u32 {
        let method = self.add_method(params, return_type, code);
        let entry = self.method_trait(name, TraitKind::Method, method);
        self.abc.classes[class].traits.push(entry);
        method
    }

    pub fn getter(&mut self, class: usize, name: &str, return_type: &str, code: &[u8]) -> u32 {
        let method = self.add_method(&[], return_type, code);
        let entry = self.method_trait(name, TraitKind::Getter, method);
        self.abc.instances[class].traits.push(entry);
        method
    }

    pub fn slot(&mut self, class: usize, name: &str, type_name: &str) {
        let entry = self.slot_trait(name, type_name);
        self.abc.instances[class].traits.push(entry);
    }

    pub fn static_slot(&mut self, class: usize, name: &str, type_name: &str) {
        let entry = self.slot_trait(name, type_name);
        self.abc.classes[class].traits.push(entry);
    }

    // Replace the instance initializer's signature and code
    pub fn constructor(&mut self, class: usize, params: &[&str], code: &[u8]) -> u32 {
        let method = self.add_method(params, "*", code);
        self.abc.instances[class].initializer = method;
        method
    }

    pub fn static_initializer(&mut self, class: usize, code: &[u8]) -> u32 {
        let method = self.add_method(&[], "*", code);
        self.abc.classes[class].initializer = method;
        method
    }

    // One exception range covering the first byte
    pub fn exception(&mut self, method: u32) {
        if let Some(body) = self.abc.bodies.iter_mut().find(|b| b.method == method) {
            body.exceptions.push(ExceptionInfo {
                from: 0,
                to: 1,
                target: 1,
                exception_type: 0,
                variable_name: 0,
            });
        }
    }

    pub fn build(mut self) -> AbcFile {
        self.abc.rebuild_cache();
        self.abc
    }
}

impl Default for AbcBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// Encode a straight-line instruction list
pub fn assemble(instructions: Vec<Instruction>) -> Vec<u8> {
    Code::from(instructions).encode().unwrap()
}

// u30 operand bytes
pub fn u30(value: u32) -> Vec<u8> {
    let mut writer = Writer::new();
    writer.write_u30(value);
    writer.into_inner()
}

// Uncompressed SWF holding `units` as DoABC records plus one SymbolClass record
pub fn swf(units: Vec<AbcFile>, symbols: &[(u16, &str)]) -> SwfFile {
    let mut body = vec![0x00, 0x00, 0x18, 0x01, 0x00];
    for abc in units {
        let mut payload = vec![0x01, 0x00, 0x00, 0x00, 0x00];
        payload.extend(abc.to_bytes());
        body.extend(long_tag(DO_ABC, &payload));
    }
    let mut payload = (symbols.len() as u16).to_le_bytes().to_vec();
    for (id, name) in symbols {
        payload.extend(id.to_le_bytes());
        payload.extend(name.as_bytes());
        payload.push(0);
    }
    body.extend(long_tag(SYMBOL_CLASS, &payload));
    body.extend([0x00, 0x00]);

    let mut data = b"FWS".to_vec();
    data.push(10);
    data.extend(((body.len() + 8) as u32).to_le_bytes());
    data.extend(body);
    SwfFile::from_bytes(&data).unwrap()
}

fn long_tag(code: u16, payload: &[u8]) -> Vec<u8> {
    let mut tag = ((code << 6) | 0x3F).to_le_bytes().to_vec();
    tag.extend((payload.len() as u32).to_le_bytes());
    tag.extend(payload);
    tag
}
