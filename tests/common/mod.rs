//! Fixture clients assembled through the public API.

#![allow(dead_code)]

use swfscope::{
    abc::{
        AbcFile, Class, ClassFlags, ExceptionInfo, Instance, MethodBody, MethodFlags, MethodInfo, Multiname,
        NamespaceKind, Parameter, Trait, TraitAttributes, TraitData, TraitKind,
    },
    assembly::{Code, Instruction, OpCode},
    swf::{DO_ABC, SYMBOL_CLASS},
};

/// `getlocal_0, pushscope, getlocal_0, constructsuper 0, returnvoid`
const CONSTRUCTOR: &[u8] = &[0xD0, 0x30, 0xD0, 0x49, 0x00, 0x47];

/// Builds a unit with every name in the public package.
pub struct Unit {
    abc: AbcFile,
    package: u32,
}

impl Unit {
    pub fn new() -> Self {
        let mut abc = AbcFile::new();
        let package = abc.pool.add_namespace(NamespaceKind::Package, "");
        Unit { abc, package }
    }

    pub fn qname(&mut self, name: &str) -> u32 {
        if name == "*" {
            return 0;
        }
        let name = self.abc.pool.add_string(name);
        self.abc
            .pool
            .add_multiname(Multiname::qname(self.package, name))
    }

    pub fn string(&mut self, value: &str) -> u32 {
        self.abc.pool.add_string(value)
    }

    fn add_method(&mut self, params: &[&str], return_type: &str, code: &[u8]) -> u32 {
        let parameters = params
            .iter()
            .map(|param| Parameter::new(self.qname(param)))
            .collect();
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

    pub fn class(&mut self, name: &str) -> usize {
        let name = self.qname(name);
        let super_name = self.qname("Object");
        let initializer = self.add_method(&[], "*", CONSTRUCTOR);
        let static_initializer = self.add_method(&[], "*", &[0x47]);
        self.abc.instances.push(Instance {
            name,
            super_name,
            flags: ClassFlags::SEALED,
            protected_namespace: None,
            interfaces: Vec::new(),
            initializer,
            traits: Vec::new(),
        });
        self.abc.classes.push(Class {
            initializer: static_initializer,
            traits: Vec::new(),
        });
        self.abc.instances.len() - 1
    }

    fn member(&mut self, name: &str, data: TraitData) -> Trait {
        let kind = match data {
            TraitData::Slot { .. } => TraitKind::Slot,
            _ => TraitKind::Method,
        };
        Trait {
            name: self.qname(name),
            kind,
            attributes: TraitAttributes::empty(),
            id: 0,
            data,
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
        let entry = self.member(name, TraitData::Method { method });
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
        let entry = self.member(name, TraitData::Method { method });
        self.abc.classes[class].traits.push(entry);
        method
    }

    pub fn slot(&mut self, class: usize, name: &str, type_name: &str) {
        let type_name = self.qname(type_name);
        let entry = self.member(
            name,
            TraitData::Slot {
                type_name,
                value: None,
            },
        );
        self.abc.instances[class].traits.push(entry);
    }

    pub fn static_slot(&mut self, class: usize, name: &str, type_name: &str) {
        let type_name = self.qname(type_name);
        let entry = self.member(
            name,
            TraitData::Slot {
                type_name,
                value: None,
            },
        );
        self.abc.classes[class].traits.push(entry);
    }

    pub fn static_initializer(&mut self, class: usize, code: &[u8]) {
        let method = self.add_method(&[], "*", code);
        self.abc.classes[class].initializer = method;
    }

    /// Give the body of `method` one catch-all exception range.
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

    /// Message registry `HabboMessages` binding each `(map, id, class)` entry.
    pub fn registry(&mut self, entries: &[(&str, Instruction, &str)]) -> usize {
        let registry = self.class("HabboMessages");
        self.static_slot(registry, "_-in", "Object");
        self.static_slot(registry, "_-out", "Object");
        let mut code = prologue();
        for (map, id, class) in entries {
            code.push(Instruction::property(OpCode::GetLex, self.qname(map)));
            code.push(id.clone());
            code.push(Instruction::property(OpCode::GetLex, self.qname(class)));
            code.push(Instruction::Bare(OpCode::Pop));
            code.push(Instruction::Bare(OpCode::Pop));
        }
        code.push(Instruction::Bare(OpCode::ReturnVoid));
        self.static_initializer(registry, &assemble(code));
        registry
    }

    pub fn build(mut self) -> AbcFile {
        self.abc.rebuild_cache();
        self.abc
    }
}

/// `getlocal_0, pushscope`
pub fn prologue() -> Vec<Instruction> {
    vec![
        Instruction::Bare(OpCode::GetLocal0),
        Instruction::Bare(OpCode::PushScope),
    ]
}

/// Prologue followed by `body`, encoded.
pub fn body(instructions: Vec<Instruction>) -> Vec<u8> {
    let mut code = prologue();
    code.extend(instructions);
    assemble(code)
}

pub fn assemble(instructions: Vec<Instruction>) -> Vec<u8> {
    Code::from(instructions).encode().unwrap()
}

fn long_tag(code: u16, payload: &[u8]) -> Vec<u8> {
    let mut tag = ((code << 6) | 0x3F).to_le_bytes().to_vec();
    tag.extend((payload.len() as u32).to_le_bytes());
    tag.extend(payload);
    tag
}

/// Uncompressed SWF bytes holding `units` and one `SymbolClass` record.
pub fn swf_bytes(units: Vec<AbcFile>, symbols: &[(u16, &str)]) -> Vec<u8> {
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
    data
}
