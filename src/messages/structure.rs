//! Static recovery of message field layouts.
//!
//! Outgoing messages expose their fields through a serializer that returns an `Array`;
//! incoming messages hand the packet buffer to a parser class whose `parse` method reads
//! it field by field. Both are recovered by walking straight-line bytecode. Bodies with
//! branches, switches or exception ranges depend on runtime input and are rejected with
//! [`Error::UnsupportedStructure`].

use std::iter;

use crate::{
    abc::{AbcFile, Container, MethodFilter, TraitKind},
    assembly::{Code, Instruction, OpCode},
    deobfuscation::is_valid_identifier,
    Error, Result,
};

fn unsupported(reason: impl Into<String>) -> Error {
    Error::UnsupportedStructure(reason.into())
}

/// Field type produced by a packet buffer read method.
///
/// Names the obfuscator generated are assumed to read an `int`.
#[must_use]
pub fn read_type(name: &str) -> Option<&'static str> {
    match name {
        "readString" => Some("String"),
        "readInt" => Some("int"),
        "readShort" => Some("short"),
        "readBoolean" => Some("Boolean"),
        "readByte" => Some("Byte"),
        "readDouble" => Some("Double"),
        "readBytes" => Some("ByteArray"),
        _ if !is_valid_identifier(name, true) => Some("int"),
        _ => None,
    }
}

/// Type of the value stored right before a `setlocal`.
fn stored_type(value: &Instruction) -> Result<&'static str> {
    match value.opcode() {
        OpCode::PushInt | OpCode::PushByte | OpCode::ConvertI => Ok("int"),
        OpCode::CoerceS | OpCode::PushString => Ok("String"),
        OpCode::PushTrue | OpCode::PushFalse => Ok("Boolean"),
        op => Err(Error::UnclassifiedValue(op)),
    }
}

/// Recovers message layouts from one immutable unit.
///
/// The resolver only reads, so one instance can be shared across threads.
pub struct StructureResolver<'a> {
    abc: &'a AbcFile,
}

impl<'a> StructureResolver<'a> {
    /// Resolver over `abc`.
    #[must_use]
    pub fn new(abc: &'a AbcFile) -> Self {
        StructureResolver { abc }
    }

    /// The `():Array` serializer of `class`, looked up along its superclass chain.
    ///
    /// # Errors
    /// Returns [`Error::RecursionLimit`] if the chain is too deep.
    pub fn serializer(&self, class: usize) -> Result<Option<u32>> {
        for current in self.abc.hierarchy(class)? {
            let filter = MethodFilter::signature(0, "Array");
            if let Some(method) = self.abc.find_method(Container::Instance(current), filter) {
                return Ok(Some(method));
            }
        }
        Ok(None)
    }

    /// Field types of an outgoing message class, in wire order.
    ///
    /// # Errors
    /// - [`Error::UnsupportedStructure`] if the layout cannot be determined statically
    /// - [`Error::UnclassifiedValue`] for a register store the analysis cannot type
    /// - [`Error::Corrupt`] for undecodable bytecode
    pub fn outgoing(&self, class: usize) -> Result<Vec<String>> {
        let method = self
            .serializer(class)?
            .ok_or_else(|| unsupported("no serializer"))?;
        let code = self.straight_code(method)?;
        let instructions = code.instructions();

        let end = code
            .last_index_of(OpCode::ReturnValue)
            .filter(|&index| index > 0)
            .ok_or_else(|| unsupported("serializer returns nothing"))?
            - 1;
        let pusher = &instructions[end];

        let structure = match pusher.opcode() {
            OpCode::NewArray | OpCode::ConstructProp => {
                let count = pusher.arg_count().unwrap_or(0) as usize;
                if count == 0 {
                    return Err(unsupported("message without fields"));
                }
                self.pushed_values(class, &code, end, count)?
            }
            OpCode::PushNull => return Err(unsupported("message without fields")),
            OpCode::GetProperty => {
                let property = pusher
                    .multiname()
                    .and_then(|name| self.abc.pool.multiname_name(name))
                    .ok_or_else(|| unsupported("runtime property name"))?;
                self.constructor_values(class, property, 0)?
            }
            _ if pusher.is_get_local() => {
                let register = pusher.register().unwrap_or(0);
                self.pushed_elements(class, &code, end, register)?
            }
            op => return Err(unsupported(format!("array produced by {}", op))),
        };

        if structure.iter().any(|field| field == "Array") {
            return Err(unsupported("nested array field"));
        }
        Ok(structure)
    }

    /// The parser class of an incoming message class.
    ///
    /// The message's base class declares a `parser` getter typed with an interface; the
    /// parser is the first class referenced from the message's methods that implements it.
    ///
    /// # Errors
    /// Returns [`Error::Corrupt`] for undecodable bytecode.
    pub fn find_parser(&self, class: usize) -> Result<Option<usize>> {
        let abc = self.abc;
        let Some(instance) = abc.instances.get(class) else {
            return Ok(None);
        };

        let base = abc.super_class(class).unwrap_or(class);
        let Some(getter) = abc.getter(Container::Instance(base), "parser") else {
            return Ok(None);
        };
        let interface = abc
            .methods
            .get(getter as usize)
            .map_or("*", |info| abc.type_name(info.return_type));

        let methods = instance
            .traits
            .iter()
            .filter(|entry| {
                matches!(
                    entry.kind,
                    TraitKind::Method | TraitKind::Getter | TraitKind::Setter
                )
            })
            .filter_map(|entry| entry.method())
            .chain(iter::once(instance.initializer));

        for method in methods {
            let Some(body) = abc.body(method) else {
                continue;
            };
            let code = body.parse_code()?;
            for instruction in &code {
                if !matches!(instruction.opcode(), OpCode::FindPropStrict | OpCode::GetLex) {
                    continue;
                }
                let Some(name) = instruction
                    .multiname()
                    .and_then(|name| abc.pool.multiname_name(name))
                else {
                    continue;
                };
                if let Some(&parser) = abc
                    .classes_named(name)
                    .iter()
                    .find(|&&candidate| abc.implements(candidate, interface))
                {
                    return Ok(Some(parser));
                }
            }
        }
        Ok(None)
    }

    /// Field types read by the `parse(1):Boolean` method of `parser`.
    ///
    /// # Errors
    /// See [`StructureResolver::outgoing`].
    pub fn incoming(&self, parser: usize) -> Result<Vec<String>> {
        let parse = self
            .abc
            .find_method(
                Container::Instance(parser),
                MethodFilter::named("parse", 1, "Boolean"),
            )
            .ok_or_else(|| unsupported("parser has no parse method"))?;
        self.reads(parser, parse, 0)
    }

    fn straight_code(&self, method: u32) -> Result<Code> {
        let body = self
            .abc
            .body(method)
            .ok_or_else(|| unsupported(format!("method {} has no body", method)))?;
        if body.has_exceptions() {
            return Err(unsupported("exception ranges"));
        }
        let code = body.parse_code()?;
        if code.has_exits() {
            return Err(unsupported("data-dependent control flow"));
        }
        Ok(code)
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        let limit = self.abc.hierarchy_limit();
        if depth > limit {
            return Err(Error::RecursionLimit(limit));
        }
        Ok(())
    }

    fn name_of(&self, instruction: &Instruction) -> Option<&'a str> {
        let abc: &'a AbcFile = self.abc;
        abc.pool.multiname_name(instruction.multiname()?)
    }

    // Class named by a `getlex`, `None` when it lives outside this unit
    fn lexical_class(&self, instruction: &Instruction) -> Option<usize> {
        self.abc.class_by_multiname(instruction.multiname()?)
    }

    // `None` for `lookup` means a global function or outside class
    fn property_type(&self, lookup: Option<usize>, property: Option<u32>) -> Result<Option<String>> {
        let Some(name) = property.and_then(|p| self.abc.pool.multiname_name(p)) else {
            return Ok(None);
        };
        match lookup {
            None => Ok(matches!(name, "int" | "getTimer").then(|| "int".to_string())),
            Some(class) => Ok(self
                .abc
                .trait_type(class, name)?
                .map(|type_name| self.abc.type_name(type_name).to_string())),
        }
    }

    /// Walk back from the array constructor at `end`, typing `count` pushed values.
    fn pushed_values(
        &self,
        class: usize,
        code: &Code,
        end: usize,
        count: usize,
    ) -> Result<Vec<String>> {
        let instructions = code.instructions();
        let mut structure: Vec<Option<String>> = vec![None; count];
        let mut remaining = count;
        let mut pending: Vec<(u32, usize)> = Vec::new();
        let mut first_local = None;

        for index in (0..end).rev() {
            if remaining == 0 {
                break;
            }
            let instruction = &instructions[index];
            if instruction.opcode() == OpCode::GetProperty {
                let lookup = match index.checked_sub(1).map(|p| &instructions[p]) {
                    Some(previous) if previous.opcode() == OpCode::GetLex => {
                        self.lexical_class(previous)
                    }
                    _ => Some(class),
                };
                if let Some(type_name) = self.property_type(lookup, instruction.multiname())? {
                    remaining -= 1;
                    structure[remaining] = Some(type_name);
                }
            } else if instruction.is_get_local() {
                let register = instruction.register().unwrap_or(0);
                if register != 0 {
                    remaining -= 1;
                    pending.push((register, remaining));
                    first_local.get_or_insert(index);
                }
            }
        }

        for index in (0..first_local.unwrap_or(0)).rev() {
            if pending.is_empty() {
                break;
            }
            let instruction = &instructions[index];
            if !instruction.is_set_local() {
                continue;
            }
            let register = instruction.register().unwrap_or(0);

            let mut slots = Vec::new();
            pending.retain(|&(pending_register, slot)| {
                if pending_register == register {
                    slots.push(slot);
                    false
                } else {
                    true
                }
            });
            if slots.is_empty() {
                continue;
            }

            let value = index
                .checked_sub(1)
                .map(|p| &instructions[p])
                .ok_or_else(|| corrupt_error!("Register {} stored from an empty stack", register))?;
            let type_name = stored_type(value)?;
            for slot in slots {
                structure[slot] = Some(type_name.to_string());
            }
        }

        structure
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| unsupported("field value of unknown origin"))
    }

    /// Types of the properties passed to `register.push(...)` before `end`.
    ///
    /// A register that is never read before `end` has no known layout.
    fn pushed_elements(
        &self,
        class: usize,
        code: &Code,
        end: usize,
        register: u32,
    ) -> Result<Vec<String>> {
        let instructions = code.instructions();
        let Some(start) = instructions[..end]
            .iter()
            .position(|i| i.is_get_local() && i.register() == Some(register))
        else {
            return Err(unsupported(format!(
                "array register {} is never filled",
                register
            )));
        };

        let mut structure = Vec::new();
        for index in start + 1..end {
            let instruction = &instructions[index];
            if instruction.opcode() != OpCode::CallPropVoid
                || self.name_of(instruction) != Some("push")
            {
                continue;
            }
            let previous = &instructions[index - 1];
            if previous.opcode() != OpCode::GetProperty {
                continue;
            }
            let lookup = match index.checked_sub(2).map(|p| &instructions[p]) {
                Some(receiver) if receiver.opcode() == OpCode::GetLex => {
                    self.lexical_class(receiver)
                }
                _ => Some(class),
            };
            if let Some(type_name) = self.property_type(lookup, previous.multiname())? {
                structure.push(type_name);
            }
        }
        Ok(structure)
    }

    /// Types flowing into `property` in the constructor of `class`.
    fn constructor_values(&self, class: usize, property: &str, depth: usize) -> Result<Vec<String>> {
        self.check_depth(depth)?;
        let abc = self.abc;
        let constructor = abc
            .instances
            .get(class)
            .map(|instance| instance.initializer)
            .ok_or_else(|| unsupported("class outside the unit"))?;
        let parameters = &abc
            .methods
            .get(constructor as usize)
            .ok_or_else(|| corrupt_error!("Constructor {} has no signature", constructor))?
            .parameters;
        let parameter_type = |register: u32| -> Result<String> {
            register
                .checked_sub(1)
                .and_then(|r| parameters.get(r as usize))
                .map(|parameter| abc.type_name(parameter.type_name).to_string())
                .ok_or_else(|| unsupported(format!("register {} is not a parameter", register)))
        };

        let code = self.straight_code(constructor)?;
        let instructions = code.instructions();
        let mut structure = Vec::new();

        let mut index = 0;
        while index < instructions.len() {
            let instruction = &instructions[index];
            match instruction.opcode() {
                OpCode::NewArray => {
                    let count = instruction.arg_count().unwrap_or(0) as usize;
                    if count > 0 {
                        let mut values = vec![String::new(); count];
                        let mut remaining = count;
                        for previous in instructions[..index].iter().rev() {
                            if previous.is_get_local() {
                                let register = previous.register().unwrap_or(0);
                                if register != 0 {
                                    remaining -= 1;
                                    values[remaining] = parameter_type(register)?;
                                }
                            }
                            if remaining == 0 {
                                structure.append(&mut values);
                                break;
                            }
                        }
                    }
                }
                OpCode::ConstructSuper => {
                    if instruction.arg_count().unwrap_or(0) > 0 {
                        let parent = abc
                            .super_class(class)
                            .ok_or_else(|| unsupported("superclass outside the unit"))?;
                        structure.extend(self.constructor_values(parent, property, depth + 1)?);
                    }
                }
                OpCode::GetProperty if self.name_of(instruction) == Some(property) => {
                    index += 1;
                    let Some(next) = instructions.get(index) else {
                        break;
                    };
                    if next.is_get_local() {
                        let register = next.register().unwrap_or(0);
                        if register != 0 {
                            structure.push(parameter_type(register)?);
                        }
                    } else {
                        let lookup = match next.opcode() {
                            OpCode::FindPropStrict => None,
                            OpCode::GetLex => self.lexical_class(next),
                            _ => Some(class),
                        };
                        loop {
                            index += 1;
                            let candidate = instructions
                                .get(index)
                                .ok_or_else(|| unsupported("property value runs past the end"))?;
                            if matches!(
                                candidate.opcode(),
                                OpCode::GetProperty | OpCode::CallProperty
                            ) {
                                if let Some(type_name) =
                                    self.property_type(lookup, candidate.multiname())?
                                {
                                    structure.push(type_name);
                                }
                                break;
                            }
                        }
                    }
                }
                _ => {}
            }
            index += 1;
        }
        Ok(structure)
    }

    /// Method named `name` taking `arg_count` arguments on `class` or a superclass, with
    /// the class that declares it.
    fn find_by_arity(&self, class: usize, name: &str, arg_count: u32) -> Result<Option<(usize, u32)>> {
        let filter = MethodFilter {
            name: Some(name),
            param_count: Some(arg_count as usize),
            return_type: None,
        };
        for current in self.abc.hierarchy(class)? {
            for container in [Container::Instance(current), Container::Class(current)] {
                if let Some(method) = self.abc.find_method(container, filter) {
                    return Ok(Some((current, method)));
                }
            }
        }
        Ok(None)
    }

    /// Fields read from the buffer in register 1 by `method` of `class`.
    fn reads(&self, class: usize, method: u32, depth: usize) -> Result<Vec<String>> {
        self.check_depth(depth)?;
        let abc = self.abc;
        let code = self.straight_code(method)?;
        let instructions = code.instructions();
        let mut structure = Vec::new();

        let mut index = 0;
        while index < instructions.len() {
            if instructions[index].opcode() != OpCode::GetLocal1 {
                index += 1;
                continue;
            }
            let receiver = index.checked_sub(1).map(|r| &instructions[r]);
            index += 1;
            let Some(next) = instructions.get(index) else {
                break;
            };

            match *next {
                Instruction::CallProperty {
                    op: OpCode::CallProperty | OpCode::CallPropVoid,
                    name,
                    arg_count: 0,
                } => {
                    let name = abc.pool.multiname_name(name).unwrap_or_default();
                    let type_name =
                        read_type(name).ok_or_else(|| unsupported(format!("unknown read {}", name)))?;
                    structure.push(type_name.to_string());
                }
                Instruction::CallProperty {
                    op: OpCode::CallProperty,
                    name,
                    arg_count,
                } => {
                    let target_class = match receiver {
                        Some(r) if matches!(r.opcode(), OpCode::GetLex | OpCode::ConstructProp) => {
                            self.lexical_class(r)
                        }
                        Some(r) if r.opcode() == OpCode::GetLocal0 => Some(class),
                        _ => None,
                    }
                    .ok_or_else(|| unsupported("nested read on an unknown receiver"))?;
                    let name = abc.pool.multiname_name(name).unwrap_or_default();
                    let (owner, target) = self
                        .find_by_arity(target_class, name, arg_count)?
                        .ok_or_else(|| unsupported(format!("nested read {} not found", name)))?;
                    structure.extend(self.reads(owner, target, depth + 1)?);
                }
                Instruction::CallProperty {
                    op: OpCode::ConstructProp,
                    name,
                    ..
                } => {
                    let target = abc
                        .class_by_multiname(name)
                        .ok_or_else(|| unsupported("constructed class outside the unit"))?;
                    let constructor = abc.instances[target].initializer;
                    structure.extend(self.reads(target, constructor, depth + 1)?);
                }
                Instruction::ArgCount {
                    op: OpCode::ConstructSuper,
                    ..
                } => {
                    let parent = abc
                        .super_class(class)
                        .ok_or_else(|| unsupported("superclass outside the unit"))?;
                    let constructor = abc.instances[parent].initializer;
                    structure.extend(self.reads(parent, constructor, depth + 1)?);
                }
                Instruction::CallProperty {
                    op: OpCode::CallSuper,
                    name,
                    arg_count,
                } => {
                    let parent = abc
                        .super_class(class)
                        .ok_or_else(|| unsupported("superclass outside the unit"))?;
                    let name = abc.pool.multiname_name(name).unwrap_or_default();
                    let (owner, target) = self
                        .find_by_arity(parent, name, arg_count)?
                        .ok_or_else(|| unsupported(format!("super read {} not found", name)))?;
                    structure.extend(self.reads(owner, target, depth + 1)?);
                }
                ref other => {
                    return Err(unsupported(format!("buffer passed to {}", other.opcode())));
                }
            }
            index += 1;
        }
        Ok(structure)
    }
}
