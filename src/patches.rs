//! Bytecode patches applied to a loaded client.
//!
//! Each patch locates its target by class name and method signature, rewrites the decoded
//! body and re-encodes it. A patch reports `Ok(false)` when its target is missing and
//! `Ok(true)` when the client is patched afterwards, including when it already was.
//! Errors are reserved for bytecode that fails to decode or re-encode.

use std::collections::BTreeSet;

use crate::{
    abc::{
        AbcFile, Container, MethodBody, MethodFilter, MethodFlags, MethodInfo, Multiname,
        NamespaceKind, Parameter, TraitKind,
    },
    assembly::{Code, Instruction, OpCode},
    deobfuscation::Deobfuscator,
    messages::StructureResolver,
    Error, Game, Result,
};

const HOST_PROPERTY: &str = "connection.info.host";
const LOOPBACK_HOST: &str = "127.0.0.1";
const DEFAULT_LOG_FUNCTION: &str = "console.log";
// Keeps the host suffix computation from altering the host
const HOST_SUFFIX_CONSTANT: i32 = 65290;
const MODULUS_TRAIT_ID: u32 = 6;
const EXPONENT_TRAIT_ID: u32 = 7;
const SEND_FUNCTION: &str = "sendMessage";
// max_stack, local_count, init_scope_depth and max_scope_depth of the key verification
const KEY_VERIFY_SHAPE: (u32, u32, u32, u32) = (4, 10, 5, 6);
// Instructions after the key shout, up to the end of the verification
const KEY_VERIFY_TAIL: usize = 5;

fn calls(abc: &AbcFile, instruction: &Instruction, op: OpCode, name: &str) -> bool {
    instruction.opcode() == op
        && instruction
            .multiname()
            .and_then(|index| abc.pool.multiname_name(index))
            == Some(name)
}

fn pushes_string(abc: &AbcFile, instruction: &Instruction, value: &str) -> bool {
    matches!(
        instruction,
        Instruction::PushConstant { op: OpCode::PushString, index }
            if abc.pool.string(*index) == Some(value)
    )
}

// Name of the first slot on `container` declared with `type_name`
fn slot_of_type(abc: &AbcFile, container: Container, type_name: &str) -> Option<u32> {
    abc.traits_of(container)
        .iter()
        .find(|entry| {
            entry.kind == TraitKind::Slot
                && entry
                    .type_name()
                    .is_some_and(|declared| abc.type_name(declared) == type_name)
        })
        .map(|entry| entry.name)
}

// Public QName of `name`, added when absent
fn public_qname(abc: &mut AbcFile, name: &str) -> u32 {
    let package = abc.pool.add_namespace(NamespaceKind::Package, "");
    let name = abc.pool.add_string(name);
    abc.pool.add_multiname(Multiname::qname(package, name))
}

/// Maps an edit that would orphan a branch target to `None`.
fn unless_referenced<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::TargetStillReferenced(target)) => {
            log::debug!("Edit would orphan branch target {}", target);
            Ok(None)
        }
        Err(error) => Err(error),
    }
}

impl Game {
    /// Send packets unencrypted: `SocketConnection.send` writes the encoded packet to the
    /// socket and flushes it without passing it through the cipher.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] for undecodable bytecode.
    pub fn disable_encryption(&mut self) -> Result<bool> {
        let Some((unit, class)) = self.locate_class("SocketConnection") else {
            return Ok(false);
        };
        let container = Container::Instance(class);
        let Some(send) = self.unit(unit).and_then(|abc| {
            abc.find_method(container, MethodFilter::named("send", 1, "Boolean"))
        }) else {
            return Ok(false);
        };
        let Some(mut code) = self.editable_code(unit, send)? else {
            return Ok(false);
        };
        let Some(abc) = self.unit(unit) else {
            return Ok(false);
        };

        Deobfuscator::with_layout_limit(self.config.max_layout_iterations)
            .run_on_code(&mut code, &abc.pool)?;

        let Some(socket) = slot_of_type(abc, container, "Socket") else {
            return Ok(false);
        };
        let (Some(flush), Some(write_bytes)) = (
            abc.pool.multiname_index("flush"),
            abc.pool.multiname_index("writeBytes"),
        ) else {
            return Ok(false);
        };

        // The encoded packet is stored two instructions after the `encode` call
        let store = code.iter().enumerate().find_map(|(index, instruction)| {
            if !calls(abc, instruction, OpCode::CallProperty, "encode") {
                return None;
            }
            let store = code.get(index + 2)?;
            if !store.is_set_local() {
                return None;
            }
            Some((index + 2, store.register()?))
        });
        let Some((store, encoded)) = store else {
            return Ok(false);
        };

        let write = [
            Instruction::get_local(0),
            Instruction::property(OpCode::GetProperty, socket),
            Instruction::get_local(encoded),
            Instruction::call_property(OpCode::CallPropVoid, write_bytes, 1),
            Instruction::get_local(0),
            Instruction::property(OpCode::GetProperty, socket),
            Instruction::call_property(OpCode::CallPropVoid, flush, 0),
            Instruction::Bare(OpCode::PushTrue),
            Instruction::Bare(OpCode::ReturnValue),
        ];
        if code.instructions().get(store + 1..) == Some(&write[..]) {
            return Ok(true);
        }

        let end = code.len();
        if unless_referenced(code.remove_range(store + 1..end))?.is_none() {
            return Ok(false);
        }
        code.extend(write);

        self.commit(unit, send, &code)?;
        log::info!("Disabled packet encryption");
        Ok(true)
    }

    /// Give `SocketConnection` a `sendMessage(id:int, ...values):Boolean` method that
    /// encodes and writes any packet without going through a message class. Encryption
    /// is disabled first.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] for undecodable bytecode.
    pub fn inject_universal_send(&mut self) -> Result<bool> {
        Ok(self.universal_send()?.is_some())
    }

    /// Unit and trait name of the universal send method, injected when missing.
    ///
    /// The body is the tail of `send` from the `encode` call on. Registers above the
    /// first shift down by one so the id and the rest array land where `send` kept the
    /// header and the values.
    fn universal_send(&mut self) -> Result<Option<(usize, u32)>> {
        if !self.disable_encryption()? {
            return Ok(None);
        }
        let Some((unit, class)) = self.locate_class("SocketConnection") else {
            return Ok(None);
        };
        let container = Container::Instance(class);
        let Some(abc) = self.unit(unit) else {
            return Ok(None);
        };
        let existing = abc
            .find_methods(container, MethodFilter::named(SEND_FUNCTION, 1, "Boolean"))
            .find_map(|(trait_index, _)| abc.traits_of(container).get(trait_index));
        if let Some(existing) = existing {
            return Ok(Some((unit, existing.name)));
        }

        let Some(send) = abc.find_method(container, MethodFilter::named("send", 1, "Boolean"))
        else {
            return Ok(None);
        };
        let (Some(info), Some(body)) = (abc.methods.get(send as usize), abc.body(send)) else {
            return Ok(None);
        };
        let return_type = info.return_type;
        let (init_scope_depth, max_scope_depth) = (body.init_scope_depth, body.max_scope_depth);

        let Some(mut code) = self.editable_code(unit, send)? else {
            return Ok(None);
        };
        let Some(abc) = self.unit(unit) else {
            return Ok(None);
        };
        let Some(encode) = code
            .iter()
            .position(|i| calls(abc, i, OpCode::CallProperty, "encode"))
        else {
            return Ok(None);
        };
        // receiver load, property lookup, then one instruction per argument
        let arguments = code.get(encode).and_then(Instruction::arg_count).unwrap_or(0);
        let Some(start) = encode.checked_sub(arguments as usize + 2) else {
            return Ok(None);
        };
        if start > 0 && unless_referenced(code.remove_range(0..start))?.is_none() {
            return Ok(None);
        }

        for index in 0..code.len() {
            let Some(instruction) = code.get(index) else {
                continue;
            };
            let Some(register) = instruction.register().filter(|&register| register >= 2) else {
                continue;
            };
            let shifted = if instruction.is_get_local() {
                Instruction::get_local(register - 1)
            } else if instruction.is_set_local() {
                Instruction::set_local(register - 1)
            } else {
                continue;
            };
            code.replace(index, shifted)?;
        }

        let abc = self.unit_mut(unit).ok_or(Error::OutOfBounds)?;
        let id = abc.pool.add_string("id");
        let values = abc.pool.add_string("values");
        code.insert_range(
            0,
            vec![
                Instruction::get_local(0),
                Instruction::Bare(OpCode::PushScope),
                Instruction::Debug {
                    debug_type: 1,
                    name: id,
                    register: 0,
                    extra: 0,
                },
                Instruction::Debug {
                    debug_type: 1,
                    name: values,
                    register: 1,
                    extra: 0,
                },
            ],
        );

        let int_type = match abc.pool.multiname_index("int") {
            Some(index) => index,
            None => public_qname(abc, "int"),
        };
        let name = public_qname(abc, SEND_FUNCTION);
        let info = MethodInfo {
            parameters: vec![Parameter {
                type_name: int_type,
                name: Some(id),
                default: None,
            }],
            return_type,
            name: 0,
            flags: MethodFlags::NEED_REST | MethodFlags::HAS_PARAM_NAMES,
        };
        // this, id and the rest array
        let body = MethodBody {
            method: 0,
            max_stack: 0,
            local_count: 3,
            init_scope_depth,
            max_scope_depth,
            code: Vec::new(),
            exceptions: Vec::new(),
            traits: Vec::new(),
        };
        let Some(method) = abc.add_method(container, name, info, body) else {
            return Ok(None);
        };

        self.commit(unit, method, &code)?;
        log::info!("Injected {}", SEND_FUNCTION);
        Ok(Some((unit, name)))
    }

    /// Send packet `id` carrying the server's public key from the key verification of
    /// `HabboCommunicationDemo`, through the universal send method.
    ///
    /// The verification is the `(1):void` method with the body shape the client
    /// compiles it to. Its connection is coerced to `SocketConnection` so the injected
    /// call resolves.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] for undecodable bytecode.
    pub fn inject_key_shouter(&mut self, id: i32) -> Result<bool> {
        let Some((send_unit, send_function)) = self.universal_send()? else {
            return Ok(false);
        };
        let Some((unit, demo)) = self.locate_class("HabboCommunicationDemo") else {
            return Ok(false);
        };
        if unit != send_unit {
            return Ok(false);
        }
        let Some(abc) = self.unit(unit) else {
            return Ok(false);
        };
        let Some(socket_type) = abc
            .find_class("SocketConnection")
            .and_then(|class| abc.instances.get(class))
            .map(|instance| instance.name)
        else {
            return Ok(false);
        };

        let shout = Instruction::call_property(OpCode::CallPropVoid, send_function, 2);
        let candidates = abc
            .find_methods(Container::Instance(demo), MethodFilter::signature(1, "void"))
            .map(|(_, method)| method)
            .collect::<Vec<_>>();
        let mut verify = None;
        for method in candidates {
            let Some(body) = self.unit(unit).and_then(|abc| abc.body(method)) else {
                continue;
            };
            let shape = (
                body.max_stack,
                body.local_count,
                body.init_scope_depth,
                body.max_scope_depth,
            );
            let Some(code) = self.editable_code(unit, method)? else {
                continue;
            };
            if code.iter().any(|instruction| *instruction == shout) {
                return Ok(true);
            }
            if verify.is_none() && shape == KEY_VERIFY_SHAPE {
                verify = Some((method, code));
            }
        }
        let Some((method, mut code)) = verify else {
            return Ok(false);
        };

        let Some(coerce) = code
            .iter()
            .enumerate()
            .filter(|(_, instruction)| instruction.opcode() == OpCode::Coerce)
            .nth(1)
            .map(|(index, _)| index)
        else {
            return Ok(false);
        };
        let Some(at) = code.len().checked_sub(KEY_VERIFY_TAIL) else {
            return Ok(false);
        };

        let abc = self.unit_mut(unit).ok_or(Error::OutOfBounds)?;
        let packet = abc.pool.add_int(id);
        code.replace(coerce, Instruction::property(OpCode::Coerce, socket_type))?;
        code.insert_range(
            at,
            vec![
                Instruction::get_local(2),
                Instruction::push_constant(OpCode::PushInt, packet),
                Instruction::get_local(6),
                shout,
            ],
        );

        self.commit(unit, method, &code)?;
        log::info!("Injected the key shouter for packet {}", id);
        Ok(true)
    }

    /// Make both host checks pass and keep the connection host from being rewritten.
    ///
    /// The checks are the first `(1):Boolean` static method of the first unit's first
    /// class and `Habbo`'s `(String, Object):Boolean` method. Each gets a
    /// `pushtrue, returnvalue` prefix.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] for undecodable bytecode.
    pub fn disable_host_checks(&mut self) -> Result<bool> {
        let Some(local) = self.unit(0).and_then(|abc| {
            abc.find_method(Container::Class(0), MethodFilter::signature(1, "Boolean"))
        }) else {
            return Ok(false);
        };
        let Some((unit, habbo)) = self.locate_class("Habbo") else {
            return Ok(false);
        };
        let Some(abc) = self.unit(unit) else {
            return Ok(false);
        };
        let remote = abc
            .find_methods(
                Container::Instance(habbo),
                MethodFilter::signature(2, "Boolean"),
            )
            .map(|(_, method)| method)
            .find(|&method| {
                abc.methods.get(method as usize).is_some_and(|info| {
                    info.parameters
                        .iter()
                        .map(|parameter| abc.type_name(parameter.type_name))
                        .eq(["String", "Object"])
                })
            });
        let Some(remote) = remote else {
            return Ok(false);
        };

        for (unit, method) in [(0, local), (unit, remote)] {
            let Some(mut code) = self.editable_code(unit, method)? else {
                return Ok(false);
            };
            if code.starts_with(&[OpCode::PushTrue, OpCode::ReturnValue]) {
                continue;
            }
            code.insert_range(
                0,
                vec![
                    Instruction::Bare(OpCode::PushTrue),
                    Instruction::Bare(OpCode::ReturnValue),
                ],
            );
            self.commit(unit, method, &code)?;
        }
        log::info!("Disabled host checks");
        self.disable_host_changes()
    }

    /// Re-read the host slot of `HabboCommunicationManager` right before connecting and
    /// neutralize the constants that build a host suffix.
    fn disable_host_changes(&mut self) -> Result<bool> {
        let Some((unit, class)) = self.locate_class("HabboCommunicationManager") else {
            return Ok(false);
        };
        let container = Container::Instance(class);
        let Some(abc) = self.unit(unit) else {
            return Ok(false);
        };

        let Some(host_slot) = slot_of_type(abc, container, "String") else {
            return Ok(false);
        };
        let Some(get_property) = abc.pool.multiname_index("getProperty") else {
            return Ok(false);
        };
        let Some(init) = abc.find_method(container, MethodFilter::named("initComponent", 0, "void"))
        else {
            return Ok(false);
        };
        let Some(init_body) = abc.body(init) else {
            return Ok(false);
        };
        // The last call of `initComponent` is the connect method
        let init_code = init_body.parse_code()?;
        let Some(connect_name) = init_code
            .iter()
            .rev()
            .find(|instruction| instruction.opcode() == OpCode::CallPropVoid)
            .and_then(|instruction| abc.pool.multiname_name(instruction.multiname()?))
        else {
            return Ok(false);
        };
        let Some(connect) = abc.find_method(container, MethodFilter::named(connect_name, 0, "void"))
        else {
            return Ok(false);
        };

        let Some(mut code) = self.editable_code(unit, connect)? else {
            return Ok(false);
        };
        let Some(abc) = self.unit(unit) else {
            return Ok(false);
        };
        if code.iter().any(|i| pushes_string(abc, i, HOST_PROPERTY)) {
            return Ok(true);
        }

        let abc = self.unit_mut(unit).ok_or(Error::OutOfBounds)?;
        let host = abc.pool.add_string(HOST_PROPERTY);
        let suffix = abc.pool.add_int(HOST_SUFFIX_CONSTANT);

        code.insert_range(
            4,
            vec![
                Instruction::get_local(0),
                Instruction::property(OpCode::FindPropStrict, get_property),
                Instruction::push_constant(OpCode::PushString, host),
                Instruction::call_property(OpCode::CallProperty, get_property, 1),
                Instruction::property(OpCode::InitProperty, host_slot),
            ],
        );
        for index in 0..code.len() {
            if let Some(Instruction::PushConstant {
                op: OpCode::PushInt,
                index: value,
            }) = code.get_mut(index)
            {
                *value = suffix;
            }
        }

        self.commit(unit, connect, &code)?;
        log::info!("Disabled host changes");
        Ok(true)
    }

    /// Connect to `127.0.0.1:port` instead of the configured endpoint.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] for undecodable bytecode.
    pub fn inject_loopback_endpoint(&mut self, port: u16) -> Result<bool> {
        let Some((unit, class)) = self.locate_class("SocketConnection") else {
            return Ok(false);
        };
        let Some(init) = self.unit(unit).and_then(|abc| {
            abc.find_method(
                Container::Instance(class),
                MethodFilter::named("init", 2, "Boolean"),
            )
        }) else {
            return Ok(false);
        };
        let Some(mut code) = self.editable_code(unit, init)? else {
            return Ok(false);
        };
        let Some(abc) = self.unit(unit) else {
            return Ok(false);
        };
        let Some(connect) = code
            .iter()
            .position(|i| calls(abc, i, OpCode::CallPropVoid, "connect"))
            .filter(|&index| index >= 2)
        else {
            return Ok(false);
        };

        let abc = self.unit_mut(unit).ok_or(Error::OutOfBounds)?;
        let host = abc.pool.add_string(LOOPBACK_HOST);
        let port = abc.pool.add_int(i32::from(port));
        code.replace(
            connect - 2,
            Instruction::push_constant(OpCode::PushString, host),
        )?;
        code.replace(connect - 1, Instruction::push_constant(OpCode::PushInt, port))?;

        self.commit(unit, init, &code)?;
        log::info!("Redirected the connection to {}", LOOPBACK_HOST);
        Ok(true)
    }

    /// Forward the client's debug log to a page function through `ExternalInterface`,
    /// `console.log` unless `function` is given.
    ///
    /// The logger is the class with two static traits whose static `log(0):void` method
    /// receives the message.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] for undecodable bytecode.
    pub fn enable_debug_logger(&mut self, function: Option<&str>) -> Result<bool> {
        let target = self.swf.abc_files().enumerate().find_map(|(unit, abc)| {
            (0..abc.classes.len()).find_map(|class| {
                if abc.classes[class].traits.len() != 2 {
                    return None;
                }
                abc.find_method(Container::Class(class), MethodFilter::named("log", 0, "void"))
                    .map(|method| (unit, method))
            })
        });
        let Some((unit, log_method)) = target else {
            return Ok(false);
        };
        let Some(abc) = self.unit(unit) else {
            return Ok(false);
        };
        let (Some(external), Some(available), Some(call)) = (
            abc.pool.multiname_index("ExternalInterface"),
            abc.pool.multiname_index("available"),
            abc.pool.multiname_index("call"),
        ) else {
            return Ok(false);
        };

        let Some(mut code) = self.editable_code(unit, log_method)? else {
            return Ok(false);
        };
        let forward = Instruction::call_property(OpCode::CallPropVoid, call, 2);
        if code.iter().any(|instruction| *instruction == forward) {
            return Ok(true);
        }
        let Some(exit) = code.index_of(OpCode::ReturnVoid) else {
            return Ok(false);
        };
        let start = code.index_of(OpCode::PushScope).map_or(0, |index| index + 1);

        let abc = self.unit_mut(unit).ok_or(Error::OutOfBounds)?;
        let function = abc.pool.add_string(function.unwrap_or(DEFAULT_LOG_FUNCTION));

        let guard = vec![
            Instruction::property(OpCode::GetLex, external),
            Instruction::property(OpCode::GetProperty, available),
            Instruction::branch(OpCode::IfFalse),
            Instruction::property(OpCode::GetLex, external),
            Instruction::push_constant(OpCode::PushString, function),
            Instruction::get_local(1),
            forward,
        ];
        let inserted = guard.len();
        code.insert_range(start, guard);
        let exit = if exit >= start { exit + inserted } else { exit };
        code.set_jump_exit(start + 2, exit)?;

        self.commit(unit, log_method, &code)?;
        log::info!("Enabled the debug logger");
        Ok(true)
    }

    /// Log every outgoing message through `Core.debug`.
    ///
    /// `Core.debug` loses its enable guard and becomes variadic; `function`, when given,
    /// replaces the page function it calls. Every outgoing serializer then passes its
    /// result array to `Core.debug` before returning it.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] for undecodable bytecode.
    pub fn inject_message_logger(&mut self, function: Option<&str>) -> Result<bool> {
        let Some((unit, core)) = self.locate_class("Core") else {
            return Ok(false);
        };
        let Some(debug) = self.unit(unit).and_then(|abc| {
            abc.find_method(Container::Class(core), MethodFilter::named("debug", 1, "void"))
                .or_else(|| {
                    abc.find_method(Container::Class(core), MethodFilter::named("debug", 0, "void"))
                        .filter(|&method| {
                            abc.methods.get(method as usize).is_some_and(|info| {
                                info.flags.contains(MethodFlags::NEED_REST)
                            })
                        })
                })
        }) else {
            return Ok(false);
        };
        if !self.unguard_debug(unit, debug, function)? {
            return Ok(false);
        }

        let Some(last) = self.swf.abc_files().count().checked_sub(1) else {
            return Ok(false);
        };
        let Some(classes) = self.messages().map(|registry| {
            registry
                .messages()
                .iter()
                .filter(|message| message.is_outgoing())
                .map(|message| message.class)
                .collect::<Vec<_>>()
        }) else {
            return Ok(false);
        };
        let Some(abc) = self.unit(last) else {
            return Ok(false);
        };
        let (Some(core_name), Some(debug_name)) = (
            abc.pool.multiname_index("Core"),
            abc.pool.multiname_index("debug"),
        ) else {
            return Ok(false);
        };

        let resolver = StructureResolver::new(abc);
        let mut serializers = BTreeSet::new();
        for class in classes {
            match resolver.serializer(class)? {
                Some(method) => {
                    serializers.insert(method);
                }
                None => log::debug!("Outgoing message class {} has no serializer", class),
            }
        }

        let report = Instruction::call_property(OpCode::CallPropVoid, debug_name, 1);
        let mut instrumented = 0;
        for method in serializers {
            let Some(mut code) = self.editable_code(last, method)? else {
                continue;
            };
            if code.iter().any(|instruction| *instruction == report) {
                continue;
            }
            let Some(exit) = code.index_of(OpCode::ReturnValue) else {
                continue;
            };
            code.insert_range(
                exit,
                vec![
                    Instruction::Bare(OpCode::Dup),
                    Instruction::set_local(1),
                    Instruction::property(OpCode::GetLex, core_name),
                    Instruction::get_local(1),
                    report.clone(),
                ],
            );
            self.commit(last, method, &code)?;
            instrumented += 1;
        }

        log::info!("Instrumented {} message serializers", instrumented);
        Ok(true)
    }

    fn unguard_debug(&mut self, unit: usize, debug: u32, function: Option<&str>) -> Result<bool> {
        let Some(mut code) = self.editable_code(unit, debug)? else {
            return Ok(false);
        };

        let guard = code.iter().position(|i| i.opcode() == OpCode::IfFalse);
        if let Some(branch) = guard.filter(|&index| index > 0) {
            let Some(end) = code.jump_exit(branch).filter(|&end| end > branch) else {
                return Ok(false);
            };
            if unless_referenced(code.remove_range(branch - 1..end))?.is_none() {
                return Ok(false);
            }
        }

        let abc = self.unit_mut(unit).ok_or(Error::OutOfBounds)?;
        if let Some(function) = function.filter(|f| !f.trim().is_empty()) {
            let name = abc.pool.add_string(function);
            if let Some(push) = code.index_of(OpCode::PushString) {
                code.replace(push, Instruction::push_constant(OpCode::PushString, name))?;
            }
        }
        if let Some(info) = abc.methods.get_mut(debug as usize) {
            info.flags |= MethodFlags::NEED_REST;
            info.parameters.clear();
        }

        self.commit(unit, debug, &code)?;
        Ok(true)
    }

    /// Make `KeyObfuscator` return the given RSA key parts.
    ///
    /// The static `():String` methods with trait ids 6 and 7 return the modulus and the
    /// exponent. Returns `Ok(true)` only if both were rewritten.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] for undecodable bytecode.
    pub fn replace_rsa_keys(&mut self, exponent: &str, modulus: &str) -> Result<bool> {
        let Some((unit, class)) = self.locate_class("KeyObfuscator") else {
            return Ok(false);
        };
        let container = Container::Class(class);
        let Some(abc) = self.unit(unit) else {
            return Ok(false);
        };
        let targets = abc
            .find_methods(container, MethodFilter::signature(0, "String"))
            .filter_map(|(trait_index, method)| {
                match abc.traits_of(container).get(trait_index)?.id {
                    MODULUS_TRAIT_ID => Some((method, modulus)),
                    EXPONENT_TRAIT_ID => Some((method, exponent)),
                    _ => None,
                }
            })
            .collect::<Vec<_>>();

        let mut modified = 0;
        for (method, value) in targets {
            let Some(mut code) = self.editable_code(unit, method)? else {
                continue;
            };
            if code.starts_with(&[OpCode::PushString, OpCode::ReturnValue])
                && unless_referenced(code.remove_range(0..2))?.is_none()
            {
                continue;
            }
            let abc = self.unit_mut(unit).ok_or(Error::OutOfBounds)?;
            let key = abc.pool.add_string(value);
            code.insert_range(
                0,
                vec![
                    Instruction::push_constant(OpCode::PushString, key),
                    Instruction::Bare(OpCode::ReturnValue),
                ],
            );
            self.commit(unit, method, &code)?;
            modified += 1;
        }

        log::info!("Replaced {} RSA key parts", modified);
        Ok(modified == 2)
    }

    /// Skip the key exchange: `HabboCommunicationDemo`'s crypto setup hands its
    /// connection straight to the completion handler. Encryption is disabled first.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] for undecodable bytecode.
    pub fn disable_handshake(&mut self) -> Result<bool> {
        if !self.disable_encryption()? {
            return Ok(false);
        }
        let Some((unit, class)) = self.locate_class("HabboCommunicationDemo") else {
            return Ok(false);
        };
        let container = Container::Instance(class);
        let Some(abc) = self.unit(unit) else {
            return Ok(false);
        };
        let candidates = abc
            .find_methods(container, MethodFilter::signature(1, "void"))
            .collect::<Vec<_>>();

        // `initCrypto(event:Event = null)` coerces its connection to the type the
        // completion handler takes as its only parameter
        let mut setup: Option<(u32, Code, u32)> = None;
        for (trait_index, method) in candidates {
            let Some(abc) = self.unit(unit) else {
                return Ok(false);
            };
            let Some(parameter) = abc
                .methods
                .get(method as usize)
                .and_then(|info| info.parameters.first())
            else {
                continue;
            };

            if setup.is_none() {
                if parameter.is_optional() && abc.type_name(parameter.type_name) == "Event" {
                    let Some(code) = self.editable_code(unit, method)? else {
                        return Ok(false);
                    };
                    let Some(handshake_type) = code
                        .iter()
                        .find(|i| i.opcode() == OpCode::Coerce)
                        .and_then(Instruction::multiname)
                    else {
                        return Ok(false);
                    };
                    setup = Some((method, code, handshake_type));
                }
                continue;
            }
            let Some((init, code, handshake_type)) = setup.as_mut() else {
                continue;
            };
            if parameter.type_name != *handshake_type {
                continue;
            }

            let Some(handler) = abc.traits_of(container).get(trait_index).map(|e| e.name) else {
                continue;
            };
            let completion = [
                Instruction::get_local(0),
                Instruction::get_local(2),
                Instruction::call_property(OpCode::CallPropVoid, handler, 1),
            ];
            if code
                .instructions()
                .windows(completion.len())
                .any(|window| window == completion)
            {
                return Ok(true);
            }

            let Some(start) = code.len().checked_sub(6) else {
                return Ok(false);
            };
            if unless_referenced(code.remove_range(start..start + 5))?.is_none() {
                return Ok(false);
            }
            code.insert_range(start, completion.to_vec());

            self.commit(unit, *init, code)?;
            log::info!("Disabled the handshake");
            return Ok(true);
        }
        Ok(false)
    }
}
