//! Call sites of messages across the unit.
//!
//! Outgoing messages are referenced where they are constructed. Incoming messages are
//! referenced through the callback handed to the event's constructor, so the reference
//! points at the handler rather than at the subscribing method.

use std::collections::HashMap;

use crate::{
    abc::{AbcFile, Container, TraitData, TraitKind},
    assembly::{Instruction, OpCode},
    messages::{MessageItem, MessageReference},
    Error, Result,
};

/// A method to scan, the container it runs in, and whether that is the static side.
type Scanned = (u32, Container, bool);

struct Scanner<'a> {
    abc: &'a AbcFile,
    messages: &'a [MessageItem],
    by_class: &'a HashMap<usize, usize>,
}

/// Attach every call site in `abc` to the messages it references.
///
/// Classes are visited in declaration order, skipping message classes and interfaces.
/// Within a class the static initializer comes first, then the instance initializer,
/// instance methods and static methods.
///
/// # Errors
/// Returns [`Error::Corrupt`] for undecodable bytecode and [`Error::RecursionLimit`] for
/// closures nested beyond the hierarchy limit.
pub(crate) fn find_references(abc: &AbcFile, messages: &mut [MessageItem]) -> Result<()> {
    let by_class = messages
        .iter()
        .enumerate()
        .map(|(index, message)| (message.class, index))
        .collect::<HashMap<_, _>>();

    let mut class_rank = 0;
    for class in 0..abc.instances.len() {
        if by_class.contains_key(&class) || abc.instances[class].is_interface() {
            continue;
        }

        let mut method_rank = 0;
        for (method, container, is_static) in class_methods(abc, class) {
            let scanner = Scanner {
                abc,
                messages,
                by_class: &by_class,
            };
            let mut found = Vec::new();
            scanner.scan(container, method, 0, &mut found)?;
            if found.is_empty() {
                continue;
            }

            if method_rank == 0 {
                class_rank += 1;
            }
            method_rank += 1;
            let group_count = found.len();
            for (index, mut reference) in found {
                reference.from_class = Some(class);
                reference.is_static = is_static;
                reference.group_count = group_count;
                reference.class_rank = class_rank;
                reference.method_rank = method_rank;
                messages[index].references.push(reference);
            }
        }
    }

    log::debug!(
        "Found {} message references in {} classes",
        messages.iter().map(|m| m.references.len()).sum::<usize>(),
        class_rank
    );
    Ok(())
}

fn class_methods(abc: &AbcFile, class: usize) -> Vec<Scanned> {
    let mut methods = Vec::new();
    if let Some(initializer) = abc.initializer_of(Container::Class(class)) {
        methods.push((initializer, Container::Class(class), true));
    }
    if let Some(initializer) = abc.initializer_of(Container::Instance(class)) {
        methods.push((initializer, Container::Instance(class), false));
    }
    for (container, is_static) in [
        (Container::Instance(class), false),
        (Container::Class(class), true),
    ] {
        methods.extend(
            abc.traits_of(container)
                .iter()
                .filter(|entry| is_method_kind(entry.kind))
                .filter_map(|entry| entry.method())
                .map(|method| (method, container, is_static)),
        );
    }
    methods
}

fn is_method_kind(kind: TraitKind) -> bool {
    matches!(kind, TraitKind::Method | TraitKind::Getter | TraitKind::Setter)
}

impl Scanner<'_> {
    fn scan(
        &self,
        container: Container,
        method: u32,
        depth: usize,
        found: &mut Vec<(usize, MessageReference)>,
    ) -> Result<()> {
        let limit = self.abc.hierarchy_limit();
        if depth > limit {
            return Err(Error::RecursionLimit(limit));
        }
        let Some(body) = self.abc.body(method) else {
            return Ok(());
        };
        let code = body.parse_code()?;

        let mut names: Vec<&str> = Vec::new();
        let mut receiver = None;
        for instruction in &code {
            match instruction {
                Instruction::Index {
                    op: OpCode::NewFunction,
                    index,
                } => self.scan(container, *index, depth + 1, found)?,
                Instruction::Property {
                    op: OpCode::GetProperty,
                    name,
                } => {
                    if let Some(name) = self.abc.pool.multiname_name(*name) {
                        names.push(name);
                    }
                }
                Instruction::Property {
                    op: OpCode::GetLex,
                    name,
                } => {
                    receiver = self.abc.class_by_multiname(*name).map(Container::Class);
                }
                Instruction::Bare(OpCode::GetLocal0) => receiver = Some(container),
                Instruction::CallProperty {
                    op: OpCode::ConstructProp,
                    name,
                    ..
                } => {
                    if let Some(name) = self.abc.pool.multiname_name(*name) {
                        names.push(name);
                    }
                    if let Some(&index) = self
                        .abc
                        .class_by_multiname(*name)
                        .and_then(|class| self.by_class.get(&class))
                    {
                        self.matched(index, container, receiver, method, &names, found);
                    }
                    names.clear();
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn matched(
        &self,
        index: usize,
        container: Container,
        receiver: Option<Container>,
        method: u32,
        names: &[&str],
        found: &mut Vec<(usize, MessageReference)>,
    ) {
        let message = &self.messages[index];

        let (from_method, instruction_rank) = if message.is_outgoing() {
            let rank = found
                .iter()
                .filter(|(i, r)| self.messages[*i].is_outgoing() && r.from_method == Some(method))
                .count();
            (method, rank + 1)
        } else {
            // The event's own name is last; the callback precedes it
            let preceding = names.split_last().map_or(&[][..], |(_, rest)| rest);
            let Some(callback) = self.callback(container, receiver, preceding) else {
                return;
            };
            (callback, 0)
        };

        let duplicate = message.has_method_reference(from_method)
            || found
                .iter()
                .any(|(i, r)| *i == index && r.from_method == Some(from_method));
        if duplicate {
            return;
        }

        found.push((
            index,
            MessageReference {
                from_method: Some(from_method),
                is_anonymous: self.abc.method_owner(from_method).is_none(),
                instruction_rank,
                ..MessageReference::default()
            },
        ));
    }

    // Handler named by the last property read before the construction
    fn callback(&self, container: Container, receiver: Option<Container>, names: &[&str]) -> Option<u32> {
        let (&name, path) = names.split_last()?;
        if let Some(method) = self.method_named(container, name) {
            return Some(method);
        }
        if let Some(method) = receiver.and_then(|receiver| self.method_named(receiver, name)) {
            return Some(method);
        }
        path.iter().rev().find_map(|&slot| {
            let class = self.slot_class(container, slot)?;
            self.method_named(Container::Instance(class), name)
        })
    }

    fn method_named(&self, container: Container, name: &str) -> Option<u32> {
        self.abc
            .traits_of(container)
            .iter()
            .filter(|entry| is_method_kind(entry.kind))
            .find(|entry| self.abc.pool.multiname_name(entry.name) == Some(name))
            .and_then(|entry| entry.method())
    }

    fn slot_class(&self, container: Container, name: &str) -> Option<usize> {
        self.abc.traits_of(container).iter().find_map(|entry| match entry.data {
            TraitData::Slot { type_name, .. }
                if self.abc.pool.multiname_name(entry.name) == Some(name) =>
            {
                self.abc.class_by_multiname(type_name)
            }
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AnalysisConfig,
        messages::{Direction, MessageRegistry},
        test::{assemble, u30, AbcBuilder},
    };

    fn construct(builder: &mut AbcBuilder, class: &str) -> Vec<Instruction> {
        let name = builder.qname(class);
        vec![
            Instruction::property(OpCode::FindPropStrict, name),
            Instruction::call_property(OpCode::ConstructProp, name, 0),
            Instruction::Bare(OpCode::Pop),
        ]
    }

    fn body(mut instructions: Vec<Instruction>) -> Vec<u8> {
        let mut code = vec![
            Instruction::Bare(OpCode::GetLocal0),
            Instruction::Bare(OpCode::PushScope),
        ];
        code.append(&mut instructions);
        code.push(Instruction::Bare(OpCode::ReturnVoid));
        assemble(code)
    }

    #[test]
    fn outgoing_ranks() {
        let mut builder = AbcBuilder::new();
        let first = builder.class("_-1aA", None);
        let second = builder.class("_-1bB", None);
        let caller = builder.class("_-2cC", None);

        let mut twice = construct(&mut builder, "_-1aA");
        twice.extend(construct(&mut builder, "_-1bB"));
        twice.extend(construct(&mut builder, "_-1aA"));
        let code = body(twice);
        let sender = builder.method(caller, "_-3dD", &[], "void", &code);
        let code = body(construct(&mut builder, "_-1bB"));
        let static_sender = builder.static_method(caller, "_-3eE", &[], "void", &code);
        let abc = builder.build();

        let mut messages = vec![
            MessageItem::new(1, Direction::Outgoing, first),
            MessageItem::new(2, Direction::Outgoing, second),
        ];
        find_references(&abc, &mut messages).unwrap();

        assert_eq!(messages[0].references.len(), 1);
        let reference = &messages[0].references[0];
        assert_eq!(reference.from_class, Some(caller));
        assert_eq!(reference.from_method, Some(sender));
        assert_eq!(reference.group_count, 2);
        assert_eq!(reference.class_rank, 1);
        assert_eq!(reference.method_rank, 1);
        assert_eq!(reference.instruction_rank, 1);
        assert!(!reference.is_static);
        assert!(!reference.is_anonymous);

        assert_eq!(messages[1].references.len(), 2);
        assert_eq!(messages[1].references[0].instruction_rank, 2);
        let later = &messages[1].references[1];
        assert_eq!(later.from_method, Some(static_sender));
        assert!(later.is_static);
        assert_eq!(later.method_rank, 2);
        assert_eq!(later.group_count, 1);
    }

    #[test]
    fn closures_are_anonymous() {
        let mut builder = AbcBuilder::new();
        let message = builder.class("_-1aA", None);
        let caller = builder.class("_-2cC", None);
        let code = body(construct(&mut builder, "_-1aA"));
        let closure = builder.add_method(&[], "void", &code);

        let mut code = vec![0xD0, 0x30, 0x40];
        code.extend(u30(closure));
        code.extend([0x29, 0x47]);
        builder.method(caller, "_-3dD", &[], "void", &code);
        let abc = builder.build();

        let mut messages = vec![MessageItem::new(1, Direction::Outgoing, message)];
        find_references(&abc, &mut messages).unwrap();

        let reference = &messages[0].references[0];
        assert_eq!(reference.from_method, Some(closure));
        assert!(reference.is_anonymous);
    }

    #[test]
    fn incoming_references_name_the_callback() {
        let mut builder = AbcBuilder::new();
        let event = builder.class("_-1aA", None);
        let caller = builder.class("_-2cC", None);
        let handler = builder.method(caller, "onRoomReady", &["*"], "void", &[0x47]);

        let callback = builder.qname("onRoomReady");
        let mut subscribe = vec![Instruction::Bare(OpCode::GetLocal0)];
        subscribe.push(Instruction::property(OpCode::GetProperty, callback));
        let name = builder.qname("_-1aA");
        subscribe.push(Instruction::call_property(OpCode::ConstructProp, name, 1));
        subscribe.push(Instruction::Bare(OpCode::Pop));
        let code = body(subscribe);
        builder.constructor(caller, &[], &code);
        let abc = builder.build();

        let mut messages = vec![MessageItem::new(9, Direction::Incoming, event)];
        find_references(&abc, &mut messages).unwrap();

        assert_eq!(messages[0].references.len(), 1);
        let reference = &messages[0].references[0];
        assert_eq!(reference.from_method, Some(handler));
        assert_eq!(reference.instruction_rank, 0);
        assert!(!reference.is_anonymous);
    }

    // Registry, one outgoing message and one caller, all under the given names
    fn client(names: [&str; 4], extra_call: bool) -> AbcFile {
        let [message, caller, method, other] = names;
        let mut builder = AbcBuilder::new();
        builder.class(message, None);
        let target = builder.qname(message);
        let caller = builder.class(caller, None);
        let code = body(construct(&mut builder, message));
        builder.method(caller, method, &[], "void", &code);
        if extra_call {
            let code = body(construct(&mut builder, message));
            builder.static_method(caller, other, &["int"], "void", &code);
        }

        let registry = builder.class("HabboMessages", None);
        builder.static_slot(registry, "_-in", "Object");
        builder.static_slot(registry, "_-out", "Object");
        let outgoing = builder.qname("_-out");
        let code = body(vec![
            Instruction::property(OpCode::GetLex, outgoing),
            Instruction::PushShort(310),
            Instruction::property(OpCode::GetLex, target),
            Instruction::Bare(OpCode::Pop),
            Instruction::Bare(OpCode::Pop),
        ]);
        builder.static_initializer(registry, &code);
        builder.build()
    }

    fn fingerprint(abc: &AbcFile) -> String {
        let config = AnalysisConfig::default().sequential();
        let registry = MessageRegistry::load(abc, &config).unwrap().unwrap();
        registry.outgoing(310).unwrap().hash.clone().unwrap()
    }

    #[test]
    fn fingerprints_survive_renaming() {
        let first = client(["_-1aA", "_-2bB", "_-3cC", "_-4dD"], false);
        let second = client(["_-7xX", "_-8yY", "_-9zZ", "_-0wW"], false);
        assert_eq!(fingerprint(&first), fingerprint(&second));

        let extended = client(["_-1aA", "_-2bB", "_-3cC", "_-4dD"], true);
        assert_ne!(fingerprint(&first), fingerprint(&extended));
    }

    #[test]
    fn registry_groups_equal_hashes() {
        let abc = client(["_-1aA", "_-2bB", "_-3cC", "_-4dD"], true);
        let registry = MessageRegistry::load(&abc, &AnalysisConfig::default())
            .unwrap()
            .unwrap();
        let message = registry.outgoing(310).unwrap();
        assert_eq!(message.references.len(), 2);

        let hash = message.hash.as_deref().unwrap();
        assert_eq!(registry.with_hash(hash).count(), 1);
        assert_eq!(registry.hashes().count(), 1);
    }
}
