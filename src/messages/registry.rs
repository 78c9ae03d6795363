//! Registry discovery and per-message enrichment.

use rayon::prelude::*;

use crate::{
    abc::{AbcFile, Container, Trait},
    assembly::{Instruction, OpCode},
    config::AnalysisConfig,
    messages::{
        hasher::hash_message, references::find_references, Direction, MessageItem,
        MessageRegistry, StructureResolver,
    },
    Error, Result,
};

/// Header id of the outgoing message whose serializer carries the client revision.
const REVISION_MESSAGE: u16 = 4000;

/// Structure outcome of one message: its parser class and its field types.
type Resolved = (Option<usize>, Option<Vec<String>>);

impl MessageRegistry {
    /// Recover the message table of `abc` and enrich every message with its structure,
    /// references and fingerprint.
    ///
    /// Returns `Ok(None)` if no registry class is found. Failures on a single message are
    /// logged and leave that message with an unknown structure.
    ///
    /// # Errors
    /// - [`Error::Corrupt`] if the registry initializer does not decode
    /// - [`Error::UnclassifiedValue`] if a serializer stores a value of unknown type
    pub fn load(abc: &AbcFile, config: &AnalysisConfig) -> Result<Option<Self>> {
        let Some(mut registry) = Self::discover(abc, config)? else {
            log::debug!("No message registry class found");
            return Ok(None);
        };

        registry.revision = registry.find_revision(abc);
        registry.extract_structures(abc, config.parallel)?;
        find_references(abc, &mut registry.messages)?;
        registry.hash_messages(abc);

        log::info!(
            "Recovered {} messages ({} incoming ids, {} outgoing ids, revision {:?})",
            registry.messages.len(),
            registry.incoming.len(),
            registry.outgoing.len(),
            registry.revision
        );
        Ok(Some(registry))
    }

    /// Locate the registry class and read its registration table.
    fn discover(abc: &AbcFile, config: &AnalysisConfig) -> Result<Option<Self>> {
        let named = config
            .registry_class_name
            .as_deref()
            .and_then(|name| abc.find_class(name));
        let Some((class, named)) = named
            .map(|class| (class, true))
            .or_else(|| find_by_shape(abc).map(|class| (class, false)))
        else {
            return Ok(None);
        };

        let maps = abc.traits_of(Container::Class(class));
        let (Some(incoming_map), Some(outgoing_map)) = (maps.first(), maps.get(1)) else {
            log::warn!("Registry class {} lacks its two id maps", class);
            return Ok(None);
        };

        let Some(initializer) = abc.initializer_of(Container::Class(class)) else {
            return Ok(None);
        };
        let Some(body) = abc.body(initializer) else {
            return Ok(None);
        };
        let code = body.parse_code()?;

        let relevant = code
            .iter()
            .filter(|instruction| {
                matches!(
                    instruction.opcode(),
                    OpCode::GetLex
                        | OpCode::PushByte
                        | OpCode::PushShort
                        | OpCode::PushInt
                        | OpCode::PushUInt
                )
            })
            .collect::<Vec<_>>();

        let mut registry = MessageRegistry::empty(class, named);
        for window in relevant.windows(3) {
            let [map, id, target] = window else {
                continue;
            };
            let direction = if names_trait(abc, map, incoming_map) {
                Direction::Incoming
            } else if names_trait(abc, map, outgoing_map) {
                Direction::Outgoing
            } else {
                continue;
            };
            let Some(id) = registered_id(abc, id) else {
                continue;
            };
            if target.opcode() != OpCode::GetLex {
                continue;
            }
            let Some(message_class) = target
                .multiname()
                .and_then(|name| abc.class_by_multiname(name))
            else {
                continue;
            };
            registry.register(id, direction, message_class);
        }

        log::debug!(
            "Registry class {} ({}) lists {} messages",
            class,
            if named { "by name" } else { "by shape" },
            registry.messages.len()
        );
        Ok(Some(registry))
    }

    fn register(&mut self, id: u16, direction: Direction, class: usize) {
        let ids = match direction {
            Direction::Incoming => &mut self.incoming,
            Direction::Outgoing => &mut self.outgoing,
        };
        if ids.contains_key(&id) {
            return;
        }

        if let Some(&index) = self.by_class.get(&class) {
            let message = &mut self.messages[index];
            if message.direction != direction {
                log::debug!("Class {} registered in both directions", class);
                return;
            }
            message.aliases.push(id);
            ids.insert(id, index);
            return;
        }

        let index = self.messages.len();
        self.messages.push(MessageItem::new(id, direction, class));
        ids.insert(id, index);
        self.by_class.insert(class, index);
    }

    fn find_revision(&self, abc: &AbcFile) -> Option<String> {
        let message = self.outgoing(REVISION_MESSAGE)?;
        let serializer = StructureResolver::new(abc)
            .serializer(message.class)
            .ok()
            .flatten()?;
        let code = abc.body(serializer)?.parse_code().ok()?;
        code.iter().find_map(|instruction| match instruction {
            Instruction::PushConstant {
                op: OpCode::PushString,
                index,
            } => abc.pool.string(*index).map(str::to_string),
            _ => None,
        })
    }

    fn extract_structures(&mut self, abc: &AbcFile, parallel: bool) -> Result<()> {
        let resolver = StructureResolver::new(abc);
        let results: Vec<Result<Resolved>> = if parallel {
            self.messages
                .par_iter()
                .map(|message| resolve(&resolver, message))
                .collect()
        } else {
            self.messages
                .iter()
                .map(|message| resolve(&resolver, message))
                .collect()
        };

        for (message, result) in self.messages.iter_mut().zip(results) {
            let (parser, structure) = result?;
            message.parser = parser;
            message.structure = structure;
        }
        Ok(())
    }

    fn hash_messages(&mut self, abc: &AbcFile) {
        for (index, message) in self.messages.iter_mut().enumerate() {
            match hash_message(abc, message) {
                Ok(hash) => {
                    self.by_hash.entry(hash.clone()).or_default().push(index);
                    message.hash = Some(hash);
                }
                Err(error) => {
                    log::warn!("Cannot fingerprint message {}: {}", message.id, error);
                }
            }
        }
    }
}

// Two static traits and three instance traits
fn find_by_shape(abc: &AbcFile) -> Option<usize> {
    (0..abc.classes.len()).find(|&class| {
        abc.classes[class].traits.len() == 2
            && abc
                .instances
                .get(class)
                .is_some_and(|instance| instance.traits.len() == 3)
    })
}

fn names_trait(abc: &AbcFile, instruction: &Instruction, entry: &Trait) -> bool {
    if instruction.opcode() != OpCode::GetLex {
        return false;
    }
    let Some(name) = instruction.multiname() else {
        return false;
    };
    name == entry.name
        || abc
            .pool
            .multiname_name(name)
            .is_some_and(|name| abc.pool.multiname_name(entry.name) == Some(name))
}

fn registered_id(abc: &AbcFile, instruction: &Instruction) -> Option<u16> {
    let value = match instruction {
        Instruction::PushByte(value) => i64::from(*value),
        Instruction::PushShort(value) => i64::from(*value),
        Instruction::PushConstant {
            op: OpCode::PushInt,
            index,
        } => i64::from(abc.pool.int(*index)?),
        Instruction::PushConstant {
            op: OpCode::PushUInt,
            index,
        } => i64::from(abc.pool.uint(*index)?),
        _ => return None,
    };
    u16::try_from(value).ok()
}

fn resolve(resolver: &StructureResolver<'_>, message: &MessageItem) -> Result<Resolved> {
    let (parser, attempt) = match message.direction {
        Direction::Outgoing => (None, resolver.outgoing(message.class)),
        Direction::Incoming => match resolver.find_parser(message.class) {
            Ok(Some(parser)) => (Some(parser), resolver.incoming(parser)),
            Ok(None) => return Ok((None, None)),
            Err(error) => (None, Err(error)),
        },
    };

    match attempt {
        Ok(structure) => Ok((parser, Some(structure))),
        Err(Error::UnsupportedStructure(reason)) => {
            log::debug!(
                "{} message {} has no static structure: {}",
                message.direction,
                message.id,
                reason
            );
            Ok((parser, None))
        }
        Err(error @ Error::UnclassifiedValue(_)) => Err(error),
        Err(error) => {
            log::warn!(
                "Structure of {} message {} failed: {}",
                message.direction,
                message.id,
                error
            );
            Ok((parser, None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{assemble, AbcBuilder};

    // Registry with an incoming and an outgoing map plus a third instance trait
    fn registry(builder: &mut AbcBuilder, name: &str, body: Vec<Instruction>) -> usize {
        let class = builder.class(name, None);
        builder.static_slot(class, "_-in", "Dictionary");
        builder.static_slot(class, "_-out", "Dictionary");
        builder.slot(class, "a", "int");
        builder.slot(class, "b", "int");
        builder.slot(class, "c", "int");
        let mut code = vec![
            Instruction::Bare(OpCode::GetLocal0),
            Instruction::Bare(OpCode::PushScope),
        ];
        code.extend(body);
        code.push(Instruction::Bare(OpCode::ReturnVoid));
        builder.static_initializer(class, &assemble(code));
        class
    }

    // `map[id] = class`, with the store reduced to a pop
    fn entry(map: u32, id: Instruction, class: u32) -> Vec<Instruction> {
        vec![
            Instruction::property(OpCode::GetLex, map),
            id,
            Instruction::property(OpCode::GetLex, class),
            Instruction::Bare(OpCode::Pop),
        ]
    }

    #[test]
    fn outgoing_registration_by_short() {
        let mut builder = AbcBuilder::new();
        let message = builder.class("_-3aZ", None);
        let outgoing = builder.qname("_-out");
        let target = builder.qname("_-3aZ");
        let body = entry(outgoing, Instruction::PushShort(4000), target);
        let table = registry(&mut builder, "HabboMessages", body);
        let abc = builder.build();

        let config = AnalysisConfig::default().sequential();
        let registry = MessageRegistry::load(&abc, &config).unwrap().unwrap();
        assert_eq!(registry.registry_class(), table);
        assert!(registry.is_named());

        let item = registry.outgoing(4000).unwrap();
        assert_eq!(item.class, message);
        assert!(item.is_outgoing());
        assert!(registry.incoming(4000).is_none());
        assert_eq!(registry.by_class(message).unwrap().id, 4000);
    }

    #[test]
    fn shared_class_gets_aliases() {
        let mut builder = AbcBuilder::new();
        let message = builder.class("_-9kL", None);
        let incoming = builder.qname("_-in");
        let target = builder.qname("_-9kL");
        let large = builder.int(1200);
        let mut body = entry(incoming, Instruction::PushByte(7), target);
        body.extend(entry(
            incoming,
            Instruction::push_constant(OpCode::PushInt, large),
            target,
        ));
        registry(&mut builder, "HabboMessages", body);
        let abc = builder.build();

        let registry = MessageRegistry::load(&abc, &AnalysisConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(registry.len(), 1);
        let item = registry.incoming(1200).unwrap();
        assert_eq!(item.id, 7);
        assert_eq!(item.aliases, vec![1200]);
        assert_eq!(item.ids().collect::<Vec<_>>(), vec![7, 1200]);
        assert_eq!(registry.by_class(message), Some(item));
        assert_eq!(registry.incoming_messages().count(), 2);
    }

    #[test]
    fn registry_found_by_shape() {
        let mut builder = AbcBuilder::new();
        builder.class("_-3aZ", None);
        let outgoing = builder.qname("_-out");
        let target = builder.qname("_-3aZ");
        let body = entry(outgoing, Instruction::PushByte(12), target);
        let table = registry(&mut builder, "_-0qQ", body);
        let abc = builder.build();

        let registry = MessageRegistry::load(&abc, &AnalysisConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(registry.registry_class(), table);
        assert!(!registry.is_named());
        assert!(registry.outgoing(12).is_some());
    }

    #[test]
    fn unit_without_registry() {
        let mut builder = AbcBuilder::new();
        builder.class("Widget", None);
        let abc = builder.build();

        assert!(MessageRegistry::load(&abc, &AnalysisConfig::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn revision_from_serializer() {
        let mut builder = AbcBuilder::new();
        let message = builder.class("_-3aZ", None);
        let revision = builder.string("PRODUCTION-201611291003-338511768");
        let serializer = assemble(vec![
            Instruction::Bare(OpCode::GetLocal0),
            Instruction::Bare(OpCode::PushScope),
            Instruction::push_constant(OpCode::PushString, revision),
            Instruction::ArgCount {
                op: OpCode::NewArray,
                arg_count: 1,
            },
            Instruction::Bare(OpCode::ReturnValue),
        ]);
        builder.method(message, "_-7uU", &[], "Array", &serializer);
        let outgoing = builder.qname("_-out");
        let target = builder.qname("_-3aZ");
        let body = entry(outgoing, Instruction::PushShort(4000), target);
        registry(&mut builder, "HabboMessages", body);
        let abc = builder.build();

        let registry = MessageRegistry::load(&abc, &AnalysisConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(
            registry.revision(),
            Some("PRODUCTION-201611291003-338511768")
        );
        assert_eq!(registry.outgoing(4000).unwrap().structure, None);
    }
}
