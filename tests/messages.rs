//! Message table recovery on complete clients, loaded through the container.

mod common;

use common::{body, prologue, swf_bytes, Unit};
use swfscope::{
    assembly::{Code, Instruction, OpCode},
    messages::Direction,
    AnalysisConfig, Game, Sanitization, SwfFile,
};

fn load(unit: Unit) -> Game {
    let swf = SwfFile::from_mem(swf_bytes(vec![unit.build()], &[])).unwrap();
    Game::with_config(swf, AnalysisConfig::default().sequential()).unwrap()
}

// Message class with typed slots and a `():Array` serializer reading them in order
fn message(unit: &mut Unit, name: &str, fields: &[(&str, &str)]) -> usize {
    let class = unit.class(name);
    let mut code = Vec::new();
    for (field, type_name) in fields {
        unit.slot(class, field, type_name);
        code.push(Instruction::get_local(0));
        code.push(Instruction::property(OpCode::GetProperty, unit.qname(field)));
    }
    code.push(Instruction::ArgCount {
        op: OpCode::NewArray,
        arg_count: fields.len() as u32,
    });
    code.push(Instruction::Bare(OpCode::ReturnValue));
    unit.method(class, "_-0aA", &[], "Array", &body(code));
    class
}

#[test]
fn outgoing_id_from_pushshort() {
    let mut unit = Unit::new();
    let class = message(&mut unit, "_-5eE", &[("_-text", "String")]);
    unit.registry(&[("_-out", Instruction::PushShort(4000), "_-5eE")]);
    let game = load(unit);

    let registry = game.messages().unwrap();
    assert_eq!(registry.len(), 1);
    let item = registry.outgoing(4000).unwrap();
    assert_eq!(item.direction, Direction::Outgoing);
    assert_eq!(item.class, class);
    assert!(registry.incoming(4000).is_none());
    assert_eq!(registry.by_class(class).map(|m| m.id), Some(4000));
}

#[test]
fn serializer_fields_in_order() {
    let mut unit = Unit::new();
    message(
        &mut unit,
        "_-6fF",
        &[("_-name", "String"), ("_-count", "int")],
    );
    unit.registry(&[("_-out", Instruction::PushShort(2011), "_-6fF")]);
    let game = load(unit);

    let item = game.messages().unwrap().outgoing(2011).unwrap();
    assert_eq!(
        item.structure,
        Some(vec!["String".to_string(), "int".to_string()])
    );
}

#[test]
fn data_dependent_serializer_is_unknown() {
    let mut unit = Unit::new();
    let class = unit.class("_-7gG");
    unit.slot(class, "_-name", "String");
    unit.slot(class, "_-flag", "Boolean");
    let name = unit.qname("_-name");
    let flag = unit.qname("_-flag");

    let mut instructions = prologue();
    instructions.extend([
        Instruction::get_local(0),
        Instruction::property(OpCode::GetProperty, flag),
        Instruction::branch(OpCode::IfFalse),
        Instruction::get_local(0),
        Instruction::property(OpCode::GetProperty, name),
        Instruction::ArgCount {
            op: OpCode::NewArray,
            arg_count: 1,
        },
        Instruction::Bare(OpCode::ReturnValue),
    ]);
    let mut code = Code::from(instructions);
    code.set_jump_exit(4, 7).unwrap();
    unit.method(class, "_-0aA", &[], "Array", &code.encode().unwrap());
    unit.registry(&[("_-out", Instruction::PushByte(12), "_-7gG")]);
    let game = load(unit);

    let item = game.messages().unwrap().outgoing(12).unwrap();
    assert_eq!(item.class, class);
    assert_eq!(item.structure, None);
}

#[test]
fn both_directions_and_revision() {
    let mut unit = Unit::new();
    message(&mut unit, "_-8hH", &[("_-id", "int")]);
    unit.class("_-9iI");
    let revision = unit.string("PRODUCTION-201701242205-837386173");

    let communication = unit.class("_-1jJ");
    let serializer = body(vec![
        Instruction::push_constant(OpCode::PushString, revision),
        Instruction::ArgCount {
            op: OpCode::NewArray,
            arg_count: 1,
        },
        Instruction::Bare(OpCode::ReturnValue),
    ]);
    unit.method(communication, "_-2kK", &[], "Array", &serializer);

    unit.registry(&[
        ("_-out", Instruction::PushShort(4000), "_-1jJ"),
        ("_-out", Instruction::PushByte(7), "_-8hH"),
        ("_-in", Instruction::PushByte(7), "_-9iI"),
    ]);
    let game = load(unit);

    let registry = game.messages().unwrap();
    assert_eq!(registry.incoming_messages().count(), 1);
    assert_eq!(registry.outgoing_messages().count(), 2);
    assert_ne!(
        registry.incoming(7).unwrap().class,
        registry.outgoing(7).unwrap().class
    );
    assert_eq!(game.revision(), Some("PRODUCTION-201701242205-837386173"));
}

// Registry, message and one or two call sites, with every identifier supplied
fn client(names: [&str; 4], extra_call: bool) -> Vec<u8> {
    let [message_name, caller_name, method, other] = names;
    let mut unit = Unit::new();
    message(&mut unit, message_name, &[("_-zZ", "int")]);
    let target = unit.qname(message_name);
    let construct = || {
        body(vec![
            Instruction::property(OpCode::FindPropStrict, target),
            Instruction::call_property(OpCode::ConstructProp, target, 0),
            Instruction::Bare(OpCode::Pop),
            Instruction::Bare(OpCode::ReturnVoid),
        ])
    };
    let caller = unit.class(caller_name);
    unit.method(caller, method, &[], "void", &construct());
    if extra_call {
        unit.static_method(caller, other, &["int"], "void", &construct());
    }
    unit.registry(&[("_-out", Instruction::PushShort(310), message_name)]);
    swf_bytes(vec![unit.build()], &[])
}

fn fingerprint(data: Vec<u8>) -> String {
    let game = Game::from_mem(data).unwrap();
    let item = game.messages().unwrap().outgoing(310).unwrap();
    assert!(!item.references.is_empty());
    item.hash.clone().unwrap()
}

#[test]
fn fingerprints_ignore_identifiers() {
    let first = fingerprint(client(["_-1aA", "_-2bB", "_-3cC", "_-4dD"], false));
    let second = fingerprint(client(["_-7xX", "_-8yY", "_-9zZ", "_-0wW"], false));
    assert_eq!(first, second);

    let extended = fingerprint(client(["_-1aA", "_-2bB", "_-3cC", "_-4dD"], true));
    assert_ne!(first, extended);
}

#[test]
fn fingerprints_survive_sanitizing() {
    let data = client(["_-1aA", "_-2bB", "_-3cC", "_-4dD"], false);
    let before = fingerprint(data.clone());

    let mut game = Game::from_mem(data).unwrap();
    game.sanitize(Sanitization::ALL).unwrap();
    assert!(game.swf().last_abc().unwrap().find_class("_-1aA").is_none());
    let after = game.messages().unwrap().outgoing(310).unwrap().hash.clone();
    assert_eq!(after.as_deref(), Some(before.as_str()));
}
