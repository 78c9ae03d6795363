//! Register and identifier renaming.
//!
//! Obfuscated clients replace identifiers with names that are not valid ActionScript
//! (`_-1Ab`, reserved words) and give every debug register the same placeholder name.
//! Both passes here assign stable, readable replacements.

use std::collections::{BTreeMap, HashMap};

use crate::{
    abc::{AbcFile, MethodFlags, Multiname},
    assembly::{Instruction, OpCode},
    Result,
};

const RESERVED_NAMES: &[&str] = &[
    "break", "case", "catch", "class", "default", "do", "dynamic", "each", "else", "extends",
    "false", "final", "for", "function", "get", "if", "implements", "import", "in", "include",
    "native", "null", "package", "return", "set", "static", "super", "switch", "throw", "true",
    "try", "use", "var", "while", "with",
];

const SANITIZED_PREFIXES: &[&str] = &[
    "class_",
    "iinterface_",
    "namespace_",
    "method_",
    "constant_",
    "slot_",
    "param",
];

/// Returns true if `value` is usable as an ActionScript identifier.
///
/// Names containing `_-` and reserved words are rejected. With `invalid_on_sanitized`,
/// names produced by the renaming passes are rejected as well, so they never count as
/// original identifiers.
///
/// # Examples
///
/// ```rust
/// use swfscope::deobfuscation::is_valid_identifier;
///
/// assert!(is_valid_identifier("HabboMessages", false));
/// assert!(!is_valid_identifier("_-2xY", false));
/// assert!(!is_valid_identifier("Class", false));
/// assert!(is_valid_identifier("Class_0001", false));
/// assert!(!is_valid_identifier("Class_0001", true));
/// ```
#[must_use]
pub fn is_valid_identifier(value: &str, invalid_on_sanitized: bool) -> bool {
    let value = value.to_lowercase();
    if invalid_on_sanitized && SANITIZED_PREFIXES.iter().any(|p| value.starts_with(p)) {
        return false;
    }
    !value.contains("_-") && !RESERVED_NAMES.contains(&value.trim())
}

/// Give placeholder-named debug registers a name derived from their position.
///
/// A register holding a parameter takes the parameter's declared name, or `paramN`; any
/// other register becomes `localN`. Parameter names in the signature follow the debug
/// names. Bodies with exception ranges are skipped.
///
/// Returns the number of rewritten bodies.
///
/// # Errors
/// Returns [`crate::Error::Corrupt`] for undecodable bytecode.
pub fn rename_registers(abc: &mut AbcFile, placeholder: &str, max_iterations: usize) -> Result<usize> {
    let mut renamed = 0;
    for body_index in 0..abc.bodies.len() {
        let body = &abc.bodies[body_index];
        if body.has_exceptions() || !body.code.contains(&OpCode::Debug.byte()) {
            continue;
        }
        let mut code = body.parse_code()?;
        if !code.contains(OpCode::Debug) {
            continue;
        }
        let method = body.method as usize;
        let param_count = abc.methods.get(method).map_or(0, |m| m.parameters.len());

        let mut modified = false;
        for index in 0..code.len() {
            let Some(&Instruction::Debug { name, register, .. }) = code.get(index) else {
                continue;
            };
            let current = abc.pool.string(name).unwrap_or_default();
            if current != placeholder && is_valid_identifier(current, false) {
                continue;
            }

            let register = usize::from(register);
            let parameter = abc
                .methods
                .get(method)
                .and_then(|info| info.parameters.get(register));
            let new_name = match parameter {
                Some(parameter) => parameter
                    .name
                    .and_then(|index| abc.pool.string(index))
                    .filter(|n| !n.trim().is_empty() && *n != placeholder)
                    .filter(|n| is_valid_identifier(n, false))
                    .map_or_else(|| format!("param{}", register + 1), str::to_string),
                None => format!("local{}", register.saturating_sub(param_count) + 1),
            };
            let new_index = abc.pool.add_string(&new_name);

            if let Some(info) = abc.methods.get_mut(method) {
                if let Some(parameter) = info.parameters.get_mut(register) {
                    parameter.name = Some(new_index);
                    info.flags |= MethodFlags::HAS_PARAM_NAMES;
                }
            }
            if let Some(Instruction::Debug { name, .. }) = code.get_mut(index) {
                *name = new_index;
            }
            modified = true;
        }

        if modified {
            let pool = &abc.pool;
            abc.bodies[body_index].set_code_with_limit(&code, pool, max_iterations)?;
            renamed += 1;
        }
    }

    if renamed > 0 {
        log::debug!("Renamed debug registers in {} bodies", renamed);
    }
    Ok(renamed)
}

/// Renames invalid namespace and class names across every unit of a file.
///
/// Counters and the rename maps are shared by all units passed to
/// [`IdentifierRenamer::rename_unit`], so a class declared in one unit and referenced from
/// another receives the same name in both.
#[derive(Debug, Default)]
pub struct IdentifierRenamer {
    namespace_count: usize,
    class_count: usize,
    interface_count: usize,
    // invalid namespace name -> replacement
    namespaces: HashMap<String, String>,
    // "namespace.class" after namespace renaming -> replacement class name
    classes: BTreeMap<String, String>,
}

impl IdentifierRenamer {
    /// A renamer with empty maps.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct namespaces and classes renamed so far.
    #[must_use]
    pub fn renamed(&self) -> usize {
        self.namespaces.len() + self.classes.len()
    }

    /// Rename the namespaces, classes and multinames of one unit and rebuild its cache.
    #[allow(clippy::cast_possible_truncation)]
    pub fn rename_unit(&mut self, abc: &mut AbcFile) {
        for index in 1..abc.pool.namespaces().len() as u32 {
            self.namespace_count += 1;
            let name = abc.pool.namespace_name(index).unwrap_or_default().to_string();
            if is_valid_identifier(&name, false) {
                continue;
            }

            let new_name = if let Some(existing) = self.namespaces.get(&name) {
                self.namespace_count -= 1;
                existing.clone()
            } else {
                let new_name = format!("Namespace_{:04}", self.namespace_count);
                self.namespaces.insert(name, new_name.clone());
                new_name
            };
            let string = abc.pool.add_string(&new_name);
            if let Some(namespace) = abc.pool.namespace_mut(index) {
                namespace.name = string;
            }
        }

        for class in 0..abc.instances.len() {
            let instance = &abc.instances[class];
            let is_interface = instance.is_interface();
            let qname = instance.name;
            let new_name = if is_interface {
                self.interface_count += 1;
                format!("IInterface_{:04}", self.interface_count)
            } else {
                self.class_count += 1;
                format!("Class_{:04}", self.class_count)
            };

            let Some(name) = abc.pool.multiname_name(qname) else {
                continue;
            };
            if is_valid_identifier(name, false) {
                continue;
            }

            let key = format!(
                "{}.{}",
                abc.pool.multiname_namespace_name(qname).unwrap_or_default(),
                name
            );
            let new_name = if let Some(existing) = self.classes.get(&key) {
                if is_interface {
                    self.interface_count -= 1;
                } else {
                    self.class_count -= 1;
                }
                existing.clone()
            } else {
                self.classes.insert(key, new_name.clone());
                new_name
            };
            let string = abc.pool.add_string(&new_name);
            if let Some(multiname) = abc.pool.multiname_mut(qname) {
                multiname.set_name_index(string);
            }
        }

        for index in 1..abc.pool.multinames().len() as u32 {
            let Some(replacement) = self.multiname_replacement(abc, index) else {
                continue;
            };
            let string = abc.pool.add_string(&replacement);
            if let Some(multiname) = abc.pool.multiname_mut(index) {
                multiname.set_name_index(string);
            }
        }

        abc.rebuild_cache();
    }

    fn multiname_replacement(&self, abc: &AbcFile, index: u32) -> Option<String> {
        let pool = &abc.pool;
        let multiname = pool.multiname(index)?;
        let name = pool.string(multiname.name_index()?)?;
        if name.trim().is_empty() || is_valid_identifier(name, false) {
            return None;
        }

        let namespaces = match multiname {
            Multiname::QName { namespace, .. } => vec![*namespace],
            Multiname::Multiname { namespace_set, .. } => {
                pool.namespace_set(*namespace_set)?.namespaces.clone()
            }
            _ => return None,
        };
        namespaces.into_iter().find_map(|namespace| {
            let key = format!("{}.{}", pool.namespace_name(namespace).unwrap_or_default(), name);
            self.classes.get(&key).cloned()
        })
    }

    /// Replacement for a `SymbolClass` name (`package.Class` or `Class`), if any part of it
    /// was renamed.
    #[must_use]
    pub fn rename_symbol(&self, full_name: &str) -> Option<String> {
        let (namespace, class) = full_name.rsplit_once('.').unwrap_or(("", full_name));
        if is_valid_identifier(namespace, false) && is_valid_identifier(class, false) {
            return None;
        }

        let namespace = self
            .namespaces
            .get(namespace)
            .map_or(namespace, String::as_str);
        let class = self
            .classes
            .get(&format!("{}.{}", namespace, class))
            .map_or(class, String::as_str);

        let renamed = if namespace.is_empty() {
            class.to_string()
        } else {
            format!("{}.{}", namespace, class)
        };
        (renamed != full_name).then_some(renamed)
    }

    /// Rewrite `SymbolClass` bindings with the current maps. Returns the number changed.
    pub fn rename_symbols(&self, symbols: &mut [(u16, String)]) -> usize {
        let mut changed = 0;
        for (_, name) in symbols.iter_mut() {
            if let Some(renamed) = self.rename_symbol(name) {
                *name = renamed;
                changed += 1;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        abc::{MethodBody, NamespaceKind},
        test::AbcBuilder,
    };

    #[test]
    fn identifiers() {
        assert!(is_valid_identifier("readString", false));
        assert!(!is_valid_identifier("_-3Kp", false));
        assert!(!is_valid_identifier("while", false));
        assert!(!is_valid_identifier("Param1", true));
        assert!(is_valid_identifier("Param1", false));
    }

    fn body_of(abc: &AbcFile, method: u32) -> &MethodBody {
        abc.body(method).unwrap()
    }

    #[test]
    fn registers_take_parameter_and_local_names() {
        let mut builder = AbcBuilder::new();
        let class = builder.class("Widget", None);
        let k = builder.string("k");
        // debug 1 "k" r0 0, debug 1 "k" r2 0, returnvoid
        let code = [0xEF, 0x01, k as u8, 0x00, 0x00, 0xEF, 0x01, k as u8, 0x02, 0x00, 0x47];
        let method = builder.method(class, "update", &["int", "String"], "void", &code);
        let mut abc = builder.build();

        assert_eq!(rename_registers(&mut abc, "k", 32).unwrap(), 1);

        let code = body_of(&abc, method).parse_code().unwrap();
        let names = code
            .iter()
            .filter_map(|instruction| match instruction {
                Instruction::Debug { name, .. } => abc.pool.string(*name),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["param1", "local1"]);

        let info = &abc.methods[method as usize];
        assert!(info.flags.contains(MethodFlags::HAS_PARAM_NAMES));
        assert_eq!(abc.pool.string(info.parameters[0].name.unwrap()), Some("param1"));
        assert!(info.parameters[1].name.is_none());

        // Nothing left to rename
        assert_eq!(rename_registers(&mut abc, "k", 32).unwrap(), 0);
    }

    #[test]
    fn body_without_signature_only_has_locals() {
        let mut builder = AbcBuilder::new();
        let class = builder.class("Widget", None);
        let k = builder.string("k");
        let code = [0xEF, 0x01, k as u8, 0x00, 0x00, 0xEF, 0x01, k as u8, 0x02, 0x00, 0x47];
        let method = builder.method(class, "update", &["int"], "void", &code);
        let mut abc = builder.build();
        let body = abc.bodies.iter_mut().find(|b| b.method == method).unwrap();
        body.method = 999;

        assert_eq!(rename_registers(&mut abc, "k", 32).unwrap(), 1);

        let body = abc.bodies.iter().find(|b| b.method == 999).unwrap();
        let names = body
            .parse_code()
            .unwrap()
            .iter()
            .filter_map(|instruction| match instruction {
                Instruction::Debug { name, .. } => abc.pool.string(*name),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["local1", "local3"]);
        assert!(abc.methods[method as usize].parameters[0].name.is_none());
    }

    #[test]
    fn classes_and_references_are_renamed() {
        let mut builder = AbcBuilder::new();
        let class = builder.class("_-1a", None);
        let interface = builder.interface("_-2b");
        builder.implement(class, "_-2b");
        builder.class("Valid", Some("_-1a"));
        let mut abc = builder.build();

        let mut renamer = IdentifierRenamer::new();
        renamer.rename_unit(&mut abc);

        assert_eq!(abc.class_name(class), Some("Class_0001"));
        assert_eq!(abc.class_name(interface), Some("IInterface_0001"));
        assert_eq!(abc.class_name(2), Some("Valid"));
        assert!(abc.implements(class, "IInterface_0001"));
        assert_eq!(abc.super_class(2), Some(class));

        assert_eq!(renamer.rename_symbol("_-1a"), Some("Class_0001".to_string()));
        assert_eq!(renamer.rename_symbol("Valid"), None);
    }

    #[test]
    fn namespaces_are_renamed_once() {
        let mut abc = AbcFile::new();
        let first = abc.pool.add_namespace(NamespaceKind::Package, "_-x");
        let second = abc.pool.add_namespace(NamespaceKind::Private, "_-x");
        let valid = abc.pool.add_namespace(NamespaceKind::Package, "com.example");

        let mut renamer = IdentifierRenamer::new();
        renamer.rename_unit(&mut abc);

        assert_eq!(abc.pool.namespace_name(first), Some("Namespace_0001"));
        assert_eq!(abc.pool.namespace_name(second), Some("Namespace_0001"));
        assert_eq!(abc.pool.namespace_name(valid), Some("com.example"));
        assert_eq!(
            renamer.rename_symbol("_-x.Main"),
            Some("Namespace_0001.Main".to_string())
        );
    }
}
