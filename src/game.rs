//! A loaded game client: the SWF container, its ABC units and the recovered message table.
//!
//! [`Game`] is the entry point for both sanitizing a client and patching it. Loading
//! decodes every unit, applies the configured hierarchy bound and recovers the message
//! registry from the last unit, which holds the client's own code.
//!
//! # Examples
//!
//! ```rust,no_run
//! use swfscope::{Game, Sanitization};
//! use std::path::Path;
//!
//! let mut game = Game::from_file(Path::new("client.swf"))?;
//! game.sanitize(Sanitization::ALL)?;
//! game.disable_host_checks()?;
//! game.write_to(Path::new("client.patched.swf"))?;
//! # Ok::<(), swfscope::Error>(())
//! ```

use std::path::Path;

use crate::{
    abc::AbcFile,
    assembly::Code,
    config::AnalysisConfig,
    deobfuscation::{rename_registers, Deobfuscator, IdentifierRenamer, Sanitization},
    messages::MessageRegistry,
    swf::SwfFile,
    Error, Result,
};

/// A decoded client with its message registry.
#[derive(Debug, Clone)]
pub struct Game {
    pub(crate) swf: SwfFile,
    pub(crate) config: AnalysisConfig,
    registry: Option<MessageRegistry>,
}

impl Game {
    /// Load a client from disk with the default configuration.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, otherwise see
    /// [`Game::with_config`].
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::with_config(SwfFile::from_file(path)?, AnalysisConfig::default())
    }

    /// Load a client from a buffer with the default configuration.
    ///
    /// # Errors
    /// See [`Game::from_file`].
    pub fn from_mem(data: Vec<u8>) -> Result<Self> {
        Self::with_config(SwfFile::from_mem(data)?, AnalysisConfig::default())
    }

    /// Wrap a decoded container and recover its messages under `config`.
    ///
    /// # Errors
    /// Returns the errors of [`MessageRegistry::load`].
    pub fn with_config(mut swf: SwfFile, config: AnalysisConfig) -> Result<Self> {
        for abc in swf.abc_files_mut() {
            abc.set_hierarchy_limit(config.max_hierarchy_depth);
        }
        let mut game = Game {
            swf,
            config,
            registry: None,
        };
        game.reload_messages()?;
        Ok(game)
    }

    /// The underlying container.
    #[must_use]
    pub fn swf(&self) -> &SwfFile {
        &self.swf
    }

    /// Configuration in effect.
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// The recovered message table, if a registry class was found.
    #[must_use]
    pub fn messages(&self) -> Option<&MessageRegistry> {
        self.registry.as_ref()
    }

    /// Client revision string, see [`MessageRegistry::revision`].
    #[must_use]
    pub fn revision(&self) -> Option<&str> {
        self.registry.as_ref()?.revision()
    }

    /// Recover the message table again from the last unit.
    ///
    /// # Errors
    /// See [`MessageRegistry::load`].
    pub fn reload_messages(&mut self) -> Result<()> {
        self.registry = match self.swf.last_abc() {
            Some(abc) => MessageRegistry::load(abc, &self.config)?,
            None => None,
        };
        Ok(())
    }

    /// Apply the selected transforms to every unit, then reload the message table.
    ///
    /// Identifier counters run across all units, and `SymbolClass` bindings follow the
    /// renamed classes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] for undecodable bytecode and
    /// [`crate::Error::LayoutDivergence`] if a rewritten body does not settle.
    pub fn sanitize(&mut self, transforms: Sanitization) -> Result<()> {
        let limit = self.config.max_layout_iterations;

        if transforms.contains(Sanitization::DEOBFUSCATE) {
            let deobfuscator = Deobfuscator::with_layout_limit(limit);
            let mut rewritten = 0;
            for abc in self.swf.abc_files_mut() {
                rewritten += deobfuscator.run_on_unit(abc)?;
            }
            log::info!("Deobfuscated {} method bodies", rewritten);
        }

        if transforms.contains(Sanitization::RENAME_REGISTERS) {
            let placeholder = self.config.obfuscated_register_name.as_str();
            let mut renamed = 0;
            for abc in self.swf.abc_files_mut() {
                renamed += rename_registers(abc, placeholder, limit)?;
            }
            log::info!("Renamed debug registers in {} method bodies", renamed);
        }

        if transforms.contains(Sanitization::RENAME_IDENTIFIERS) {
            let mut renamer = IdentifierRenamer::new();
            for abc in self.swf.abc_files_mut() {
                renamer.rename_unit(abc);
            }
            let symbols = self
                .swf
                .symbol_classes_mut()
                .map(|symbols| renamer.rename_symbols(symbols))
                .sum::<usize>();
            log::info!(
                "Renamed {} identifiers and {} symbol bindings",
                renamer.renamed(),
                symbols
            );
        }

        self.reload_messages()
    }

    /// Encode the client, compressed as it was loaded.
    ///
    /// # Errors
    /// See [`SwfFile::to_bytes`].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.swf.to_bytes()
    }

    /// Encode the client and write it to `path`.
    ///
    /// # Errors
    /// See [`SwfFile::write_to`].
    pub fn write_to(&self, path: &Path) -> Result<()> {
        self.swf.write_to(path)
    }

    pub(crate) fn unit(&self, index: usize) -> Option<&AbcFile> {
        self.swf.abc_files().nth(index)
    }

    pub(crate) fn unit_mut(&mut self, index: usize) -> Option<&mut AbcFile> {
        self.swf.abc_files_mut().nth(index)
    }

    /// Unit and class index of the first class named `name`, searching from the last
    /// unit backwards.
    pub(crate) fn locate_class(&self, name: &str) -> Option<(usize, usize)> {
        let units = self.swf.abc_files().collect::<Vec<_>>();
        units
            .iter()
            .enumerate()
            .rev()
            .find_map(|(unit, abc)| abc.find_class(name).map(|class| (unit, class)))
    }

    /// Decoded code of `method`, `None` if it has no body or its body has exception
    /// ranges.
    pub(crate) fn editable_code(&self, unit: usize, method: u32) -> Result<Option<Code>> {
        let Some(body) = self.unit(unit).and_then(|abc| abc.body(method)) else {
            return Ok(None);
        };
        if body.has_exceptions() {
            log::debug!("Method {} has exception ranges and is left untouched", method);
            return Ok(None);
        }
        body.parse_code().map(Some)
    }

    /// Re-encode `code` into the body of `method`.
    pub(crate) fn commit(&mut self, unit: usize, method: u32, code: &Code) -> Result<()> {
        let limit = self.config.max_layout_iterations;
        let abc = self.unit_mut(unit).ok_or(Error::OutOfBounds)?;
        let (pool, body) = abc.pool_and_body_mut(method).ok_or(Error::OutOfBounds)?;
        body.set_code_with_limit(code, pool, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Instruction, OpCode},
        test::{assemble, swf, AbcBuilder},
    };

    #[test]
    fn loads_without_registry() {
        let mut builder = AbcBuilder::new();
        builder.class("Widget", None);
        let game = Game::with_config(swf(vec![builder.build()], &[]), AnalysisConfig::default())
            .unwrap();
        assert!(game.messages().is_none());
        assert!(game.revision().is_none());
        assert_eq!(game.swf().abc_files().count(), 1);
    }

    #[test]
    fn hierarchy_limit_is_applied() {
        let mut builder = AbcBuilder::new();
        builder.class("Widget", None);
        let config = AnalysisConfig {
            max_hierarchy_depth: 3,
            ..AnalysisConfig::default()
        };
        let game = Game::with_config(swf(vec![builder.build()], &[]), config).unwrap();
        assert_eq!(game.unit(0).unwrap().hierarchy_limit(), 3);
    }

    #[test]
    fn sanitize_renames_across_units_and_symbols() {
        let mut first = AbcBuilder::new();
        first.class("_-1aA", None);
        let mut second = AbcBuilder::new();
        second.class("Widget", None);
        second.class("_-2bB", None);
        let swf = swf(vec![first.build(), second.build()], &[(1, "_-2bB")]);

        let mut game = Game::with_config(swf, AnalysisConfig::default()).unwrap();
        game.sanitize(Sanitization::RENAME_IDENTIFIERS).unwrap();

        assert_eq!(game.unit(0).unwrap().class_name(0), Some("Class_0001"));
        let second = game.unit(1).unwrap();
        assert_eq!(second.class_name(0), Some("Widget"));
        assert_eq!(second.class_name(1), Some("Class_0003"));
        assert_eq!(second.find_class("Class_0003"), Some(1));

        let symbols = game.swf.symbol_classes_mut().next().unwrap().clone();
        assert_eq!(symbols, vec![(1, "Class_0003".to_string())]);
    }

    #[test]
    fn sanitize_deobfuscates_every_unit() {
        // pushfalse, pushtrue, iftrue +3, pushbyte 1, returnvalue, pop, pushbyte 2, returnvalue
        let guarded = [
            0x27, 0x26, 0x11, 0x03, 0x00, 0x00, 0x24, 0x01, 0x48, 0x29, 0x24, 0x02, 0x48,
        ];
        let mut builder = AbcBuilder::new();
        let class = builder.class("Widget", None);
        let method = builder.method(class, "size", &[], "int", &guarded);
        let swf = swf(vec![builder.build()], &[]);

        let mut game = Game::with_config(swf, AnalysisConfig::default()).unwrap();
        game.sanitize(Sanitization::DEOBFUSCATE).unwrap();
        assert_eq!(
            game.unit(0).unwrap().body(method).unwrap().code,
            vec![0x24, 0x02, 0x48]
        );

        let bytes = game.to_bytes().unwrap();
        let reloaded = Game::from_mem(bytes).unwrap();
        assert_eq!(
            reloaded.unit(0).unwrap().body(method).unwrap().code,
            vec![0x24, 0x02, 0x48]
        );
    }

    #[test]
    fn locate_prefers_later_units() {
        let mut first = AbcBuilder::new();
        first.class("Core", None);
        let mut second = AbcBuilder::new();
        second.class("Widget", None);
        second.class("Core", None);
        let game = Game::with_config(
            swf(vec![first.build(), second.build()], &[]),
            AnalysisConfig::default(),
        )
        .unwrap();

        assert_eq!(game.locate_class("Core"), Some((1, 1)));
        assert_eq!(game.locate_class("Missing"), None);
    }

    #[test]
    fn commit_rewrites_a_body() {
        let mut builder = AbcBuilder::new();
        let class = builder.class("Widget", None);
        let method = builder.method(class, "size", &[], "int", &[0x24, 0x02, 0x48]);
        let mut game =
            Game::with_config(swf(vec![builder.build()], &[]), AnalysisConfig::default()).unwrap();

        let mut code = game.editable_code(0, method).unwrap().unwrap();
        code.insert_range(
            0,
            vec![
                Instruction::Bare(OpCode::PushTrue),
                Instruction::Bare(OpCode::ReturnValue),
            ],
        );
        game.commit(0, method, &code).unwrap();
        assert_eq!(
            game.unit(0).unwrap().body(method).unwrap().code,
            assemble(vec![
                Instruction::Bare(OpCode::PushTrue),
                Instruction::Bare(OpCode::ReturnValue),
                Instruction::PushByte(2),
                Instruction::Bare(OpCode::ReturnValue),
            ])
        );
    }
}
