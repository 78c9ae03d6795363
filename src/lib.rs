// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # swfscope
//!
//! A toolkit for reading, cleaning up and patching ActionScript 3 clients shipped as SWF
//! files. Built in pure Rust, `swfscope` decodes the SWF container and every embedded ABC
//! bytecode unit, lets you rewrite method bodies at the instruction level and writes the
//! client back out without disturbing anything you did not touch.
//!
//! ## Features
//!
//! - **Lossless codec** - Untouched units and method bodies re-encode byte for byte
//! - **Editable code** - Index-based branch targets that survive inserts, removals and
//!   re-layout of jump offsets
//! - **Deobfuscation** - Constant-condition folding, dead code removal, placeholder register
//!   and identifier renaming
//! - **Message correlation** - Recover the client's message table, wire structures and
//!   rename-resistant fingerprints that stay stable across builds
//! - **Client patches** - Host checks, encryption, handshake, endpoints, RSA keys and logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use swfscope::prelude::*;
//! use std::path::Path;
//!
//! let mut game = Game::from_file(Path::new("client.swf"))?;
//! game.sanitize(Sanitization::ALL)?;
//!
//! if let Some(messages) = game.messages() {
//!     println!("revision {:?}", messages.revision());
//!     for message in messages.outgoing_messages() {
//!         println!("{} {:?} {:?}", message.id, message.structure, message.hash);
//!     }
//! }
//!
//! game.disable_host_checks()?;
//! game.inject_loopback_endpoint(30000)?;
//! game.write_to(Path::new("client.patched.swf"))?;
//! # Ok::<(), swfscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`swf`] - Container header, zlib/LZMA compression and the tag stream
//! - [`abc`] - Constant pool, signatures, classes, traits and method bodies
//! - [`assembly`] - Instruction codec, symbolic evaluation and the [`assembly::Code`] container
//! - [`deobfuscation`] - Body passes and identifier renaming
//! - [`messages`] - Message registry, structures, references and fingerprints
//! - [`Game`] - Loads a client and is the entry point for sanitizing and patching
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Patches distinguish a missing
//! target (`Ok(false)`) from bytecode that cannot be processed (`Err`):
//!
//! ```rust,no_run
//! use swfscope::{Error, Game};
//!
//! match Game::from_mem(std::fs::read("client.swf")?) {
//!     Ok(game) => println!("{} units", game.swf().abc_files().count()),
//!     Err(Error::NotSupported) => println!("Not a SWF file"),
//!     Err(Error::Corrupt { message, .. }) => println!("Corrupt: {}", message),
//!     Err(e) => println!("Error: {}", e),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Development and Testing
//!
//! ```bash
//! cargo test
//! cargo bench
//! cargo +nightly fuzz run swffile --release
//! ```
#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use swfscope::prelude::*;
///
/// let game = Game::from_file("client.swf".as_ref())?;
/// println!("{:?}", game.revision());
/// # Ok::<(), swfscope::Error>(())
/// ```
pub mod prelude;

/// SWF container decoding and encoding.
pub mod swf;

/// ABC bytecode units.
///
/// # Key Types
///
/// - [`abc::AbcFile`] - A decoded unit with its lookups
/// - [`abc::ConstantPool`] - Shared constant tables with insertion helpers
/// - [`abc::Trait`] - Members of classes, instances and scripts
/// - [`abc::MethodBody`] - Raw bytecode plus frame capacities
pub mod abc;

/// AVM2 instructions and the editable code container.
pub mod assembly;

/// Body rewriting and identifier renaming.
pub mod deobfuscation;

/// Message registry recovery and fingerprinting.
pub mod messages;

/// Analysis bounds and registry lookup settings.
pub mod config;

/// The loaded client.
pub mod game;

mod patches;

/// `swfscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust,no_run
/// use swfscope::{Game, Result};
///
/// fn load(path: &str) -> Result<Game> {
///     Game::from_file(std::path::Path::new(path))
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `swfscope` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

/// Main entry point for working with a client.
pub use game::Game;

/// Load-time configuration.
pub use config::AnalysisConfig;

/// Container type, see [`swf`].
pub use swf::SwfFile;

/// Transforms selectable for [`Game::sanitize`].
pub use deobfuscation::Sanitization;

/// Recovered message table.
pub use messages::{MessageItem, MessageRegistry};

/// Low-level input access and the primitive decoder.
///
/// # Example
///
/// ```rust
/// use swfscope::Parser;
///
/// let mut parser = Parser::new(&[0x80, 0x01]);
/// assert_eq!(parser.read_u30()?, 128);
/// # Ok::<(), swfscope::Error>(())
/// ```
pub use file::{parser::Parser, File};
