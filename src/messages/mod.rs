//! Protocol message recovery.
//!
//! The client registers every message class in the static initializer of one registry
//! class, keyed by its numeric header id. [`MessageRegistry`] recovers that table and then
//! enriches each message:
//!
//! 1. **Structure** - the field types on the wire, see [`StructureResolver`]
//! 2. **References** - the call sites that construct or subscribe to the message
//! 3. **Fingerprint** - a digest of the call-site shape that survives identifier
//!    renaming between client builds, see [`FingerprintWriter`]
//!
//! Messages are addressed by their index in [`MessageRegistry::messages`]; the id maps
//! and the hash groups store such indices.
//!
//! # Examples
//!
//! ```rust,no_run
//! use swfscope::Game;
//! use std::path::Path;
//!
//! let game = Game::from_file(Path::new("client.swf"))?;
//! if let Some(registry) = game.messages() {
//!     for message in registry.outgoing_messages() {
//!         println!("{} {:?} {:?}", message.id, message.structure, message.hash);
//!     }
//! }
//! # Ok::<(), swfscope::Error>(())
//! ```

mod hasher;
mod references;
mod registry;
mod structure;

pub use hasher::FingerprintWriter;
pub use structure::{read_type, StructureResolver};

use std::collections::{BTreeMap, HashMap};

use strum::Display;

/// Which way a message travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Direction {
    /// Server to client, decoded by a parser class
    Incoming,
    /// Client to server, encoded by a serializer method
    Outgoing,
}

/// One call site of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageReference {
    /// Class declaring the referencing method
    pub from_class: Option<usize>,
    /// Referencing method; for incoming messages the subscribed callback, when resolved
    pub from_method: Option<u32>,
    /// The referencing method belongs to the static side
    pub is_static: bool,
    /// The referencing method is a closure without trait or initializer
    pub is_anonymous: bool,
    /// Number of references found in the same method
    pub group_count: usize,
    /// 1-based position of the referencing class among classes with references
    pub class_rank: usize,
    /// 1-based position of the method among the class's methods with references
    pub method_rank: usize,
    /// 1-based position of an outgoing reference within its method
    pub instruction_rank: usize,
}

/// A recovered protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageItem {
    /// Header id of the first registration
    pub id: u16,
    /// Direction
    pub direction: Direction,
    /// Message class, an index into the unit's classes
    pub class: usize,
    /// Parser class of an incoming message
    pub parser: Option<usize>,
    /// Field types in wire order, `None` when they could not be determined
    pub structure: Option<Vec<String>>,
    /// Further ids registered for the same class
    pub aliases: Vec<u16>,
    /// Call sites
    pub references: Vec<MessageReference>,
    /// Lowercase hex MD5 fingerprint
    pub hash: Option<String>,
}

impl MessageItem {
    pub(crate) fn new(id: u16, direction: Direction, class: usize) -> Self {
        MessageItem {
            id,
            direction,
            class,
            parser: None,
            structure: None,
            aliases: Vec::new(),
            references: Vec::new(),
            hash: None,
        }
    }

    /// Returns true for client to server messages.
    #[must_use]
    pub fn is_outgoing(&self) -> bool {
        self.direction == Direction::Outgoing
    }

    /// The primary id followed by every alias.
    pub fn ids(&self) -> impl Iterator<Item = u16> + '_ {
        std::iter::once(self.id).chain(self.aliases.iter().copied())
    }

    /// Returns true if a reference already names `method`.
    #[must_use]
    pub fn has_method_reference(&self, method: u32) -> bool {
        self.references
            .iter()
            .any(|reference| reference.from_method == Some(method))
    }
}

/// The message table of one client unit.
#[derive(Debug, Clone)]
pub struct MessageRegistry {
    registry_class: usize,
    named: bool,
    messages: Vec<MessageItem>,
    incoming: BTreeMap<u16, usize>,
    outgoing: BTreeMap<u16, usize>,
    by_class: HashMap<usize, usize>,
    by_hash: BTreeMap<String, Vec<usize>>,
    revision: Option<String>,
}

impl MessageRegistry {
    fn empty(registry_class: usize, named: bool) -> Self {
        MessageRegistry {
            registry_class,
            named,
            messages: Vec::new(),
            incoming: BTreeMap::new(),
            outgoing: BTreeMap::new(),
            by_class: HashMap::new(),
            by_hash: BTreeMap::new(),
            revision: None,
        }
    }

    /// Class holding the registration table.
    #[must_use]
    pub fn registry_class(&self) -> usize {
        self.registry_class
    }

    /// Returns true if the registry was found by its configured name rather than by shape.
    #[must_use]
    pub fn is_named(&self) -> bool {
        self.named
    }

    /// Client revision string, taken from the serializer of outgoing message 4000.
    #[must_use]
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Every distinct message, in registration order.
    #[must_use]
    pub fn messages(&self) -> &[MessageItem] {
        &self.messages
    }

    /// Number of distinct messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if nothing was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Incoming message registered under `id`, aliases included.
    #[must_use]
    pub fn incoming(&self, id: u16) -> Option<&MessageItem> {
        self.messages.get(*self.incoming.get(&id)?)
    }

    /// Outgoing message registered under `id`, aliases included.
    #[must_use]
    pub fn outgoing(&self, id: u16) -> Option<&MessageItem> {
        self.messages.get(*self.outgoing.get(&id)?)
    }

    /// Message whose class is `class`.
    #[must_use]
    pub fn by_class(&self, class: usize) -> Option<&MessageItem> {
        self.messages.get(*self.by_class.get(&class)?)
    }

    /// Incoming messages ordered by id. Shared classes appear once per id.
    pub fn incoming_messages(&self) -> impl Iterator<Item = &MessageItem> {
        self.incoming.values().map(|&index| &self.messages[index])
    }

    /// Outgoing messages ordered by id. Shared classes appear once per id.
    pub fn outgoing_messages(&self) -> impl Iterator<Item = &MessageItem> {
        self.outgoing.values().map(|&index| &self.messages[index])
    }

    /// Messages sharing the fingerprint `hash`.
    pub fn with_hash<'a>(&'a self, hash: &str) -> impl Iterator<Item = &'a MessageItem> {
        self.by_hash
            .get(hash)
            .into_iter()
            .flatten()
            .map(|&index| &self.messages[index])
    }

    /// Every fingerprint with the number of messages carrying it.
    pub fn hashes(&self) -> impl Iterator<Item = (&str, usize)> {
        self.by_hash
            .iter()
            .map(|(hash, group)| (hash.as_str(), group.len()))
    }
}
