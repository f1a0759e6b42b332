//! Global message registry: name → factory during registration, frozen into
//! name → id and id → factory tables the first time an id is consulted.
//!
//! Ids are assigned by numbering the registered names in lexicographic
//! order, so two peers that registered the same set of names agree on every
//! id without exchanging a directory. The price is that registration ends at
//! the first id lookup; late registration fails with `RegistryFrozen`.

use crate::error::{Error, Result};
use crate::message::{Message, MessageId, MessageType};
use hashbrown::HashMap;
use lazy_static::lazy_static;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Produces a blank message for the registry to deserialize into.
pub type Factory = fn() -> Box<dyn Message>;

struct IdTable {
    by_name: HashMap<String, MessageId>,
    by_id: HashMap<MessageId, Factory>,
}

/// The registry state machine. The process-wide instance lives behind
/// [`register_message`] and friends; standalone instances exist for tests
/// and for tooling that wants its own id universe.
pub struct MessageRegistry {
    factories: BTreeMap<String, Factory>,
    table: Option<IdTable>,
}

impl MessageRegistry {
    #[inline]
    pub fn new() -> MessageRegistry {
        MessageRegistry {
            factories: BTreeMap::new(),
            table: None,
        }
    }

    /// Number of registered message types.
    #[inline]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// True once ids have been materialized.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.table.is_some()
    }

    /// Registers a message name with its factory.
    pub fn register(&mut self, name: &str, factory: Factory) -> Result<()> {
        if self.table.is_some() {
            return Err(Error::RegistryFrozen);
        }

        if self.factories.contains_key(name) {
            return Err(Error::DuplicateMessage);
        }

        self.factories.insert(name.to_string(), factory);
        Ok(())
    }

    /// Materializes the id tables. Idempotent; every id consumer funnels
    /// through here.
    pub fn freeze(&mut self) -> Result<()> {
        if self.table.is_some() {
            return Ok(());
        }

        if self.factories.len() > MessageId::max_value() as usize + 1 {
            return Err(Error::TooManyMessages);
        }

        let mut by_name = HashMap::with_capacity(self.factories.len());
        let mut by_id = HashMap::with_capacity(self.factories.len());

        // BTreeMap iteration is the lexicographic order the id contract
        // requires.
        for (index, (name, &factory)) in self.factories.iter().enumerate() {
            let id = index as MessageId;
            by_name.insert(name.clone(), id);
            by_id.insert(id, factory);
        }

        self.table = Some(IdTable { by_name, by_id });
        Ok(())
    }

    /// Returns the id for a name, freezing the registry on first use.
    pub fn id_of(&mut self, name: &str) -> Result<MessageId> {
        self.freeze()?;
        self.lookup_id(name)
    }

    /// Id lookup on an already-frozen registry.
    pub fn lookup_id(&self, name: &str) -> Result<MessageId> {
        let table = self.table.as_ref().ok_or(Error::UnknownMessage)?;

        table.by_name.get(name).copied().ok_or(Error::UnknownMessage)
    }

    /// Reads the id at the head of the buffer, produces a blank value from
    /// the matching factory and lets the value consume the rest. Requires a
    /// frozen registry.
    pub fn deserialize(&self, buf: &[u8]) -> Result<Box<dyn Message>> {
        let table = self.table.as_ref().ok_or(Error::UnknownMessage)?;

        let mut peek = 0;
        let id = <MessageId as crate::serialize::Deserialize>::deserialize(buf, &mut peek)?;

        let factory = table.by_id.get(&id).copied().ok_or(Error::UnknownMessage)?;

        let mut msg = factory();
        let mut pos = 0;
        msg.deserialize_message(buf, &mut pos)?;

        Ok(msg)
    }
}

lazy_static! {
    static ref GLOBAL: RwLock<MessageRegistry> = RwLock::new(MessageRegistry::new());
}

fn make_message<M: MessageType>() -> Box<dyn Message> {
    Box::new(M::default())
}

/// Registers `M` with the process-wide registry under its type name. Must
/// happen before any id is consulted.
pub fn register_message<M: MessageType>() -> Result<()> {
    GLOBAL
        .write()
        .expect("message registry lock poisoned")
        .register(M::type_name(), make_message::<M>)
}

/// Id of `M` in the process-wide registry; freezes it on first use.
pub fn message_id_of<M: MessageType>() -> Result<MessageId> {
    message_id_by_name(M::type_name())
}

/// Name-keyed id lookup against the process-wide registry. Reads after the
/// freeze point only take the shared lock.
pub fn message_id_by_name(name: &str) -> Result<MessageId> {
    {
        let registry = GLOBAL.read().expect("message registry lock poisoned");

        if registry.is_frozen() {
            return registry.lookup_id(name);
        }
    }

    GLOBAL
        .write()
        .expect("message registry lock poisoned")
        .id_of(name)
}

/// Deserializes a message from the process-wide registry, freezing it if
/// receiving happens before any explicit id lookup.
pub fn deserialize_message(buf: &[u8]) -> Result<Box<dyn Message>> {
    {
        let registry = GLOBAL.read().expect("message registry lock poisoned");

        if registry.is_frozen() {
            return registry.deserialize(buf);
        }
    }

    GLOBAL
        .write()
        .expect("message registry lock poisoned")
        .freeze()?;

    GLOBAL
        .read()
        .expect("message registry lock poisoned")
        .deserialize(buf)
}
