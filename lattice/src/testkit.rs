//! Message types shared by the unit tests that exercise the process-wide
//! registry. Every test using the global registry funnels through `init` so
//! registration finishes before any test freezes the id space.

use crate::registry::register_message;
use lattice_proc::Message;
use lazy_static::lazy_static;

#[derive(Debug, Default, Clone, PartialEq, Message)]
pub struct Probe {
    pub code: u32,
    pub level: i16,
    pub flag: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Message)]
pub struct Blob {
    pub items: Vec<u8>,
}

#[derive(Debug, Default, Clone, PartialEq, Message)]
pub struct Note {
    pub text: String,
}

lazy_static! {
    static ref SETUP: () = {
        register_message::<Probe>().unwrap();
        register_message::<Blob>().unwrap();
        register_message::<Note>().unwrap();
    };
}

/// Registers the shared test messages exactly once.
pub fn init() {
    lazy_static::initialize(&SETUP);
}
