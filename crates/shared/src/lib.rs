//! Wire types shared by the gadget runtime and its hosts.

pub mod domain;
pub mod error;
pub mod protocol;
