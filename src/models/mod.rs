//! Domain models shared between the resolver, cache and web layers

pub mod icon;
pub mod target;

pub use icon::{Icon, IconSource, Resolution};
pub use target::Target;
