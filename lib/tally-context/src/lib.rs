//! Tag contexts.
//!
//! A tag context is the resolved set of key/value pairs that is current when an application records a measurement.
//! How a tag context is created or propagated between threads and processes is up to the caller: the stats engine only
//! ever reads a context through [`TagContext::get`] and [`TagContext::iter`].
#![deny(warnings)]
#![deny(missing_docs)]

mod tags;
pub use self::tags::{Tag, TagContext, TagContextBuilder, TagKey, TagValue};
