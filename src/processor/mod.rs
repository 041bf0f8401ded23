//! Bundled page processors
//!
//! The crawler itself never looks inside a page; it hands every body to
//! a [`Processor`](crate::crawler::Processor). [`AnchorProcessor`] is the
//! one the command line uses.

mod anchor;

pub use anchor::AnchorProcessor;
