//! Built-in container formats
//!
//! Each submodule exposes a `register` function adding its extensions to an
//! [`ExtensionRegistry`](crate::extensions::ExtensionRegistry).

pub mod wave;
