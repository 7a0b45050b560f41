//! Library surface for the `hpcsim` host binary, split out so integration
//! tests can drive [`runtime::Runtime`] against an in-process fake plugin
//! without going through `dlopen`.

pub mod config;
pub mod error;
pub mod runtime;
