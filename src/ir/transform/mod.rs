//! Module-level rewrites of the IR.

mod builtin_polyfill;

pub use builtin_polyfill::{builtin_polyfill, BuiltinPolyfillConfig, PolyfillError};
