/*! Shader constant evaluation and IR builtin polyfilling.

The crate has two halves that share a type system:

- [`constant`] holds interned constant values and the [`Eval`](constant::Eval)
  evaluator, which folds WGSL operators, constructors and builtins at compile
  time, reporting failures to a [`diag::List`].
- [`ir`] is a small SSA-style intermediate representation with explicit
  use-lists, and [`ir::transform::builtin_polyfill`] rewrites builtin calls the
  target cannot execute natively into sequences of simpler instructions.

Types, values and IR entities are stored in an [`Arena`] or [`UniqueArena`]
and referred to by a [`Handle`].
!*/

#![allow(
    clippy::new_without_default,
    clippy::unneeded_field_pattern,
    clippy::match_like_matches_macro,
    clippy::too_many_arguments
)]
#![warn(
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_qualifications
)]

mod arena;
mod builtin;
pub mod constant;
pub mod diag;
pub mod ir;
mod span;
pub mod ty;

pub use crate::arena::{Arena, BadHandle, Handle, UniqueArena};
pub use crate::builtin::BuiltinFn;
pub use crate::span::Span;

use std::{collections::HashMap, hash::BuildHasherDefault};

/// Hash map that is faster but not resilient to DoS attacks.
pub type FastHashMap<K, T> = HashMap<K, T, BuildHasherDefault<fxhash::FxHasher>>;

/// Insertion-order-preserving hash set (`IndexSet<K>`), but with the same
/// hasher as `FastHashMap` (faster but not resilient to DoS attacks).
pub type FastIndexSet<K> = indexmap::IndexSet<K, BuildHasherDefault<fxhash::FxHasher>>;

/// Insertion-order-preserving hash map (`IndexMap<K, V>`), but with the same
/// hasher as `FastHashMap<K, V>` (faster but not resilient to DoS attacks).
pub type FastIndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<fxhash::FxHasher>>;
