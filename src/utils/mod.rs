//! Utility Module
//!
//! - [`interner`]: String interning for property names
//!
//! # String Interning
//!
//! Shader property names are interned once when a pass is built. Later
//! lookups go through [`interner::get`], which never allocates, so resolving
//! a name to a uniform handle stays allocation-free.
//!
//! ```rust,ignore
//! use strata::utils::interner;
//!
//! let sym1 = interner::intern("mainColor");
//! let sym2 = interner::intern("mainColor");
//! assert_eq!(sym1, sym2); // O(1) comparison
//! ```

pub mod interner;

pub use interner::Symbol;
