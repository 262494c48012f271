//! # strand-common-core
//!
//! Core types shared by the strand interpreter and search crates:
//! - `TypeCode` - builtin type classification of descriptors
//! - `types` - signature parsing and slot-size arithmetic
//! - `Modifiers` - class-file access flags
//! - `jni` - JNI-style name mangling

pub mod jni;
pub mod modifiers;
pub mod types;

pub use modifiers::Modifiers;
pub use types::{SignatureError, SignatureResult, TypeCode};
