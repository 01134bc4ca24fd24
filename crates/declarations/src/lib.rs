//! Declaration registry.
//!
//! Owns named scopes (`builtin`, `external`, `manual`, ...) of auxiliary type
//! declarations and republishes them into the editor's analysis engine. Every
//! update reconciles the new declared set against what is already registered:
//! unchanged entries keep their registration, changed entries are swapped, and
//! vanished entries are released. Repeating an update is free.

mod entry;
mod registry;

pub use entry::{DeclarationEntry, RawDeclaration};
pub use registry::{DeclarationHandle, DeclarationRegistry, DeclarationSink, ReconcileReport};

/// Scope holding declarations shipped with the playground.
pub const SCOPE_BUILTIN: &str = "builtin";
/// Scope holding declarations fetched for external modules.
pub const SCOPE_EXTERNAL: &str = "external";
/// Scope holding declarations typed in by the user.
pub const SCOPE_MANUAL: &str = "manual";
