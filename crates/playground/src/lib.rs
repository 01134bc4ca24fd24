//! Assembled code playground.
//!
//! Wires an editor widget, the declaration registry, a compile worker and an
//! execution sandbox together:
//!
//! * [`Pipeline`]: compile then run on each trigger, discarding superseded results
//! * [`CompletionRegistry`]: pluggable completion providers with failure isolation
//! * [`Playground`]: the editor instance exposed to embedders
//!
//! Behaviour is tuned through [`PlaygroundConfig`], usually loaded from TOML.

mod completion;
mod config;
mod error;
mod pipeline;
mod playground;
mod widget;

pub use completion::{CompletionItem, CompletionProvider, CompletionRegistry, CompletionRequest, ProviderError};
pub use config::{ConfigError, PlaygroundConfig};
pub use error::PlaygroundError;
pub use pipeline::{ConsoleBuffer, Phase, Pipeline, Snapshot, SourceFn, Status, Tone, TriggerKind, TriggerOutcome};
pub use playground::Playground;
pub use widget::{EditorWidget, WidgetEvent, WidgetListener};
