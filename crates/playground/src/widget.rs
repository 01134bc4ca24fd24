//! The embedded editor widget, seen from the playground.

use std::sync::Arc;

use playpen_declarations::DeclarationSink;
use playpen_primitives::{Problem, Subscription};

/// Notifications the widget raises.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetEvent {
	/// The text buffer changed.
	ContentChanged,
	/// The editor lost focus.
	Blurred,
	/// The user pressed the run shortcut.
	RunShortcut,
	/// The live analysis engine replaced its marker set.
	MarkersChanged(Vec<Problem>),
}

pub type WidgetListener = Arc<dyn Fn(WidgetEvent) + Send + Sync>;

/// Editor component hosting the text buffer and the live analysis engine.
pub trait EditorWidget: Send + Sync + 'static {
	/// Current buffer text.
	fn value(&self) -> String;

	/// Replaces the buffer text.
	fn set_value(&self, text: &str);

	/// Attaches a listener; the widget stops calling it once the subscription
	/// is released.
	fn subscribe(&self, listener: WidgetListener) -> Subscription;

	/// Where declaration files for the analysis engine go.
	fn declarations(&self) -> Arc<dyn DeclarationSink>;
}
