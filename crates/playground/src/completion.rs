//! Pluggable completion providers.
//!
//! Providers are queried concurrently and their items concatenated in
//! registration order. A provider that errors or panics contributes nothing;
//! the others are unaffected.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use parking_lot::Mutex;
use playpen_primitives::Subscription;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// Cursor context handed to every provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
	pub source: String,
	/// 1-based cursor line.
	pub line: u32,
	/// 1-based cursor column.
	pub column: u32,
	/// Word fragment before the cursor.
	pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionItem {
	pub label: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub detail: Option<String>,
	/// Text to insert; the label when absent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub insert_text: Option<String>,
}

impl CompletionItem {
	pub fn new(label: impl Into<String>) -> Self {
		Self {
			label: label.into(),
			detail: None,
			insert_text: None,
		}
	}

	#[must_use]
	pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
		self.detail = Some(detail.into());
		self
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ProviderError(pub String);

/// A source of completion suggestions.
#[async_trait]
pub trait CompletionProvider: Send + Sync + 'static {
	/// Name used in logs.
	fn name(&self) -> &str;

	async fn complete(&self, request: &CompletionRequest) -> Result<Vec<CompletionItem>, ProviderError>;
}

type ProviderList = Arc<Mutex<Vec<(u64, Arc<dyn CompletionProvider>)>>>;

/// Runtime-registered completion providers.
///
/// Cheap to clone; clones share the same providers.
#[derive(Clone, Default)]
pub struct CompletionRegistry {
	providers: ProviderList,
	next_id: Arc<AtomicU64>,
}

impl CompletionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a provider; releasing the subscription removes it.
	pub fn register(&self, provider: Arc<dyn CompletionProvider>) -> Subscription {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		trace!(provider = provider.name(), id, "completion.register");
		self.providers.lock().push((id, provider));

		let providers = Arc::downgrade(&self.providers);
		Subscription::new(move || {
			if let Some(providers) = providers.upgrade() {
				providers.lock().retain(|(entry, _)| *entry != id);
			}
		})
	}

	pub fn len(&self) -> usize {
		self.providers.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Queries every provider and concatenates their items in registration order.
	pub async fn complete(&self, request: &CompletionRequest) -> Vec<CompletionItem> {
		let providers: Vec<_> = self.providers.lock().iter().map(|(_, provider)| Arc::clone(provider)).collect();
		let results = join_all(providers.iter().map(|provider| AssertUnwindSafe(provider.complete(request)).catch_unwind())).await;

		let mut items = Vec::new();
		for (provider, result) in providers.iter().zip(results) {
			match result {
				Ok(Ok(found)) => items.extend(found),
				Ok(Err(error)) => warn!(provider = provider.name(), %error, "completion.provider.failed"),
				Err(_) => warn!(provider = provider.name(), "completion.provider.panicked"),
			}
		}
		items
	}

	/// Drops every provider.
	pub fn clear(&self) {
		self.providers.lock().clear();
	}
}

impl std::fmt::Debug for CompletionRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CompletionRegistry").field("providers", &self.len()).finish()
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	struct Words(&'static str, &'static [&'static str]);

	#[async_trait]
	impl CompletionProvider for Words {
		fn name(&self) -> &str {
			self.0
		}

		async fn complete(&self, request: &CompletionRequest) -> Result<Vec<CompletionItem>, ProviderError> {
			Ok(self.1.iter().filter(|w| w.starts_with(&request.prefix)).map(|w| CompletionItem::new(*w)).collect())
		}
	}

	struct Failing;

	#[async_trait]
	impl CompletionProvider for Failing {
		fn name(&self) -> &str {
			"failing"
		}

		async fn complete(&self, _: &CompletionRequest) -> Result<Vec<CompletionItem>, ProviderError> {
			Err(ProviderError("index unavailable".into()))
		}
	}

	struct Panicking;

	#[async_trait]
	impl CompletionProvider for Panicking {
		fn name(&self) -> &str {
			"panicking"
		}

		async fn complete(&self, _: &CompletionRequest) -> Result<Vec<CompletionItem>, ProviderError> {
			panic!("provider bug")
		}
	}

	fn request(prefix: &str) -> CompletionRequest {
		CompletionRequest {
			source: String::new(),
			line: 1,
			column: 1,
			prefix: prefix.into(),
		}
	}

	fn labels(items: &[CompletionItem]) -> Vec<&str> {
		items.iter().map(|item| item.label.as_str()).collect()
	}

	#[tokio::test]
	async fn items_follow_registration_order() {
		let registry = CompletionRegistry::new();
		let _a = registry.register(Arc::new(Words("a", &["console", "const"])));
		let _b = registry.register(Arc::new(Words("b", &["constructor", "let"])));

		let items = registry.complete(&request("cons")).await;
		assert_eq!(labels(&items), vec!["console", "const", "constructor"]);
	}

	#[tokio::test]
	async fn failing_providers_are_isolated() {
		let _ = tracing_subscriber::fmt::try_init();
		let registry = CompletionRegistry::new();
		let _f = registry.register(Arc::new(Failing));
		let _p = registry.register(Arc::new(Panicking));
		let _w = registry.register(Arc::new(Words("w", &["Math"])));

		assert_eq!(labels(&registry.complete(&request("")).await), vec!["Math"]);
	}

	#[tokio::test]
	async fn releasing_the_subscription_unregisters() {
		let registry = CompletionRegistry::new();
		let mut sub = registry.register(Arc::new(Words("w", &["x"])));
		assert_eq!(registry.len(), 1);
		sub.dispose();
		assert!(registry.is_empty());
		assert!(registry.complete(&request("")).await.is_empty());
	}
}
