//! Scope registry and reconciliation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use playpen_primitives::Subscription;
use serde_json::Value;
use tracing::{debug, trace};

use crate::entry::{DeclarationEntry, RawDeclaration};

/// Receiver of declaration files, implemented by the editor's analysis engine.
///
/// The returned subscription unregisters the file when disposed or dropped.
///
/// `register`, and the release of a registration being replaced under the same
/// key, run while the registry holds its scope lock; they must not call back
/// into the registry. Registrations that simply vanish are released after the
/// lock is gone.
pub trait DeclarationSink: Send + Sync + 'static {
	/// Registers one declaration file under `path`.
	fn register(&self, path: &str, content: &str) -> Subscription;
}

/// Side effects performed by one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
	/// Registrations created.
	pub registered: usize,
	/// Registrations released.
	pub released: usize,
	/// Registrations left untouched because their signature did not change.
	pub kept: usize,
}

impl ReconcileReport {
	/// Returns true when the pass touched the analysis engine.
	pub fn has_changes(&self) -> bool {
		self.registered > 0 || self.released > 0
	}
}

/// The exact bytes fed to the analysis engine for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ContentSignature {
	path: String,
	content: String,
}

struct ActiveRegistration {
	signature: ContentSignature,
	handle: Subscription,
}

/// A declared entry plus the ticket identifying it for [`DeclarationHandle`]s.
struct Declared {
	ticket: u64,
	entry: DeclarationEntry,
}

#[derive(Default)]
struct ScopeState {
	declared: Vec<Declared>,
	active: HashMap<String, ActiveRegistration>,
}

struct RegistryInner {
	sink: Arc<dyn DeclarationSink>,
	scopes: Mutex<HashMap<String, ScopeState>>,
	next_ticket: AtomicU64,
	disposed: AtomicBool,
}

/// Registry of declaration scopes.
///
/// Cheap to clone; clones share the same scopes.
#[derive(Clone)]
pub struct DeclarationRegistry {
	inner: Arc<RegistryInner>,
}

impl DeclarationRegistry {
	/// Creates a registry publishing into `sink`.
	pub fn new(sink: Arc<dyn DeclarationSink>) -> Self {
		Self {
			inner: Arc::new(RegistryInner {
				sink,
				scopes: Mutex::new(HashMap::new()),
				next_ticket: AtomicU64::new(0),
				disposed: AtomicBool::new(false),
			}),
		}
	}

	/// Replaces the declared set of `scope` and reconciles its registrations.
	pub fn set_scope<I, R>(&self, scope: &str, entries: I) -> ReconcileReport
	where
		I: IntoIterator<Item = R>,
		R: Into<RawDeclaration>,
	{
		if self.is_disposed() {
			return ReconcileReport::default();
		}
		let declared: Vec<_> = entries
			.into_iter()
			.enumerate()
			.map(|(index, raw)| {
				let raw: RawDeclaration = raw.into();
				Declared {
					ticket: self.inner.ticket(),
					entry: raw.normalize(|| format!("{scope}-{index}")),
				}
			})
			.collect();
		self.inner.replace_declared(scope, declared)
	}

	/// Replaces `scope` from loosely-typed persisted data.
	///
	/// Accepts an array of entry objects; anything unusable is filtered out.
	pub fn set_scope_json(&self, scope: &str, value: &Value) -> ReconcileReport {
		let items = value.as_array().map(Vec::as_slice).unwrap_or_default();
		let raw: Vec<_> = items.iter().filter_map(RawDeclaration::from_json).collect();
		if raw.len() != items.len() {
			trace!(scope, dropped = items.len() - raw.len(), "declarations.filtered");
		}
		self.set_scope(scope, raw)
	}

	/// Appends one entry to `scope`. Releasing the handle removes exactly that entry.
	pub fn add_entry(&self, entry: impl Into<RawDeclaration>, scope: &str) -> DeclarationHandle {
		let ticket = self.inner.ticket();
		if self.is_disposed() {
			return DeclarationHandle::detached(scope, ticket);
		}
		let raw: RawDeclaration = entry.into();
		let entry = raw.normalize(|| format!("{scope}-entry-{ticket}"));
		self.inner.mutate_declared(scope, |declared| declared.push(Declared { ticket, entry }));
		DeclarationHandle {
			registry: Arc::downgrade(&self.inner),
			scope: scope.to_owned(),
			ticket,
			released: false,
		}
	}

	/// Returns a snapshot of the declared entries of `scope`, in declaration order.
	pub fn get_scope(&self, scope: &str) -> Vec<DeclarationEntry> {
		self.inner
			.scopes
			.lock()
			.get(scope)
			.map(|state| state.declared.iter().map(|d| d.entry.clone()).collect())
			.unwrap_or_default()
	}

	/// Lists scope names, sorted.
	pub fn scopes(&self) -> Vec<String> {
		let mut names: Vec<_> = self.inner.scopes.lock().keys().cloned().collect();
		names.sort();
		names
	}

	/// Number of live registrations held for `scope`.
	pub fn active_count(&self, scope: &str) -> usize {
		self.inner.scopes.lock().get(scope).map_or(0, |state| state.active.len())
	}

	/// Releases every registration in every scope. Later calls are no-ops.
	pub fn dispose(&self) {
		if self.inner.disposed.swap(true, Ordering::AcqRel) {
			return;
		}
		let scopes = std::mem::take(&mut *self.inner.scopes.lock());
		let released: usize = scopes.values().map(|state| state.active.len()).sum();
		drop(scopes);
		debug!(released, "declarations.dispose");
	}

	/// Returns true after [`Self::dispose`].
	pub fn is_disposed(&self) -> bool {
		self.inner.disposed.load(Ordering::Acquire)
	}
}

impl RegistryInner {
	fn ticket(&self) -> u64 {
		self.next_ticket.fetch_add(1, Ordering::Relaxed)
	}

	fn replace_declared(&self, scope: &str, declared: Vec<Declared>) -> ReconcileReport {
		self.mutate_declared(scope, move |current| *current = declared)
	}

	/// Applies `edit` to the declared list of `scope` and reconciles.
	///
	/// Registrations are created under the lock so concurrent updates cannot
	/// interleave. A registration whose signature changed is released under the
	/// lock too, right before its replacement registers, since both usually share
	/// a path. Registrations with no successor are dropped after the lock is gone.
	fn mutate_declared(&self, scope: &str, edit: impl FnOnce(&mut Vec<Declared>)) -> ReconcileReport {
		let (report, released) = {
			let mut scopes = self.scopes.lock();
			if self.disposed.load(Ordering::Acquire) {
				return ReconcileReport::default();
			}
			let state = scopes.entry(scope.to_owned()).or_default();
			edit(&mut state.declared);
			reconcile(scope, state, self.sink.as_ref())
		};
		drop(released);
		if report.has_changes() {
			debug!(scope, registered = report.registered, released = report.released, kept = report.kept, "declarations.reconcile");
		} else {
			trace!(scope, kept = report.kept, "declarations.reconcile.noop");
		}
		report
	}
}

fn registration_path(scope: &str, key: &str, name: &str) -> String {
	format!("playpen:///{scope}/{key}/{name}")
}

/// Assigns collision-free keys: the entry id, suffixed `~N` when taken.
fn resolve_keys(declared: &[Declared]) -> Vec<String> {
	let mut taken = HashSet::with_capacity(declared.len());
	declared
		.iter()
		.map(|d| {
			let base = d.entry.id.as_str();
			let mut key = base.to_owned();
			let mut suffix = 1usize;
			while taken.contains(&key) {
				key = format!("{base}~{suffix}");
				suffix += 1;
			}
			taken.insert(key.clone());
			key
		})
		.collect()
}

/// Brings `state.active` in line with `state.declared`.
///
/// Releases changed registrations in place; returns the report plus the
/// orphaned handles to release once the caller unlocks.
fn reconcile(scope: &str, state: &mut ScopeState, sink: &dyn DeclarationSink) -> (ReconcileReport, Vec<Subscription>) {
	let mut report = ReconcileReport::default();
	let mut previous = std::mem::take(&mut state.active);
	let mut released = Vec::new();

	for (declared, key) in state.declared.iter().zip(resolve_keys(&state.declared)) {
		let entry = &declared.entry;
		if !entry.enabled {
			continue;
		}
		let signature = ContentSignature {
			path: registration_path(scope, &key, &entry.name),
			content: entry.content.clone(),
		};

		match previous.remove(&key) {
			Some(existing) if existing.signature == signature => {
				report.kept += 1;
				state.active.insert(key, existing);
				continue;
			}
			Some(stale) => {
				let mut handle = stale.handle;
				handle.dispose();
				report.released += 1;
			}
			None => {}
		}

		trace!(scope, key = %key, path = %signature.path, "declarations.register");
		let handle = sink.register(&signature.path, &signature.content);
		report.registered += 1;
		state.active.insert(key, ActiveRegistration { signature, handle });
	}

	for (key, orphan) in previous {
		trace!(scope, key = %key, "declarations.release");
		released.push(orphan.handle);
		report.released += 1;
	}

	(report, released)
}

/// Handle returned by [`DeclarationRegistry::add_entry`].
///
/// Releasing it removes the entry it was created for and reconciles the scope.
/// Entries replaced by a later `set_scope` are already gone; releasing then does
/// nothing. Dropping the handle without calling [`Self::release`] keeps the entry.
#[derive(Debug)]
pub struct DeclarationHandle {
	registry: Weak<RegistryInner>,
	scope: String,
	ticket: u64,
	released: bool,
}

impl DeclarationHandle {
	fn detached(scope: &str, ticket: u64) -> Self {
		Self {
			registry: Weak::new(),
			scope: scope.to_owned(),
			ticket,
			released: true,
		}
	}

	/// Scope the entry was added to.
	pub fn scope(&self) -> &str {
		&self.scope
	}

	/// Removes the entry. Idempotent.
	pub fn release(&mut self) -> ReconcileReport {
		if std::mem::replace(&mut self.released, true) {
			return ReconcileReport::default();
		}
		let Some(registry) = self.registry.upgrade() else {
			return ReconcileReport::default();
		};
		let ticket = self.ticket;
		registry.mutate_declared(&self.scope, |declared| declared.retain(|d| d.ticket != ticket))
	}
}

impl std::fmt::Debug for RegistryInner {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RegistryInner").field("disposed", &self.disposed.load(Ordering::Relaxed)).finish_non_exhaustive()
	}
}

impl std::fmt::Debug for DeclarationRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DeclarationRegistry").field("scopes", &self.scopes()).finish()
	}
}
