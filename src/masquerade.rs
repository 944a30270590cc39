//! Temporarily acting as another principal, with an auditable way back.
use tracing::debug;

use crate::{
	error::Error,
	reconcile::{PrincipalRecord, PrincipalStore},
};

/// Session-scoped slot holding the original principal's identifier while a
/// masquerade is active. Absence of a value means "not masquerading"; there
/// is no other state.
///
/// Implementors bridge to whatever the surrounding application uses for
/// session storage; [`MemorySession`] covers in-process callers and tests.
pub trait MasqueradeSession {
	/// Read the stored original-principal identifier.
	fn original_principal(&self) -> Option<String>;

	/// Store the original-principal identifier.
	fn set_original_principal(&mut self, id: &str);

	/// Clear the slot.
	fn clear_original_principal(&mut self);

	/// Whether a masquerade is active for this session.
	fn is_masquerading(&self) -> bool {
		self.original_principal().is_some()
	}
}

/// Trivial in-process session slot.
#[derive(Clone, Debug, Default)]
pub struct MemorySession {
	/// The stored identifier, if any.
	original: Option<String>,
}

impl MasqueradeSession for MemorySession {
	fn original_principal(&self) -> Option<String> {
		self.original.clone()
	}

	fn set_original_principal(&mut self, id: &str) {
		self.original = Some(id.to_owned());
	}

	fn clear_original_principal(&mut self) {
		self.original = None;
	}
}

/// Swaps a resolved principal's effective identity with another resolvable
/// principal and back again.
///
/// The manager operates purely on already-resolved local principals; it
/// never talks to the directory. Per session the state machine is
/// two-state: not masquerading, or masquerading with the original
/// principal's identifier parked in the session slot.
#[derive(Debug)]
pub struct MasqueradeManager<S> {
	/// Lookup used to resolve target and original principals.
	store: S,
}

impl<S: PrincipalStore> MasqueradeManager<S> {
	/// Create a manager over a principal store.
	#[must_use]
	pub fn new(store: S) -> Self {
		MasqueradeManager { store }
	}

	/// Begin masquerading as `target_id`.
	///
	/// Returns the target principal, which the caller installs as the
	/// session's effective principal. Returns `Ok(None)`, leaving all
	/// state untouched, when a masquerade is already active (nesting is
	/// not allowed) or the target does not resolve.
	pub async fn masquerade_as_user(
		&self,
		session: &mut impl MasqueradeSession,
		current: &PrincipalRecord,
		target_id: &str,
	) -> Result<Option<PrincipalRecord>, Error> {
		if session.is_masquerading() {
			debug!("Refusing nested masquerade");
			return Ok(None);
		}
		let Some(target) = self.store.find_by_id(target_id).await? else {
			debug!(%target_id, "Masquerade target does not resolve");
			return Ok(None);
		};
		session.set_original_principal(&current.id);
		Ok(Some(target))
	}

	/// Resolve the original principal parked for this session, without
	/// changing any state. `Ok(None)` when not masquerading.
	pub async fn masquerading_user(
		&self,
		session: &impl MasqueradeSession,
	) -> Result<Option<PrincipalRecord>, Error> {
		let Some(id) = session.original_principal() else {
			return Ok(None);
		};
		self.store.find_by_id(&id).await
	}

	/// End the masquerade, clearing the session slot.
	///
	/// Returns the original principal, which the caller restores as the
	/// session's effective principal. `Ok(None)` when not masquerading (no
	/// state is touched), or when the parked original no longer resolves
	/// (the slot is still cleared: a stale masquerade must not pin the
	/// session).
	pub async fn stop_masquerading(
		&self,
		session: &mut impl MasqueradeSession,
	) -> Result<Option<PrincipalRecord>, Error> {
		let Some(id) = session.original_principal() else {
			return Ok(None);
		};
		let original = self.store.find_by_id(&id).await?;
		session.clear_original_principal();
		Ok(original)
	}
}
