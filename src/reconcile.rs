//! Reconciling directory-confirmed identities with the local account store.
use async_trait::async_trait;
use ldap3::SearchEntry;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{config::AttributeConfig, directory::DirectoryHandler, error::Error};

/// Attribute holding a person's given name.
const GIVEN_NAME_ATTRIBUTE: &str = "givenName";
/// Attribute holding a person's surname.
const SURNAME_ATTRIBUTE: &str = "sn";
/// Attribute holding a person's display name.
const DISPLAY_NAME_ATTRIBUTE: &str = "displayName";

/// Profile fields extracted from a directory record, captured on records the
/// local store does not hold yet so a caller can provision them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchAttributes {
	/// Local-store identifier, already prefixed.
	pub id: Option<String>,
	/// Login name.
	pub username: Option<String>,
	/// Given name.
	pub first_name: Option<String>,
	/// Surname.
	pub last_name: Option<String>,
	/// Display name.
	pub display_name: Option<String>,
	/// Primary mail address.
	pub email: Option<String>,
}

/// A principal as surfaced to the calling authentication layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalRecord {
	/// Primary identifier in the local store.
	pub id: String,
	/// Login name.
	pub username: String,
	/// Display name, if known.
	pub display_name: Option<String>,
	/// Primary mail address, if known.
	pub email: Option<String>,
	/// Whether the record exists in the local store. A directory-confirmed
	/// identity without a local row carries `false`; calling code must not
	/// treat such a record as logged in without provisioning it first.
	pub is_valid: bool,
	/// Directory attributes captured for provisioning. Populated only on
	/// transient records, never on persisted ones.
	pub search_attributes: Option<SearchAttributes>,
}

/// Lookup capability over the local account store.
#[async_trait]
pub trait PrincipalStore {
	/// Find a principal by its primary identifier.
	async fn find_by_id(&self, id: &str) -> Result<Option<PrincipalRecord>, Error>;
}

/// Policy knobs for reconciliation.
#[derive(Clone, Debug, Default)]
pub struct ReconcilePolicy {
	/// Prefix prepended to the extracted identifier before local lookup.
	pub id_prefix: String,
	/// Whether to return a transient record for identities the local store
	/// does not hold. When off, such identities fail authentication
	/// outright.
	pub synthesize_missing: bool,
}

impl ReconcilePolicy {
	/// Build the policy from the flat settings surface.
	#[must_use]
	pub fn from_settings(settings: &crate::factory::Settings) -> Self {
		ReconcilePolicy {
			id_prefix: settings.local_id_prefix.clone(),
			synthesize_missing: settings.synthesize_missing,
		}
	}
}

/// Maps directory search results onto local principal records.
#[derive(Debug)]
pub struct IdentityReconciler<S> {
	/// The local account store.
	store: S,
	/// Reconciliation policy.
	policy: ReconcilePolicy,
	/// Attribute-name mapping shared with the directory handler.
	attributes: AttributeConfig,
}

impl<S: PrincipalStore> IdentityReconciler<S> {
	/// Create a reconciler over a local store.
	#[must_use]
	pub fn new(store: S, policy: ReconcilePolicy, attributes: AttributeConfig) -> Self {
		IdentityReconciler { store, policy, attributes }
	}

	/// Resolve directory search results to a local principal.
	///
	/// `Ok(None)` covers every expected rejection: no directory match, a
	/// record without the identifier attribute, or an unknown identity with
	/// synthesis disabled. The caller reports all of these as the same
	/// generic invalid-credentials outcome; which case occurred must not
	/// reach the end user.
	pub async fn resolve(&self, results: &[SearchEntry]) -> Result<Option<PrincipalRecord>, Error> {
		if !DirectoryHandler::is_valid_result(results) {
			return Ok(None);
		}

		let attribute = |name: &str| {
			DirectoryHandler::get_attribute_from_results(results, name).map(str::to_owned)
		};

		let Some(user_id) = attribute(&self.attributes.user_id) else {
			debug!(
				attribute = %self.attributes.user_id,
				"Directory record carries no local identifier"
			);
			return Ok(None);
		};
		let id = format!("{}{user_id}", self.policy.id_prefix);

		if let Some(mut record) = self.store.find_by_id(&id).await? {
			record.is_valid = true;
			return Ok(Some(record));
		}

		if !self.policy.synthesize_missing {
			debug!(%id, "No local record for directory identity");
			return Ok(None);
		}

		let username = attribute(&self.attributes.username);
		let email = attribute(&self.attributes.mail);
		let search_attributes = SearchAttributes {
			id: Some(id.clone()),
			username: username.clone(),
			first_name: attribute(GIVEN_NAME_ATTRIBUTE),
			last_name: attribute(SURNAME_ATTRIBUTE),
			display_name: attribute(DISPLAY_NAME_ATTRIBUTE),
			email: email.clone(),
		};
		Ok(Some(PrincipalRecord {
			id,
			username: username.unwrap_or_default(),
			display_name: search_attributes.display_name.clone(),
			email,
			is_valid: false,
			search_attributes: Some(search_attributes),
		}))
	}
}
