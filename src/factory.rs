//! Building configured directory handlers from the flat settings surface.
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
	config::{AttributeConfig, Config, ConnectionConfig, ModifyMethod, TierCredentials},
	directory::DirectoryHandler,
	error::Error,
};

/// The externally supplied configuration surface, as an administrator would
/// write it: flat values, pipe-delimited base-DN list, empty string meaning
/// "unset" for the tier overrides.
///
/// Resolved into a [`Config`] (and from there a [`DirectoryHandler`]) by
/// [`Settings::build`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Settings {
	/// The URL to connect to the server with. Supports ldap, ldaps, and ldapi
	/// schemes
	pub url: Url,
	/// Connection settings.
	#[serde(default)]
	pub connection: ConnectionConfig,
	/// LDAP protocol version. Only version 3 can be spoken over the wire;
	/// other values are rejected.
	#[serde(default = "default_version")]
	pub version: u8,
	/// Pipe-delimited list of candidate base DNs, tried in order. Entries
	/// may be empty; an empty entry scopes operations to the overlay alone.
	#[serde(default)]
	pub base_dn: String,
	/// Logical root spliced onto every DN. Empty means none.
	#[serde(default)]
	pub overlay_dn: String,
	/// Administrative bind DN.
	#[serde(default)]
	pub admin_dn: String,
	/// Administrative bind password.
	#[serde(default)]
	pub admin_password: String,
	/// Substitute the administrative identity when a caller presents no
	/// password, instead of attempting an unauthenticated bind.
	#[serde(default)]
	pub allow_empty_password: bool,
	/// Names of attributes to search for and extract data from
	#[serde(default)]
	pub attributes: AttributeConfig,
	/// Custom compound filter template for authentication searches. Empty
	/// means the built-in default; otherwise it must contain at least one
	/// `%s` placeholder.
	#[serde(default)]
	pub auth_query: String,
	/// Prefix prepended to extracted identifiers before local-store lookup.
	#[serde(default)]
	pub local_id_prefix: String,
	/// Return a transient, not-yet-persisted record when the directory
	/// confirms an identity the local store does not hold.
	#[serde(default)]
	pub synthesize_missing: bool,
	/// Add-tier base DN; empty inherits the first search base.
	#[serde(default)]
	pub add_base_dn: String,
	/// Add-tier bind DN; empty inherits the admin DN.
	#[serde(default)]
	pub add_dn: String,
	/// Add-tier bind password; empty inherits the admin password.
	#[serde(default)]
	pub add_password: String,
	/// Modify trust mode label; anything but the literal `"admin"` means
	/// self-bind.
	#[serde(default)]
	pub modify_method: String,
	/// Modify-tier base DN; empty inherits the add tier.
	#[serde(default)]
	pub modify_base_dn: String,
	/// Modify-tier bind DN; empty inherits the add tier.
	#[serde(default)]
	pub modify_dn: String,
	/// Modify-tier bind password; empty inherits the add tier.
	#[serde(default)]
	pub modify_password: String,
}

/// The protocol version spoken when none is configured.
fn default_version() -> u8 {
	3
}

/// A non-empty override, or the inherited value.
fn inherit(value: &str, fallback: &str) -> String {
	if value.is_empty() {
		fallback.to_owned()
	} else {
		value.to_owned()
	}
}

impl Settings {
	/// Settings for the given server with every other knob at its default.
	#[must_use]
	pub fn new(url: Url) -> Self {
		Settings {
			url,
			connection: ConnectionConfig::default(),
			version: default_version(),
			base_dn: String::new(),
			overlay_dn: String::new(),
			admin_dn: String::new(),
			admin_password: String::new(),
			allow_empty_password: false,
			attributes: AttributeConfig::default(),
			auth_query: String::new(),
			local_id_prefix: String::new(),
			synthesize_missing: false,
			add_base_dn: String::new(),
			add_dn: String::new(),
			add_password: String::new(),
			modify_method: String::new(),
			modify_base_dn: String::new(),
			modify_dn: String::new(),
			modify_password: String::new(),
		}
	}

	/// Resolve these settings into a directory configuration.
	///
	/// The credential tiers are cascaded here, exactly once: an unset add
	/// tier inherits the search tier (first base DN, administrative
	/// credentials), an unset modify tier inherits the resolved add tier.
	/// The resulting [`Config`] carries effective values only.
	pub fn resolve(&self) -> Result<Config, Error> {
		match self.url.scheme() {
			"ldap" | "ldaps" | "ldapi" => {}
			other => {
				return Err(Error::Invalid(format!("Unsupported directory URL scheme {other}")))
			}
		}
		if self.version != 3 {
			return Err(Error::Invalid(format!(
				"Unsupported LDAP protocol version {}",
				self.version
			)));
		}
		if !self.auth_query.is_empty() && !self.auth_query.contains("%s") {
			return Err(Error::Invalid(
				"The auth query template carries no %s placeholder".to_owned(),
			));
		}

		let base_dns: Vec<String> =
			self.base_dn.split('|').map(|candidate| candidate.trim().to_owned()).collect();
		let search_base = base_dns.first().cloned().unwrap_or_default();

		let add = TierCredentials {
			base_dn: inherit(&self.add_base_dn, &search_base),
			bind_dn: inherit(&self.add_dn, &self.admin_dn),
			password: inherit(&self.add_password, &self.admin_password),
		};
		let modify = TierCredentials {
			base_dn: inherit(&self.modify_base_dn, &add.base_dn),
			bind_dn: inherit(&self.modify_dn, &add.bind_dn),
			password: inherit(&self.modify_password, &add.password),
		};

		Ok(Config {
			url: self.url.clone(),
			connection: self.connection.clone(),
			version: self.version,
			base_dns,
			overlay_dn: (!self.overlay_dn.is_empty()).then(|| self.overlay_dn.clone()),
			admin_dn: self.admin_dn.clone(),
			admin_password: self.admin_password.clone(),
			allow_empty_password: self.allow_empty_password,
			attributes: self.attributes.clone(),
			auth_query: (!self.auth_query.is_empty()).then(|| self.auth_query.clone()),
			add,
			modify,
			modify_method: ModifyMethod::from_label(&self.modify_method),
		})
	}

	/// Build a configured handler. This is the factory entry point.
	pub fn build(&self) -> Result<DirectoryHandler, Error> {
		Ok(DirectoryHandler::new(self.resolve()?))
	}
}
