//! Client for authenticating against and maintaining entries in an LDAP
//! directory.

use std::collections::HashSet;

use ldap3::{dn_escape, ldap_escape, LdapConnAsync, Mod, Scope, SearchEntry};
use tracing::{debug, warn};

use crate::{
	config::{Config, ModifyMethod},
	entry::SearchEntryExt,
	error::Error,
	hash,
};

/// Attribute hashed credentials are stored under.
const PASSWORD_ATTRIBUTE: &str = "userPassword";

/// Result code of an LDAP no-such-object response.
const RC_NO_SUCH_OBJECT: u32 = 32;

/// Attribute-list placeholder requesting no attributes at all.
const NO_ATTRS: &str = "1.1";

/// Holds data and provides the interface for interactions with the LDAP
/// server: binds (with candidate-subtree fallback), searches, and
/// subtree-scoped add/modify operations.
///
/// A handler serves one logical operation at a time; callers needing
/// concurrency use one handler per flow. Every successful
/// [`connect`](DirectoryHandler::connect) or
/// [`connect_by_dn`](DirectoryHandler::connect_by_dn) opens a fresh
/// transport connection and replaces the previously bound one.
pub struct DirectoryHandler {
	/// The configuration of the directory handler.
	config: Config,
	/// The currently bound connection, if any.
	conn: Option<ldap3::Ldap>,
}

impl std::fmt::Debug for DirectoryHandler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DirectoryHandler")
			.field("config", &self.config)
			.field("bound", &self.conn.is_some())
			.finish()
	}
}

impl DirectoryHandler {
	/// Create a new handler from a resolved configuration.
	#[must_use]
	pub fn new(config: Config) -> Self {
		DirectoryHandler { config, conn: None }
	}

	/// The handler's configuration.
	#[must_use]
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Whether a bound connection is currently held.
	#[must_use]
	pub fn is_bound(&self) -> bool {
		self.conn.is_some()
	}

	/// Open a fresh transport connection. The raw connection is driven by a
	/// background task for the lifetime of the returned handle.
	async fn open(&self) -> Result<ldap3::Ldap, Error> {
		let settings = self.config.connection.to_settings().await?;
		let (conn, ldap) =
			LdapConnAsync::from_url_with_settings(settings, &self.config.url).await?;
		tokio::spawn(async move {
			if let Err(err) = conn.drive().await {
				warn!("Ldap connection error {err}");
			}
		});
		Ok(ldap)
	}

	/// Attempt a simple bind on the given handle.
	///
	/// `Ok(false)` means the server rejected the credentials; transport and
	/// protocol failures propagate.
	async fn try_bind(ldap: &mut ldap3::Ldap, dn: &str, password: &str) -> Result<bool, Error> {
		let result = ldap.simple_bind(dn, password).await?;
		if result.rc == 0 {
			Ok(true)
		} else {
			debug!(%dn, rc = result.rc, "Bind rejected");
			Ok(false)
		}
	}

	/// Courtesy unbind; failures are logged, the operation already concluded.
	async fn close(mut ldap: ldap3::Ldap) {
		if let Err(err) = ldap.unbind().await {
			warn!("Failed to unbind cleanly: {err}");
		}
	}

	/// Join DN components, omitting empty segments.
	fn join_dn(segments: &[&str]) -> String {
		segments
			.iter()
			.copied()
			.filter(|segment| !segment.is_empty())
			.collect::<Vec<_>>()
			.join(",")
	}

	/// The overlay root, or the empty string when none is configured.
	fn overlay(&self) -> &str {
		self.config.overlay_dn.as_deref().unwrap_or("")
	}

	/// The base a search is scoped to: the candidate suffixed with the
	/// overlay, or the overlay alone when the candidate entry is empty.
	fn effective_base(&self, base: &str) -> String {
		Self::join_dn(&[base, self.overlay()])
	}

	/// The first configured base DN, with the overlay applied.
	fn primary_base(&self) -> String {
		self.effective_base(self.config.base_dns.first().map(String::as_str).unwrap_or(""))
	}

	/// The administrative bind DN, overlay appended.
	fn admin_bind_dn(&self) -> String {
		Self::join_dn(&[&self.config.admin_dn, self.overlay()])
	}

	/// Bind identity for a username under one candidate base.
	fn bind_identity(&self, username: &str, base: &str) -> String {
		let rdn = format!("{}={}", self.config.attributes.username, dn_escape(username));
		Self::join_dn(&[&rdn, base, self.overlay()])
	}

	/// Connect to the directory and bind.
	///
	/// Without a username this is a single administrative bind. With a
	/// username, each configured base DN is tried in order with a bind
	/// identity of `<username-attr>=<username>,<base>,<overlay>` (empty
	/// segments omitted); a rejected bind moves on to the next candidate,
	/// since it only means "wrong credentials for this subtree". When the
	/// caller supplied no password and the configuration allows it, the
	/// administrative identity is substituted for the user bind.
	///
	/// Returns whether a bind succeeded. Transport and protocol errors
	/// propagate; they are infrastructure problems, not failed logins.
	pub async fn connect(
		&mut self,
		username: Option<&str>,
		password: Option<&str>,
	) -> Result<bool, Error> {
		let mut ldap = self.open().await?;

		let Some(username) = username else {
			let dn = self.admin_bind_dn();
			if Self::try_bind(&mut ldap, &dn, &self.config.admin_password).await? {
				self.conn = Some(ldap);
				return Ok(true);
			}
			return Ok(false);
		};

		let password = password.unwrap_or("");
		let base_dns = self.config.base_dns.clone();
		for base in &base_dns {
			let (dn, secret) = if !password.is_empty() {
				(self.bind_identity(username, base), password.to_owned())
			} else if self.config.allow_empty_password {
				// no secret presented; bind as admin on the caller's behalf
				(self.admin_bind_dn(), self.config.admin_password.clone())
			} else {
				(self.bind_identity(username, base), String::new())
			};
			if Self::try_bind(&mut ldap, &dn, &secret).await? {
				self.conn = Some(ldap);
				return Ok(true);
			}
		}
		Ok(false)
	}

	/// Connect to the directory and bind directly as the given DN.
	///
	/// An empty password is replaced by the administrative identity when the
	/// configuration allows it; otherwise the bind is attempted with the
	/// empty secret. Returns whether the bind succeeded.
	pub async fn connect_by_dn(&mut self, dn: &str, password: &str) -> Result<bool, Error> {
		let mut ldap = self.open().await?;
		let (dn, secret) = if password.is_empty() && self.config.allow_empty_password {
			(self.admin_bind_dn(), self.config.admin_password.clone())
		} else {
			(dn.to_owned(), password.to_owned())
		};
		if Self::try_bind(&mut ldap, &dn, &secret).await? {
			self.conn = Some(ldap);
			Ok(true)
		} else {
			Ok(false)
		}
	}

	/// Gracefully release the bound connection, if any.
	pub async fn unbind(&mut self) {
		if let Some(ldap) = self.conn.take() {
			Self::close(ldap).await;
		}
	}

	/// Build the compound authentication filter for a value.
	///
	/// A configured template has every `%s` replaced with the escaped value;
	/// the default is a disjunction over the username, mail and mail-alias
	/// attributes.
	fn auth_filter(&self, value: &str) -> String {
		let escaped = ldap_escape(value);
		match &self.config.auth_query {
			Some(template) => template.replace("%s", &escaped),
			None => format!(
				"(|({username}={escaped})({mail}={escaped})({mail_array}={escaped}))",
				username = self.config.attributes.username,
				mail = self.config.attributes.mail,
				mail_array = self.config.attributes.mail_array,
			),
		}
	}

	/// Run one subtree search. An absent base (no-such-object) yields an
	/// empty result rather than an error, since candidate bases are allowed
	/// to be missing on a given server.
	async fn search_base(
		ldap: &mut ldap3::Ldap,
		base: &str,
		filter: &str,
	) -> Result<Vec<SearchEntry>, Error> {
		let result = ldap.search(base, Scope::Subtree, filter, vec!["*"]).await?;
		if result.1.rc == RC_NO_SUCH_OBJECT {
			return Ok(Vec::new());
		}
		let (entries, _) = result.success()?;
		Ok(entries.into_iter().map(SearchEntry::construct).collect())
	}

	/// Search for the record matching an authentication value (login name or
	/// mail address).
	///
	/// The compound filter is executed against each candidate base DN in
	/// order; the first non-empty result wins. When no candidate matches,
	/// the last (empty) result is returned; "no match" is a routine
	/// outcome, not an error.
	pub async fn search_by_auth(&mut self, value: &str) -> Result<Vec<SearchEntry>, Error> {
		let filter = self.auth_filter(value);
		let bases: Vec<String> =
			self.config.base_dns.iter().map(|base| self.effective_base(base)).collect();
		let ldap = self.conn.as_mut().ok_or(Error::NotConnected)?;

		let mut last = Vec::new();
		for base in &bases {
			debug!(%base, %filter, "Searching directory");
			let entries = Self::search_base(ldap, base, &filter).await?;
			if !entries.is_empty() {
				return Ok(entries);
			}
			last = entries;
		}
		Ok(last)
	}

	/// Search the primary base for a record by login name. No candidate
	/// fallback.
	pub async fn search_by_uid(&mut self, uid: &str) -> Result<Vec<SearchEntry>, Error> {
		let filter = format!("({}={})", self.config.attributes.username, ldap_escape(uid));
		self.search_single(&filter).await
	}

	/// Search the primary base for a record by mail address. No candidate
	/// fallback.
	pub async fn search_by_email(&mut self, email: &str) -> Result<Vec<SearchEntry>, Error> {
		let filter = format!("({}={})", self.config.attributes.mail, ldap_escape(email));
		self.search_single(&filter).await
	}

	/// Search the primary base for a record by mail alias. No candidate
	/// fallback.
	pub async fn search_by_email_array(&mut self, email: &str) -> Result<Vec<SearchEntry>, Error> {
		let filter = format!("({}={})", self.config.attributes.mail_array, ldap_escape(email));
		self.search_single(&filter).await
	}

	/// Search the primary base with a caller-supplied raw filter.
	pub async fn search_by_query(&mut self, filter: &str) -> Result<Vec<SearchEntry>, Error> {
		self.search_single(filter).await
	}

	/// Execute a single search against the primary base DN.
	async fn search_single(&mut self, filter: &str) -> Result<Vec<SearchEntry>, Error> {
		let base = self.primary_base();
		let ldap = self.conn.as_mut().ok_or(Error::NotConnected)?;
		debug!(%base, %filter, "Searching directory");
		Self::search_base(ldap, &base, filter).await
	}

	/// Extract the first value of the named attribute from search results.
	///
	/// Records are scanned in order; the name `"dn"` (any case) returns the
	/// first record's distinguished name, any other name is matched
	/// case-insensitively. `None` means the attribute simply is not there,
	/// an expected outcome.
	#[must_use]
	pub fn get_attribute_from_results<'a>(
		results: &'a [SearchEntry],
		name: &str,
	) -> Option<&'a str> {
		if name.eq_ignore_ascii_case("dn") {
			return results.first().map(|entry| entry.dn.as_str());
		}
		results.iter().find_map(|entry| entry.attr_first_ci(name))
	}

	/// Whether a result sequence yielded at least one record.
	#[must_use]
	pub fn is_valid_result(results: &[SearchEntry]) -> bool {
		!results.is_empty()
	}

	/// Resolve the DN a mutation targets. Identifiers already containing a
	/// DN separator are used verbatim; anything else is synthesized as
	/// `<username-attr>=<identifier>` under the tier's base and the overlay.
	fn target_dn(&self, identifier: &str, base: &str) -> String {
		if identifier.contains('=') {
			identifier.to_owned()
		} else {
			let rdn = format!("{}={}", self.config.attributes.username, dn_escape(identifier));
			Self::join_dn(&[&rdn, base, self.overlay()])
		}
	}

	/// Probe whether a node exists.
	async fn entry_exists(ldap: &mut ldap3::Ldap, dn: &str) -> Result<bool, Error> {
		let result = ldap.search(dn, Scope::Base, "(objectClass=*)", vec![NO_ATTRS]).await?;
		if result.1.rc == RC_NO_SUCH_OBJECT {
			return Ok(false);
		}
		let (entries, _) = result.success()?;
		Ok(!entries.is_empty())
	}

	/// Create a new directory node carrying the given attributes.
	///
	/// Binds with the add-tier credentials on a fresh connection; a rejected
	/// bind propagates as an error here, since adding is a privileged,
	/// intentional operation. Returns `Ok(false)` without touching the
	/// directory when the node already exists; creation never overwrites.
	pub async fn add_object(
		&mut self,
		identifier: &str,
		attributes: &[(String, Vec<String>)],
	) -> Result<bool, Error> {
		let tier = self.config.add.clone();
		let dn = self.target_dn(identifier, &tier.base_dn);

		let mut ldap = self.open().await?;
		ldap.simple_bind(&tier.bind_dn, &tier.password).await?.success()?;

		if Self::entry_exists(&mut ldap, &dn).await? {
			debug!(%dn, "Refusing to add over an existing node");
			Self::close(ldap).await;
			return Ok(false);
		}

		let attrs: Vec<(String, HashSet<String>)> = attributes
			.iter()
			.map(|(name, values)| (name.clone(), values.iter().cloned().collect()))
			.collect();
		let result = ldap.add(&dn, attrs).await;
		Self::close(ldap).await;
		result?.success()?;
		Ok(true)
	}

	/// Replace (or attach) the given attributes on an existing node.
	///
	/// In admin mode this binds with the modify-tier credentials on a fresh
	/// connection (a rejected bind propagates). In self mode the connection
	/// bound by a prior [`connect`](DirectoryHandler::connect) or
	/// [`connect_by_dn`](DirectoryHandler::connect_by_dn) is reused without
	/// a rebind. Returns `Ok(false)` when the node does not exist;
	/// modification never creates.
	pub async fn modify_object(
		&mut self,
		identifier: &str,
		attributes: &[(String, Vec<String>)],
	) -> Result<bool, Error> {
		let tier = self.config.modify.clone();
		let dn = self.target_dn(identifier, &tier.base_dn);

		match self.config.modify_method {
			ModifyMethod::Admin => {
				let mut ldap = self.open().await?;
				ldap.simple_bind(&tier.bind_dn, &tier.password).await?.success()?;
				let outcome = Self::apply_modifications(&mut ldap, &dn, attributes).await;
				Self::close(ldap).await;
				outcome
			}
			ModifyMethod::SelfBind => {
				let ldap = self.conn.as_mut().ok_or(Error::NotConnected)?;
				Self::apply_modifications(ldap, &dn, attributes).await
			}
		}
	}

	/// Apply attribute replacements to an existing node.
	async fn apply_modifications(
		ldap: &mut ldap3::Ldap,
		dn: &str,
		attributes: &[(String, Vec<String>)],
	) -> Result<bool, Error> {
		if !Self::entry_exists(ldap, dn).await? {
			debug!(%dn, "Refusing to modify a missing node");
			return Ok(false);
		}
		let mods: Vec<Mod<String>> = attributes
			.iter()
			.map(|(name, values)| Mod::Replace(name.clone(), values.iter().cloned().collect()))
			.collect();
		ldap.modify(dn, mods).await?.success()?;
		Ok(true)
	}

	/// Store a new password for a node as a freshly salted hash.
	pub async fn modify_object_password(
		&mut self,
		identifier: &str,
		password: &str,
	) -> Result<bool, Error> {
		let hashed = hash::hash(password);
		self.modify_object(identifier, &[(PASSWORD_ATTRIBUTE.to_owned(), vec![hashed])]).await
	}

	/// The search-tier base DN used as the add-tier default.
	fn search_tier_base(&self) -> String {
		self.config.base_dns.first().cloned().unwrap_or_default()
	}

	/// Override the add-tier base DN; an empty value restores the
	/// search-tier default.
	pub fn set_add_base_dn(&mut self, base_dn: &str) {
		self.config.add.base_dn =
			if base_dn.is_empty() { self.search_tier_base() } else { base_dn.to_owned() };
	}

	/// Override the add-tier bind DN; an empty value restores the
	/// administrative identity.
	pub fn set_add_dn(&mut self, dn: &str) {
		self.config.add.bind_dn =
			if dn.is_empty() { self.config.admin_dn.clone() } else { dn.to_owned() };
	}

	/// Override the add-tier bind password; an empty value restores the
	/// administrative password.
	pub fn set_add_password(&mut self, password: &str) {
		self.config.add.password = if password.is_empty() {
			self.config.admin_password.clone()
		} else {
			password.to_owned()
		};
	}

	/// Override the modify-tier base DN; an empty value restores the
	/// add-tier value.
	pub fn set_modify_base_dn(&mut self, base_dn: &str) {
		self.config.modify.base_dn =
			if base_dn.is_empty() { self.config.add.base_dn.clone() } else { base_dn.to_owned() };
	}

	/// Override the modify-tier bind DN; an empty value restores the
	/// add-tier value.
	pub fn set_modify_dn(&mut self, dn: &str) {
		self.config.modify.bind_dn =
			if dn.is_empty() { self.config.add.bind_dn.clone() } else { dn.to_owned() };
	}

	/// Override the modify-tier bind password; an empty value restores the
	/// add-tier value.
	pub fn set_modify_password(&mut self, password: &str) {
		self.config.modify.password =
			if password.is_empty() { self.config.add.password.clone() } else { password.to_owned() };
	}

	/// Set the modify trust mode from its configured label.
	pub fn set_modify_method(&mut self, label: &str) {
		self.config.modify_method = ModifyMethod::from_label(label);
	}
}
