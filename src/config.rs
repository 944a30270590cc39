//! Config for the directory handler.
use std::{path::PathBuf, sync::Arc, time::Duration};

use ldap3::LdapConnSettings;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Directory configuration, fully resolved.
///
/// The credential tiers (`add`, `modify`) hold their effective values,
/// computed once when the configuration is built; there is no lazy fallback
/// at call time. Instances are normally produced by
/// [`Settings::build`](crate::factory::Settings::build) and are immutable
/// for the lifetime of a handler except through the handler's explicit
/// setters.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Config {
	/// The URL to connect to the server with. Supports ldap, ldaps, and ldapi
	/// schemes
	pub url: Url,
	/// Connection settings.
	pub connection: ConnectionConfig,
	/// LDAP protocol version. Retained for interface completeness; the
	/// transport always negotiates version 3 and other values are rejected
	/// when the configuration is built.
	pub version: u8,
	/// Ordered candidate base DNs for binds and searches. Entries may be
	/// empty, in which case the overlay alone scopes the operation.
	pub base_dns: Vec<String>,
	/// Logical root spliced onto every DN this handler constructs.
	pub overlay_dn: Option<String>,
	/// DN of the administrative bind identity.
	pub admin_dn: String,
	/// Password of the administrative bind identity.
	pub admin_password: String,
	/// Substitute the admin identity when a caller supplies no password,
	/// instead of attempting an unauthenticated bind.
	pub allow_empty_password: bool,
	/// Names of attributes to search for and extract data from
	pub attributes: AttributeConfig,
	/// Custom compound filter template for authentication searches. Every
	/// `%s` is replaced with the (escaped) value being searched for. When
	/// unset, a disjunction over the username, mail and mail-alias
	/// attributes is used.
	pub auth_query: Option<String>,
	/// Effective credentials for add operations.
	pub add: TierCredentials,
	/// Effective credentials for modify operations.
	pub modify: TierCredentials,
	/// Trust model for modify operations.
	pub modify_method: ModifyMethod,
}

/// Configuration for how to connect to the LDAP server
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionConfig {
	/// Timeout to establish a connection in seconds.
	pub timeout: u64,

	/// TLS config
	pub tls: TLSConfig,
}

impl Default for ConnectionConfig {
	fn default() -> Self {
		ConnectionConfig { timeout: 10, tls: TLSConfig::default() }
	}
}

/// TLS Configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TLSConfig {
	/// Use StartTLS extended operation for establishing a secure connection,
	/// rather than TLS on a dedicated port.
	#[serde(default)]
	pub starttls: bool,

	/// Disable verification of TLS certificates
	#[serde(default)]
	pub no_tls_verify: bool,

	/// TLS root certificates path
	#[serde(default)]
	pub root_certificates_path: Option<PathBuf>,

	/// Path of the TLS client key to use for the connection
	#[serde(default)]
	pub client_key_path: Option<PathBuf>,

	/// Path of the TLS client certificate to use for the connection
	#[serde(default)]
	pub client_certificate_path: Option<PathBuf>,
}

/// Names of the directory attributes relevant to authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeConfig {
	/// The attribute holding the identifier records are stored under in the
	/// local account store.
	#[serde(default = "default_user_id_attribute")]
	pub user_id: String,
	/// The attribute holding the login name; also the naming attribute used
	/// when DNs are synthesized.
	#[serde(default = "default_username_attribute")]
	pub username: String,
	/// The attribute holding the primary mail address.
	#[serde(default = "default_mail_attribute")]
	pub mail: String,
	/// The multi-valued attribute holding mail aliases.
	#[serde(default = "default_mail_array_attribute")]
	pub mail_array: String,
}

/// Default name of the local-identifier attribute.
fn default_user_id_attribute() -> String {
	"employeeNumber".to_owned()
}

/// Default name of the login-name attribute.
fn default_username_attribute() -> String {
	"uid".to_owned()
}

/// Default name of the mail attribute.
fn default_mail_attribute() -> String {
	"mail".to_owned()
}

/// Default name of the mail-alias attribute.
fn default_mail_array_attribute() -> String {
	"mailLocalAddress".to_owned()
}

impl Default for AttributeConfig {
	fn default() -> Self {
		AttributeConfig {
			user_id: default_user_id_attribute(),
			username: default_username_attribute(),
			mail: default_mail_attribute(),
			mail_array: default_mail_array_attribute(),
		}
	}
}

/// Credentials scoping one tier of mutating operations.
///
/// Values are already cascaded: an add tier left unconfigured carries the
/// search-tier values, a modify tier left unconfigured carries the add-tier
/// values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierCredentials {
	/// Base DN mutated object DNs are synthesized under.
	pub base_dn: String,
	/// DN to bind with for operations in this tier.
	pub bind_dn: String,
	/// Password to bind with for operations in this tier.
	pub password: String,
}

/// Trust model for modify operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifyMethod {
	/// The acting identity was already bound by the caller; modifications
	/// run on that connection without a rebind.
	#[serde(rename = "self")]
	SelfBind,
	/// Bind with the modify-tier administrative credentials before
	/// modifying.
	#[serde(rename = "admin")]
	Admin,
}

impl ModifyMethod {
	/// Parse a configured label. Anything but the literal `"admin"`
	/// normalizes to [`ModifyMethod::SelfBind`], the less privileged trust
	/// mode.
	#[must_use]
	pub fn from_label(label: &str) -> Self {
		if label == "admin" {
			ModifyMethod::Admin
		} else {
			ModifyMethod::SelfBind
		}
	}
}

impl Default for ModifyMethod {
	fn default() -> Self {
		ModifyMethod::SelfBind
	}
}

impl ConnectionConfig {
	/// Create a [`LdapConnSettings`] based on this [`ConnectionConfig`]
	pub(crate) async fn to_settings(&self) -> Result<LdapConnSettings, Error> {
		let mut settings = LdapConnSettings::new();

		settings = settings.set_conn_timeout(Duration::from_secs(self.timeout));
		settings = settings.set_starttls(self.tls.starttls);
		settings = settings.set_no_tls_verify(self.tls.no_tls_verify);

		if let Some(path) = &self.tls.root_certificates_path {
			let mut roots = rustls::RootCertStore::empty();
			let pem = tokio::fs::read(path).await?;
			let certificates = rustls_pemfile::certs(&mut pem.as_slice())?;
			let (added, _) = roots.add_parsable_certificates(&certificates);
			if added == 0 {
				return Err(Error::Invalid("Could not read root certificate".to_owned()));
			}
			let builder =
				rustls::ClientConfig::builder().with_safe_defaults().with_root_certificates(roots);

			let config = match (&self.tls.client_key_path, &self.tls.client_certificate_path) {
				(Some(key_path), Some(cert_path)) => {
					let certs: Vec<rustls::Certificate> =
						rustls_pemfile::certs(&mut tokio::fs::read(cert_path).await?.as_slice())?
							.into_iter()
							.map(rustls::Certificate)
							.collect();
					let mut keys = rustls_pemfile::pkcs8_private_keys(
						&mut tokio::fs::read(key_path).await?.as_slice(),
					)?;
					let key = keys.pop().ok_or_else(|| {
						Error::Invalid("Could not read client certificates".to_owned())
					})?;
					builder.with_client_auth_cert(certs, rustls::PrivateKey(key)).map_err(|_| {
						Error::Invalid("Could not read client certificates".to_owned())
					})?
				}
				(None, None) => builder.with_no_client_auth(),
				_ => Err(Error::Invalid(
					"Both a client certificate and key file in PKCS8 format must be specified"
						.to_owned(),
				))?,
			};
			settings = settings.set_config(Arc::new(config));
		}
		Ok(settings)
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used, clippy::expect_used)]

	use std::{io::ErrorKind, path::PathBuf};

	use super::{ConnectionConfig, ModifyMethod, TLSConfig};
	use crate::error::Error;

	#[test]
	fn modify_method_normalizes_to_self() {
		assert_eq!(ModifyMethod::from_label("admin"), ModifyMethod::Admin);
		assert_eq!(ModifyMethod::from_label("self"), ModifyMethod::SelfBind);
		assert_eq!(ModifyMethod::from_label("Admin"), ModifyMethod::SelfBind);
		assert_eq!(ModifyMethod::from_label(""), ModifyMethod::SelfBind);
		assert_eq!(ModifyMethod::from_label("root"), ModifyMethod::SelfBind);
	}

	#[tokio::test]
	async fn tls_config_rejects_bad_certificates() {
		// not a PEM file
		assert!(matches!(
			ConnectionConfig {
				tls: TLSConfig {
					root_certificates_path: Some(PathBuf::from("src/config.rs")),
					..TLSConfig::default()
				},
				..ConnectionConfig::default()
			}
			.to_settings()
			.await
			.err()
			.unwrap(),
			Error::Invalid(_)
		));

		// nonexistent file
		assert!(matches!(
			ConnectionConfig {
				tls: TLSConfig {
					root_certificates_path: Some(PathBuf::from("invalid_path")),
					..TLSConfig::default()
				},
				..ConnectionConfig::default()
			}
			.to_settings()
			.await
			.err()
			.unwrap(),
			Error::Io(io_err) if io_err.kind() == ErrorKind::NotFound
		));
	}
}
