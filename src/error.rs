//! Error codes

/// Errors that can occur when using this library.
///
/// Expected authentication outcomes are not errors: a failed bind, a search
/// without matches, or an add/modify refused by policy are reported as
/// `Ok(false)`/`Ok(None)` by the functions concerned. Only infrastructural
/// problems surface through this type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// A configuration value was malformed or unusable.
	#[error("Invalid configuration: {0}")]
	Invalid(String),
	/// An operation required a bound connection, but none was established.
	#[error("Not connected to the directory")]
	NotConnected,
	/// An I/O error occurred, e.g. while reading TLS certificate files.
	#[error(transparent)]
	Io(#[from] std::io::Error),
	/// An underlying protocol error or similar occurred, or the LDAP library
	/// was used incorrectly.
	#[error(transparent)]
	Ldap(#[from] ldap3::LdapError),
}
