//! Authenticate users against an LDAP directory and reconcile them with a
//! local account store.
//!
//! The library binds a presented identity (login name or mail address, plus
//! an optional password) against a directory server, trying each configured
//! candidate subtree in order, then maps the directory-confirmed identity
//! onto a local principal record, optionally returning a transient record
//! for identities the local store does not hold yet, so the caller can
//! provision them. Subtree-scoped add and modify operations (including
//! salted password hashing) maintain directory entries, and a small
//! masquerade facility lets a resolved principal temporarily act as another
//! one.
//!
//! For a general primer on LDAP, the [introduction] in the `ldap3` crate
//! which is used here for interfacing with LDAP is an excellent resource.
//! The site "firstyear's blog-a-log" also has [a guide][firstyear] which is
//! more visually oriented and goes into more detail about searching
//!
//! [introduction]: https://github.com/inejge/ldap3/blob/master/LDAP-primer.md
//! [firstyear]: https://fy.blackhats.net.au/blog/html/pages/ldap_guide_part_1_foundations.html
//!
//! # Getting started
//! A minimal authentication flow might look like so:
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use ldap_auth::{DirectoryHandler, Settings};
//! use url::Url;
//!
//! // Configuration can also be deserialized with serde. It's hand-constructed
//! // here for demonstration purposes.
//! let mut settings = Settings::new(Url::parse("ldap://localhost")?);
//! settings.base_dn = "ou=people|ou=staff".to_owned();
//! settings.overlay_dn = "dc=example,dc=com".to_owned();
//! settings.admin_dn = "cn=admin,dc=example,dc=com".to_owned();
//! settings.admin_password = "verysecret".to_owned();
//!
//! let mut handler = settings.build()?;
//! if !handler.connect(Some("alice"), Some("password")).await? {
//!     // Report exactly this, whatever the cause: which step rejected the
//!     // login must not be observable from the outside.
//!     println!("invalid username or password");
//!     return Ok(());
//! }
//!
//! let results = handler.search_by_auth("alice").await?;
//! if let Some(mail) = DirectoryHandler::get_attribute_from_results(&results, "mail") {
//!     println!("authenticated: {mail}");
//! }
//! handler.unbind().await;
//! # Ok(())
//! # }
//! ```
//!
//! The results of `search_by_auth` feed
//! [`IdentityReconciler::resolve`](reconcile::IdentityReconciler::resolve),
//! which performs the local-store lookup and synthesis.
//!
//! # Limitations
//! * A handler serves one logical operation at a time; callers needing
//!   concurrency use one handler instance per flow, there is no pooling.
//! * [secrecy](https://docs.rs/secrecy) is not used for storing the
//!   configured bind passwords, it probably should be

pub mod config;
pub mod directory;
pub mod entry;
pub mod error;
pub mod factory;
pub mod hash;
pub mod masquerade;
pub mod reconcile;

pub use ldap3::{self, SearchEntry};

pub use crate::{
	config::{AttributeConfig, Config, ConnectionConfig, ModifyMethod, TierCredentials},
	directory::DirectoryHandler,
	entry::SearchEntryExt,
	error::Error,
	factory::Settings,
	masquerade::{MasqueradeManager, MasqueradeSession, MemorySession},
	reconcile::{
		IdentityReconciler, PrincipalRecord, PrincipalStore, ReconcilePolicy, SearchAttributes,
	},
};
