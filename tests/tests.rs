#![allow(
	clippy::dbg_macro,
	clippy::expect_used,
	clippy::missing_docs_in_private_items,
	clippy::print_stderr,
	clippy::print_stdout,
	clippy::unwrap_used,
	clippy::bool_assert_comparison
)]
use std::error::Error;

use ldap_auth::{DirectoryHandler, Settings};
use serial_test::serial;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};
use url::Url;

mod common;

use common::{
	ldap_add_organizational_unit, ldap_add_user, ldap_clear_organizational_unit, ldap_connect,
	ldap_delete_user,
};

fn test_settings() -> Settings {
	let mut settings = Settings::new(Url::parse("ldap://localhost:1389").unwrap());
	settings.base_dn =
		"ou=usersA,dc=example,dc=org|ou=usersB,dc=example,dc=org".to_owned();
	settings.admin_dn = "cn=admin,dc=example,dc=org".to_owned();
	settings.admin_password = "adminpassword".to_owned();
	settings
}

async fn setup_units(ldap: &mut ldap3::Ldap) -> Result<(), Box<dyn Error>> {
	ldap_clear_organizational_unit(ldap, "usersA").await;
	ldap_clear_organizational_unit(ldap, "usersB").await;
	ldap_add_organizational_unit(ldap, "usersA").await?;
	ldap_add_organizational_unit(ldap, "usersB").await?;
	Ok(())
}

#[tokio::test]
async fn self_mode_modify_requires_a_bound_connection() {
	// no server needed: the contract violation is caught before any network
	// round-trip
	let mut handler = test_settings().build().unwrap();
	let outcome = handler
		.modify_object("eve", &[("sn".to_owned(), vec!["Everson".to_owned()])])
		.await;
	assert!(matches!(outcome, Err(ldap_auth::Error::NotConnected)));
}

#[ignore = "docker"]
#[tokio::test]
#[serial]
async fn connect_falls_back_across_candidate_subtrees() -> Result<(), Box<dyn Error>> {
	let tracing_filter = EnvFilter::default().add_directive(LevelFilter::DEBUG.into());
	tracing_subscriber::fmt().with_env_filter(tracing_filter).init();

	let mut ldap = ldap_connect().await?;
	setup_units(&mut ldap).await?;

	// alice exists only in the second candidate subtree; the first bind
	// attempt (ou=usersA) must fail and fall through to ou=usersB
	ldap_add_user(&mut ldap, "usersB", "alice", &[("userPassword", "alicepw")]).await?;

	let mut handler = test_settings().build()?;
	assert!(handler.connect(Some("alice"), Some("alicepw")).await?);
	handler.unbind().await;

	let mut handler = test_settings().build()?;
	assert_eq!(handler.connect(Some("alice"), Some("wrongpw")).await?, false);

	ldap_delete_user(&mut ldap, "usersB", "alice").await?;
	ldap.unbind().await?;
	Ok(())
}

#[ignore = "docker"]
#[tokio::test]
#[serial]
async fn empty_password_substitutes_the_admin_bind() -> Result<(), Box<dyn Error>> {
	let mut settings = test_settings();
	settings.allow_empty_password = true;

	// bob has no directory entry at all; the bind must go through as admin
	let mut handler = settings.build()?;
	assert!(handler.connect(Some("bob"), Some("")).await?);
	handler.unbind().await;

	// with the substitution disabled, the unauthenticated bind must not
	// yield a usable login
	let mut handler = test_settings().build()?;
	let connected = handler.connect(Some("bob"), Some("")).await;
	if let Ok(true) = connected {
		panic!("anonymous fallback must not report success for a user bind");
	}
	Ok(())
}

#[ignore = "docker"]
#[tokio::test]
#[serial]
async fn search_by_auth_returns_first_non_empty_candidate() -> Result<(), Box<dyn Error>> {
	let mut ldap = ldap_connect().await?;
	setup_units(&mut ldap).await?;
	ldap_add_user(
		&mut ldap,
		"usersB",
		"carol",
		&[("mail", "carol@example.com"), ("employeeNumber", "1007")],
	)
	.await?;

	let mut handler = test_settings().build()?;
	assert!(handler.connect(None, None).await?, "administrative bind should succeed");

	let results = handler.search_by_auth("carol@example.com").await?;
	assert!(DirectoryHandler::is_valid_result(&results));
	let dn = DirectoryHandler::get_attribute_from_results(&results, "dn").unwrap();
	assert!(dn.contains("ou=usersB"), "match must come from the subtree that has the entry");
	assert_eq!(DirectoryHandler::get_attribute_from_results(&results, "uid"), Some("carol"));
	assert_eq!(
		DirectoryHandler::get_attribute_from_results(&results, "employeenumber"),
		Some("1007"),
		"attribute extraction is case-insensitive"
	);

	// searching by login name goes through the same compound filter
	let results = handler.search_by_auth("carol").await?;
	assert!(DirectoryHandler::is_valid_result(&results));

	// the single-shot searches are scoped to the primary base only
	let results = handler.search_by_email("carol@example.com").await?;
	assert_eq!(
		DirectoryHandler::is_valid_result(&results),
		false,
		"carol lives in the second subtree; no fallback here"
	);
	let results = handler.search_by_query("(uid=carol)").await?;
	assert_eq!(DirectoryHandler::is_valid_result(&results), false);

	// no match anywhere is an empty result, not an error
	let results = handler.search_by_auth("nobody@example.com").await?;
	assert_eq!(DirectoryHandler::is_valid_result(&results), false);

	handler.unbind().await;
	ldap_delete_user(&mut ldap, "usersB", "carol").await?;
	ldap.unbind().await?;
	Ok(())
}

#[ignore = "docker"]
#[tokio::test]
#[serial]
async fn add_object_never_overwrites() -> Result<(), Box<dyn Error>> {
	let mut ldap = ldap_connect().await?;
	setup_units(&mut ldap).await?;

	let attrs = vec![
		("objectClass".to_owned(), vec!["inetOrgPerson".to_owned()]),
		("uid".to_owned(), vec!["dave".to_owned()]),
		("cn".to_owned(), vec!["dave".to_owned()]),
		("sn".to_owned(), vec!["Dawson".to_owned()]),
	];

	// the add tier inherits the first search base and the admin credentials
	let mut handler = test_settings().build()?;
	assert!(handler.add_object("dave", &attrs).await?);
	assert_eq!(
		handler.add_object("dave", &attrs).await?,
		false,
		"adding over an existing node must be refused"
	);

	ldap_delete_user(&mut ldap, "usersA", "dave").await?;
	ldap.unbind().await?;
	Ok(())
}

#[ignore = "docker"]
#[tokio::test]
#[serial]
async fn modify_object_replaces_and_attaches_attributes() -> Result<(), Box<dyn Error>> {
	let mut ldap = ldap_connect().await?;
	setup_units(&mut ldap).await?;
	ldap_add_user(&mut ldap, "usersA", "eve", &[]).await?;

	let mut settings = test_settings();
	settings.modify_method = "admin".to_owned();
	let mut handler = settings.build()?;

	// a missing node is refused, not created
	assert_eq!(
		handler
			.modify_object("ghost", &[("sn".to_owned(), vec!["Ghost".to_owned()])])
			.await?,
		false
	);

	// sn exists on the entry (replace), displayName does not (attach)
	assert!(
		handler
			.modify_object(
				"eve",
				&[
					("sn".to_owned(), vec!["Everson".to_owned()]),
					("displayName".to_owned(), vec!["Eve Everson".to_owned()]),
				],
			)
			.await?
	);

	assert!(handler.connect(None, None).await?);
	let results = handler.search_by_uid("eve").await?;
	assert_eq!(DirectoryHandler::get_attribute_from_results(&results, "sn"), Some("Everson"));
	assert_eq!(
		DirectoryHandler::get_attribute_from_results(&results, "displayName"),
		Some("Eve Everson")
	);
	handler.unbind().await;

	ldap_delete_user(&mut ldap, "usersA", "eve").await?;
	ldap.unbind().await?;
	Ok(())
}

#[ignore = "docker"]
#[tokio::test]
#[serial]
async fn password_modification_round_trips_through_a_bind() -> Result<(), Box<dyn Error>> {
	let mut ldap = ldap_connect().await?;
	setup_units(&mut ldap).await?;
	ldap_add_user(&mut ldap, "usersA", "frank", &[("userPassword", "oldpw")]).await?;

	let mut settings = test_settings();
	settings.modify_method = "admin".to_owned();
	let mut handler = settings.build()?;
	assert!(handler.modify_object_password("frank", "franknewpw").await?);

	// the server must accept the stored salted hash for a fresh user bind
	let mut handler = test_settings().build()?;
	assert!(handler.connect(Some("frank"), Some("franknewpw")).await?);
	handler.unbind().await;

	let mut handler = test_settings().build()?;
	assert_eq!(handler.connect(Some("frank"), Some("oldpw")).await?, false);

	ldap_delete_user(&mut ldap, "usersA", "frank").await?;
	ldap.unbind().await?;
	Ok(())
}

#[ignore = "docker"]
#[tokio::test]
#[serial]
async fn self_mode_modification_reuses_the_callers_bind() -> Result<(), Box<dyn Error>> {
	let mut ldap = ldap_connect().await?;
	setup_units(&mut ldap).await?;
	ldap_add_user(&mut ldap, "usersA", "grace", &[("userPassword", "gracepw")]).await?;

	let mut handler = test_settings().build()?;
	assert!(
		handler.connect_by_dn("uid=grace,ou=usersA,dc=example,dc=org", "gracepw").await?
	);
	// no rebind happens here; the modification runs as grace herself
	assert!(
		handler
			.modify_object(
				"grace",
				&[("displayName".to_owned(), vec!["Grace H.".to_owned()])],
			)
			.await?
	);
	handler.unbind().await;

	ldap_delete_user(&mut ldap, "usersA", "grace").await?;
	ldap.unbind().await?;
	Ok(())
}
