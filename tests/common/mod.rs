use std::{collections::HashSet, error::Error};

use ldap3::LdapConnAsync;

pub async fn ldap_connect() -> Result<ldap3::Ldap, Box<dyn Error>> {
	let (conn, mut ldap) = LdapConnAsync::new("ldap://localhost:1389").await?;
	let _handle = tokio::spawn(async move {
		if let Err(err) = conn.drive().await {
			panic!("Ldap connection error {err}");
		}
	});
	ldap.simple_bind("cn=admin,dc=example,dc=org", "adminpassword").await?.success()?;
	Ok(ldap)
}

pub async fn ldap_add_organizational_unit(
	ldap: &mut ldap3::Ldap,
	ou: &str,
) -> Result<(), Box<dyn Error>> {
	ldap.add(
		&format!("ou={},dc=example,dc=org", ou),
		vec![("objectClass", ["organizationalUnit"].into())],
	)
	.await?
	.success()?;
	Ok(())
}

pub async fn ldap_delete_organizational_unit(
	ldap: &mut ldap3::Ldap,
	ou: &str,
) -> Result<(), Box<dyn Error>> {
	ldap.delete(&format!("ou={},dc=example,dc=org", ou)).await?.success()?;
	Ok(())
}

/// Create an inetOrgPerson under the given ou. The extensibleObject class is
/// included so tests can attach attributes like mailLocalAddress without the
/// server having the corresponding auxiliary schema loaded.
pub async fn ldap_add_user(
	ldap: &mut ldap3::Ldap,
	ou: &str,
	uid: &str,
	attrs: &[(&str, &str)],
) -> Result<(), Box<dyn Error>> {
	let mut entry: Vec<(&str, HashSet<&str>)> = vec![
		("objectClass", ["inetOrgPerson", "extensibleObject"].into()),
		("uid", [uid].into()),
		("cn", [uid].into()),
		("sn", [uid].into()),
	];
	for (name, value) in attrs {
		entry.push((name, [*value].into()));
	}
	ldap.add(&format!("uid={},ou={},dc=example,dc=org", uid, ou), entry).await?.success()?;
	Ok(())
}

pub async fn ldap_delete_user(
	ldap: &mut ldap3::Ldap,
	ou: &str,
	uid: &str,
) -> Result<(), Box<dyn Error>> {
	ldap.delete(&format!("uid={},ou={},dc=example,dc=org", uid, ou)).await?.success()?;
	Ok(())
}

/// Remove an organizational unit and any users the test left in it.
pub async fn ldap_clear_organizational_unit(ldap: &mut ldap3::Ldap, ou: &str) {
	let Ok(result) = ldap
		.search(
			&format!("ou={},dc=example,dc=org", ou),
			ldap3::Scope::OneLevel,
			"(objectClass=*)",
			vec!["1.1"],
		)
		.await
	else {
		return;
	};
	for entry in result.0 {
		let entry = ldap3::SearchEntry::construct(entry);
		let _ = ldap.delete(&entry.dn).await;
	}
	let _ = ldap.delete(&format!("ou={},dc=example,dc=org", ou)).await;
}
