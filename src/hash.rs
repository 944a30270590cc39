//! Salted SHA-1 password hashing in the directory's `{SSHA}` storage format.
//!
//! The encoding is the conventional one for `userPassword` values: the
//! scheme tag followed by base64 of the digest with the salt appended. Salts
//! are drawn from the operating system's CSPRNG, so hashing the same
//! plaintext twice yields two different strings that both verify.
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha1::{Digest, Sha1};

/// Scheme tag directory servers use to recognize salted SHA-1 values.
const SCHEME: &str = "{SSHA}";
/// Number of random salt bytes appended to the digest.
const SALT_LENGTH: usize = 4;
/// Length of a SHA-1 digest.
const DIGEST_LENGTH: usize = 20;

/// Hash a plaintext secret for storage in the directory.
///
/// Generates a fresh salt on every call.
#[must_use]
pub fn hash(plaintext: &str) -> String {
	let mut salt = [0_u8; SALT_LENGTH];
	OsRng.fill_bytes(&mut salt);
	hash_with_salt(plaintext, &salt)
}

/// Hash a plaintext secret with the given salt.
fn hash_with_salt(plaintext: &str, salt: &[u8]) -> String {
	let mut hasher = Sha1::new();
	hasher.update(plaintext.as_bytes());
	hasher.update(salt);
	let mut buffer = hasher.finalize().to_vec();
	buffer.extend_from_slice(salt);
	format!("{SCHEME}{}", STANDARD.encode(buffer))
}

/// Check a plaintext secret against a stored `{SSHA}` value.
///
/// Returns `false` for values that do not carry the scheme tag or do not
/// decode; a malformed stored hash is a failed verification, not an error.
#[must_use]
pub fn verify(plaintext: &str, stored: &str) -> bool {
	let Some(encoded) = strip_scheme(stored) else {
		return false;
	};
	let Ok(decoded) = STANDARD.decode(encoded) else {
		return false;
	};
	if decoded.len() < DIGEST_LENGTH {
		return false;
	}
	let (digest, salt) = decoded.split_at(DIGEST_LENGTH);
	let mut hasher = Sha1::new();
	hasher.update(plaintext.as_bytes());
	hasher.update(salt);
	hasher.finalize().as_slice() == digest
}

/// Strip the scheme tag, matching it case-insensitively.
fn strip_scheme(stored: &str) -> Option<&str> {
	if stored.len() < SCHEME.len() || !stored.is_char_boundary(SCHEME.len()) {
		return None;
	}
	let (tag, rest) = stored.split_at(SCHEME.len());
	tag.eq_ignore_ascii_case(SCHEME).then_some(rest)
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use base64::{engine::general_purpose::STANDARD, Engine as _};

	use super::{hash, verify, SALT_LENGTH, SCHEME};

	#[test]
	fn fresh_salt_every_call() {
		let first = hash("correct horse battery staple");
		let second = hash("correct horse battery staple");
		assert_ne!(first, second, "Each call must draw a fresh salt");
		assert!(verify("correct horse battery staple", &first));
		assert!(verify("correct horse battery staple", &second));
	}

	#[test]
	fn format() {
		let hashed = hash("secret");
		assert!(hashed.starts_with(SCHEME));
		let decoded = STANDARD.decode(&hashed[SCHEME.len()..]).unwrap();
		assert_eq!(decoded.len(), 20 + SALT_LENGTH);
	}

	#[test]
	fn wrong_password_fails() {
		let hashed = hash("secret");
		assert!(!verify("Secret", &hashed));
		assert!(!verify("", &hashed));
	}

	#[test]
	fn scheme_tag_is_case_insensitive() {
		let hashed = hash("secret");
		let lower = format!("{{ssha}}{}", &hashed[SCHEME.len()..]);
		assert!(verify("secret", &lower));
	}

	#[test]
	fn malformed_values_do_not_verify() {
		assert!(!verify("secret", ""));
		assert!(!verify("secret", "secret"));
		assert!(!verify("secret", "{SSHA}"));
		assert!(!verify("secret", "{SSHA}****"));
		assert!(!verify("secret", "{SSHA}AAAA"));
	}
}
