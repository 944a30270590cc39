//! Helper methods for extracting data from search results.
use ldap3::SearchEntry;

/// An extension trait for [`SearchEntry`] that provides convenience methods for
/// extracting data.
pub trait SearchEntryExt {
	/// Get the first value of an attribute. Will return `None` if the
	/// attribute is not present.
	fn attr_first(&self, attr: &str) -> Option<&str>;

	/// Get the first value of an attribute, matching the attribute name
	/// case-insensitively. Directory attribute names are case-insensitive by
	/// definition, while the maps in [`SearchEntry`] preserve whichever
	/// spelling the server returned.
	fn attr_first_ci(&self, attr: &str) -> Option<&str>;
}

impl SearchEntryExt for SearchEntry {
	fn attr_first(&self, attr: &str) -> Option<&str> {
		let attr = self.attrs.get(attr)?;
		attr.first().map(String::as_str)
	}

	fn attr_first_ci(&self, attr: &str) -> Option<&str> {
		if let Some(values) = self.attrs.get(attr) {
			return values.first().map(String::as_str);
		}
		self.attrs
			.iter()
			.find(|(name, _)| name.eq_ignore_ascii_case(attr))
			.and_then(|(_, values)| values.first())
			.map(String::as_str)
	}
}
