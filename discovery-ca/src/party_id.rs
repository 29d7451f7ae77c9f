use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{oid, Error};

/// A typed identifier of the form `urn:oid:<oid>:<value>`
///
/// Node certificates carry the organization they belong to as a [`PartyId`]
/// under the [`oid::ORGANIZATION_ID`] object identifier.
///
/// ```
/// # use discovery_ca::PartyId;
/// let party: PartyId = "urn:oid:1.3.6.1.4.1.54851.4:1".parse().unwrap();
/// assert_eq!(party.oid(), "1.3.6.1.4.1.54851.4");
/// assert_eq!(party.value(), "1");
/// assert_eq!(party.to_string(), "urn:oid:1.3.6.1.4.1.54851.4:1");
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct PartyId {
	oid: String,
	value: String,
}

impl PartyId {
	/// Creates an identifier from a dotted OID and a value
	pub fn new(oid: impl Into<String>, value: impl Into<String>) -> Result<Self, Error> {
		let oid = oid.into();
		let value = value.into();
		if !is_dotted_oid(&oid) {
			return Err(Error::MalformedInput(format!("invalid oid in party id: {}", oid)));
		}
		if value.is_empty() || value.contains(':') {
			return Err(Error::MalformedInput(format!(
				"invalid value in party id: {:?}",
				value
			)));
		}
		Ok(Self { oid, value })
	}

	/// An organization identifier, the kind embedded in node certificates
	pub fn organization(value: impl Into<String>) -> Result<Self, Error> {
		Self::new(dotted(oid::ORGANIZATION_ID), value)
	}

	/// The dotted object identifier part
	pub fn oid(&self) -> &str {
		&self.oid
	}

	/// The value part
	pub fn value(&self) -> &str {
		&self.value
	}

	/// Whether the identifier is typed with the given OID
	pub(crate) fn has_oid(&self, components: &[u64]) -> bool {
		self.oid == dotted(components)
	}

	pub(crate) fn oid_components(&self) -> Vec<u64> {
		// validated in `new`
		self.oid.split('.').filter_map(|arc| arc.parse().ok()).collect()
	}
}

pub(crate) fn dotted(components: &[u64]) -> String {
	components
		.iter()
		.map(|c| c.to_string())
		.collect::<Vec<_>>()
		.join(".")
}

fn is_dotted_oid(s: &str) -> bool {
	let mut arcs = 0;
	for arc in s.split('.') {
		if arc.is_empty() || !arc.bytes().all(|b| b.is_ascii_digit()) || arc.parse::<u64>().is_err()
		{
			return false;
		}
		arcs += 1;
	}
	arcs >= 2
}

impl FromStr for PartyId {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let parts = s.split(':').collect::<Vec<_>>();
		match parts.as_slice() {
			["urn", "oid", oid, value] => Self::new(*oid, *value),
			_ => Err(Error::MalformedInput(format!(
				"party id must be of the form urn:oid:<oid>:<value>, got {:?}",
				s
			))),
		}
	}
}

impl fmt::Display for PartyId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "urn:oid:{}:{}", self.oid, self.value)
	}
}

impl Serialize for PartyId {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for PartyId {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		PartyId::from_str(&s).map_err(serde::de::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_and_format() {
		let party = PartyId::from_str("urn:oid:1.3.6.1.4.1.54851.4:00000001").unwrap();
		assert_eq!(party.oid(), "1.3.6.1.4.1.54851.4");
		assert_eq!(party.value(), "00000001");
		assert!(party.has_oid(oid::ORGANIZATION_ID));
		assert_eq!(party.oid_components(), oid::ORGANIZATION_ID);
		assert_eq!(party.to_string(), "urn:oid:1.3.6.1.4.1.54851.4:00000001");
	}

	#[test]
	fn organization_helper() {
		let party = PartyId::organization("1").unwrap();
		assert_eq!(party.to_string(), "urn:oid:1.3.6.1.4.1.54851.4:1");
	}

	#[test]
	fn rejects_malformed() {
		for s in [
			"",
			"urn:oid:1.2.3",
			"urn:uuid:1.2.3:a",
			"urn:oid:1..3:a",
			"urn:oid:abc:a",
			"urn:oid:1.2.3:",
			"urn:oid:1.2.3:a:b",
			"urn:oid:1.99999999999999999999999:a",
			"oid:urn:1.2.3:a",
		] {
			let err = PartyId::from_str(s).unwrap_err();
			assert!(matches!(err, Error::MalformedInput(_)), "{:?}", s);
		}
	}

	#[test]
	fn serde_as_string() {
		let party = PartyId::organization("42").unwrap();
		let json = serde_json::to_string(&party).unwrap();
		assert_eq!(json, "\"urn:oid:1.3.6.1.4.1.54851.4:42\"");
		let back: PartyId = serde_json::from_str(&json).unwrap();
		assert_eq!(back, party);
	}
}
