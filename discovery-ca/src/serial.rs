use std::fmt;

use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ExternalError;
use crate::store::Store;
use crate::Error;

/// Length of the per-issuer salt in bytes
pub const SALT_LEN: usize = 32;

/// RFC 5280 limits serial numbers to 20 octets
const MAX_SERIAL_LEN: usize = 20;

/// A certificate serial number.
#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct SerialNumber {
	inner: Vec<u8>,
}

impl SerialNumber {
	/// Create a serial number from the given byte slice.
	pub fn from_slice(bytes: &[u8]) -> SerialNumber {
		let inner = bytes.to_vec();
		SerialNumber { inner }
	}

	/// Return the byte representation of the serial number.
	pub fn to_bytes(&self) -> Vec<u8> {
		self.inner.clone()
	}

	/// Return the length of the serial number in bytes.
	pub fn len(&self) -> usize {
		self.inner.len()
	}

	/// Whether the serial number has no bytes
	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	/// Lowercase hex without separators
	pub fn to_hex(&self) -> String {
		to_hex(&self.inner)
	}

	/// Parses the form produced by [`to_hex`](Self::to_hex)
	pub fn from_hex(s: &str) -> Result<Self, Error> {
		from_hex(s).map(SerialNumber::from)
	}
}

impl AsRef<[u8]> for SerialNumber {
	fn as_ref(&self) -> &[u8] {
		&self.inner
	}
}

impl fmt::Display for SerialNumber {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
		let hex: Vec<_> = self.inner.iter().map(|b| format!("{:02x}", b)).collect();
		write!(f, "{}", hex.join(":"))
	}
}

impl From<Vec<u8>> for SerialNumber {
	fn from(inner: Vec<u8>) -> SerialNumber {
		SerialNumber { inner }
	}
}

impl From<u64> for SerialNumber {
	fn from(u: u64) -> SerialNumber {
		let inner = u.to_be_bytes().into();
		SerialNumber { inner }
	}
}

impl Serialize for SerialNumber {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> Deserialize<'de> for SerialNumber {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		SerialNumber::from_hex(&s).map_err(serde::de::Error::custom)
	}
}

/// Derives the serial number of the `count`-th certificate of an issuer
///
/// The serial is the SHA-256 digest of the text `salt_hex` followed by the
/// decimal `count`, truncated to 20 octets with the top bit cleared so that
/// the DER INTEGER is positive and fits the RFC 5280 limit.
///
/// ```
/// # use discovery_ca::derive_serial;
/// let a = derive_serial("00ff", 0);
/// assert_eq!(a, derive_serial("00ff", 0));
/// assert_ne!(a, derive_serial("00ff", 1));
/// assert_eq!(a.len(), 20);
/// ```
pub fn derive_serial(salt_hex: &str, count: u64) -> SerialNumber {
	let text = format!("{}{}", salt_hex, count);
	let digest = digest::digest(&digest::SHA256, text.as_bytes());
	let mut sl = digest.as_ref()[0..MAX_SERIAL_LEN].to_vec();
	sl[0] &= 0x7f; // MSB must be 0 to ensure encoding bignum in 20 bytes
	SerialNumber::from(sl)
}

/// Produces serial numbers unique per issuer from a salt and the issued count kept in a [`Store`]
pub struct SerialNumberGenerator<'a> {
	store: &'a dyn Store,
	rng: SystemRandom,
}

impl<'a> SerialNumberGenerator<'a> {
	/// Creates a generator backed by `store`
	pub fn new(store: &'a dyn Store) -> Self {
		Self {
			store,
			rng: SystemRandom::new(),
		}
	}

	/// Returns the salt of `issuer`, creating and persisting one on first use
	pub fn salt(&self, issuer: &str) -> Result<String, Error> {
		let mut candidate = [0u8; SALT_LEN];
		self.rng.fill(&mut candidate)._err()?;
		self.store.salt_or_insert(issuer, &to_hex(&candidate))
	}

	/// The serial for the next certificate of `issuer`
	///
	/// Callers serialize issuance per issuer; two calls without an issuance
	/// in between return the same serial.
	pub fn next_serial(&self, issuer: &str) -> Result<SerialNumber, Error> {
		let salt = self.salt(issuer)?;
		let count = self.store.count_certificates(issuer)?;
		Ok(derive_serial(&salt, count))
	}
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
	bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub(crate) fn from_hex(s: &str) -> Result<Vec<u8>, Error> {
	if s.len() % 2 != 0 || !s.is_ascii() {
		return Err(Error::MalformedInput(format!("invalid hex string {:?}", s)));
	}
	(0..s.len())
		.step_by(2)
		.map(|i| {
			u8::from_str_radix(&s[i..i + 2], 16)
				.map_err(|_| Error::MalformedInput(format!("invalid hex string {:?}", s)))
		})
		.collect()
}

/// Serde support for byte fields kept as lowercase hex text
pub(crate) mod hex_bytes {
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&super::to_hex(bytes))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
		let s = String::deserialize(deserializer)?;
		super::from_hex(&s).map_err(serde::de::Error::custom)
	}
}
