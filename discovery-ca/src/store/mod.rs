//! Persistence of pending requests, issued certificates and per-issuer serial state
//!
//! The [`Store`] trait is the boundary the service works against. Two backends
//! exist: [`MemoryStore`] for tests and ephemeral use, and [`DiskStore`] which
//! keeps everything in one JSON document that is replaced atomically.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, PartyId, SerialNumber};

mod disk;
mod memory;

pub use disk::DiskStore;
pub(crate) use disk::write_json_atomic;
pub use memory::MemoryStore;

/// Identifier of a pending request, assigned by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for RequestId {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		s.parse()
			.map(RequestId)
			.map_err(|_| Error::MalformedInput(format!("invalid request id {:?}", s)))
	}
}

/// A validated request, as handed to [`Store::insert_request`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequest {
	/// Rendered subject of the request
	pub subject: String,
	/// Organization the request was made for
	pub organization_id: PartyId,
	/// The submitted PEM text, verbatim
	pub pem: String,
	/// Submission time
	pub submitted_at: OffsetDateTime,
}

/// A request waiting for approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
	/// Store assigned identifier
	pub id: RequestId,
	/// Rendered subject of the request
	pub subject: String,
	/// Organization the request was made for
	pub organization_id: PartyId,
	/// The submitted PEM text, verbatim
	pub pem: String,
	/// Submission time
	#[serde(with = "time::serde::rfc3339")]
	pub submitted_at: OffsetDateTime,
}

/// A certificate issued by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCertificate {
	/// Serial number, unique per issuer
	pub serial: SerialNumber,
	/// Rendered subject of the certificate
	pub subject: String,
	/// Rendered subject of the issuing CA certificate
	pub issuer: String,
	/// Organization the certificate was issued to
	pub organization_id: PartyId,
	/// The certificate
	#[serde(with = "pem_certificate")]
	pub der: Vec<u8>,
	/// PEM of the CA certificate followed by the root certificate, as configured at issuance
	pub chain: String,
	/// Issuance time
	#[serde(with = "time::serde::rfc3339")]
	pub issued_at: OffsetDateTime,
}

impl IssuedCertificate {
	/// The certificate in PEM
	pub fn pem(&self) -> String {
		crate::chain::encode_certificate(&self.der)
	}
}

/// The salt of an issuer, created once and never changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaSerialState {
	/// Rendered subject of the issuing CA certificate
	pub issuer: String,
	/// Hex encoded random salt
	pub salt: String,
}

/// The persistence boundary of the service
///
/// Implementations must make [`salt_or_insert`](Store::salt_or_insert) and
/// [`commit_issuance`](Store::commit_issuance) atomic.
pub trait Store: Send + Sync {
	/// Stores a new pending request and assigns its identifier
	fn insert_request(&self, request: NewRequest) -> Result<PendingRequest, Error>;

	/// Looks up a pending request
	fn request(&self, id: RequestId) -> Result<Option<PendingRequest>, Error>;

	/// All pending requests of an organization, oldest first
	fn requests_by_organization(&self, party: &PartyId) -> Result<Vec<PendingRequest>, Error>;

	/// All certificates issued to an organization, oldest first
	fn certificates_by_organization(&self, party: &PartyId)
		-> Result<Vec<IssuedCertificate>, Error>;

	/// Number of certificates issued under `issuer`
	fn count_certificates(&self, issuer: &str) -> Result<u64, Error>;

	/// Returns the salt of `issuer`, storing `candidate` when there is none yet
	fn salt_or_insert(&self, issuer: &str, candidate: &str) -> Result<String, Error>;

	/// Inserts `certificate` and deletes the request `request_id` as one step
	///
	/// Fails with [`Error::NotFound`] and changes nothing when the request is gone.
	fn commit_issuance(
		&self,
		certificate: IssuedCertificate,
		request_id: RequestId,
	) -> Result<(), Error>;
}

/// The whole content of a store, shared by the backends
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct State {
	next_id: u64,
	requests: BTreeMap<RequestId, PendingRequest>,
	certificates: Vec<IssuedCertificate>,
	salts: HashMap<String, CaSerialState>,
}

impl State {
	fn insert_request(&mut self, request: NewRequest) -> PendingRequest {
		self.next_id += 1;
		let pending = PendingRequest {
			id: RequestId(self.next_id),
			subject: request.subject,
			organization_id: request.organization_id,
			pem: request.pem,
			submitted_at: request.submitted_at,
		};
		self.requests.insert(pending.id, pending.clone());
		pending
	}

	fn request(&self, id: RequestId) -> Option<PendingRequest> {
		self.requests.get(&id).cloned()
	}

	fn requests_by_organization(&self, party: &PartyId) -> Vec<PendingRequest> {
		self.requests
			.values()
			.filter(|r| &r.organization_id == party)
			.cloned()
			.collect()
	}

	fn certificates_by_organization(&self, party: &PartyId) -> Vec<IssuedCertificate> {
		self.certificates
			.iter()
			.filter(|c| &c.organization_id == party)
			.cloned()
			.collect()
	}

	fn count_certificates(&self, issuer: &str) -> u64 {
		self.certificates.iter().filter(|c| c.issuer == issuer).count() as u64
	}

	/// Returns the salt of `issuer`, inserting `candidate` when there is none
	fn salt_or_insert(&mut self, issuer: &str, candidate: &str) -> String {
		if let Some(state) = self.salts.get(issuer) {
			return state.salt.clone();
		}
		self.salts.insert(
			issuer.to_string(),
			CaSerialState {
				issuer: issuer.to_string(),
				salt: candidate.to_string(),
			},
		);
		candidate.to_string()
	}

	fn commit_issuance(
		&mut self,
		certificate: IssuedCertificate,
		request_id: RequestId,
	) -> Result<(), Error> {
		if self.requests.remove(&request_id).is_none() {
			return Err(Error::NotFound(format!("request {}", request_id)));
		}
		self.certificates.push(certificate);
		Ok(())
	}
}

pub(crate) mod pem_certificate {
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(der: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&crate::chain::encode_certificate(der))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
		let s = String::deserialize(deserializer)?;
		pem::parse(&s)
			.map(pem::Pem::into_contents)
			.map_err(serde::de::Error::custom)
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;

	pub(crate) fn new_request(org: &str) -> NewRequest {
		NewRequest {
			subject: "CN=test,O=test,C=NL".into(),
			organization_id: PartyId::organization(org).unwrap(),
			pem: "-----BEGIN CERTIFICATE REQUEST-----\n-----END CERTIFICATE REQUEST-----\n".into(),
			submitted_at: OffsetDateTime::UNIX_EPOCH,
		}
	}

	pub(crate) fn issued(org: &str, issuer: &str, serial: u64) -> IssuedCertificate {
		IssuedCertificate {
			serial: SerialNumber::from(serial),
			subject: "CN=test,O=test,C=NL".into(),
			issuer: issuer.into(),
			organization_id: PartyId::organization(org).unwrap(),
			der: vec![0x30, 0x03, 0x02, 0x01, 0x01],
			chain: String::new(),
			issued_at: OffsetDateTime::UNIX_EPOCH,
		}
	}

	/// Behaviour every backend must show
	pub(crate) fn exercise(store: &dyn Store) {
		let first = store.insert_request(new_request("1")).unwrap();
		let second = store.insert_request(new_request("1")).unwrap();
		let other = store.insert_request(new_request("2")).unwrap();
		assert_ne!(first.id, second.id);

		let party = PartyId::organization("1").unwrap();
		assert_eq!(store.request(first.id).unwrap(), Some(first.clone()));
		assert_eq!(
			store.requests_by_organization(&party).unwrap(),
			vec![first.clone(), second.clone()]
		);

		store
			.commit_issuance(issued("1", "CN=ca", 1), first.id)
			.unwrap();
		assert_eq!(store.request(first.id).unwrap(), None);
		assert_eq!(store.count_certificates("CN=ca").unwrap(), 1);
		assert_eq!(store.count_certificates("CN=other").unwrap(), 0);

		// the request is gone, nothing changes
		let err = store
			.commit_issuance(issued("1", "CN=ca", 2), first.id)
			.unwrap_err();
		assert!(matches!(err, Error::NotFound(_)));
		assert_eq!(store.count_certificates("CN=ca").unwrap(), 1);
		assert_eq!(store.certificates_by_organization(&party).unwrap().len(), 1);
		assert_eq!(
			store
				.requests_by_organization(&PartyId::organization("2").unwrap())
				.unwrap(),
			vec![other]
		);

		assert_eq!(store.salt_or_insert("CN=ca", "aa").unwrap(), "aa");
		assert_eq!(store.salt_or_insert("CN=ca", "bb").unwrap(), "aa");
		assert_eq!(store.salt_or_insert("CN=ca2", "bb").unwrap(), "bb");
	}

	#[test]
	fn request_id_parse() {
		assert_eq!("12".parse::<RequestId>().unwrap(), RequestId(12));
		assert!("x".parse::<RequestId>().is_err());
	}

	#[test]
	fn certificate_serializes_as_pem() {
		let cert = issued("1", "CN=ca", 7);
		let json = serde_json::to_value(&cert).unwrap();
		assert!(json["der"]
			.as_str()
			.unwrap()
			.starts_with("-----BEGIN CERTIFICATE-----"));
		assert_eq!(json["serial"], "0000000000000007");
		assert_eq!(json["issued_at"], "1970-01-01T00:00:00Z");
		let back: IssuedCertificate = serde_json::from_value(json).unwrap();
		assert_eq!(back, cert);
	}
}
