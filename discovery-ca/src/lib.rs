/*!
Certificate authority and node directory for a closed network

This crate accepts PKCS#10 certificate signing requests, checks the identity
claims they carry and issues X.509 certificates signed by a configured CA key.
Every node certificate names the organization it belongs to as an otherName
in its subjectAltName, see [`PartyId`].

Besides issuance the crate publishes the network parameters and the network
map of registered nodes, both signed with the network map key, see
[`NodeDirectory`].

## Example

```
use discovery_ca::store::MemoryStore;
use discovery_ca::{CertificateService, Config, DistinguishedName, KeyPair, PartyId, RequestParams};
# fn main() -> Result<(), discovery_ca::Error> {
let service = CertificateService::with_store(Config::default(), Box::new(MemoryStore::new()));

let params = RequestParams {
	distinguished_name: DistinguishedName::parse("CN=node,O=Org,C=NL")?,
	organization_id: Some(PartyId::organization("12345")?),
	email: None,
};
let pem = params.serialize_pem(&KeyPair::generate()?)?;
let pending = service.submit(&pem)?;
assert_eq!(pending.subject, "CN=node,O=Org,C=NL");

let requests = service.list_pending_requests(&PartyId::organization("12345")?)?;
assert_eq!(requests.len(), 1);
# Ok(())
# }
```
*/
#![forbid(unsafe_code)]
#![forbid(non_ascii_idents)]
#![deny(missing_docs)]
#![allow(clippy::complexity, clippy::style, clippy::pedantic)]

pub use crate::certificate::{
	date_time_ymd, BasicConstraints, Certificate, CertificateParams, GeneralSubtree, IsCa,
	Issuer, KeyUsagePurpose, NameConstraints, SanType,
};
pub use crate::config::{Config, ConfigDefaults, LogType};
pub use crate::csr::{CertificateSigningRequest, PublicKey, RequestParams, RequestedName};
pub use crate::directory::{
	hash_hex, NetworkMap, NetworkParameters, NodeDirectory, NodeEntry, NotaryInfo, SignedPayload,
	MAX_MESSAGE_SIZE, MAX_TRANSACTION_SIZE, MIN_PLATFORM_VERSION,
};
pub use crate::dn::{DistinguishedName, DnType, DnValue};
pub use crate::error::Error;
pub use crate::issuer::{CertificateIssuer, IssuancePolicy, SigningCa};
pub use crate::key_pair::{KeyPair, PublicKeyData};
pub use crate::material::MaterialProvider;
pub use crate::party_id::PartyId;
pub use crate::serial::{derive_serial, SerialNumber, SerialNumberGenerator, SALT_LEN};
pub use crate::service::{CertificateService, CertificateWithChain};
pub use crate::sign_algo::algo::*;
pub use crate::sign_algo::SignatureAlgorithm;

mod certificate;
pub mod chain;
mod config;
mod csr;
mod directory;
mod dn;
mod error;
mod issuer;
mod key_pair;
mod material;
pub mod oid;
mod party_id;
mod serial;
mod service;
mod sign_algo;
pub mod store;

const ENCODE_CONFIG: pem::EncodeConfig = {
	let line_ending = match cfg!(target_family = "windows") {
		true => pem::LineEnding::CRLF,
		false => pem::LineEnding::LF,
	};
	pem::EncodeConfig::new().set_line_ending(line_ending)
};
