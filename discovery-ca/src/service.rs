//! The operations offered to callers of the certificate authority

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::store::{DiskStore, IssuedCertificate, MemoryStore, NewRequest, PendingRequest, RequestId, Store};
use crate::{
	chain, CertificateIssuer, CertificateSigningRequest, Config, Error, IssuancePolicy,
	MaterialProvider, PartyId, SigningCa,
};

/// A certificate as handed out to its organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateWithChain {
	/// The certificate in PEM
	pub certificate_pem: String,
	/// The CA and root certificates in PEM, as they were at issuance
	pub chain: Vec<String>,
}

/// Accepts requests and issues certificates for them
///
/// Issuance under one CA is serialized: the lock of the issuer is held from
/// computing the serial until the certificate is committed.
pub struct CertificateService {
	config: Config,
	material: MaterialProvider,
	store: Box<dyn Store>,
	issuer_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CertificateService {
	/// Creates the service with the store selected by `config`
	///
	/// Requests and certificates are kept below `data_dir` when it is set,
	/// in memory otherwise.
	pub fn from_config(config: Config) -> Result<Self, Error> {
		let store: Box<dyn Store> = match &config.data_dir {
			Some(dir) => Box::new(DiskStore::open(dir)?),
			None => Box::new(MemoryStore::new()),
		};
		Ok(Self::with_store(config, store))
	}

	/// Creates the service on top of `store`
	pub fn with_store(config: Config, store: Box<dyn Store>) -> Self {
		Self {
			material: MaterialProvider::new(&config),
			config,
			store,
			issuer_locks: Mutex::new(HashMap::new()),
		}
	}

	/// The configuration the service runs with
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// The provider of the CA material
	pub fn material(&self) -> &MaterialProvider {
		&self.material
	}

	/// Describes every problem with the configured material, see
	/// [`MaterialProvider::validate_configuration`]
	pub fn validate(&self) -> Vec<String> {
		self.material.validate_configuration()
	}

	/// Validates and stores a PEM encoded request
	///
	/// The request must parse, carry a valid self-signature and name an
	/// organization, checked in that order. With `auto_ack` configured the
	/// certificate is issued right away and an issuance failure is returned
	/// while the request stays pending.
	pub fn submit(&self, pem: &str) -> Result<PendingRequest, Error> {
		let csr = CertificateSigningRequest::parse(pem)?;
		if !csr.verify_self_signature() {
			warn!(
				"Rejected request for {} with an invalid signature",
				csr.subject()
			);
			return Err(Error::InvalidSignature);
		}
		let organization_id = csr.organization_id()?;

		let pending = self.store.insert_request(NewRequest {
			subject: csr.subject().to_string(),
			organization_id,
			pem: pem.to_string(),
			submitted_at: OffsetDateTime::now_utc(),
		})?;
		info!(
			"Received request {} for {}, organization {}",
			pending.id, pending.subject, pending.organization_id
		);

		if self.config.auto_ack {
			self.approve(pending.id)?;
		}
		Ok(pending)
	}

	/// The pending requests of `party`
	pub fn list_pending_requests(&self, party: &PartyId) -> Result<Vec<PendingRequest>, Error> {
		self.store.requests_by_organization(party)
	}

	/// The certificates issued to `party`, each with its chain
	pub fn list_certificates(&self, party: &PartyId) -> Result<Vec<CertificateWithChain>, Error> {
		self.store
			.certificates_by_organization(party)?
			.iter()
			.map(|cert| {
				Ok(CertificateWithChain {
					certificate_pem: cert.pem(),
					chain: chain::split(&cert.chain)?,
				})
			})
			.collect()
	}

	/// Issues the certificate for a pending request
	pub fn approve(&self, id: RequestId) -> Result<IssuedCertificate, Error> {
		if self.store.request(id)?.is_none() {
			return Err(Error::NotFound(format!("request {}", id)));
		}

		let ca = SigningCa::load(&self.material)?;
		let lock = self.issuer_lock(&ca.name());
		// a panic during an earlier issuance left no partial state behind, the
		// store commits atomically
		let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

		// approved by someone else while waiting for the lock
		let pending = self
			.store
			.request(id)?
			.ok_or_else(|| Error::NotFound(format!("request {}", id)))?;
		CertificateIssuer::new(self.store.as_ref(), IssuancePolicy::from_config(&self.config))
			.issue(&ca, &pending)
	}

	fn issuer_lock(&self, issuer: &str) -> Arc<Mutex<()>> {
		let mut locks = self
			.issuer_locks
			.lock()
			.unwrap_or_else(PoisonError::into_inner);
		locks.entry(issuer.to_string()).or_default().clone()
	}
}

#[cfg(test)]
mod tests {
	use assert_fs::prelude::*;
	use assert_fs::TempDir;

	use super::*;
	use crate::{
		BasicConstraints, CertificateParams, DistinguishedName, IsCa, Issuer, KeyPair,
		RequestParams,
	};

	fn service(dir: &TempDir) -> CertificateService {
		let root_key = KeyPair::generate().unwrap();
		let mut root_params = CertificateParams::default();
		root_params.distinguished_name = DistinguishedName::parse("CN=Root,C=NL").unwrap();
		root_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
		let root = root_params.self_signed(&root_key).unwrap();

		let ca_key = KeyPair::generate().unwrap();
		let mut ca_params = CertificateParams::default();
		ca_params.distinguished_name = DistinguishedName::parse("CN=Doorman,C=NL").unwrap();
		ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
		let ca = ca_params
			.signed_by(&ca_key, &Issuer::from_params(&root_params, &root_key))
			.unwrap();

		dir.child("root.pem").write_str(&root.pem()).unwrap();
		dir.child("ca.pem").write_str(&ca.pem()).unwrap();
		dir.child("ca-key.pem")
			.write_str(&ca_key.serialize_pem())
			.unwrap();
		let config = Config {
			root_cert_path: dir.path().join("root.pem"),
			ca_cert_path: dir.path().join("ca.pem"),
			ca_key_path: dir.path().join("ca-key.pem"),
			..Config::default()
		};
		CertificateService::with_store(config, Box::new(MemoryStore::new()))
	}

	fn submit(service: &CertificateService) -> PendingRequest {
		let params = RequestParams {
			distinguished_name: DistinguishedName::parse("CN=node,O=Org,C=NL").unwrap(),
			organization_id: Some(PartyId::organization("1").unwrap()),
			email: None,
		};
		let pem = params.serialize_pem(&KeyPair::generate().unwrap()).unwrap();
		service.submit(&pem).unwrap()
	}

	#[test]
	fn approval_recovers_from_a_panicked_issuance() {
		let dir = TempDir::new().unwrap();
		let service = service(&dir);
		let pending = submit(&service);

		let lock = service.issuer_lock("CN=Doorman,C=NL");
		let panicked = std::thread::spawn(move || {
			let _guard = lock.lock().unwrap();
			panic!("issuance failed");
		})
		.join();
		assert!(panicked.is_err());
		assert!(service.issuer_lock("CN=Doorman,C=NL").is_poisoned());

		let issued = service.approve(pending.id).unwrap();
		assert_eq!(issued.issuer, "CN=Doorman,C=NL");
		assert_eq!(service.store.request(pending.id).unwrap(), None);
	}

	#[test]
	fn same_issuer_shares_a_lock() {
		let dir = TempDir::new().unwrap();
		let service = service(&dir);
		let first = service.issuer_lock("CN=a");
		assert!(Arc::ptr_eq(&first, &service.issuer_lock("CN=a")));
		assert!(!Arc::ptr_eq(&first, &service.issuer_lock("CN=b")));
	}

	#[test]
	fn unknown_request_is_not_found() {
		let dir = TempDir::new().unwrap();
		let service = service(&dir);
		assert!(matches!(
			service.approve(RequestId(99)),
			Err(Error::NotFound(_))
		));
	}
}
