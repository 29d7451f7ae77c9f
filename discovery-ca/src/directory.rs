//! The node directory: registered nodes, the shared network parameters and
//! the network map, each handed out signed with the network map key.
//!
//! Peers check a [`SignedPayload`] with the certificate it carries, so the
//! transport does not need to be trusted.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use log::{debug, error, info};
use ring::{digest, signature};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use x509_parser::parse_x509_certificate;

use crate::error::ExternalError;
use crate::serial::{hex_bytes, to_hex};
use crate::store::{pem_certificate, write_json_atomic};
use crate::{Config, Error, KeyPair, MaterialProvider, SignatureAlgorithm};

/// Lowest platform version nodes must run
pub const MIN_PLATFORM_VERSION: u32 = 4;
/// Largest message peers accept, in bytes
pub const MAX_MESSAGE_SIZE: u32 = 10 * 1024 * 1024;
/// Largest transaction peers accept, in bytes
pub const MAX_TRANSACTION_SIZE: u32 = 10 * 1024 * 1024;

const CONTRACT_PACKAGE: &str = "nl.nuts.consent.contract";
const SCHEMA_PACKAGE: &str = "nl.nuts.consent.schema";
const FLOW_PACKAGE: &str = "nl.nuts.consent.flow";

const DIRECTORY_FILE: &str = "node-directory.json";

/// Hex encoded SHA-256 of `bytes`
pub fn hash_hex(bytes: &[u8]) -> String {
	to_hex(digest::digest(&digest::SHA256, bytes).as_ref())
}

//------------ SignedPayload -------------------------------------------------

/// Serialized bytes with a signature and the certificate of the signing key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPayload {
	/// The signed bytes
	#[serde(with = "hex_bytes")]
	pub raw: Vec<u8>,
	/// The signature over `raw`
	#[serde(with = "hex_bytes")]
	pub signature: Vec<u8>,
	/// Dotted identifier of the signature algorithm
	pub algorithm: String,
	/// Certificate of the signing key, in DER
	#[serde(with = "pem_certificate")]
	pub certificate: Vec<u8>,
}

impl SignedPayload {
	/// Signs `raw` with `key`, attaching `certificate`
	pub fn sign(raw: Vec<u8>, key: &KeyPair, certificate: &[u8]) -> Result<Self, Error> {
		let signature = key.sign(&raw)?;
		Ok(Self {
			raw,
			signature,
			algorithm: key.algorithm().oid(),
			certificate: certificate.to_vec(),
		})
	}

	/// Serializes `value` as JSON and signs it
	pub fn sign_json<T: Serialize>(
		value: &T,
		key: &KeyPair,
		certificate: &[u8],
	) -> Result<Self, Error> {
		let raw = serde_json::to_vec(value)._err()?;
		Self::sign(raw, key, certificate)
	}

	/// Checks the signature with the public key of the embedded certificate
	pub fn verify(&self) -> Result<(), Error> {
		let components = self
			.algorithm
			.split('.')
			.map(|arc| arc.parse::<u64>())
			.collect::<Result<Vec<_>, _>>()
			.map_err(|_| {
				Error::MalformedInput(format!("invalid algorithm identifier {}", self.algorithm))
			})?;
		let alg = SignatureAlgorithm::from_oid(&components)?;
		let (_, cert) = parse_x509_certificate(&self.certificate)._err()?;
		let public_key = signature::UnparsedPublicKey::new(
			alg.verify_alg,
			cert.public_key().subject_public_key.data.as_ref(),
		);
		public_key
			.verify(&self.raw, &self.signature)
			.map_err(|_| Error::InvalidSignature)
	}

	/// Hex encoded SHA-256 of the signed bytes, identifying the payload
	pub fn hash(&self) -> String {
		hash_hex(&self.raw)
	}

	/// Verifies the signature and deserializes the payload from JSON
	pub fn verified<T: DeserializeOwned>(&self) -> Result<T, Error> {
		self.verify()?;
		serde_json::from_slice(&self.raw)
			.map_err(|e| Error::MalformedInput(format!("invalid payload: {}", e)))
	}
}

//------------ NetworkParameters ---------------------------------------------

/// A notary announced in the network parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotaryInfo {
	/// Name of the notary node
	pub name: String,
	/// Whether the notary validates transactions
	pub validating: bool,
}

/// The parameters every node of the network runs with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParameters {
	/// Increased whenever the parameters change
	pub epoch: u64,
	#[allow(missing_docs)]
	pub min_platform_version: u32,
	#[allow(missing_docs)]
	pub max_message_size: u32,
	#[allow(missing_docs)]
	pub max_transaction_size: u32,
	/// When the parameters last changed
	#[serde(with = "time::serde::rfc3339")]
	pub modified_time: OffsetDateTime,
	/// The notaries of the network, in registration order
	pub notaries: Vec<NotaryInfo>,
	/// Attachment hashes allowed per package
	pub whitelisted_contract_implementations: BTreeMap<String, Vec<String>>,
}

impl NetworkParameters {
	/// First parameters of a network without notaries
	pub fn initial(config: &Config) -> Self {
		Self {
			epoch: 1,
			min_platform_version: MIN_PLATFORM_VERSION,
			max_message_size: MAX_MESSAGE_SIZE,
			max_transaction_size: MAX_TRANSACTION_SIZE,
			modified_time: now(),
			notaries: Vec::new(),
			whitelisted_contract_implementations: whitelist(config),
		}
	}
}

fn whitelist(config: &Config) -> BTreeMap<String, Vec<String>> {
	fn non_blank(hashes: &[String]) -> Vec<String> {
		hashes
			.iter()
			.map(|h| h.trim())
			.filter(|h| !h.is_empty())
			.map(str::to_string)
			.collect()
	}

	let contracts = non_blank(&config.contract_hashes);
	let mut wci = BTreeMap::new();
	wci.insert(CONTRACT_PACKAGE.to_string(), contracts.clone());
	wci.insert(SCHEMA_PACKAGE.to_string(), contracts);
	wci.insert(FLOW_PACKAGE.to_string(), non_blank(&config.flow_hashes));
	wci
}

fn now() -> OffsetDateTime {
	let now = OffsetDateTime::now_utc();
	now.replace_nanosecond(0).unwrap_or(now)
}

//------------ NodeEntry -----------------------------------------------------

/// A node published to the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
	/// The legal name of the node
	pub name: String,
	/// Whether the node acts as notary
	pub notary: bool,
	/// The node info as published
	#[serde(with = "hex_bytes")]
	pub raw: Vec<u8>,
	/// Hex encoded SHA-256 of `raw`
	pub hash: String,
}

impl NodeEntry {
	/// An entry for `raw` published under `name`
	///
	/// Nodes whose name contains `notary` are registered as notary.
	pub fn new(name: impl Into<String>, raw: Vec<u8>) -> Self {
		let name = name.into();
		Self {
			notary: name.contains("notary"),
			hash: hash_hex(&raw),
			name,
			raw,
		}
	}
}

//------------ NetworkMap ----------------------------------------------------

/// The list of published nodes together with the parameters they must use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMap {
	/// Hashes of all published node infos
	pub node_info_hashes: Vec<String>,
	/// Hash of the signed network parameters
	pub network_parameter_hash: String,
}

//------------ NodeDirectory -------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DirectoryState {
	nodes: Vec<NodeEntry>,
	parameters: NetworkParameters,
}

/// Registered nodes and the current network parameters
///
/// With a data directory configured the state is kept on disk and replaced
/// atomically on every change.
#[derive(Debug)]
pub struct NodeDirectory {
	material: MaterialProvider,
	path: Option<PathBuf>,
	state: Mutex<DirectoryState>,
}

impl NodeDirectory {
	/// Opens the directory configured in `config`
	pub fn open(config: &Config) -> Result<Self, Error> {
		let material = MaterialProvider::new(config);
		let path = match &config.data_dir {
			Some(dir) => {
				fs::create_dir_all(dir)._err()?;
				Some(dir.join(DIRECTORY_FILE))
			},
			None => None,
		};
		let state = match &path {
			Some(path) => match fs::read(path) {
				Ok(bytes) => Some(serde_json::from_slice::<DirectoryState>(&bytes)._err()?),
				Err(e) if e.kind() == io::ErrorKind::NotFound => None,
				Err(e) => {
					error!("Cannot read {}: {}", path.display(), e);
					return Err(Error::Storage(format!("cannot read the node directory: {}", e)));
				},
			},
			None => None,
		};
		let state = match state {
			Some(state) => state,
			None => {
				let state = DirectoryState {
					nodes: Vec::new(),
					parameters: NetworkParameters::initial(config),
				};
				if let Some(path) = &path {
					write_json_atomic(path, &state)?;
				}
				state
			},
		};
		Ok(Self {
			material,
			path,
			state: Mutex::new(state),
		})
	}

	fn state(&self) -> Result<MutexGuard<'_, DirectoryState>, Error> {
		self.state
			.lock()
			.map_err(|_| Error::Storage("node directory lock poisoned".into()))
	}

	/// Adds `node`, replacing an earlier entry of the same name, and returns its hash
	///
	/// A notary not yet known is added to the network parameters, which then
	/// move to a new epoch.
	pub fn register(&self, node: NodeEntry) -> Result<String, Error> {
		let mut state = self.state()?;
		let mut next = state.clone();
		let hash = node.hash.clone();

		if node.notary && !next.parameters.notaries.iter().any(|n| n.name == node.name) {
			next.parameters.notaries.push(NotaryInfo {
				name: node.name.clone(),
				validating: false,
			});
			next.parameters.epoch += 1;
			next.parameters.modified_time = now();
			info!(
				"Notary {} added, network parameters now at epoch {}",
				node.name, next.parameters.epoch
			);
		}
		match next.nodes.iter_mut().find(|n| n.name == node.name) {
			Some(existing) => *existing = node,
			None => next.nodes.push(node),
		}

		if let Some(path) = &self.path {
			write_json_atomic(path, &next)?;
		}
		*state = next;
		debug!("Registered node info {}", hash);
		Ok(hash)
	}

	/// All registered nodes, in registration order
	pub fn nodes(&self) -> Result<Vec<NodeEntry>, Error> {
		Ok(self.state()?.nodes.clone())
	}

	/// The node whose info hashes to `hash`
	pub fn node(&self, hash: &str) -> Result<Option<NodeEntry>, Error> {
		Ok(self
			.state()?
			.nodes
			.iter()
			.find(|n| n.hash.eq_ignore_ascii_case(hash))
			.cloned())
	}

	/// The current parameters, unsigned
	pub fn network_parameters(&self) -> Result<NetworkParameters, Error> {
		Ok(self.state()?.parameters.clone())
	}

	/// The current parameters, signed with the network map key
	pub fn signed_network_parameters(&self) -> Result<SignedPayload, Error> {
		let parameters = self.network_parameters()?;
		self.sign(&parameters)
	}

	/// The hashes of all nodes and of the current parameters, signed with the network map key
	pub fn network_map(&self) -> Result<SignedPayload, Error> {
		let (hashes, parameters) = {
			let state = self.state()?;
			let hashes = state.nodes.iter().map(|n| n.hash.clone()).collect();
			(hashes, state.parameters.clone())
		};
		let map = NetworkMap {
			node_info_hashes: hashes,
			network_parameter_hash: self.sign(&parameters)?.hash(),
		};
		self.sign(&map)
	}

	fn sign<T: Serialize>(&self, value: &T) -> Result<SignedPayload, Error> {
		let key = self.material.network_map_key()?;
		let certificate = self.material.network_map_certificate()?;
		SignedPayload::sign_json(value, &key, &certificate)
	}
}

#[cfg(test)]
mod tests {
	use assert_fs::prelude::*;
	use assert_fs::TempDir;

	use super::*;
	use crate::{CertificateParams, DnType, PKCS_ED25519};

	fn config(dir: &TempDir, key: &KeyPair) -> Config {
		let mut params = CertificateParams::default();
		params
			.distinguished_name
			.push(DnType::CommonName, "Network Map");
		let cert = params.self_signed(key).unwrap();
		dir.child("nm.pem").write_str(&cert.pem()).unwrap();
		dir.child("nm-key.pem")
			.write_str(&key.serialize_pem())
			.unwrap();
		Config {
			network_map_cert_path: dir.path().join("nm.pem"),
			network_map_key_path: dir.path().join("nm-key.pem"),
			contract_hashes: vec!["AB12".into(), " ".into()],
			flow_hashes: vec!["CD34".into()],
			..Config::default()
		}
	}

	#[test]
	fn signed_parameters_verify() {
		let dir = TempDir::new().unwrap();
		let key = KeyPair::generate().unwrap();
		let directory = NodeDirectory::open(&config(&dir, &key)).unwrap();

		let signed = directory.signed_network_parameters().unwrap();
		assert_eq!(signed.algorithm, "1.2.840.10045.4.3.2");
		let params: NetworkParameters = signed.verified().unwrap();
		assert_eq!(params.epoch, 1);
		assert_eq!(params.min_platform_version, 4);
		assert_eq!(params.max_message_size, 10_485_760);
		assert_eq!(
			params.whitelisted_contract_implementations[CONTRACT_PACKAGE],
			vec!["AB12".to_string()]
		);
		assert_eq!(
			params.whitelisted_contract_implementations[SCHEMA_PACKAGE],
			vec!["AB12".to_string()]
		);
		assert_eq!(
			params.whitelisted_contract_implementations[FLOW_PACKAGE],
			vec!["CD34".to_string()]
		);
	}

	#[test]
	fn tampered_payload_is_rejected() {
		let dir = TempDir::new().unwrap();
		let key = KeyPair::generate_for(&PKCS_ED25519).unwrap();
		let directory = NodeDirectory::open(&config(&dir, &key)).unwrap();

		let mut signed = directory.network_map().unwrap();
		signed.verify().unwrap();
		signed.raw.push(b' ');
		assert_eq!(signed.verify(), Err(Error::InvalidSignature));

		signed.algorithm = "1.2.3".into();
		assert!(signed.verify().is_err());
	}

	#[test]
	fn notary_moves_epoch() {
		let dir = TempDir::new().unwrap();
		let key = KeyPair::generate().unwrap();
		let directory = NodeDirectory::open(&config(&dir, &key)).unwrap();

		let node = NodeEntry::new("O=Org,L=Town,C=NL", b"node info".to_vec());
		assert!(!node.notary);
		let hash = directory.register(node.clone()).unwrap();
		assert_eq!(hash, hash_hex(b"node info"));
		assert_eq!(directory.network_parameters().unwrap().epoch, 1);

		let notary = NodeEntry::new("O=notary,L=Town,C=NL", b"notary info".to_vec());
		directory.register(notary.clone()).unwrap();
		let params = directory.network_parameters().unwrap();
		assert_eq!(params.epoch, 2);
		assert_eq!(params.notaries.len(), 1);
		assert!(!params.notaries[0].validating);

		// republishing replaces the entry and leaves the parameters alone
		directory
			.register(NodeEntry::new("O=notary,L=Town,C=NL", b"notary info 2".to_vec()))
			.unwrap();
		assert_eq!(directory.network_parameters().unwrap().epoch, 2);
		assert_eq!(directory.nodes().unwrap().len(), 2);
		assert_eq!(directory.node(&notary.hash).unwrap(), None);
		assert_eq!(directory.node(&hash).unwrap(), Some(node));
	}

	#[test]
	fn network_map_lists_hashes() {
		let dir = TempDir::new().unwrap();
		let key = KeyPair::generate().unwrap();
		let directory = NodeDirectory::open(&config(&dir, &key)).unwrap();
		let hash = directory
			.register(NodeEntry::new("O=Org,L=Town,C=NL", vec![1, 2, 3]))
			.unwrap();

		let map: NetworkMap = directory.network_map().unwrap().verified().unwrap();
		assert_eq!(map.node_info_hashes, vec![hash]);
		assert_eq!(
			map.network_parameter_hash,
			directory.signed_network_parameters().unwrap().hash()
		);
	}

	#[test]
	fn persisted_in_data_dir() {
		let dir = TempDir::new().unwrap();
		let key = KeyPair::generate().unwrap();
		let mut config = config(&dir, &key);
		config.data_dir = Some(dir.path().join("data"));
		{
			let directory = NodeDirectory::open(&config).unwrap();
			directory
				.register(NodeEntry::new("O=notary,C=NL", vec![9]))
				.unwrap();
		}
		let text = fs::read_to_string(dir.path().join("data").join(DIRECTORY_FILE)).unwrap();
		assert!(text.contains("O=notary,C=NL"));

		let directory = NodeDirectory::open(&config).unwrap();
		assert_eq!(directory.nodes().unwrap().len(), 1);
		assert_eq!(directory.network_parameters().unwrap().epoch, 2);
	}

	#[test]
	fn missing_key_is_reported() {
		let directory = NodeDirectory::open(&Config {
			network_map_key_path: "missing-key.pem".into(),
			..Config::default()
		})
		.unwrap();
		assert!(matches!(
			directory.network_map(),
			Err(Error::ResourceNotFound(_))
		));
	}
}
