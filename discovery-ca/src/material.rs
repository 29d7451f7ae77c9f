//! Loading of the configured certificates and keys
//!
//! Nothing is cached: every call reads from disk again, so replaced files are
//! picked up by the next issuance.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::ExternalError;
use crate::{Config, Error, Issuer, KeyPair};

/// Resolves and loads the PEM files the service signs with
#[derive(Debug, Clone)]
pub struct MaterialProvider {
	root_cert_path: PathBuf,
	ca_cert_path: PathBuf,
	ca_key_path: PathBuf,
	network_map_cert_path: PathBuf,
	network_map_key_path: PathBuf,
	resource_dirs: Vec<PathBuf>,
}

impl MaterialProvider {
	/// Uses the paths and resource directories of `config`
	pub fn new(config: &Config) -> Self {
		Self {
			root_cert_path: config.root_cert_path.clone(),
			ca_cert_path: config.ca_cert_path.clone(),
			ca_key_path: config.ca_key_path.clone(),
			network_map_cert_path: config.network_map_cert_path.clone(),
			network_map_key_path: config.network_map_key_path.clone(),
			resource_dirs: config.resource_dirs.clone(),
		}
	}

	/// Finds `path` on the filesystem, or else below one of the resource directories
	///
	/// The error does not name the path, it is logged instead.
	pub fn resolve(&self, path: &Path) -> Result<PathBuf, Error> {
		if path.is_file() {
			return Ok(path.to_path_buf());
		}
		for dir in &self.resource_dirs {
			let candidate = dir.join(path);
			if candidate.is_file() {
				debug!("Resolved {} to {}", path.display(), candidate.display());
				return Ok(candidate);
			}
		}
		warn!(
			"{} not found, searched {} resource directories",
			path.display(),
			self.resource_dirs.len()
		);
		Err(Error::ResourceNotFound("resource not found".into()))
	}

	fn read(&self, path: &Path) -> Result<String, Error> {
		let resolved = self.resolve(path)?;
		fs::read_to_string(&resolved)._err()
	}

	/// Loads the first certificate of the PEM file at `path`, as DER
	pub fn load_certificate(&self, path: &Path) -> Result<Vec<u8>, Error> {
		let text = self.read(path)?;
		let block = pem::parse(&text)._err()?;
		if block.tag() != "CERTIFICATE" {
			warn!("{} holds a {} block", path.display(), block.tag());
			return Err(Error::MalformedInput(format!(
				"expected a CERTIFICATE block, found {}",
				block.tag()
			)));
		}
		let der = block.into_contents();
		x509_parser::parse_x509_certificate(&der)._err()?;
		Ok(der)
	}

	/// Loads the PKCS#8 PEM private key at `path`
	pub fn load_private_key(&self, path: &Path) -> Result<KeyPair, Error> {
		let text = self.read(path)?;
		KeyPair::from_pem(&text)
	}

	/// The trust root
	pub fn root_certificate(&self) -> Result<Vec<u8>, Error> {
		named("root certificate", self.load_certificate(&self.root_cert_path))
	}

	/// The certificate of the issuing CA
	pub fn ca_certificate(&self) -> Result<Vec<u8>, Error> {
		named("CA certificate", self.load_certificate(&self.ca_cert_path))
	}

	/// The key of the issuing CA
	pub fn ca_key(&self) -> Result<KeyPair, Error> {
		named("CA key", self.load_private_key(&self.ca_key_path))
	}

	/// The certificate embedded in signed directory payloads
	pub fn network_map_certificate(&self) -> Result<Vec<u8>, Error> {
		named(
			"network map certificate",
			self.load_certificate(&self.network_map_cert_path),
		)
	}

	/// The key signing directory payloads
	pub fn network_map_key(&self) -> Result<KeyPair, Error> {
		named("network map key", self.load_private_key(&self.network_map_key_path))
	}

	/// Loads all configured material and describes every problem found
	///
	/// An empty list means the service can issue and sign.
	pub fn validate_configuration(&self) -> Vec<String> {
		fn check<T>(messages: &mut Vec<String>, what: &str, res: Result<T, Error>) -> Option<T> {
			match res {
				Ok(v) => Some(v),
				Err(e) => {
					messages.push(format!("Failed to load {}, cause: {}", what, e));
					None
				},
			}
		}

		let mut messages = Vec::new();
		check(&mut messages, "root certificate", self.root_certificate());
		let ca_cert = check(&mut messages, "CA certificate", self.ca_certificate());
		let ca_key = check(&mut messages, "CA key", self.ca_key());
		let nm_cert = check(
			&mut messages,
			"network map certificate",
			self.network_map_certificate(),
		);
		let nm_key = check(&mut messages, "network map key", self.network_map_key());

		if let (Some(cert), Some(key)) = (ca_cert, ca_key) {
			if let Err(e) = Issuer::from_ca_cert_der(&cert, &key) {
				messages.push(format!("CA key does not match CA certificate: {}", e));
			}
		}
		if let (Some(cert), Some(key)) = (nm_cert, nm_key) {
			if let Err(e) = Issuer::from_ca_cert_der(&cert, &key) {
				messages.push(format!(
					"network map key does not match network map certificate: {}",
					e
				));
			}
		}
		messages
	}
}

/// Names the missing resource by its role rather than its location
fn named<T>(what: &str, res: Result<T, Error>) -> Result<T, Error> {
	res.map_err(|e| match e {
		Error::ResourceNotFound(_) => Error::ResourceNotFound(format!("{} not found", what)),
		e => e,
	})
}

#[cfg(test)]
mod tests {
	use assert_fs::prelude::*;
	use assert_fs::TempDir;

	use super::*;
	use crate::{BasicConstraints, CertificateParams, DnType, IsCa};

	fn self_signed(cn: &str, key: &KeyPair) -> String {
		let mut params = CertificateParams::default();
		params.distinguished_name.push(DnType::CommonName, cn);
		params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
		params.self_signed(key).unwrap().pem()
	}

	fn provider(dir: &TempDir, resource_dirs: Vec<PathBuf>) -> MaterialProvider {
		let config = Config {
			root_cert_path: dir.path().join("root.pem"),
			ca_cert_path: dir.path().join("ca.pem"),
			ca_key_path: dir.path().join("ca-key.pem"),
			network_map_cert_path: "nm.pem".into(),
			network_map_key_path: "nm-key.pem".into(),
			resource_dirs,
			..Config::default()
		};
		MaterialProvider::new(&config)
	}

	#[test]
	fn resolves_through_resource_dirs() {
		let dir = TempDir::new().unwrap();
		let resources = TempDir::new().unwrap();
		let key = KeyPair::generate().unwrap();
		resources
			.child("nm.pem")
			.write_str(&self_signed("nm", &key))
			.unwrap();
		resources
			.child("nm-key.pem")
			.write_str(&key.serialize_pem())
			.unwrap();

		let material = provider(&dir, vec![resources.path().to_path_buf()]);
		let cert = material.network_map_certificate().unwrap();
		let (_, parsed) = x509_parser::parse_x509_certificate(&cert).unwrap();
		assert_eq!(
			parsed.public_key().subject_public_key.data.as_ref(),
			material.network_map_key().unwrap().public_key_raw()
		);
	}

	#[test]
	fn missing_resource() {
		let dir = TempDir::new().unwrap();
		let material = provider(&dir, Vec::new());
		let err = material.network_map_certificate().unwrap_err();
		assert_eq!(
			err,
			Error::ResourceNotFound("network map certificate not found".into())
		);
		assert!(!err.to_string().contains("nm.pem"));

		let err = material.resolve(&dir.path().join("absent.pem")).unwrap_err();
		assert!(!err.to_string().contains(&*dir.path().to_string_lossy()));
	}

	#[test]
	fn key_where_certificate_expected() {
		let dir = TempDir::new().unwrap();
		let key = KeyPair::generate().unwrap();
		dir.child("root.pem").write_str(&key.serialize_pem()).unwrap();
		let material = provider(&dir, Vec::new());
		assert!(matches!(
			material.root_certificate(),
			Err(Error::MalformedInput(_))
		));
	}

	#[test]
	fn validation_lists_every_failure() {
		let dir = TempDir::new().unwrap();
		let material = provider(&dir, Vec::new());
		let messages = material.validate_configuration();
		assert_eq!(messages.len(), 5);
		assert!(messages[0].starts_with("Failed to load root certificate, cause: "));
		assert!(messages[2].starts_with("Failed to load CA key, cause: "));
		assert!(messages[4].ends_with("network map key not found"));
		assert!(messages.iter().all(|m| !m.contains(&*dir.path().to_string_lossy())));
	}

	#[test]
	fn validation_detects_foreign_key() {
		let dir = TempDir::new().unwrap();
		let resources = TempDir::new().unwrap();
		let ca_key = KeyPair::generate().unwrap();
		let other_key = KeyPair::generate().unwrap();
		let nm_key = KeyPair::generate().unwrap();
		dir.child("root.pem")
			.write_str(&self_signed("root", &ca_key))
			.unwrap();
		dir.child("ca.pem")
			.write_str(&self_signed("ca", &ca_key))
			.unwrap();
		dir.child("ca-key.pem")
			.write_str(&other_key.serialize_pem())
			.unwrap();
		resources
			.child("nm.pem")
			.write_str(&self_signed("nm", &nm_key))
			.unwrap();
		resources
			.child("nm-key.pem")
			.write_str(&nm_key.serialize_pem())
			.unwrap();

		let material = provider(&dir, vec![resources.path().to_path_buf()]);
		let messages = material.validate_configuration();
		assert_eq!(messages.len(), 1, "{:?}", messages);
		assert!(messages[0].starts_with("CA key does not match CA certificate"));

		dir.child("ca-key.pem")
			.write_str(&ca_key.serialize_pem())
			.unwrap();
		assert!(material.validate_configuration().is_empty());
	}
}
