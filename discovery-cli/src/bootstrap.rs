use std::{fmt, fs::File, io, path::Path};

use bpaf::Bpaf;
use discovery_ca::{
	BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
	DnValue, Error, IsCa, Issuer, KeyPair, KeyUsagePurpose, PartyId,
	RequestParams, SignatureAlgorithm,
};

/// Base names of the files written by [`write_network_material`]
pub const ROOT_FILE_NAME: &str = "root";
/// See [`ROOT_FILE_NAME`]
pub const DOORMAN_FILE_NAME: &str = "doorman";
/// See [`ROOT_FILE_NAME`]
pub const NETWORK_MAP_FILE_NAME: &str = "network-map";

#[derive(Debug, Clone)]
/// PEM serialized certificate or request and the PEM serialized private key
/// belonging to it
pub struct PemCertifiedKey {
	pub cert_pem: String,
	pub private_key_pem: String,
}

impl PemCertifiedKey {
	/// Writes `{name}.pem` and `{name}.key.pem` into `dir`, creating it if needed
	pub fn write(&self, dir: &Path, name: &str) -> Result<(), io::Error> {
		use std::io::Write;
		std::fs::create_dir_all(dir)?;

		let key_path = dir.join(format!("{name}.key.pem"));
		let mut key_out = File::create(key_path)?;
		write!(key_out, "{}", &self.private_key_pem)?;

		let cert_path = dir.join(format!("{name}.pem"));
		let mut cert_out = File::create(cert_path)?;
		write!(cert_out, "{}", &self.cert_pem)?;

		Ok(())
	}
}

/// Builder to configure [CertificateParams] to be finalized
/// into either a [Ca] or an [EndEntity].
#[derive(Default)]
pub struct CertificateBuilder {
	params: CertificateParams,
	alg: KeypairAlgorithm,
}

impl CertificateBuilder {
	/// Initialize `CertificateParams` with defaults
	/// # Example
	/// ```
	/// # use discovery_cli::CertificateBuilder;
	/// let cert = CertificateBuilder::new();
	/// ```
	pub fn new() -> Self {
		Self::default()
	}
	/// Set signature algorithm (instead of default).
	pub fn signature_algorithm(mut self, alg: &KeypairAlgorithm) -> Self {
		self.alg = alg.clone();
		self
	}
	/// Set options for Ca Certificates
	/// # Example
	/// ```
	/// # use discovery_cli::CertificateBuilder;
	/// let cert = CertificateBuilder::new().certificate_authority();
	/// ```
	pub fn certificate_authority(self) -> CaBuilder {
		CaBuilder::new(self.params, self.alg)
	}
	/// Set options for `EndEntity` Certificates
	pub fn end_entity(self) -> EndEntityBuilder {
		EndEntityBuilder::new(self.params, self.alg)
	}
}

fn push_name(
	params: &mut CertificateParams,
	country: &str,
	organization: &str,
	common: &str,
) -> Result<(), Error> {
	let country = DnValue::printable(country)?;
	let dn = &mut params.distinguished_name;
	dn.push(DnType::CommonName, common);
	dn.push(DnType::OrganizationName, organization);
	dn.push(DnType::CountryName, country);
	Ok(())
}

/// [CertificateParams] from which a [Ca] [Certificate] can be built
pub struct CaBuilder {
	params: CertificateParams,
	alg: KeypairAlgorithm,
}

impl CaBuilder {
	/// Initialize `CaBuilder`
	pub fn new(mut params: CertificateParams, alg: KeypairAlgorithm) -> Self {
		params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
		params.key_usages.push(KeyUsagePurpose::DigitalSignature);
		params.key_usages.push(KeyUsagePurpose::KeyCertSign);
		params.key_usages.push(KeyUsagePurpose::CrlSign);
		Self { params, alg }
	}
	/// Set the subject to `CN={common},O={organization},C={country}`
	///
	/// Fails when `country` is not a PrintableString.
	pub fn name(mut self, country: &str, organization: &str, common: &str) -> Result<Self, Error> {
		push_name(&mut self.params, country, organization, common)?;
		Ok(self)
	}
	/// build a self-signed `Ca` Certificate.
	pub fn build(self) -> Result<Ca, Error> {
		let key_pair = self.alg.to_keypair()?;
		let cert = self.params.self_signed(&key_pair)?;
		Ok(Ca {
			cert,
			params: self.params,
			key_pair,
		})
	}
	/// build a `Ca` Certificate signed by `issuer`.
	pub fn build_signed(mut self, issuer: &Ca) -> Result<Ca, Error> {
		self.params.use_authority_key_identifier_extension = true;
		let key_pair = self.alg.to_keypair()?;
		let cert = self.params.signed_by(&key_pair, &issuer.issuer())?;
		Ok(Ca {
			cert,
			params: self.params,
			key_pair,
		})
	}
}

/// CA [Certificate] with its key
pub struct Ca {
	cert: Certificate,
	params: CertificateParams,
	key_pair: KeyPair,
}

impl Ca {
	/// Serialize certificate and key
	pub fn serialize_pem(&self) -> PemCertifiedKey {
		PemCertifiedKey {
			cert_pem: self.cert.pem(),
			private_key_pem: self.key_pair.serialize_pem(),
		}
	}
	/// Return `&Certificate`
	pub fn cert(&self) -> &Certificate {
		&self.cert
	}
	fn issuer(&self) -> Issuer<'_> {
		Issuer::from_params(&self.params, &self.key_pair)
	}
}

/// End-entity [Certificate]
pub struct EndEntity {
	cert: Certificate,
	key_pair: KeyPair,
}

impl EndEntity {
	/// Serialize certificate and key
	pub fn serialize_pem(&self) -> PemCertifiedKey {
		PemCertifiedKey {
			cert_pem: self.cert.pem(),
			private_key_pem: self.key_pair.serialize_pem(),
		}
	}
}

/// [CertificateParams] from which an [EndEntity] [Certificate] can be built
pub struct EndEntityBuilder {
	params: CertificateParams,
	alg: KeypairAlgorithm,
}

impl EndEntityBuilder {
	/// Initialize `EndEntityBuilder`
	pub fn new(mut params: CertificateParams, alg: KeypairAlgorithm) -> Self {
		params.is_ca = IsCa::NoCa;
		params.use_authority_key_identifier_extension = true;
		params.key_usages.push(KeyUsagePurpose::DigitalSignature);
		Self { params, alg }
	}
	/// Set the subject to `CN={common},O={organization},C={country}`
	///
	/// Fails when `country` is not a PrintableString.
	pub fn name(mut self, country: &str, organization: &str, common: &str) -> Result<Self, Error> {
		push_name(&mut self.params, country, organization, common)?;
		Ok(self)
	}
	/// build `EndEntity` Certificate.
	pub fn build(self, issuer: &Ca) -> Result<EndEntity, Error> {
		let key_pair = self.alg.to_keypair()?;
		let cert = self.params.signed_by(&key_pair, &issuer.issuer())?;
		Ok(EndEntity { cert, key_pair })
	}
}

/// Generates the root, the doorman CA below it and the network map
/// certificate, and writes them into `dir`
///
/// The files are named after [`ROOT_FILE_NAME`], [`DOORMAN_FILE_NAME`] and
/// [`NETWORK_MAP_FILE_NAME`], which match the default configuration paths.
pub fn write_network_material(
	dir: &Path,
	alg: &KeypairAlgorithm,
	country: &str,
	organization: &str,
) -> anyhow::Result<()> {
	let root = CertificateBuilder::new()
		.signature_algorithm(alg)
		.certificate_authority()
		.name(country, organization, &format!("{organization} Root CA"))?
		.build()?;

	let doorman = CertificateBuilder::new()
		.signature_algorithm(alg)
		.certificate_authority()
		.name(country, organization, &format!("{organization} Doorman"))?
		.build_signed(&root)?;

	let network_map = CertificateBuilder::new()
		.signature_algorithm(alg)
		.end_entity()
		.name(country, organization, &format!("{organization} Network Map"))?
		.build(&root)?;

	root.serialize_pem().write(dir, ROOT_FILE_NAME)?;
	doorman.serialize_pem().write(dir, DOORMAN_FILE_NAME)?;
	network_map
		.serialize_pem()
		.write(dir, NETWORK_MAP_FILE_NAME)?;
	Ok(())
}

/// Generates a key and a signing request for it
///
/// The request is returned in `cert_pem`.
pub fn create_request(
	alg: &KeypairAlgorithm,
	subject: &str,
	organization_id: &str,
	email: Option<String>,
) -> anyhow::Result<PemCertifiedKey> {
	let params = RequestParams {
		distinguished_name: DistinguishedName::parse(subject)?,
		organization_id: Some(PartyId::organization(organization_id)?),
		email,
	};
	let key_pair = alg.to_keypair()?;
	Ok(PemCertifiedKey {
		cert_pem: params.serialize_pem(&key_pair)?,
		private_key_pem: key_pair.serialize_pem(),
	})
}

#[derive(Clone, Debug, Default, Bpaf)]
/// Supported Keypair Algorithms
pub enum KeypairAlgorithm {
	Ed25519,
	#[default]
	EcdsaP256,
	EcdsaP384,
}

impl fmt::Display for KeypairAlgorithm {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			KeypairAlgorithm::Ed25519 => write!(f, "ed25519"),
			KeypairAlgorithm::EcdsaP256 => write!(f, "ecdsa-p256"),
			KeypairAlgorithm::EcdsaP384 => write!(f, "ecdsa-p384"),
		}
	}
}

impl KeypairAlgorithm {
	/// The signature algorithm keys of this variant sign with
	pub fn signature_algorithm(&self) -> &'static SignatureAlgorithm {
		match self {
			KeypairAlgorithm::Ed25519 => &discovery_ca::PKCS_ED25519,
			KeypairAlgorithm::EcdsaP256 => &discovery_ca::PKCS_ECDSA_P256_SHA256,
			KeypairAlgorithm::EcdsaP384 => &discovery_ca::PKCS_ECDSA_P384_SHA384,
		}
	}
	/// Return a fresh [`KeyPair`] for the given variant
	fn to_keypair(&self) -> Result<KeyPair, Error> {
		KeyPair::generate_for(self.signature_algorithm())
	}
}
