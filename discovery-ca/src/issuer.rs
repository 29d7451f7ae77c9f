//! Turning a pending request into a certificate signed by the configured CA

use log::info;
use time::OffsetDateTime;
use x509_parser::parse_x509_certificate;
use x509_parser::prelude::X509Certificate;

use crate::error::ExternalError;
use crate::store::{IssuedCertificate, PendingRequest, Store};
use crate::{
	chain, BasicConstraints, CertificateParams, CertificateSigningRequest, Config,
	DistinguishedName, DnType, Error, GeneralSubtree, IsCa, Issuer, KeyPair, KeyUsagePurpose,
	MaterialProvider, NameConstraints, SanType, SerialNumberGenerator,
};

/// The choices issuance leaves to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuancePolicy {
	/// Days from issuance until the certificate expires
	pub validity_days: u32,
	/// Write `CA:TRUE` into the basic constraints of issued certificates
	pub leaf_is_ca: bool,
	/// Restrict issued certificates to the country and organization of the CA
	pub name_constraints: bool,
}

impl IssuancePolicy {
	/// The policy configured in `config`
	pub fn from_config(config: &Config) -> Self {
		Self {
			validity_days: config.certificate_validity_days,
			leaf_is_ca: config.leaf_is_ca,
			name_constraints: config.name_constraints,
		}
	}
}

/// The CA certificate, key and root one issuance signs with
///
/// Loaded once per approval, so that the issuer lock and the signature are
/// taken for the same CA even when the files are replaced in between.
pub struct SigningCa {
	der: Vec<u8>,
	key: KeyPair,
	root_der: Vec<u8>,
	name: DistinguishedName,
}

impl SigningCa {
	/// Loads the configured CA material
	///
	/// Fails with [`Error::SigningFailure`] when the key does not belong to the CA certificate.
	pub fn load(material: &MaterialProvider) -> Result<Self, Error> {
		let der = material.ca_certificate()?;
		let key = material.ca_key()?;
		let root_der = material.root_certificate()?;
		Issuer::from_ca_cert_der(&der, &key)?;

		let (_, ca) = parse_x509_certificate(&der)._err()?;
		let name = DistinguishedName::from_name(ca.subject())?;
		Ok(Self {
			der,
			key,
			root_der,
			name,
		})
	}

	/// The rendered subject of the CA certificate
	///
	/// Serial state and certificate counts are kept per issuer under this name.
	pub fn name(&self) -> String {
		self.name.to_string()
	}

	/// The CA certificate in DER
	pub fn der(&self) -> &[u8] {
		&self.der
	}
}

/// Signs pending requests and records the result
pub struct CertificateIssuer<'a> {
	store: &'a dyn Store,
	policy: IssuancePolicy,
}

impl<'a> CertificateIssuer<'a> {
	/// Creates an issuer committing to `store`
	pub fn new(store: &'a dyn Store, policy: IssuancePolicy) -> Self {
		Self { store, policy }
	}

	/// Issues a certificate for `pending`, signed by `ca`, and removes the request from the store
	///
	/// Nothing is stored when any step fails; the request then stays pending.
	/// Callers must serialize calls for the same issuer.
	pub fn issue(&self, ca: &SigningCa, pending: &PendingRequest) -> Result<IssuedCertificate, Error> {
		let csr = CertificateSigningRequest::parse(&pending.pem)?;
		let organization_id = csr.organization_id()?;

		let issuer = Issuer::from_ca_cert_der(&ca.der, &ca.key)?;
		let (_, ca_cert) = parse_x509_certificate(&ca.der)._err()?;
		let issuer_name = ca.name();

		let serial = SerialNumberGenerator::new(self.store).next_serial(&issuer_name)?;

		let mut params = CertificateParams::valid_for_days(self.policy.validity_days);
		params.serial_number = Some(serial.clone());
		params.distinguished_name = csr.subject().clone();
		params.raw_subject = Some(csr.subject_raw().to_vec());
		params.is_ca = match self.policy.leaf_is_ca {
			true => IsCa::Ca(BasicConstraints::Unconstrained),
			false => IsCa::NoCa,
		};
		params.basic_constraints_critical = false;
		params.key_usages = vec![
			KeyUsagePurpose::DigitalSignature,
			KeyUsagePurpose::KeyCertSign,
			KeyUsagePurpose::CrlSign,
		];
		params.subject_alt_names = vec![SanType::OtherName(organization_id.clone())];
		if let Some(email) = csr.email() {
			params
				.subject_alt_names
				.push(SanType::Rfc822Name(email.to_string()));
		}
		if self.policy.name_constraints {
			params.name_constraints = Some(permitted_organization(&ca.name));
		}
		params.use_authority_key_identifier_extension = true;

		let certificate = params.signed_by(csr.public_key(), &issuer)?;
		let der = certificate.der().to_vec();
		verify_issued(&der, &ca_cert)?;

		let issued = IssuedCertificate {
			serial,
			subject: csr.subject().to_string(),
			issuer: issuer_name,
			organization_id,
			der,
			chain: chain::join(&[
				chain::encode_certificate(&ca.der),
				chain::encode_certificate(&ca.root_der),
			]),
			issued_at: OffsetDateTime::now_utc(),
		};
		self.store.commit_issuance(issued.clone(), pending.id)?;

		info!(
			"Issued certificate {} for {} ({}) under {}",
			issued.serial, issued.subject, issued.organization_id, issued.issuer
		);
		Ok(issued)
	}
}

/// Name constraints permitting only names below the CA's country and organization
fn permitted_organization(ca_name: &DistinguishedName) -> NameConstraints {
	let mut permitted = DistinguishedName::new();
	for ty in [DnType::CountryName, DnType::OrganizationName] {
		if let Some(value) = ca_name.get(&ty) {
			permitted.push(ty, value.clone());
		}
	}
	NameConstraints {
		permitted_subtrees: vec![GeneralSubtree::DirectoryName(permitted)],
		excluded_subtrees: Vec::new(),
	}
}

/// Checks the freshly signed certificate against the public key of the CA
fn verify_issued(der: &[u8], ca: &X509Certificate<'_>) -> Result<(), Error> {
	let (_, cert) = parse_x509_certificate(der).map_err(|e| {
		Error::SigningFailure(format!("issued certificate does not parse: {}", e))
	})?;
	cert.verify_signature(Some(ca.public_key())).map_err(|e| {
		Error::SigningFailure(format!("issued certificate does not verify: {}", e))
	})
}
