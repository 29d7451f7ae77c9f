#![allow(dead_code)]

use assert_fs::prelude::*;
use assert_fs::TempDir;

use discovery_ca::{
	oid, BasicConstraints, Certificate, CertificateParams, Config, DistinguishedName, IsCa,
	Issuer, KeyPair, KeyUsagePurpose, PartyId, RequestParams, PKCS_ECDSA_P384_SHA384,
};
use yasna::models::ObjectIdentifier;
use yasna::Tag;

pub const ORGANIZATION: &str = "12345";

/// Root, CA and network map material written into a temporary directory
pub struct Material {
	pub dir: TempDir,
	pub config: Config,
	pub root: Certificate,
	pub ca: Certificate,
	pub ca_key: KeyPair,
}

pub fn party() -> PartyId {
	PartyId::organization(ORGANIZATION).unwrap()
}

fn ca_params(dn: &str) -> CertificateParams {
	let mut params = CertificateParams::default();
	params.distinguished_name = DistinguishedName::parse(dn).unwrap();
	params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
	params.key_usages = vec![
		KeyUsagePurpose::DigitalSignature,
		KeyUsagePurpose::KeyCertSign,
		KeyUsagePurpose::CrlSign,
	];
	params
}

/// Writes a fresh root and CA below `dir` under the default file names
pub fn write_ca(dir: &TempDir, ca_dn: &str) -> (Certificate, Certificate, KeyPair) {
	let root_key = KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384).unwrap();
	let root_params = ca_params("CN=Root CA,O=Nuts,C=NL");
	let root = root_params.self_signed(&root_key).unwrap();

	let ca_key = KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384).unwrap();
	let mut params = ca_params(ca_dn);
	params.use_authority_key_identifier_extension = true;
	let ca = params
		.signed_by(&ca_key, &Issuer::from_params(&root_params, &root_key))
		.unwrap();

	dir.child("root.pem").write_str(&root.pem()).unwrap();
	dir.child("ca.pem").write_str(&ca.pem()).unwrap();
	dir.child("ca-key.pem")
		.write_str(&ca_key.serialize_pem())
		.unwrap();
	(root, ca, ca_key)
}

pub fn material() -> Material {
	let dir = TempDir::new().unwrap();
	let (root, ca, ca_key) = write_ca(&dir, "CN=Doorman,O=Nuts,C=NL");

	let nm_key = KeyPair::generate().unwrap();
	let nm = ca_params("CN=Network Map,O=Nuts,C=NL")
		.self_signed(&nm_key)
		.unwrap();
	dir.child("nm.pem").write_str(&nm.pem()).unwrap();
	dir.child("nm-key.pem")
		.write_str(&nm_key.serialize_pem())
		.unwrap();

	let config = Config {
		root_cert_path: "root.pem".into(),
		ca_cert_path: "ca.pem".into(),
		ca_key_path: "ca-key.pem".into(),
		network_map_cert_path: "nm.pem".into(),
		network_map_key_path: "nm-key.pem".into(),
		resource_dirs: vec![dir.path().to_path_buf()],
		..Config::default()
	};
	Material {
		dir,
		config,
		root,
		ca,
		ca_key,
	}
}

pub fn request_params(organization: Option<&str>) -> RequestParams {
	RequestParams {
		distinguished_name: DistinguishedName::parse("CN=test,O=test,C=NL,L=town").unwrap(),
		organization_id: organization.map(|o| PartyId::organization(o).unwrap()),
		email: Some("info@example.com".into()),
	}
}

/// A request for [`ORGANIZATION`], together with the requesting key
pub fn request() -> (String, KeyPair) {
	let key = KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384).unwrap();
	let pem = request_params(Some(ORGANIZATION))
		.serialize_pem(&key)
		.unwrap();
	(pem, key)
}

/// A request for [`ORGANIZATION`] with `subject`
pub fn request_for(subject: &str) -> String {
	let key = KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384).unwrap();
	let mut params = request_params(Some(ORGANIZATION));
	params.distinguished_name = DistinguishedName::parse(subject).unwrap();
	params.serialize_pem(&key).unwrap()
}

/// A request for [`ORGANIZATION`] whose emailAddress is written as UTF8String
///
/// The request is built from a regular one: its attributes are kept, the
/// email attribute is appended and the result is signed again.
pub fn request_with_utf8_email(email: &str) -> String {
	let key = KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384).unwrap();
	let mut params = request_params(Some(ORGANIZATION));
	params.email = None;
	let der = params.serialize_der(&key).unwrap();

	let (info, algorithm) = yasna::parse_der(&der, |reader| {
		reader.read_sequence(|reader| {
			let info = reader.next().read_der()?;
			let algorithm = reader.next().read_der()?;
			reader.next().read_der()?;
			Ok((info, algorithm))
		})
	})
	.unwrap();
	let (subject, spki, attributes) = yasna::parse_der(&info, |reader| {
		reader.read_sequence(|reader| {
			reader.next().read_u8()?;
			let subject = reader.next().read_der()?;
			let spki = reader.next().read_der()?;
			let attributes = reader.next().read_tagged_implicit(Tag::context(0), |reader| {
				reader.collect_set_of(|reader| reader.read_der())
			})?;
			Ok((subject, spki, attributes))
		})
	})
	.unwrap();

	let info = yasna::construct_der(|writer| {
		writer.write_sequence(|writer| {
			writer.next().write_u8(0);
			writer.next().write_der(&subject);
			writer.next().write_der(&spki);
			writer
				.next()
				.write_tagged_implicit(Tag::context(0), |writer| {
					writer.write_set_of(|writer| {
						for attribute in &attributes {
							writer.next().write_der(attribute);
						}
						writer.next().write_sequence(|writer| {
							writer.next().write_oid(&ObjectIdentifier::from_slice(
								oid::PKCS_9_AT_EMAIL_ADDRESS,
							));
							writer
								.next()
								.write_set(|writer| writer.next().write_utf8_string(email));
						});
					});
				});
		});
	});
	let signature = key.sign(&info).unwrap();
	let der = yasna::construct_der(|writer| {
		writer.write_sequence(|writer| {
			writer.next().write_der(&info);
			writer.next().write_der(&algorithm);
			writer
				.next()
				.write_bitvec_bytes(&signature, signature.len() * 8);
		});
	});
	pem::encode(&pem::Pem::new("CERTIFICATE REQUEST", der))
}
