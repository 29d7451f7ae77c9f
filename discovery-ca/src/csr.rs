use pem::Pem;
use yasna::models::ObjectIdentifier;
use yasna::Tag;

use crate::certificate::{write_general_names, write_x509_extension, SanType};
use crate::dn::write_distinguished_name;
use crate::error::ExternalError;
use crate::key_pair::PublicKeyData;
use crate::party_id::dotted;
use crate::{oid, DistinguishedName, Error, KeyPair, PartyId, ENCODE_CONFIG};

const CSR_TAGS: &[&str] = &["CERTIFICATE REQUEST", "NEW CERTIFICATE REQUEST"];

/// A public key, extracted from a CSR
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct PublicKey {
	spki: Vec<u8>,
	raw: Vec<u8>,
}

impl PublicKey {
	/// The raw key bits, the BIT STRING content of the SubjectPublicKeyInfo
	pub fn raw(&self) -> &[u8] {
		&self.raw
	}
}

impl PublicKeyData for PublicKey {
	fn subject_public_key_info(&self) -> Vec<u8> {
		self.spki.clone()
	}
}

/// A general name found in the subjectAltName of a request
///
/// Only the kinds that carry identity claims are kept apart.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum RequestedName {
	/// An otherName, with its value when it decodes as a UTF8String
	OtherName {
		/// Object identifier arcs of the type-id
		oid: Vec<u64>,
		/// The decoded value
		value: Option<String>,
	},
	/// An rfc822Name
	Rfc822Name(String),
	/// Any other kind of general name
	Other,
}

/// A parsed PKCS#10 certificate signing request
///
/// The identity claims are extracted once when parsing. The self-signature is
/// checked at that time too, but only reported by
/// [`verify_self_signature`](Self::verify_self_signature).
#[derive(Debug, Clone)]
pub struct CertificateSigningRequest {
	der: Vec<u8>,
	subject: DistinguishedName,
	subject_raw: Vec<u8>,
	public_key: PublicKey,
	names: Vec<RequestedName>,
	email: Option<String>,
	signature_valid: bool,
}

impl CertificateSigningRequest {
	/// Parse a certificate signing request from the ASCII PEM format
	pub fn parse(pem_str: &str) -> Result<Self, Error> {
		let csr = pem::parse(pem_str)._err()?;
		if !CSR_TAGS.contains(&csr.tag()) {
			return Err(Error::MalformedInput(format!(
				"expected a CERTIFICATE REQUEST block, found {}",
				csr.tag()
			)));
		}
		Self::from_der(csr.contents())
	}

	/// Parse a certificate signing request from DER-encoded bytes
	pub fn from_der(der: &[u8]) -> Result<Self, Error> {
		use x509_parser::extensions::ParsedExtension;
		use x509_parser::prelude::{FromDer, ParsedCriAttribute, X509CertificationRequest};

		let (_, csr) = X509CertificationRequest::from_der(der)._err()?;
		let info = &csr.certification_request_info;

		let subject = DistinguishedName::from_name(&info.subject)?;
		let public_key = PublicKey {
			spki: info.subject_pki.raw.to_vec(),
			raw: info.subject_pki.subject_public_key.data.to_vec(),
		};

		let mut names = Vec::new();
		for attr in info.iter_attributes() {
			if let ParsedCriAttribute::ExtensionRequest(requested) = attr.parsed_attribute() {
				for ext in &requested.extensions {
					if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
						names.extend(san.general_names.iter().map(RequestedName::from_general));
					}
				}
			}
		}

		// a UTF8String value is accepted as long as it would fit an IA5String
		let email = read_email_attribute(der);
		if let Some(email) = email.as_deref().filter(|email| !email.is_ascii()) {
			return Err(Error::MalformedInput(format!(
				"emailAddress {:?} is not an IA5String",
				email
			)));
		}

		Ok(Self {
			der: der.to_vec(),
			subject,
			subject_raw: info.subject.as_raw().to_vec(),
			public_key,
			names,
			email,
			signature_valid: csr.verify_signature().is_ok(),
		})
	}

	/// Whether the request is signed by the key it carries
	pub fn verify_self_signature(&self) -> bool {
		self.signature_valid
	}

	/// The organization identifier from the otherName of the subjectAltName
	///
	/// When several otherNames carry the organization OID, the first one wins.
	pub fn organization_id(&self) -> Result<PartyId, Error> {
		self.names
			.iter()
			.find_map(|name| match name {
				RequestedName::OtherName {
					oid: name_oid,
					value: Some(value),
				} if name_oid == oid::ORGANIZATION_ID => {
					PartyId::new(dotted(name_oid), value.as_str()).ok()
				},
				_ => None,
			})
			.ok_or(Error::MissingOrganizationId)
	}

	/// The email address of the PKCS#9 emailAddress attribute, when present
	pub fn email(&self) -> Option<&str> {
		self.email.as_deref()
	}

	/// The subject of the request
	pub fn subject(&self) -> &DistinguishedName {
		&self.subject
	}

	/// The encoded subject name, as found in the request
	pub fn subject_raw(&self) -> &[u8] {
		&self.subject_raw
	}

	/// The public key of the request
	pub fn public_key(&self) -> &PublicKey {
		&self.public_key
	}

	/// The names of the requested subjectAltName, in order
	pub fn requested_names(&self) -> &[RequestedName] {
		&self.names
	}

	/// The request in DER
	pub fn der(&self) -> &[u8] {
		&self.der
	}
}

impl RequestedName {
	fn from_general(name: &x509_parser::extensions::GeneralName<'_>) -> Self {
		use x509_parser::extensions::GeneralName;

		match name {
			GeneralName::OtherName(type_id, value) => RequestedName::OtherName {
				oid: type_id.iter().map(Iterator::collect).unwrap_or_default(),
				value: read_other_name_value(value),
			},
			GeneralName::RFC822Name(email) => RequestedName::Rfc822Name((*email).to_owned()),
			_ => RequestedName::Other,
		}
	}
}

/// The value follows the type-id of an otherName: `[0] EXPLICIT UTF8String`,
/// or a bare UTF8String as written by some tools
fn read_other_name_value(value: &[u8]) -> Option<String> {
	yasna::parse_der(value, |reader| {
		reader.read_tagged(Tag::context(0), |reader| reader.read_utf8string())
	})
	.or_else(|_| yasna::parse_der(value, |reader| reader.read_utf8string()))
	.ok()
}

/// Finds the first PKCS#9 emailAddress attribute of the request
///
/// The value is an IA5String, some tools write a UTF8String.
fn read_email_attribute(csr_der: &[u8]) -> Option<String> {
	let email_oid = ObjectIdentifier::from_slice(oid::PKCS_9_AT_EMAIL_ADDRESS);
	let read_value = |der: &[u8]| {
		yasna::parse_ber(der, |reader| reader.read_ia5_string())
			.or_else(|_| yasna::parse_ber(der, |reader| reader.read_utf8string()))
			.ok()
	};

	let email = yasna::parse_ber(csr_der, |reader| {
		reader.read_sequence(|reader| {
			let email = reader.next().read_sequence(|reader| {
				reader.next().read_u8()?; // version
				reader.next().read_der()?; // subject
				reader.next().read_der()?; // subjectPKInfo
				reader.next().read_tagged_implicit(Tag::context(0), |reader| {
					let mut email = None;
					reader.read_set_of(|reader| {
						let values = reader.read_sequence(|reader| {
							let attr_oid = reader.next().read_oid()?;
							let values = reader.next().collect_set_of(|reader| reader.read_der())?;
							Ok((attr_oid == email_oid).then_some(values))
						})?;
						if email.is_none() {
							email = values
								.into_iter()
								.flatten()
								.find_map(|value| read_value(&value));
						}
						Ok(())
					})?;
					Ok(email)
				})
			})?;
			reader.next().read_der()?; // signatureAlgorithm
			reader.next().read_der()?; // signature
			Ok(email)
		})
	});
	email.ok().flatten()
}

/// Parameters for creating a certificate signing request
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
	/// The subject
	pub distinguished_name: DistinguishedName,
	/// Written as otherName in the requested subjectAltName
	pub organization_id: Option<PartyId>,
	/// Written as PKCS#9 emailAddress attribute
	pub email: Option<String>,
}

impl RequestParams {
	/// Creates a PEM encoded request, self-signed with `subject_key`
	pub fn serialize_pem(&self, subject_key: &KeyPair) -> Result<String, Error> {
		let der = self.serialize_der(subject_key)?;
		Ok(pem::encode_config(
			&Pem::new("CERTIFICATE REQUEST", der),
			ENCODE_CONFIG,
		))
	}

	/// Creates a DER encoded request, self-signed with `subject_key`
	pub fn serialize_der(&self, subject_key: &KeyPair) -> Result<Vec<u8>, Error> {
		if let Some(email) = self.email.as_deref().filter(|email| !email.is_ascii()) {
			return Err(Error::MalformedInput(format!(
				"emailAddress {:?} is not an IA5String",
				email
			)));
		}
		subject_key.sign_der(|writer| {
			// Write version
			writer.next().write_u8(0);
			write_distinguished_name(writer.next(), &self.distinguished_name);
			writer
				.next()
				.write_der(&subject_key.subject_public_key_info());

			// RFC 2986 requires the attributes tag even when there are none
			writer
				.next()
				.write_tagged_implicit(Tag::context(0), |writer| {
					// RFC 2986 specifies that attributes are a SET OF Attribute
					writer.write_set_of(|writer| {
						if let Some(party) = &self.organization_id {
							writer.next().write_sequence(|writer| {
								writer.next().write_oid(&ObjectIdentifier::from_slice(
									oid::PKCS_9_AT_EXTENSION_REQUEST,
								));
								writer.next().write_set(|writer| {
									writer.next().write_sequence(|writer| {
										write_x509_extension(
											writer.next(),
											oid::SUBJECT_ALT_NAME,
											false,
											|writer| {
												write_general_names(
													writer,
													&[SanType::OtherName(party.clone())],
												)
											},
										);
									});
								});
							});
						}
						if let Some(email) = &self.email {
							writer.next().write_sequence(|writer| {
								writer.next().write_oid(&ObjectIdentifier::from_slice(
									oid::PKCS_9_AT_EMAIL_ADDRESS,
								));
								writer.next().write_set(|writer| {
									writer.next().write_ia5_string(email);
								});
							});
						}
					});
				});

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sign_algo::algo::PKCS_ECDSA_P384_SHA384;

	fn params() -> RequestParams {
		RequestParams {
			distinguished_name: DistinguishedName::parse("CN=test,O=test,C=NL,L=town").unwrap(),
			organization_id: Some(PartyId::organization("1").unwrap()),
			email: Some("info@example.com".into()),
		}
	}

	#[test]
	fn parse_own_request() {
		let key = KeyPair::generate().unwrap();
		let pem = params().serialize_pem(&key).unwrap();
		let csr = CertificateSigningRequest::parse(&pem).unwrap();

		assert!(csr.verify_self_signature());
		assert_eq!(csr.subject().to_string(), "CN=test,O=test,C=NL,L=town");
		assert_eq!(
			csr.organization_id().unwrap().to_string(),
			"urn:oid:1.3.6.1.4.1.54851.4:1"
		);
		assert_eq!(csr.email(), Some("info@example.com"));
		assert_eq!(csr.public_key().raw(), key.public_key_raw());
		assert_eq!(csr.public_key().subject_public_key_info(), key.public_key_der());
	}

	#[test]
	fn missing_organization_id() {
		let key = KeyPair::generate().unwrap();
		let mut params = params();
		params.organization_id = None;
		params.email = None;
		let csr = CertificateSigningRequest::parse(&params.serialize_pem(&key).unwrap()).unwrap();
		assert!(csr.verify_self_signature());
		assert_eq!(csr.organization_id(), Err(Error::MissingOrganizationId));
		assert_eq!(csr.email(), None);
	}

	#[test]
	fn other_oid_is_not_an_organization() {
		let key = KeyPair::generate().unwrap();
		let mut params = params();
		params.organization_id = Some(PartyId::new("1.2.3.4", "1").unwrap());
		let csr = CertificateSigningRequest::parse(&params.serialize_pem(&key).unwrap()).unwrap();
		assert_eq!(csr.organization_id(), Err(Error::MissingOrganizationId));
		assert_eq!(
			csr.requested_names(),
			&[RequestedName::OtherName {
				oid: vec![1, 2, 3, 4],
				value: Some("1".into())
			}]
		);
	}

	#[test]
	fn tampered_request_fails_signature() {
		let key = KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384).unwrap();
		let mut der = params().serialize_der(&key).unwrap();
		let pos = der
			.windows(4)
			.position(|w| w == b"town")
			.unwrap();
		der[pos] = b'g';
		let csr = CertificateSigningRequest::from_der(&der).unwrap();
		assert!(!csr.verify_self_signature());
		assert_eq!(csr.subject().to_string(), "CN=test,O=test,C=NL,L=gown");
	}

	#[test]
	fn rejects_garbage() {
		assert!(matches!(
			CertificateSigningRequest::parse("not a pem"),
			Err(Error::MalformedInput(_))
		));
		let pem = pem::encode(&Pem::new("CERTIFICATE REQUEST", vec![0x30, 0x00]));
		assert!(matches!(
			CertificateSigningRequest::parse(&pem),
			Err(Error::MalformedInput(_))
		));
		let pem = pem::encode(&Pem::new("PRIVATE KEY", vec![0x30, 0x00]));
		assert!(matches!(
			CertificateSigningRequest::parse(&pem),
			Err(Error::MalformedInput(_))
		));
	}

	/// A request carrying only an emailAddress attribute, as a UTF8String
	fn request_with_utf8_email(key: &KeyPair, email: &str) -> Vec<u8> {
		key.sign_der(|writer| {
			writer.next().write_u8(0);
			write_distinguished_name(writer.next(), &params().distinguished_name);
			writer.next().write_der(&key.subject_public_key_info());
			writer
				.next()
				.write_tagged_implicit(Tag::context(0), |writer| {
					writer.write_set_of(|writer| {
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
			Ok(())
		})
		.unwrap()
	}

	#[test]
	fn utf8_email_must_be_ascii() {
		let key = KeyPair::generate().unwrap();
		let der = request_with_utf8_email(&key, "info@example.com");
		let csr = CertificateSigningRequest::from_der(&der).unwrap();
		assert!(csr.verify_self_signature());
		assert_eq!(csr.email(), Some("info@example.com"));

		let der = request_with_utf8_email(&key, "jörg@example.nl");
		assert!(matches!(
			CertificateSigningRequest::from_der(&der),
			Err(Error::MalformedInput(_))
		));
	}

	#[test]
	fn non_ascii_email_is_not_written() {
		let key = KeyPair::generate().unwrap();
		let mut params = params();
		params.email = Some("jörg@example.nl".into());
		assert!(matches!(
			params.serialize_der(&key),
			Err(Error::MalformedInput(_))
		));
	}

	#[test]
	fn other_name_value_encodings() {
		let explicit = yasna::construct_der(|writer| {
			writer.write_tagged(Tag::context(0), |writer| writer.write_utf8_string("1"))
		});
		assert_eq!(read_other_name_value(&explicit), Some("1".into()));
		let bare = yasna::construct_der(|writer| writer.write_utf8_string("2"));
		assert_eq!(read_other_name_value(&bare), Some("2".into()));
		let int = yasna::construct_der(|writer| writer.write_u8(3));
		assert_eq!(read_other_name_value(&int), None);
	}
}
