use pem::Pem;
use pki_types::CertificateDer;
use ring::digest;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};
use yasna::models::{GeneralizedTime, ObjectIdentifier, UTCTime};
use yasna::{DERWriter, Tag};

use crate::dn::write_distinguished_name;
use crate::error::ExternalError;
use crate::key_pair::PublicKeyData;
use crate::{oid, DistinguishedName, Error, KeyPair, PartyId, SerialNumber, ENCODE_CONFIG};

/// An issued certificate
#[derive(Debug, Clone)]
pub struct Certificate {
	der: CertificateDer<'static>,
}

impl Certificate {
	/// Get the certificate in DER encoded format.
	///
	/// [`CertificateDer`] implements `Deref<Target = [u8]>` and `AsRef<[u8]>`, so you can easily
	/// extract the DER bytes from the return value.
	pub fn der(&self) -> &CertificateDer<'static> {
		&self.der
	}
	/// Get the certificate in PEM encoded format.
	pub fn pem(&self) -> String {
		pem::encode_config(&Pem::new("CERTIFICATE", self.der().to_vec()), ENCODE_CONFIG)
	}
}

impl From<Certificate> for CertificateDer<'static> {
	fn from(cert: Certificate) -> Self {
		cert.der
	}
}

/// Parameters used for certificate generation
#[allow(missing_docs)]
#[non_exhaustive]
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CertificateParams {
	pub not_before: OffsetDateTime,
	pub not_after: OffsetDateTime,
	pub serial_number: Option<SerialNumber>,
	pub subject_alt_names: Vec<SanType>,
	pub distinguished_name: DistinguishedName,
	/// The encoded subject name, written as is instead of `distinguished_name` when set
	///
	/// Issuance copies the subject of a request this way so that the string
	/// types and attribute order survive unchanged.
	pub raw_subject: Option<Vec<u8>>,
	pub is_ca: IsCa,
	/// Whether the basicConstraints extension is marked critical
	pub basic_constraints_critical: bool,
	pub key_usages: Vec<KeyUsagePurpose>,
	pub name_constraints: Option<NameConstraints>,
	/// If `true`, the 'Authority Key Identifier' extension will be added to the generated cert
	pub use_authority_key_identifier_extension: bool,
}

impl Default for CertificateParams {
	fn default() -> Self {
		// not_before and not_after set to reasonably long dates
		let not_before = date_time_ymd(1975, 1, 1);
		let not_after = date_time_ymd(4096, 1, 1);
		CertificateParams {
			not_before,
			not_after,
			serial_number: None,
			subject_alt_names: Vec::new(),
			distinguished_name: DistinguishedName::new(),
			raw_subject: None,
			is_ca: IsCa::NoCa,
			basic_constraints_critical: true,
			key_usages: Vec::new(),
			name_constraints: None,
			use_authority_key_identifier_extension: false,
		}
	}
}

impl CertificateParams {
	/// Parameters for a certificate valid from now for `days` days
	pub fn valid_for_days(days: u32) -> Self {
		let not_before = OffsetDateTime::now_utc();
		CertificateParams {
			not_before,
			not_after: not_before + time::Duration::days(i64::from(days)),
			..Default::default()
		}
	}

	/// Generate a new certificate from the given parameters, signed by the provided issuer.
	///
	/// The returned certificate will have its issuer field set to the subject of the
	/// provided `issuer`, and the authority key identifier extension will be populated using
	/// the key identifier of `issuer` when requested. It will be signed by the issuer's key.
	///
	/// Note that no validation of the `issuer` certificate is performed.
	pub fn signed_by(
		&self,
		public_key: &impl PublicKeyData,
		issuer: &Issuer,
	) -> Result<Certificate, Error> {
		let der = self.serialize_der_with_signer(public_key, issuer)?;
		Ok(Certificate {
			der: CertificateDer::from(der),
		})
	}

	/// Generates a new self-signed certificate from the given parameters.
	pub fn self_signed(&self, key_pair: &KeyPair) -> Result<Certificate, Error> {
		let issuer = Issuer::from_params(self, key_pair);
		self.signed_by(key_pair, &issuer)
	}

	fn subject_der(&self) -> Vec<u8> {
		match &self.raw_subject {
			Some(raw) => raw.clone(),
			None => yasna::construct_der(|writer| {
				write_distinguished_name(writer, &self.distinguished_name)
			}),
		}
	}

	fn serialize_der_with_signer<K: PublicKeyData>(
		&self,
		pub_key: &K,
		issuer: &Issuer,
	) -> Result<Vec<u8>, Error> {
		for san in &self.subject_alt_names {
			san.check()?;
		}
		let pub_key_spki = pub_key.subject_public_key_info();
		issuer.key_pair.sign_der(|writer| {
			// Write version
			writer.next().write_tagged(Tag::context(0), |writer| {
				writer.write_u8(2);
			});
			// Write serialNumber
			if let Some(ref serial) = self.serial_number {
				writer.next().write_bigint_bytes(serial.as_ref(), true);
			} else {
				let hash = digest::digest(&digest::SHA256, &pub_key_spki);
				// RFC 5280 specifies at most 20 bytes for a serial number
				let mut sl = hash.as_ref()[0..20].to_vec();
				sl[0] &= 0x7f; // MSB must be 0 to ensure encoding bignum in 20 bytes
				writer.next().write_bigint_bytes(&sl, true);
			};
			// Write signature algorithm
			issuer.key_pair.algorithm().write_alg_ident(writer.next());
			// Write issuer name
			writer.next().write_der(&issuer.name_der);
			// Write validity
			writer.next().write_sequence(|writer| {
				// Not before
				write_dt_utc_or_generalized(writer.next(), self.not_before);
				// Not after
				write_dt_utc_or_generalized(writer.next(), self.not_after);
			});
			// Write subject
			writer.next().write_der(&self.subject_der());
			// Write subjectPublicKeyInfo
			writer.next().write_der(&pub_key_spki);
			// write extensions
			writer.next().write_tagged(Tag::context(3), |writer| {
				writer.write_sequence(|writer| {
					if self.use_authority_key_identifier_extension {
						write_x509_authority_key_identifier(writer.next(), &issuer.key_identifier);
					}
					// Write subject_alt_names
					if !self.subject_alt_names.is_empty() {
						self.write_subject_alt_names(writer.next());
					}
					// Write standard key usage
					self.write_key_usage(writer.next());
					if let Some(name_constraints) = &self.name_constraints {
						// If both trees are empty, the extension must be omitted.
						if !name_constraints.is_empty() {
							write_name_constraints(writer.next(), name_constraints);
						}
					}
					// Write subject_key_identifier
					write_x509_extension(
						writer.next(),
						oid::SUBJECT_KEY_IDENTIFIER,
						false,
						|writer| {
							writer.write_bytes(&key_identifier(&pub_key_spki));
						},
					);
					// Write basic_constraints
					write_x509_extension(
						writer.next(),
						oid::BASIC_CONSTRAINTS,
						self.basic_constraints_critical,
						|writer| {
							writer.write_sequence(|writer| {
								if let IsCa::Ca(constraint) = &self.is_ca {
									writer.next().write_bool(true); // cA flag
									if let BasicConstraints::Constrained(path_len_constraint) =
										constraint
									{
										writer.next().write_u8(*path_len_constraint);
									}
								}
							});
						},
					);
				});
			});
			Ok(())
		})
	}

	fn write_subject_alt_names(&self, writer: DERWriter) {
		// Per https://tools.ietf.org/html/rfc5280#section-4.1.2.6, SAN must be marked
		// as critical if subject is empty.
		let critical = self.raw_subject.is_none() && self.distinguished_name.is_empty();
		write_x509_extension(writer, oid::SUBJECT_ALT_NAME, critical, |writer| {
			write_general_names(writer, &self.subject_alt_names)
		});
	}

	/// Write a certificate's KeyUsage as defined in RFC 5280.
	fn write_key_usage(&self, writer: DERWriter) {
		if self.key_usages.is_empty() {
			return;
		}

		// "When present, conforming CAs SHOULD mark this extension as critical."
		write_x509_extension(writer, oid::KEY_USAGE, true, |writer| {
			let bits = self
				.key_usages
				.iter()
				.fold(0u16, |bits, usage| bits | 1 << usage.bit());

			// Compute the 1-based most significant bit
			let msb = 16 - bits.leading_zeros();
			let nb = if msb <= 8 { 1 } else { 2 };
			let bits = bits.reverse_bits().to_be_bytes();

			// Finally take only the bytes != 0
			writer.write_bitvec_bytes(&bits[..nb], msb as usize)
		});
	}
}

pub(crate) fn write_general_names(writer: DERWriter, names: &[SanType]) {
	writer.write_sequence(|writer| {
		for san in names {
			writer
				.next()
				.write_tagged_implicit(Tag::context(san.tag()), |writer| match san {
					SanType::Rfc822Name(name) => writer.write_ia5_string(name),
					SanType::OtherName(party) => {
						// otherName SEQUENCE { OID, [0] explicit any defined by oid }
						// https://datatracker.ietf.org/doc/html/rfc5280#page-38
						writer.write_sequence(|writer| {
							writer
								.next()
								.write_oid(&ObjectIdentifier::from_slice(&party.oid_components()));
							writer.next().write_tagged(Tag::context(0), |writer| {
								writer.write_utf8_string(party.value())
							});
						});
					},
				});
		}
	});
}

fn write_name_constraints(writer: DERWriter, name_constraints: &NameConstraints) {
	write_x509_extension(writer, oid::NAME_CONSTRAINTS, true, |writer| {
		writer.write_sequence(|writer| {
			if !name_constraints.permitted_subtrees.is_empty() {
				write_general_subtrees(writer.next(), 0, &name_constraints.permitted_subtrees);
			}
			if !name_constraints.excluded_subtrees.is_empty() {
				write_general_subtrees(writer.next(), 1, &name_constraints.excluded_subtrees);
			}
		});
	});
}

fn write_general_subtrees(writer: DERWriter, tag: u64, general_subtrees: &[GeneralSubtree]) {
	writer.write_tagged_implicit(Tag::context(tag), |writer| {
		writer.write_sequence(|writer| {
			for subtree in general_subtrees.iter() {
				writer.next().write_sequence(|writer| match subtree {
					// Name is a CHOICE, so the [4] tag of directoryName is explicit
					GeneralSubtree::DirectoryName(name) => writer
						.next()
						.write_tagged(Tag::context(TAG_DIRECTORY_NAME), |writer| {
							write_distinguished_name(writer, name)
						}),
				});
				// minimum must be 0 (the default) and maximum must be absent
			}
		});
	});
}

pub(crate) fn write_x509_extension(
	writer: DERWriter,
	extension_oid: &[u64],
	is_critical: bool,
	value_serializer: impl FnOnce(DERWriter),
) {
	// Extension specification:
	//    Extension  ::=  SEQUENCE  {
	//         extnID      OBJECT IDENTIFIER,
	//         critical    BOOLEAN DEFAULT FALSE,
	//         extnValue   OCTET STRING
	//                     -- contains the DER encoding of an ASN.1 value
	//                     -- corresponding to the extension type identified
	//                     -- by extnID
	//         }

	writer.write_sequence(|writer| {
		let oid = ObjectIdentifier::from_slice(extension_oid);
		writer.next().write_oid(&oid);
		if is_critical {
			writer.next().write_bool(true);
		}
		let bytes = yasna::construct_der(value_serializer);
		writer.next().write_bytes(&bytes);
	})
}

/// Serializes an X.509v3 authority key identifier extension according to RFC 5280.
fn write_x509_authority_key_identifier(writer: DERWriter, aki: &[u8]) {
	// 'The keyIdentifier field of the authorityKeyIdentifier extension MUST
	//  be included in all certificates generated by conforming CAs to
	//  facilitate certification path construction.'
	write_x509_extension(writer, oid::AUTHORITY_KEY_IDENTIFIER, false, |writer| {
		writer.write_sequence(|writer| {
			writer
				.next()
				.write_tagged_implicit(Tag::context(0), |writer| writer.write_bytes(aki))
		});
	});
}

/// Truncated SHA-256 of the SubjectPublicKeyInfo, method 1 of RFC 7093
pub(crate) fn key_identifier(spki_der: &[u8]) -> Vec<u8> {
	let digest = digest::digest(&digest::SHA256, spki_der);
	digest.as_ref()[0..20].to_vec()
}

/// The signing side of certificate generation: who signs, and how the issuer is named
///
/// Built either from an existing CA certificate and its key, or from the
/// parameters of a certificate that signs itself.
pub struct Issuer<'a> {
	/// The encoded subject of the issuer certificate, written as the issuer field
	name_der: Vec<u8>,
	/// Written as the authority key identifier
	key_identifier: Vec<u8>,
	key_pair: &'a KeyPair,
}

impl<'a> Issuer<'a> {
	/// Uses the CA certificate in `ca_der` signing with `key_pair`
	///
	/// Fails with [`Error::SigningFailure`] when the key does not belong to the certificate.
	pub fn from_ca_cert_der(ca_der: &[u8], key_pair: &'a KeyPair) -> Result<Self, Error> {
		use x509_parser::extensions::ParsedExtension;

		let (_, ca) = x509_parser::parse_x509_certificate(ca_der)._err()?;
		let ca_public_key: &[u8] = ca.public_key().subject_public_key.data.as_ref();
		if ca_public_key != key_pair.public_key_raw() {
			return Err(Error::SigningFailure(
				"the CA key does not belong to the CA certificate".into(),
			));
		}

		let key_identifier = ca
			.extensions()
			.iter()
			.find_map(|ext| match ext.parsed_extension() {
				ParsedExtension::SubjectKeyIdentifier(ki) => Some(ki.0.to_vec()),
				_ => None,
			})
			.unwrap_or_else(|| key_identifier(ca.public_key().raw));

		Ok(Self {
			name_der: ca.subject().as_raw().to_vec(),
			key_identifier,
			key_pair,
		})
	}

	/// Uses the subject of `params` as issuer name, for self-signed certificates
	pub fn from_params(params: &CertificateParams, key_pair: &'a KeyPair) -> Self {
		Self {
			name_der: params.subject_der(),
			key_identifier: key_identifier(&key_pair.public_key_der()),
			key_pair,
		}
	}

	/// The key identifier written into the authority key identifier of issued certificates
	pub fn key_identifier(&self) -> &[u8] {
		&self.key_identifier
	}
}

/// A general name of a subjectAltName, restricted to the kinds this crate writes
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum SanType {
	/// An otherName carrying a party identifier as `[0] EXPLICIT UTF8String`
	OtherName(PartyId),
	/// Also known as E-Mail address, restricted to IA5 (ASCII) characters
	Rfc822Name(String),
}

// Defined in the GeneralName list in
// https://tools.ietf.org/html/rfc5280#page-38
const TAG_OTHER_NAME: u64 = 0;
const TAG_RFC822_NAME: u64 = 1;
const TAG_DIRECTORY_NAME: u64 = 4;

impl SanType {
	fn tag(&self) -> u64 {
		match self {
			SanType::OtherName(_party) => TAG_OTHER_NAME,
			SanType::Rfc822Name(_name) => TAG_RFC822_NAME,
		}
	}

	/// Fails for names that cannot be encoded
	fn check(&self) -> Result<(), Error> {
		match self {
			SanType::Rfc822Name(name) if !name.is_ascii() => Err(Error::MalformedInput(format!(
				"rfc822Name {:?} is not an IA5String",
				name
			))),
			_ => Ok(()),
		}
	}
}

/// The [NameConstraints extension](https://tools.ietf.org/html/rfc5280#section-4.2.1.10)
/// (only relevant for CA certificates)
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NameConstraints {
	/// A list of subtrees that the domain has to match.
	pub permitted_subtrees: Vec<GeneralSubtree>,
	/// A list of subtrees that the domain must not match.
	///
	/// Any name matching an excluded subtree is invalid even if it also matches a permitted subtree.
	pub excluded_subtrees: Vec<GeneralSubtree>,
}

impl NameConstraints {
	fn is_empty(&self) -> bool {
		self.permitted_subtrees.is_empty() && self.excluded_subtrees.is_empty()
	}
}

#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
/// General Subtree type.
pub enum GeneralSubtree {
	/// Names below this distinguished name
	DirectoryName(DistinguishedName),
}

/// One of the purposes contained in the [key usage extension](https://tools.ietf.org/html/rfc5280#section-4.2.1.3)
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum KeyUsagePurpose {
	/// digitalSignature
	DigitalSignature,
	/// contentCommitment / nonRepudiation
	ContentCommitment,
	/// keyEncipherment
	KeyEncipherment,
	/// dataEncipherment
	DataEncipherment,
	/// keyAgreement
	KeyAgreement,
	/// keyCertSign
	KeyCertSign,
	/// cRLSign
	CrlSign,
	/// encipherOnly
	EncipherOnly,
	/// decipherOnly
	DecipherOnly,
}

impl KeyUsagePurpose {
	/// Index of the named bit in the KeyUsage BIT STRING
	fn bit(&self) -> u16 {
		use KeyUsagePurpose::*;
		match self {
			DigitalSignature => 0,
			ContentCommitment => 1,
			KeyEncipherment => 2,
			DataEncipherment => 3,
			KeyAgreement => 4,
			KeyCertSign => 5,
			CrlSign => 6,
			EncipherOnly => 7,
			DecipherOnly => 8,
		}
	}
}

/// Whether the certificate is allowed to sign other certificates
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum IsCa {
	/// The certificate can only sign itself, `CA:FALSE` is written
	NoCa,
	/// The certificate may be used to sign other certificates
	Ca(BasicConstraints),
}

/// The path length constraint (only relevant for CA certificates)
///
/// Sets an optional upper limit on the length of the intermediate certificate chain
/// length allowed for this CA certificate (not including the end entity certificate).
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum BasicConstraints {
	/// No constraint
	Unconstrained,
	/// Constrain to the contained number of intermediate certificates
	Constrained(u8),
}

/// Helper to obtain an `OffsetDateTime` from year, month, day values
///
/// Out of range dates collapse to the unix epoch.
pub fn date_time_ymd(year: i32, month: u8, day: u8) -> OffsetDateTime {
	let date = Month::try_from(month)
		.ok()
		.and_then(|month| Date::from_calendar_date(year, month, day).ok());
	match date {
		Some(date) => PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_utc(),
		None => OffsetDateTime::UNIX_EPOCH,
	}
}

fn dt_strip_nanos(dt: OffsetDateTime) -> OffsetDateTime {
	// Set nanoseconds to zero
	// This is needed because the GeneralizedTime serializer would otherwise
	// output fractional values which RFC 5280 explicitly forbode [1].
	// UTCTime cannot express fractional seconds or leap seconds
	// therefore, it needs to be stripped of nanoseconds fully.
	// [1]: https://tools.ietf.org/html/rfc5280#section-4.1.2.5.2
	dt.replace_nanosecond(0).unwrap_or(dt)
}

fn write_dt_utc_or_generalized(writer: DERWriter, dt: OffsetDateTime) {
	// RFC 5280 requires CAs to write certificate validity dates
	// below 2050 as UTCTime, and anything starting from 2050
	// as GeneralizedTime [1]. The RFC doesn't say anything
	// about dates before 1950, but as UTCTime can't represent
	// them, we have to use GeneralizedTime if we want to or not.
	// [1]: https://tools.ietf.org/html/rfc5280#section-4.1.2.5
	let date_time = dt_strip_nanos(dt);
	if (1950..2050).contains(&dt.year()) {
		writer.write_utctime(&UTCTime::from_datetime(date_time));
	} else {
		writer.write_generalized_time(&GeneralizedTime::from_datetime(date_time));
	}
}
