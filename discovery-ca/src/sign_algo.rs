use std::fmt;
use std::hash::{Hash, Hasher};

use ring::signature::{self, EcdsaSigningAlgorithm, EdDSAParameters, RsaEncoding};
use yasna::models::ObjectIdentifier;
use yasna::DERWriter;

use crate::party_id::dotted;
use crate::Error;

#[derive(Clone, Copy, Debug)]
pub(crate) enum SignAlgo {
	EcDsa(&'static EcdsaSigningAlgorithm),
	EdDsa(&'static EdDSAParameters),
	Rsa(&'static dyn RsaEncoding),
}

/// A signature algorithm keys can be generated, loaded and verified with
///
/// Two values are equal when they carry the same signature OID.
pub struct SignatureAlgorithm {
	name: &'static str,
	/// Algorithm and curve OIDs of the subjectPublicKeyInfo
	key_oids: &'static [&'static [u64]],
	/// OID written into the signatureAlgorithm of signed structures
	signature_oid: &'static [u64],
	/// RSA identifiers carry an explicit NULL parameter
	null_params: bool,
	pub(crate) sign_alg: SignAlgo,
	pub(crate) verify_alg: &'static dyn signature::VerificationAlgorithm,
}

impl fmt::Debug for SignatureAlgorithm {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.name)
	}
}

impl PartialEq for SignatureAlgorithm {
	fn eq(&self, other: &Self) -> bool {
		self.signature_oid == other.signature_oid
	}
}

impl Eq for SignatureAlgorithm {}

impl Hash for SignatureAlgorithm {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.signature_oid.hash(state);
	}
}

impl SignatureAlgorithm {
	pub(crate) fn all() -> &'static [&'static SignatureAlgorithm] {
		use algo::*;
		static ALL: &[&SignatureAlgorithm] = &[
			&PKCS_ECDSA_P384_SHA384,
			&PKCS_ECDSA_P256_SHA256,
			&PKCS_ED25519,
			&PKCS_RSA_SHA256,
		];
		ALL
	}

	/// Looks up the algorithm whose signature OID is `oid`
	pub fn from_oid(oid: &[u64]) -> Result<&'static SignatureAlgorithm, Error> {
		Self::all()
			.iter()
			.copied()
			.find(|alg| alg.signature_oid == oid)
			.ok_or_else(|| {
				Error::MalformedInput(format!("unsupported signature algorithm {}", dotted(oid)))
			})
	}

	/// The dotted signature OID, e.g. `1.2.840.10045.4.3.3`
	pub fn oid(&self) -> String {
		dotted(self.signature_oid)
	}

	/// Writes the AlgorithmIdentifier of signatures made with this algorithm
	pub(crate) fn write_alg_ident(&self, writer: DERWriter) {
		self.write_identifier(writer, &[self.signature_oid]);
	}

	/// Writes the AlgorithmIdentifier of a subjectPublicKeyInfo for this algorithm
	pub(crate) fn write_oids_sign_alg(&self, writer: DERWriter) {
		self.write_identifier(writer, self.key_oids);
	}

	fn write_identifier(&self, writer: DERWriter, oids: &[&[u64]]) {
		writer.write_sequence(|writer| {
			for oid in oids {
				writer.next().write_oid(&ObjectIdentifier::from_slice(oid));
			}
			if self.null_params {
				writer.next().write_null();
			}
		});
	}
}

/// The supported signature algorithms
pub(crate) mod algo {
	use super::*;
	use crate::oid::*;

	/// ecdsa-with-SHA384 on P-384 ([RFC 5758](https://tools.ietf.org/html/rfc5758#section-3.2)),
	/// the algorithm of the network's CA keys
	pub static PKCS_ECDSA_P384_SHA384: SignatureAlgorithm = SignatureAlgorithm {
		name: "PKCS_ECDSA_P384_SHA384",
		key_oids: &[EC_PUBLIC_KEY, EC_SECP_384_R1],
		signature_oid: &[1, 2, 840, 10045, 4, 3, 3],
		null_params: false,
		sign_alg: SignAlgo::EcDsa(&signature::ECDSA_P384_SHA384_ASN1_SIGNING),
		verify_alg: &signature::ECDSA_P384_SHA384_ASN1,
	};

	/// ecdsa-with-SHA256 on P-256 ([RFC 5758](https://tools.ietf.org/html/rfc5758#section-3.2))
	pub static PKCS_ECDSA_P256_SHA256: SignatureAlgorithm = SignatureAlgorithm {
		name: "PKCS_ECDSA_P256_SHA256",
		key_oids: &[EC_PUBLIC_KEY, EC_SECP_256_R1],
		signature_oid: &[1, 2, 840, 10045, 4, 3, 2],
		null_params: false,
		sign_alg: SignAlgo::EcDsa(&signature::ECDSA_P256_SHA256_ASN1_SIGNING),
		verify_alg: &signature::ECDSA_P256_SHA256_ASN1,
	};

	/// id-Ed25519 ([RFC 8410](https://tools.ietf.org/html/rfc8410))
	pub static PKCS_ED25519: SignatureAlgorithm = SignatureAlgorithm {
		name: "PKCS_ED25519",
		key_oids: &[&[1, 3, 101, 112]],
		signature_oid: &[1, 3, 101, 112],
		null_params: false,
		sign_alg: SignAlgo::EdDsa(&signature::ED25519),
		verify_alg: &signature::ED25519,
	};

	/// sha256WithRSAEncryption ([RFC 4055](https://tools.ietf.org/html/rfc4055))
	pub static PKCS_RSA_SHA256: SignatureAlgorithm = SignatureAlgorithm {
		name: "PKCS_RSA_SHA256",
		key_oids: &[RSA_ENCRYPTION],
		signature_oid: &[1, 2, 840, 113549, 1, 1, 11],
		null_params: true,
		sign_alg: SignAlgo::Rsa(&signature::RSA_PKCS1_SHA256),
		verify_alg: &signature::RSA_PKCS1_2048_8192_SHA256,
	};
}
