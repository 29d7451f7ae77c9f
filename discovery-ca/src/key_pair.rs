use std::fmt;

use pem::Pem;
use ring::rand::SystemRandom;
use ring::signature::{
	EcdsaKeyPair, Ed25519KeyPair, KeyPair as RingKeyPair, RsaEncoding, RsaKeyPair,
};
use yasna::{DERWriter, DERWriterSeq};

use crate::error::ExternalError;
use crate::sign_algo::{algo::*, SignAlgo, SignatureAlgorithm};
use crate::{Error, ENCODE_CONFIG};

/// A key pair variant
#[allow(clippy::large_enum_variant)]
enum KeyPairKind {
	/// A Ecdsa key pair
	Ec(EcdsaKeyPair),
	/// A Ed25519 key pair
	Ed(Ed25519KeyPair),
	/// A RSA key pair
	Rsa(RsaKeyPair, &'static dyn RsaEncoding),
}

impl fmt::Debug for KeyPairKind {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Ec(key_pair) => write!(f, "{:?}", key_pair),
			Self::Ed(key_pair) => write!(f, "{:?}", key_pair),
			Self::Rsa(key_pair, _) => write!(f, "{:?}", key_pair),
		}
	}
}

/// A key pair used to sign certificates, CSRs and directory payloads
///
/// Keys are read from and written to PKCS#8. Note that ring, the underlying
/// library, cannot generate RSA keys, and only loads RSA keys in PKCS#8 form.
/// See ring's [documentation](ring::signature::RsaKeyPair::from_pkcs8).
#[derive(Debug)]
pub struct KeyPair {
	kind: KeyPairKind,
	alg: &'static SignatureAlgorithm,
	serialized_der: Vec<u8>,
}

impl KeyPair {
	/// Generate a new random [`PKCS_ECDSA_P256_SHA256`] key pair
	pub fn generate() -> Result<Self, Error> {
		Self::generate_for(&PKCS_ECDSA_P256_SHA256)
	}

	/// Generate a new random key pair for the specified signature algorithm
	///
	/// RSA key generation is unavailable and reported as [`Error::SigningFailure`].
	pub fn generate_for(alg: &'static SignatureAlgorithm) -> Result<Self, Error> {
		let rng = &SystemRandom::new();
		let pkcs8 = match alg.sign_alg {
			SignAlgo::EcDsa(sign_alg) => EcdsaKeyPair::generate_pkcs8(sign_alg, rng)._err()?,
			SignAlgo::EdDsa(_) => Ed25519KeyPair::generate_pkcs8(rng)._err()?,
			// https://github.com/briansmith/ring/issues/219
			SignAlgo::Rsa(_) => {
				return Err(Error::SigningFailure(
					"RSA key generation is not supported".into(),
				))
			},
		};
		Self::load(pkcs8.as_ref(), alg).ok_or_else(|| {
			Error::SigningFailure("generated key could not be loaded".into())
		})
	}

	/// Loads `pkcs8` as a key of `alg`, if it is one
	fn load(pkcs8: &[u8], alg: &'static SignatureAlgorithm) -> Option<Self> {
		let kind = match alg.sign_alg {
			SignAlgo::EcDsa(sign_alg) => {
				EcdsaKeyPair::from_pkcs8(sign_alg, pkcs8, &SystemRandom::new())
					.ok()
					.map(KeyPairKind::Ec)
			},
			SignAlgo::EdDsa(_) => Ed25519KeyPair::from_pkcs8_maybe_unchecked(pkcs8)
				.ok()
				.map(KeyPairKind::Ed),
			SignAlgo::Rsa(encoding) => RsaKeyPair::from_pkcs8(pkcs8)
				.ok()
				.map(|kp| KeyPairKind::Rsa(kp, encoding)),
		}?;
		Some(KeyPair {
			kind,
			alg,
			serialized_der: pkcs8.to_vec(),
		})
	}

	/// Returns the key pair's signature algorithm
	pub fn algorithm(&self) -> &'static SignatureAlgorithm {
		self.alg
	}

	/// Parses the key pair from a PKCS#8 `PRIVATE KEY` PEM block
	pub fn from_pem(pem_str: &str) -> Result<Self, Error> {
		let private_key = pem::parse(pem_str)._err()?;
		if private_key.tag() != "PRIVATE KEY" {
			return Err(Error::MalformedInput(format!(
				"expected a PRIVATE KEY block, found {}",
				private_key.tag()
			)));
		}
		Self::try_from(private_key.contents())
	}

	/// Get the raw public key of this key pair
	///
	/// The key is in raw format, as how [`ring::signature::KeyPair::public_key`]
	/// would output, and how [`ring::signature::UnparsedPublicKey::verify`]
	/// would accept. It equals the BIT STRING content of the
	/// SubjectPublicKeyInfo of a certificate issued for this key.
	pub fn public_key_raw(&self) -> &[u8] {
		match &self.kind {
			KeyPairKind::Ec(kp) => kp.public_key().as_ref(),
			KeyPairKind::Ed(kp) => kp.public_key().as_ref(),
			KeyPairKind::Rsa(kp, _) => kp.public_key().as_ref(),
		}
	}

	pub(crate) fn sign_der(
		&self,
		f: impl FnOnce(&mut DERWriterSeq<'_>) -> Result<(), Error>,
	) -> Result<Vec<u8>, Error> {
		yasna::try_construct_der(|writer| {
			writer.write_sequence(|writer| {
				let data = yasna::try_construct_der(|writer| writer.write_sequence(f))?;
				writer.next().write_der(&data);

				// Write signatureAlgorithm
				self.alg.write_alg_ident(writer.next());

				// Write signature
				let sig = self.sign(&data)?;
				writer.next().write_bitvec_bytes(&sig, sig.len() * 8);

				Ok(())
			})
		})
	}

	/// Signs `msg` with this key, returning the raw signature bytes
	pub fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, Error> {
		let signature = match &self.kind {
			KeyPairKind::Ec(kp) => {
				let system_random = SystemRandom::new();
				kp.sign(&system_random, msg)._err()?.as_ref().to_vec()
			},
			KeyPairKind::Ed(kp) => kp.sign(msg).as_ref().to_vec(),
			KeyPairKind::Rsa(kp, padding_alg) => {
				let system_random = SystemRandom::new();
				let mut signature = vec![0; kp.public().modulus_len()];
				kp.sign(*padding_alg, &system_random, msg, &mut signature)
					._err()?;
				signature
			},
		};
		Ok(signature)
	}

	/// Return the key pair's public key in DER format
	///
	/// The key is formatted according to the SubjectPublicKeyInfo struct of
	/// X.509.
	/// See [RFC 5280 section 4.1](https://tools.ietf.org/html/rfc5280#section-4.1).
	pub fn public_key_der(&self) -> Vec<u8> {
		yasna::construct_der(|writer| self.serialize_public_key_der(writer))
	}

	fn serialize_public_key_der(&self, writer: DERWriter) {
		writer.write_sequence(|writer| {
			self.alg.write_oids_sign_alg(writer.next());
			let pk = self.public_key_raw();
			writer.next().write_bitvec_bytes(pk, pk.len() * 8);
		})
	}

	/// Serializes the key pair (including the private key) in PKCS#8 format in PEM
	pub fn serialize_pem(&self) -> String {
		let p = Pem::new("PRIVATE KEY", self.serialized_der.clone());
		pem::encode_config(&p, ENCODE_CONFIG)
	}
}

impl TryFrom<&[u8]> for KeyPair {
	type Error = Error;

	/// Detects the algorithm of a PKCS#8 key; RSA keys sign with SHA-256
	fn try_from(pkcs8: &[u8]) -> Result<KeyPair, Error> {
		[
			&PKCS_ED25519,
			&PKCS_ECDSA_P256_SHA256,
			&PKCS_ECDSA_P384_SHA384,
			&PKCS_RSA_SHA256,
		]
		.into_iter()
		.find_map(|alg| Self::load(pkcs8, alg))
		.ok_or_else(|| Error::MalformedInput("could not parse the PKCS#8 private key".into()))
	}
}

/// A public key that can be placed in the subjectPublicKeyInfo of a certificate
pub trait PublicKeyData {
	/// The SubjectPublicKeyInfo structure in DER
	fn subject_public_key_info(&self) -> Vec<u8>;
}

impl PublicKeyData for KeyPair {
	fn subject_public_key_info(&self) -> Vec<u8> {
		self.public_key_der()
	}
}
