//! Conversion between a PEM blob holding several certificates and the
//! individual PEM encoded certificates.

use pem::Pem;

use crate::error::ExternalError;
use crate::{Error, ENCODE_CONFIG};

const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// Splits a concatenated PEM chain into one PEM text per certificate, in order
///
/// ```
/// # use discovery_ca::chain;
/// assert!(chain::split("").unwrap().is_empty());
/// ```
pub fn split(chain: &str) -> Result<Vec<String>, Error> {
	let blocks = pem::parse_many(chain)._err()?;
	blocks
		.iter()
		.map(|block| {
			if block.tag() != CERTIFICATE_TAG {
				return Err(Error::MalformedInput(format!(
					"expected a {} block in chain, found {}",
					CERTIFICATE_TAG,
					block.tag()
				)));
			}
			Ok(pem::encode_config(block, ENCODE_CONFIG))
		})
		.collect()
}

/// Joins PEM encoded certificates into a single chain
pub fn join<S: AsRef<str>>(certificates: &[S]) -> String {
	let mut chain = String::new();
	for certificate in certificates {
		let certificate = certificate.as_ref();
		chain.push_str(certificate);
		if !certificate.ends_with('\n') {
			chain.push('\n');
		}
	}
	chain
}

/// Encodes DER certificate bytes as PEM
pub fn encode_certificate(der: &[u8]) -> String {
	pem::encode_config(&Pem::new(CERTIFICATE_TAG, der.to_vec()), ENCODE_CONFIG)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cert(byte: u8) -> String {
		encode_certificate(&[0x30, 0x03, 0x02, 0x01, byte])
	}

	#[test]
	fn split_join() {
		let certs = vec![cert(1), cert(2), cert(3)];
		let chain = join(&certs);
		assert_eq!(split(&chain).unwrap(), certs);
	}

	#[test]
	fn join_without_trailing_newline() {
		let first = cert(1);
		let trimmed = first.trim_end().to_string();
		let chain = join(&[trimmed, cert(2)]);
		assert_eq!(split(&chain).unwrap(), vec![cert(1), cert(2)]);
	}

	#[test]
	fn rejects_other_blocks() {
		let key = pem::encode(&Pem::new("PRIVATE KEY", vec![1, 2, 3]));
		let chain = join(&[cert(1), key]);
		assert!(matches!(split(&chain), Err(Error::MalformedInput(_))));
	}
}
