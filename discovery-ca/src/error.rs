use std::fmt;

#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
/// The error type of the discovery-ca crate
pub enum Error {
	/// The input did not decode to the expected structure
	MalformedInput(String),
	/// The self-signature of a certificate signing request did not verify
	InvalidSignature,
	/// The request does not carry an organization identifier
	MissingOrganizationId,
	/// A configured certificate or key could not be resolved
	ResourceNotFound(String),
	/// A cryptographic step of issuance failed
	SigningFailure(String),
	/// A named request or certificate does not exist
	NotFound(String),
	/// The persistence backend failed
	Storage(String),
	/// The configuration is unusable
	Config(String),
}

impl Error {
	/// Whether the error is caused by the caller's input rather than by the service
	pub fn is_client_error(&self) -> bool {
		matches!(
			self,
			Error::MalformedInput(_)
				| Error::InvalidSignature
				| Error::MissingOrganizationId
				| Error::NotFound(_)
		)
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		use self::Error::*;
		match self {
			MalformedInput(e) => write!(f, "Malformed input: {}", e)?,
			InvalidSignature => write!(
				f,
				"The signature of the certificate signing request is invalid"
			)?,
			MissingOrganizationId => write!(
				f,
				"The certificate signing request has no organization identifier in its subjectAltName"
			)?,
			ResourceNotFound(e) => write!(f, "{}", e)?,
			SigningFailure(e) => write!(f, "Signing failed: {}", e)?,
			NotFound(e) => write!(f, "Not found: {}", e)?,
			Storage(e) => write!(f, "Storage error: {}", e)?,
			Config(e) => write!(f, "Configuration error: {}", e)?,
		};
		Ok(())
	}
}

impl std::error::Error for Error {}

/// A trait describing an error that can be converted into a discovery-ca [`Error`].
///
/// We use this trait to avoid leaking external error types into the public API
/// through a `From<x> for Error` implementation.
pub(crate) trait ExternalError<T>: Sized {
	fn _err(self) -> Result<T, Error>;
}

impl<T> ExternalError<T> for Result<T, ring::error::KeyRejected> {
	fn _err(self) -> Result<T, Error> {
		self.map_err(|e| Error::SigningFailure(format!("key rejected: {}", e)))
	}
}

impl<T> ExternalError<T> for Result<T, ring::error::Unspecified> {
	fn _err(self) -> Result<T, Error> {
		self.map_err(|_| Error::SigningFailure("unspecified cryptographic failure".into()))
	}
}

impl<T> ExternalError<T> for Result<T, pem::PemError> {
	fn _err(self) -> Result<T, Error> {
		self.map_err(|e| Error::MalformedInput(e.to_string()))
	}
}

impl<T> ExternalError<T> for Result<T, std::io::Error> {
	fn _err(self) -> Result<T, Error> {
		self.map_err(|e| Error::Storage(e.to_string()))
	}
}

impl<T> ExternalError<T> for Result<T, serde_json::Error> {
	fn _err(self) -> Result<T, Error> {
		self.map_err(|e| Error::Storage(e.to_string()))
	}
}

impl<T> ExternalError<T> for Result<T, toml::de::Error> {
	fn _err(self) -> Result<T, Error> {
		self.map_err(|e| Error::Config(e.to_string()))
	}
}

impl<T> ExternalError<T> for Result<T, x509_parser::nom::Err<x509_parser::error::X509Error>> {
	fn _err(self) -> Result<T, Error> {
		self.map_err(|e| Error::MalformedInput(e.to_string()))
	}
}

impl<T> ExternalError<T> for Result<T, x509_parser::error::X509Error> {
	fn _err(self) -> Result<T, Error> {
		self.map_err(|e| Error::MalformedInput(e.to_string()))
	}
}
