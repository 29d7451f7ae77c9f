use std::sync::{Mutex, MutexGuard};

use super::{IssuedCertificate, NewRequest, PendingRequest, RequestId, State, Store};
use crate::{Error, PartyId};

/// A [`Store`] keeping everything in memory behind a mutex
#[derive(Debug, Default)]
pub struct MemoryStore {
	state: Mutex<State>,
}

impl MemoryStore {
	/// Creates an empty store
	pub fn new() -> Self {
		Self::default()
	}

	fn state(&self) -> Result<MutexGuard<'_, State>, Error> {
		self.state
			.lock()
			.map_err(|_| Error::Storage("memory store lock poisoned".into()))
	}
}

impl Store for MemoryStore {
	fn insert_request(&self, request: NewRequest) -> Result<PendingRequest, Error> {
		Ok(self.state()?.insert_request(request))
	}

	fn request(&self, id: RequestId) -> Result<Option<PendingRequest>, Error> {
		Ok(self.state()?.request(id))
	}

	fn requests_by_organization(&self, party: &PartyId) -> Result<Vec<PendingRequest>, Error> {
		Ok(self.state()?.requests_by_organization(party))
	}

	fn certificates_by_organization(
		&self,
		party: &PartyId,
	) -> Result<Vec<IssuedCertificate>, Error> {
		Ok(self.state()?.certificates_by_organization(party))
	}

	fn count_certificates(&self, issuer: &str) -> Result<u64, Error> {
		Ok(self.state()?.count_certificates(issuer))
	}

	fn salt_or_insert(&self, issuer: &str, candidate: &str) -> Result<String, Error> {
		Ok(self.state()?.salt_or_insert(issuer, candidate))
	}

	fn commit_issuance(
		&self,
		certificate: IssuedCertificate,
		request_id: RequestId,
	) -> Result<(), Error> {
		self.state()?.commit_issuance(certificate, request_id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn memory_store() {
		super::super::tests::exercise(&MemoryStore::new());
	}
}
