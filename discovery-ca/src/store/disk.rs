use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::{debug, error};
use serde::Serialize;
use tempfile::NamedTempFile;

use super::{IssuedCertificate, NewRequest, PendingRequest, RequestId, State, Store};
use crate::error::ExternalError;
use crate::{Error, PartyId};

const STATE_FILE: &str = "discovery-ca.json";

/// A [`Store`] persisting everything in a single JSON document under a directory
///
/// Every change is applied to a copy of the state, written to a temporary
/// file in the same directory and moved into place. A failed write leaves
/// both the file and the in-memory state untouched.
#[derive(Debug)]
pub struct DiskStore {
	path: PathBuf,
	state: Mutex<State>,
}

impl DiskStore {
	/// Opens the store in `dir`, creating the directory when needed
	pub fn open(dir: impl AsRef<Path>) -> Result<Self, Error> {
		let dir = dir.as_ref();
		fs::create_dir_all(dir).map_err(|e| {
			error!("Cannot create directory {}: {}", dir.display(), e);
			Error::Storage(format!("cannot create the data directory: {}", e))
		})?;
		let path = dir.join(STATE_FILE);
		let state = match fs::read(&path) {
			Ok(bytes) => serde_json::from_slice(&bytes)._err()?,
			Err(e) if e.kind() == io::ErrorKind::NotFound => State::default(),
			Err(e) => {
				error!("Cannot read {}: {}", path.display(), e);
				return Err(Error::Storage(format!("cannot read the store: {}", e)));
			},
		};
		debug!("Opened store at {}", path.display());
		Ok(Self {
			path,
			state: Mutex::new(state),
		})
	}

	fn state(&self) -> Result<MutexGuard<'_, State>, Error> {
		self.state
			.lock()
			.map_err(|_| Error::Storage("disk store lock poisoned".into()))
	}

	/// Runs `op` on a copy of the state and persists the copy when it succeeds
	fn update<T>(&self, op: impl FnOnce(&mut State) -> Result<T, Error>) -> Result<T, Error> {
		let mut state = self.state()?;
		let mut next = state.clone();
		let res = op(&mut next)?;
		self.persist(&next)?;
		*state = next;
		Ok(res)
	}

	fn persist(&self, state: &State) -> Result<(), Error> {
		write_json_atomic(&self.path, state)
	}
}

/// Serializes `value` into a temporary file next to `path` and moves it into place
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), Error> {
	let dir = path.parent().unwrap_or_else(|| Path::new("."));
	let mut tmp_file = NamedTempFile::new_in(dir)._err()?;
	{
		let mut writer = io::BufWriter::new(&mut tmp_file);
		serde_json::to_writer_pretty(&mut writer, value)._err()?;
		writer.flush()._err()?;
	}
	tmp_file.persist(path).map_err(|err| {
		error!(
			"Failed to rename temp file {} to {}: {}",
			err.file.path().display(),
			path.display(),
			err.error
		);
		Error::Storage(format!("failed to replace the stored state: {}", err.error))
	})?;
	Ok(())
}

impl Store for DiskStore {
	fn insert_request(&self, request: NewRequest) -> Result<PendingRequest, Error> {
		self.update(|state| Ok(state.insert_request(request)))
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
		{
			let state = self.state()?;
			if let Some(existing) = state.salts.get(issuer) {
				return Ok(existing.salt.clone());
			}
		}
		self.update(|state| Ok(state.salt_or_insert(issuer, candidate)))
	}

	fn commit_issuance(
		&self,
		certificate: IssuedCertificate,
		request_id: RequestId,
	) -> Result<(), Error> {
		self.update(|state| state.commit_issuance(certificate, request_id))
	}
}

#[cfg(test)]
mod tests {
	use assert_fs::TempDir;

	use super::*;
	use crate::store::tests::{exercise, issued, new_request};

	#[test]
	fn disk_store() {
		let dir = TempDir::new().unwrap();
		exercise(&DiskStore::open(dir.path()).unwrap());
	}

	#[test]
	fn survives_reopen() {
		let dir = TempDir::new().unwrap();
		let party = PartyId::organization("1").unwrap();
		{
			let store = DiskStore::open(dir.path()).unwrap();
			let request = store.insert_request(new_request("1")).unwrap();
			store.insert_request(new_request("1")).unwrap();
			store
				.commit_issuance(issued("1", "CN=ca", 1), request.id)
				.unwrap();
			store.salt_or_insert("CN=ca", "00ff").unwrap();
		}

		let store = DiskStore::open(dir.path()).unwrap();
		assert_eq!(store.requests_by_organization(&party).unwrap().len(), 1);
		assert_eq!(store.certificates_by_organization(&party).unwrap().len(), 1);
		assert_eq!(store.salt_or_insert("CN=ca", "1111").unwrap(), "00ff");

		// identifiers continue after reopening
		let next = store.insert_request(new_request("1")).unwrap();
		assert_eq!(next.id, RequestId(3));
	}

	#[test]
	fn corrupt_file_is_reported() {
		let dir = TempDir::new().unwrap();
		fs::write(dir.path().join(STATE_FILE), b"{ not json").unwrap();
		assert!(matches!(
			DiskStore::open(dir.path()),
			Err(Error::Storage(_))
		));
	}

	#[test]
	fn errors_do_not_name_the_directory() {
		let dir = TempDir::new().unwrap();
		// a file where the directory should be
		let blocked = dir.path().join("blocked");
		fs::write(&blocked, b"").unwrap();
		let err = DiskStore::open(blocked.join("data")).unwrap_err();
		assert!(matches!(err, Error::Storage(_)));
		assert!(!err.to_string().contains(&*dir.path().to_string_lossy()));
	}
}
