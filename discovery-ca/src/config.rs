//! Configuration of the service, read from a TOML file

use std::fs;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use serde::de;
use serde::{Deserialize, Deserializer};

use crate::error::ExternalError;
use crate::Error;

//------------ ConfigDefaults ------------------------------------------------

/// Default values for the fields a configuration file may leave out
pub struct ConfigDefaults;

impl ConfigDefaults {
	fn root_cert_path() -> PathBuf {
		PathBuf::from("certificates/root.pem")
	}

	fn ca_cert_path() -> PathBuf {
		PathBuf::from("certificates/doorman.pem")
	}

	fn ca_key_path() -> PathBuf {
		PathBuf::from("certificates/doorman.key.pem")
	}

	fn network_map_cert_path() -> PathBuf {
		PathBuf::from("certificates/network-map.pem")
	}

	fn network_map_key_path() -> PathBuf {
		PathBuf::from("certificates/network-map.key.pem")
	}

	fn certificate_validity_days() -> u32 {
		365
	}

	fn auto_ack() -> bool {
		false
	}

	fn leaf_is_ca() -> bool {
		true
	}

	fn name_constraints() -> bool {
		false
	}

	fn log_level() -> LevelFilter {
		LevelFilter::Info
	}

	fn log_type() -> LogType {
		LogType::Stderr
	}

	fn log_file() -> PathBuf {
		PathBuf::from("./discovery.log")
	}

	fn data_dir() -> PathBuf {
		PathBuf::from("./data")
	}
}

//------------ Config --------------------------------------------------------

/// Global configuration of the certificate authority
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	/// The trust root, included last in every issued chain
	#[serde(default = "ConfigDefaults::root_cert_path")]
	pub root_cert_path: PathBuf,

	/// The certificate of the issuing CA
	#[serde(default = "ConfigDefaults::ca_cert_path")]
	pub ca_cert_path: PathBuf,

	/// The PKCS#8 PEM private key of the issuing CA
	#[serde(default = "ConfigDefaults::ca_key_path")]
	pub ca_key_path: PathBuf,

	/// The certificate embedded in signed network parameters and maps
	#[serde(default = "ConfigDefaults::network_map_cert_path")]
	pub network_map_cert_path: PathBuf,

	/// The key signing network parameters and maps
	#[serde(default = "ConfigDefaults::network_map_key_path")]
	pub network_map_key_path: PathBuf,

	/// Directories searched for material not found at its configured path
	#[serde(default)]
	pub resource_dirs: Vec<PathBuf>,

	/// Validity of issued certificates
	#[serde(default = "ConfigDefaults::certificate_validity_days")]
	pub certificate_validity_days: u32,

	/// Issue certificates as soon as a request is accepted
	#[serde(default = "ConfigDefaults::auto_ack")]
	pub auto_ack: bool,

	/// Mark issued certificates as CA certificates
	#[serde(default = "ConfigDefaults::leaf_is_ca")]
	pub leaf_is_ca: bool,

	/// Restrict issued certificates to the country and organization of the CA
	#[serde(default = "ConfigDefaults::name_constraints")]
	pub name_constraints: bool,

	/// Hashes whitelisted for the contract and schema packages
	#[serde(default)]
	pub contract_hashes: Vec<String>,

	/// Hashes whitelisted for the flow package
	#[serde(default)]
	pub flow_hashes: Vec<String>,

	/// Where requests, certificates and nodes are kept; in memory when absent
	///
	/// Commands that run once per process should use
	/// [`with_data_dir`](Config::with_data_dir) instead of relying on memory.
	#[serde(default)]
	pub data_dir: Option<PathBuf>,

	#[serde(
		default = "ConfigDefaults::log_level",
		deserialize_with = "deserialize_level_filter"
	)]
	#[allow(missing_docs)]
	pub log_level: LevelFilter,

	#[serde(default = "ConfigDefaults::log_type")]
	#[allow(missing_docs)]
	pub log_type: LogType,

	#[serde(default = "ConfigDefaults::log_file")]
	#[allow(missing_docs)]
	pub log_file: PathBuf,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			root_cert_path: ConfigDefaults::root_cert_path(),
			ca_cert_path: ConfigDefaults::ca_cert_path(),
			ca_key_path: ConfigDefaults::ca_key_path(),
			network_map_cert_path: ConfigDefaults::network_map_cert_path(),
			network_map_key_path: ConfigDefaults::network_map_key_path(),
			resource_dirs: Vec::new(),
			certificate_validity_days: ConfigDefaults::certificate_validity_days(),
			auto_ack: ConfigDefaults::auto_ack(),
			leaf_is_ca: ConfigDefaults::leaf_is_ca(),
			name_constraints: ConfigDefaults::name_constraints(),
			contract_hashes: Vec::new(),
			flow_hashes: Vec::new(),
			data_dir: None,
			log_level: ConfigDefaults::log_level(),
			log_type: ConfigDefaults::log_type(),
			log_file: ConfigDefaults::log_file(),
		}
	}
}

impl Config {
	/// Creates the config from a TOML file and verifies it
	pub fn read_config(path: impl AsRef<Path>) -> Result<Self, Error> {
		let path = path.as_ref();
		let text = fs::read_to_string(path).map_err(|e| {
			Error::Config(format!(
				"cannot read config file '{}': {}",
				path.display(),
				e
			))
		})?;
		Self::parse(&text)
	}

	/// Creates the config from TOML text and verifies it
	pub fn parse(text: &str) -> Result<Self, Error> {
		let config: Config = toml::from_str(text)._err()?;
		config.verify()?;
		Ok(config)
	}

	/// Makes sure state is kept on disk, below `./data` unless `data_dir` is set
	pub fn with_data_dir(mut self) -> Self {
		if self.data_dir.is_none() {
			self.data_dir = Some(ConfigDefaults::data_dir());
		}
		self
	}

	/// Checks the values that deserialize but cannot work
	pub fn verify(&self) -> Result<(), Error> {
		if self.certificate_validity_days == 0 {
			return Err(Error::Config(
				"certificate_validity_days must be at least 1".into(),
			));
		}
		if self.log_type == LogType::File && self.log_file.as_os_str().is_empty() {
			return Err(Error::Config(
				"log_file must be set when log_type is \"file\"".into(),
			));
		}
		Ok(())
	}
}

fn deserialize_level_filter<'de, D>(d: D) -> Result<LevelFilter, D::Error>
where
	D: Deserializer<'de>,
{
	let string = String::deserialize(d)?;
	string
		.parse()
		.map_err(|_| de::Error::custom(format!("invalid log level \"{}\"", string)))
}

//------------ LogType -------------------------------------------------------

/// The target to log to
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LogType {
	/// Standard error
	Stderr,
	/// The configured log file
	File,
}

impl<'de> Deserialize<'de> for LogType {
	fn deserialize<D>(d: D) -> Result<LogType, D::Error>
	where
		D: Deserializer<'de>,
	{
		let string = String::deserialize(d)?;
		match string.as_str() {
			"stderr" => Ok(LogType::Stderr),
			"file" => Ok(LogType::File),
			_ => Err(de::Error::custom(format!(
				"expected \"stderr\" or \"file\", found : \"{}\"",
				string
			))),
		}
	}
}
