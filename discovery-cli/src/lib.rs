#![warn(missing_docs)]
//! Operator tooling for the [discovery_ca] certificate authority: development
//! network material, signing requests and logging setup for the `discovery`
//! command.

mod bootstrap;
pub mod logging;

pub use bootstrap::{
	create_request, keypair_algorithm, write_network_material, Ca, CaBuilder, CertificateBuilder,
	EndEntity, EndEntityBuilder, KeypairAlgorithm, PemCertifiedKey, DOORMAN_FILE_NAME,
	NETWORK_MAP_FILE_NAME, ROOT_FILE_NAME,
};
