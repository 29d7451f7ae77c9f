//! Command Line argument parsing
#![allow(missing_docs)]

use std::path::PathBuf;

use bpaf::Bpaf;
use discovery_ca::store::RequestId;
use discovery_ca::PartyId;
use discovery_cli::{keypair_algorithm, KeypairAlgorithm};

#[derive(Clone, Debug, Bpaf)]
#[bpaf(options, version)]
/// discovery: certificate authority and node directory
pub struct Options {
	/// Configuration file, defaults apply when absent
	#[bpaf(short, long, argument("discovery.toml"))]
	pub config: Option<PathBuf>,
	#[bpaf(external)]
	pub command: Command,
}

#[derive(Clone, Debug, Bpaf)]
pub enum Command {
	/// Check that the configured certificates and keys load and match
	#[bpaf(command("validate"))]
	Validate,
	/// Submit a certificate signing request
	#[bpaf(command("submit"))]
	Submit {
		/// PEM file holding the request
		#[bpaf(positional("request.pem"))]
		request: PathBuf,
	},
	/// List the pending requests of an organization
	#[bpaf(command("pending"))]
	Pending {
		/// Organization identifier, bare or as urn
		#[bpaf(long, argument::<String>("ID"), parse(parse_party))]
		party: PartyId,
	},
	/// Issue the certificate for a pending request
	#[bpaf(command("approve"))]
	Approve {
		#[bpaf(positional("REQUEST_ID"))]
		id: RequestId,
	},
	/// List the certificates issued to an organization, with their chains
	#[bpaf(command("certificates"))]
	Certificates {
		/// Organization identifier, bare or as urn
		#[bpaf(long, argument::<String>("ID"), parse(parse_party))]
		party: PartyId,
	},
	/// Print the signed network parameters
	#[bpaf(command("network-parameters"))]
	NetworkParameters,
	/// Print the signed network map
	#[bpaf(command("network-map"))]
	NetworkMap,
	/// Register the signed node info of a node
	#[bpaf(command("publish"))]
	Publish {
		/// Node name, notaries carry "notary" in it
		#[bpaf(long, argument("NAME"))]
		name: String,
		/// File holding the node info
		#[bpaf(positional("node-info"))]
		node_info: PathBuf,
	},
	/// Generate development root, doorman and network map material
	#[bpaf(command("init-ca"))]
	InitCa {
		/// Output Directory for generated files
		#[bpaf(short, long, argument("output/path/"), fallback("certificates".into()), debug_fallback)]
		output: PathBuf,
		/// Signature algorithm
		#[bpaf(external(keypair_algorithm), fallback(KeypairAlgorithm::EcdsaP384), display_fallback)]
		sig_algo: KeypairAlgorithm,
		/// Country Name
		#[bpaf(long, fallback("NL".into()), display_fallback)]
		country_name: String,
		/// Organization Name
		#[bpaf(long, fallback("Nuts".into()), display_fallback)]
		organization_name: String,
	},
	/// Generate a key and a signing request for a node
	#[bpaf(command("request"))]
	Request {
		/// Output Directory for generated files
		#[bpaf(short, long, argument("output/path/"))]
		output: PathBuf,
		/// Basename for request/key
		#[bpaf(long, fallback("node".into()), display_fallback)]
		file_name: String,
		/// Signature algorithm
		#[bpaf(external(keypair_algorithm), fallback(KeypairAlgorithm::EcdsaP256), display_fallback)]
		sig_algo: KeypairAlgorithm,
		/// Subject of the request
		#[bpaf(long, argument("CN=node,O=Org,C=NL"))]
		subject: String,
		/// Organization identifier to claim
		#[bpaf(long, argument("ID"))]
		organization_id: String,
		/// E-mail address of the administrator
		#[bpaf(long, argument("ADDRESS"))]
		email: Option<String>,
	},
}

impl Command {
	/// Whether the command reads or changes requests, certificates or nodes
	pub fn is_stateful(&self) -> bool {
		!matches!(
			self,
			Command::Validate | Command::InitCa { .. } | Command::Request { .. }
		)
	}
}

/// Accepts `urn:oid:<oid>:<value>` as well as a bare organization identifier
fn parse_party(s: String) -> Result<PartyId, discovery_ca::Error> {
	if s.starts_with("urn:") {
		s.parse()
	} else {
		PartyId::organization(s)
	}
}
