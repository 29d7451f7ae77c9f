use std::fs;

use anyhow::{bail, Context, Result};
use discovery_ca::{CertificateService, Config, NodeDirectory, NodeEntry};
use discovery_cli::logging::init_logging;
use discovery_cli::{create_request, write_network_material};
use log::{error, info};
use serde::Serialize;

mod args;
use args::Command;

fn main() -> Result<()> {
	let opts = args::options().run();

	let config = match &opts.config {
		Some(path) => Config::read_config(path)?,
		None => Config::default(),
	};
	init_logging(&config)?;

	// every invocation is a fresh process, state has to outlive it
	let config = match opts.command.is_stateful() && config.data_dir.is_none() {
		true => {
			let config = config.with_data_dir();
			if let Some(dir) = &config.data_dir {
				info!("No data_dir configured, keeping state in {}", dir.display());
			}
			config
		},
		false => config,
	};

	match opts.command {
		Command::Validate => {
			let problems = CertificateService::from_config(config)?.validate();
			if !problems.is_empty() {
				for problem in &problems {
					error!("{}", problem);
				}
				bail!("configuration has {} problem(s)", problems.len());
			}
			println!("configuration is valid");
		},
		Command::Submit { request } => {
			let pem = fs::read_to_string(&request)
				.with_context(|| format!("cannot read request '{}'", request.display()))?;
			let pending = CertificateService::from_config(config)?.submit(&pem)?;
			print_json(&pending)?;
		},
		Command::Pending { party } => {
			let pending = CertificateService::from_config(config)?.list_pending_requests(&party)?;
			print_json(&pending)?;
		},
		Command::Approve { id } => {
			let issued = CertificateService::from_config(config)?.approve(id)?;
			print!("{}", issued.pem());
		},
		Command::Certificates { party } => {
			let certificates = CertificateService::from_config(config)?.list_certificates(&party)?;
			print_json(&certificates)?;
		},
		Command::NetworkParameters => {
			print_json(&NodeDirectory::open(&config)?.signed_network_parameters()?)?;
		},
		Command::NetworkMap => {
			print_json(&NodeDirectory::open(&config)?.network_map()?)?;
		},
		Command::Publish { name, node_info } => {
			let raw = fs::read(&node_info)
				.with_context(|| format!("cannot read node info '{}'", node_info.display()))?;
			let hash = NodeDirectory::open(&config)?.register(NodeEntry::new(name, raw))?;
			println!("{}", hash);
		},
		Command::InitCa {
			output,
			sig_algo,
			country_name,
			organization_name,
		} => {
			write_network_material(&output, &sig_algo, &country_name, &organization_name)?;
		},
		Command::Request {
			output,
			file_name,
			sig_algo,
			subject,
			organization_id,
			email,
		} => {
			create_request(&sig_algo, &subject, &organization_id, email)?
				.write(&output, &file_name)?;
		},
	}
	Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}
