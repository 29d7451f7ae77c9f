//! Logging to stderr or to a file, as configured

use std::io;

use anyhow::{anyhow, Context};
use discovery_ca::{Config, LogType};
use log::LevelFilter;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Installs the global logger described by `config`
///
/// Fails when a logger is already installed or the log file cannot be opened.
pub fn init_logging(config: &Config) -> anyhow::Result<()> {
	let dispatch = match config.log_type {
		LogType::Stderr => fern_logger(config.log_level).chain(io::stderr()),
		LogType::File => {
			let file = fern::log_file(&config.log_file).with_context(|| {
				format!("failed to open log file '{}'", config.log_file.display())
			})?;
			fern_logger(config.log_level).chain(file)
		},
	};
	dispatch
		.apply()
		.map_err(|e| anyhow!("failed to init logger: {}", e))
}

fn fern_logger(level: LevelFilter) -> fern::Dispatch {
	let show_target = level == LevelFilter::Trace || level == LevelFilter::Debug;
	fern::Dispatch::new()
		.format(move |out, message, record| {
			let now = OffsetDateTime::now_utc()
				.format(&Rfc3339)
				.unwrap_or_default();
			if show_target {
				out.finish(format_args!(
					"{} [{}] [{}] {}",
					now,
					record.level(),
					record.target(),
					message
				))
			} else {
				out.finish(format_args!("{} [{}] {}", now, record.level(), message))
			}
		})
		.level(level)
}

#[cfg(test)]
mod tests {
	use assert_fs::prelude::*;
	use log::info;

	use super::*;

	#[test]
	fn unopenable_log_file_is_reported() {
		let temp = assert_fs::TempDir::new().unwrap();
		let config = Config {
			log_type: LogType::File,
			log_file: temp.child("missing/dir/discovery.log").path().to_path_buf(),
			..Config::default()
		};
		let err = init_logging(&config).unwrap_err();
		assert!(err.to_string().starts_with("failed to open log file"));
	}

	#[test]
	fn file_logger_writes_lines() {
		let temp = assert_fs::TempDir::new().unwrap();
		let log_file = temp.child("discovery.log");
		let config = Config {
			log_type: LogType::File,
			log_file: log_file.path().to_path_buf(),
			log_level: LevelFilter::Info,
			..Config::default()
		};
		init_logging(&config).unwrap();
		info!("Received request 1");
		log::logger().flush();

		let text = std::fs::read_to_string(log_file.path()).unwrap();
		assert!(text.contains("[INFO] Received request 1"));
	}
}
