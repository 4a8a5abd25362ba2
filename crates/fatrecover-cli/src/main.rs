use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use fatrecover_core::{
	filesystem_info, format_root_listing, list_root_directory, open_engine, ContentHash,
	RecoveryConfig, RecoveryReport, SearchLimits,
};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "fatrecover", version, about = "Recover deleted files from a FAT32 disk image")]
#[command(group(ArgGroup::new("action").required(true).multiple(true).args(["info", "list", "recover", "recover_scattered"])))]
#[command(group(ArgGroup::new("recovery").args(["recover", "recover_scattered"])))]
struct Cli {
	/// Path to the FAT32 image (opened read-write)
	disk: PathBuf,

	/// Print the file system information
	#[arg(short = 'i')]
	info: bool,

	/// List the root directory
	#[arg(short = 'l')]
	list: bool,

	/// Recover a contiguous file
	#[arg(short = 'r', value_name = "FILENAME", conflicts_with = "recover_scattered")]
	recover: Option<String>,

	/// Recover a possibly non-contiguous file (requires -s)
	#[arg(short = 'R', value_name = "FILENAME", requires = "sha1")]
	recover_scattered: Option<String>,

	/// Expected SHA-1 of the file content, 40 hex digits
	#[arg(short = 's', value_name = "SHA1", requires = "recovery")]
	sha1: Option<String>,

	/// Free clusters the non-contiguous search may draw from (1-64)
	#[arg(long, default_value_t = SearchLimits::default().max_free_clusters)]
	max_free_clusters: usize,

	/// Longest chain the non-contiguous search will attempt (at most --max-free-clusters)
	#[arg(long, default_value_t = SearchLimits::default().max_chain_len)]
	max_chain_len: usize,

	/// Print recovery results as JSON
	#[arg(long)]
	json: bool,

	/// Log engine decisions to stderr
	#[arg(long)]
	verbose: bool,
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	tracing_subscriber::fmt()
		.with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
		.with_writer(std::io::stderr)
		.init();

	// Reject a malformed hash before the image is touched
	let expected = cli
		.sha1
		.as_deref()
		.map(ContentHash::from_hex)
		.transpose()?;

	let config = RecoveryConfig::with_limits(SearchLimits {
		max_free_clusters: cli.max_free_clusters,
		max_chain_len: cli.max_chain_len,
	});
	let mut engine = open_engine(&cli.disk, config)
		.with_context(|| format!("Failed to open {}", cli.disk.display()))?;

	if cli.info {
		print!("{}", filesystem_info(engine.volume().boot_sector()));
	}

	if cli.list {
		let entries = list_root_directory(engine.volume())?;
		print!("{}", format_root_listing(&entries));
	}

	let report = match (&cli.recover, &cli.recover_scattered, &expected) {
		(Some(name), _, _) => Some(engine.recover_contiguous(name, expected.as_ref())?),
		(None, Some(name), Some(hash)) => Some(engine.recover_non_contiguous(name, hash)?),
		_ => None,
	};

	if let Some(report) = report {
		print_report(&report, cli.json)?;
	}

	Ok(())
}

fn print_report(report: &RecoveryReport, json: bool) -> Result<()> {
	if json {
		println!("{}", report.to_json()?);
	} else {
		println!("{}", report);
	}
	Ok(())
}
