//! Main entry point for the grants disbursement tool.
//!
//! Loads the configuration, builds the primary signing account and runs one
//! command: checking gasless support, signing an EIP-7702 authorization,
//! disbursing tokens from a Safe, or sending a sponsored transaction.

use alloy_primitives::{Address, Bytes, U256};
use clap::{Parser, Subcommand};
use grants_config::Config;
use std::path::PathBuf;

mod commands;

/// Command-line arguments for the grants tool.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml", global = true)]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info", global = true)]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Report whether gasless sponsorship is available on a chain
	Supports {
		#[arg(long)]
		chain: u64,
	},
	/// Sign an EIP-7702 authorization with the primary account
	Authorize {
		#[arg(long)]
		chain: u64,
		/// Contract the account delegates to
		#[arg(long)]
		contract: Address,
		/// Account nonce; read from the chain when omitted
		#[arg(long)]
		nonce: Option<u64>,
	},
	/// Disburse tokens from a Safe to a list of recipients
	Disburse {
		#[arg(long)]
		chain: u64,
		#[arg(long)]
		safe: Address,
		/// Token symbol as configured for the chain
		#[arg(long)]
		token: String,
		/// JSON file with `[{"address", "amount", "validationError"?}]`
		#[arg(long)]
		recipients: PathBuf,
	},
	/// Send a transaction through a sponsored smart account
	Sponsor {
		#[arg(long)]
		chain: u64,
		#[arg(long)]
		to: Address,
		#[arg(long)]
		data: Option<Bytes>,
		/// Value in wei
		#[arg(long)]
		value: Option<U256>,
		/// Delegate the account itself instead of using a separate smart account
		#[arg(long)]
		eip7702: bool,
	},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let config = Config::from_file(&args.config).await?;
	tracing::info!(
		config = %args.config.display(),
		account = %config.account.primary,
		networks = config.networks.len(),
		"Loaded configuration"
	);

	let output = match args.command {
		Command::Supports { chain } => commands::supports(&config, chain),
		Command::Authorize {
			chain,
			contract,
			nonce,
		} => commands::authorize(&config, chain, contract, nonce).await?,
		Command::Disburse {
			chain,
			safe,
			token,
			recipients,
		} => commands::disburse(&config, chain, safe, token, &recipients).await?,
		Command::Sponsor {
			chain,
			to,
			data,
			value,
			eip7702,
		} => {
			commands::sponsor(
				config,
				chain,
				to,
				data.unwrap_or_default(),
				value.unwrap_or_default(),
				eip7702,
			)
			.await?
		},
	};

	println!("{}", serde_json::to_string_pretty(&output)?);
	Ok(())
}
