//! Command implementations wiring configuration into the library crates.

use alloy_primitives::{Address, Bytes, U256};
use alloy_rpc_types::TransactionRequest;
use grants_account::{create_account, sign_authorization, AuthorizationParams, SigningAccount};
use grants_config::{Config, NetworkConfig};
use grants_gasless::{to_signer, GaslessProviderRegistry};
use grants_provider::implementations::{local::LocalWalletClient, remote::RemoteWalletClient};
use grants_provider::{EthereumProviderBridge, RequestDispatcher, WalletClient};
use grants_safe::implementations::{eip1193::Eip1193SafeKitFactory, http::HttpTransactionService};
use grants_safe::{
	ConfirmationPolicy, DisbursementService, Erc20Reader, SafeLinks, SafeSigningCoordinator,
	SafeTransactionBuilder,
};
use grants_types::{
	parse_quantity, DisbursementRecipient, DisbursementRequest, HttpConnector, HttpTransport,
	JsonRpcTransport,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

type CommandResult = Result<Value, Box<dyn std::error::Error>>;

const RPC_TIMEOUT: Duration = Duration::from_secs(30);
const SERVICE_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_WALLET_TIMEOUT_SECONDS: u64 = 120;

/// Reports the gasless eligibility of `chain_id`.
pub fn supports(config: &Config, chain_id: u64) -> Value {
	let registry = GaslessProviderRegistry::new(
		config.gasless.clone(),
		Arc::new(HttpConnector::default()),
	);
	let provider = registry
		.config_for(chain_id)
		.map(|config| config.provider_kind().as_str());
	json!({
		"chainId": chain_id,
		"supported": registry.supports(chain_id),
		"provider": provider,
		"supportedChains": registry.supported_chains(),
	})
}

/// Signs an EIP-7702 authorization for `contract` with the primary account.
pub async fn authorize(
	config: &Config,
	chain_id: u64,
	contract: Address,
	nonce: Option<u64>,
) -> CommandResult {
	let account = primary_account(config)?;
	let nonce = match nonce {
		Some(nonce) => nonce,
		None => {
			let rpc = chain_transport(network(config, chain_id)?)?;
			pending_nonce(rpc.as_ref(), account.address()).await?
		},
	};

	let authorization = sign_authorization(
		account.as_ref(),
		AuthorizationParams {
			contract_address: contract,
			chain_id,
			nonce,
		},
	)
	.await?;
	tracing::info!(
		signer = %account.address(),
		contract = %contract,
		nonce = nonce,
		"Authorization signed"
	);
	Ok(serde_json::to_value(authorization)?)
}

/// Disburses `token` from `safe` to the recipients listed in `recipients_path`.
pub async fn disburse(
	config: &Config,
	chain_id: u64,
	safe: Address,
	token: String,
	recipients_path: &Path,
) -> CommandResult {
	let recipients = load_recipients(recipients_path).await?;
	let network = network(config, chain_id)?;
	let rpc = chain_transport(network)?;
	let account: Arc<dyn SigningAccount> = Arc::from(primary_account(config)?);
	let wallet = wallet_client(config, account, &network.rpc_url, chain_id)?;
	let provider: Arc<dyn RequestDispatcher> =
		Arc::new(EthereumProviderBridge::new(wallet, rpc, chain_id));

	let tokens = Arc::new(Erc20Reader::new(provider.clone()));
	let builder = SafeTransactionBuilder::new(Arc::new(config.clone()), tokens.clone());
	let kits = Eip1193SafeKitFactory::new(
		Duration::from_secs(config.safe.confirmation_poll_seconds),
		config.safe.confirmation_poll_attempts,
	);
	let confirmation = if config.safe.confirm_execution {
		ConfirmationPolicy::Await
	} else {
		ConfirmationPolicy::Skip
	};
	let mut coordinator = SafeSigningCoordinator::new(
		Arc::new(kits),
		SafeLinks::new(&config.safe.app_url),
		confirmation,
	);
	match HttpTransactionService::for_chain(
		chain_id,
		network.safe_transaction_service.as_deref(),
		SERVICE_TIMEOUT,
	) {
		Some(Ok(service)) => {
			coordinator = coordinator.with_service(chain_id, Arc::new(service));
		},
		Some(Err(e)) => tracing::warn!(error = %e, "Ignoring Safe Transaction Service"),
		None => tracing::info!(chain_id = chain_id, "No Safe Transaction Service for chain"),
	}

	let service = DisbursementService::new(builder, coordinator, tokens);
	let request = DisbursementRequest {
		safe_address: Some(safe),
		chain_id,
		token_symbol: token,
		recipients,
	};
	let result = service.disburse(&request, Some(provider)).await?;
	Ok(serde_json::to_value(result)?)
}

/// Sends one call through the chain's sponsored smart account.
pub async fn sponsor(
	mut config: Config,
	chain_id: u64,
	to: Address,
	data: Bytes,
	value: U256,
	use_eip7702: bool,
) -> CommandResult {
	if use_eip7702 {
		if let Some(gasless) = config.gasless.get_mut(&chain_id) {
			gasless.use_eip7702 = true;
		}
	}
	let rpc = chain_transport(network(&config, chain_id)?)?;
	let account: Arc<dyn SigningAccount> = Arc::from(primary_account(&config)?);

	let registry =
		GaslessProviderRegistry::new(config.gasless, Arc::new(HttpConnector::default()));
	let Some(client) = registry.create_client(chain_id, account).await? else {
		return Err(format!("Gasless sponsorship is not available on chain {}", chain_id).into());
	};
	let signer = to_signer(client, rpc, chain_id);
	tracing::info!(smart_account = %signer.address(), "Sending sponsored transaction");

	let tx = TransactionRequest::default().to(to).input(data.into()).value(value);
	let tx_hash = signer
		.request("eth_sendTransaction", json!([serde_json::to_value(tx)?]))
		.await?;
	Ok(json!({
		"chainId": chain_id,
		"from": signer.address(),
		"transactionHash": tx_hash,
	}))
}

fn network(config: &Config, chain_id: u64) -> Result<&NetworkConfig, String> {
	config
		.networks
		.get(&chain_id)
		.ok_or_else(|| format!("Chain {} is not configured", chain_id))
}

fn chain_transport(
	network: &NetworkConfig,
) -> Result<Arc<dyn JsonRpcTransport>, Box<dyn std::error::Error>> {
	Ok(Arc::new(HttpTransport::new(&network.rpc_url, RPC_TIMEOUT)?))
}

fn primary_account(
	config: &Config,
) -> Result<Box<dyn SigningAccount>, Box<dyn std::error::Error>> {
	let name = &config.account.primary;
	let raw = config
		.account
		.implementations
		.get(name)
		.ok_or_else(|| format!("Account implementation '{}' is not configured", name))?;
	Ok(create_account(name, raw)?)
}

/// Local accounts send through their own key; anything else goes through its wallet endpoint.
fn wallet_client(
	config: &Config,
	account: Arc<dyn SigningAccount>,
	rpc_url: &str,
	chain_id: u64,
) -> Result<Arc<dyn WalletClient>, Box<dyn std::error::Error>> {
	if account.private_key().is_some() {
		return Ok(Arc::new(LocalWalletClient::new(account, rpc_url, chain_id)?));
	}

	let raw = config.account.implementations.get(&config.account.primary);
	let wallet_url = raw
		.and_then(|raw| raw.get("wallet_url"))
		.and_then(|url| url.as_str())
		.ok_or("Account has neither a private key nor a wallet_url")?;
	let timeout = raw
		.and_then(|raw| raw.get("timeout_seconds"))
		.and_then(|t| t.as_integer())
		.and_then(|t| u64::try_from(t).ok())
		.unwrap_or(DEFAULT_WALLET_TIMEOUT_SECONDS);
	let transport = HttpTransport::new(wallet_url, Duration::from_secs(timeout))?;
	Ok(Arc::new(RemoteWalletClient::new(account.address(), Arc::new(transport))))
}

async fn pending_nonce(
	rpc: &dyn JsonRpcTransport,
	address: Address,
) -> Result<u64, Box<dyn std::error::Error>> {
	let count = rpc
		.request("eth_getTransactionCount", json!([address, "pending"]))
		.await?;
	let nonce = parse_quantity(&count)?;
	u64::try_from(nonce).map_err(|_| format!("Nonce {} out of range", nonce).into())
}

async fn load_recipients(
	path: &Path,
) -> Result<Vec<DisbursementRecipient>, Box<dyn std::error::Error>> {
	let contents = tokio::fs::read_to_string(path).await?;
	let recipients: Vec<DisbursementRecipient> = serde_json::from_str(&contents)?;
	tracing::debug!(path = %path.display(), count = recipients.len(), "Loaded recipients");
	Ok(recipients)
}
