use std::{sync::Arc, time::Duration};

use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, JsonRpcClient, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, U256},
    utils::hex,
};

use crate::{
    config::{HarnessConfig, NetworkProfile},
    error::{HarnessError, Result},
    fork::{redact, ForkNode, ForkSpec},
};

/// JSON-RPC transport a [`RuntimeContext`] runs over: HTTP against a node,
/// a scripted mock in tests.
pub trait Transport: JsonRpcClient + Clone + 'static {}

impl<T: JsonRpcClient + Clone + 'static> Transport for T {}

pub type Client<P = Http> = SignerMiddleware<Provider<P>, LocalWallet>;

/// Connection to the active network, owned by a single command invocation.
#[derive(Debug)]
pub struct RuntimeContext<P = Http> {
    profile: NetworkProfile,
    provider: Provider<P>,
    wallets: Vec<LocalWallet>,
    confirmation_timeout: Duration,
    _fork: Option<ForkNode>,
}

impl RuntimeContext<Http> {
    pub async fn connect(profile: &NetworkProfile, config: &HarnessConfig) -> Result<Self> {
        let mut wallets = parse_wallets(&profile.credentials()?)?;
        let rpc_url = profile.rpc_url()?;

        let fork = if profile.is_fork() {
            let node = ForkNode::spawn(&ForkSpec {
                program: config.anvil.clone(),
                upstream: rpc_url.clone(),
                block_number: profile.fork_block_number,
                chain_id: profile.chain_id,
            })
            .await?;
            if wallets.is_empty() {
                wallets = parse_wallets(node.keys())?;
            }
            Some(node)
        } else {
            None
        };
        let endpoint = fork.as_ref().map(|f| f.endpoint().to_string()).unwrap_or(rpc_url);

        let provider =
            Provider::<Http>::try_from(endpoint.as_str()).map_err(|e| HarnessError::Connection {
                url: redact(&endpoint),
                reason: e.to_string(),
            })?;
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| HarnessError::Connection {
                url: redact(&endpoint),
                reason: e.to_string(),
            })?
            .as_u64();

        match profile.chain_id {
            Some(expected) if expected != chain_id => {
                return Err(HarnessError::ChainIdMismatch {
                    expected,
                    actual: chain_id,
                })
            }
            None => log::warn!("network {} has no chainId, using {chain_id}", profile.name),
            _ => {}
        }
        log::info!(
            "connected to {} (chain {chain_id}, {} account(s))",
            profile.name,
            wallets.len()
        );

        let wallets = wallets
            .into_iter()
            .map(|w| w.with_chain_id(chain_id))
            .collect();
        Ok(Self {
            _fork: fork,
            ..Self::new(
                profile.clone(),
                provider,
                wallets,
                config.confirmation_timeout,
            )
        })
    }
}

impl<P: Transport> RuntimeContext<P> {
    /// Wallets must already carry the chain id they sign for.
    pub fn new(
        profile: NetworkProfile,
        provider: Provider<P>,
        wallets: Vec<LocalWallet>,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            profile,
            provider,
            wallets,
            confirmation_timeout,
            _fork: None,
        }
    }

    pub fn profile(&self) -> &NetworkProfile {
        &self.profile
    }

    pub fn provider(&self) -> &Provider<P> {
        &self.provider
    }

    pub fn confirmation_timeout(&self) -> Duration {
        self.confirmation_timeout
    }

    /// Native-currency balance in wei.
    pub async fn get_balance(&self, address: Address) -> Result<U256> {
        native_balance(&self.provider, address).await
    }

    pub fn get_account(&self, index: usize) -> Result<LocalWallet> {
        self.wallets
            .get(index)
            .cloned()
            .ok_or(HarnessError::NoSuchAccount(index))
    }

    pub fn accounts(&self) -> Vec<Address> {
        self.wallets.iter().map(Signer::address).collect()
    }

    /// Signing client for the default sender (the first account).
    pub fn client(&self) -> Result<Arc<Client<P>>> {
        Ok(Arc::new(SignerMiddleware::new(
            self.provider.clone(),
            self.get_account(0)?,
        )))
    }
}

pub async fn native_balance<M: Middleware>(client: &M, address: Address) -> Result<U256> {
    client
        .get_balance(address, None)
        .await
        .map_err(HarnessError::rpc)
}

#[cfg(test)]
impl RuntimeContext<ethers::providers::MockProvider> {
    /// Context over a scripted transport, signing as anvil's first dev account
    /// on chain 31337.
    pub(crate) fn mocked(profile: NetworkProfile) -> (Self, ethers::providers::MockProvider) {
        let (provider, mock) = Provider::mocked();
        let key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let wallet = parse_wallet(0, key).unwrap().with_chain_id(31337u64);
        let context = Self::new(profile, provider, vec![wallet], Duration::from_secs(5));
        (context, mock)
    }
}

fn parse_wallets<S: AsRef<str>>(keys: &[S]) -> Result<Vec<LocalWallet>> {
    keys.iter()
        .enumerate()
        .map(|(index, key)| parse_wallet(index, key.as_ref()))
        .collect()
}

fn parse_wallet(index: usize, sk: &str) -> Result<LocalWallet> {
    let auth = |reason: String| HarnessError::Authentication { index, reason };
    let bytes = hex::decode(sk.strip_prefix("0x").unwrap_or(sk))
        .map_err(|e| auth(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(auth(format!("expected 32 bytes, got {}", bytes.len())));
    }
    LocalWallet::from_bytes(&bytes).map_err(|e| auth(e.to_string()))
}
