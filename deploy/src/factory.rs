use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use ethers::{
    abi::{
        token::{LenientTokenizer, Tokenizer},
        Abi, Token,
    },
    contract::{Contract, ContractFactory},
    providers::{Middleware, Provider},
    types::{transaction::eip2718::TypedTransaction, Address, Bytes, TransactionReceipt, H256},
    utils::to_checksum,
};
use serde::Deserialize;

use crate::{
    contracts::{IERC20_ABI, IWETH_ABI},
    error::{HarnessError, Result},
    provider::{Client, RuntimeContext, Transport},
    utils::{send_transaction, wait_transaction, POLL_INTERVAL},
};

#[derive(Debug, Deserialize)]
struct ArtifactFile {
    abi: Abi,
    #[serde(default)]
    bytecode: Option<BytecodeField>,
}

/// Hardhat stores bytecode as a hex string, Foundry as `{ "object": "0x…" }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BytecodeField {
    Hex(Bytes),
    Object { object: Bytes },
}

impl BytecodeField {
    fn into_bytes(self) -> Option<Bytes> {
        let bytes = match self {
            Self::Hex(bytes) | Self::Object { object: bytes } => bytes,
        };
        (!bytes.is_empty()).then_some(bytes)
    }
}

/// Knows how to deploy or attach to one contract interface.
#[derive(Debug, Clone)]
pub struct Factory {
    name: String,
    abi: Abi,
    bytecode: Option<Bytes>,
}

impl Factory {
    pub fn new(name: impl Into<String>, abi: Abi, bytecode: Option<Bytes>) -> Self {
        Self {
            name: name.into(),
            abi,
            bytecode,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tokenizes string arguments against the constructor inputs.
    pub fn constructor_tokens(&self, args: &[String]) -> Result<Vec<Token>> {
        let inputs = self
            .abi
            .constructor()
            .map(|c| c.inputs.as_slice())
            .unwrap_or_default();
        if inputs.len() != args.len() {
            return Err(HarnessError::invalid_value(
                "constructorArgs",
                &format!("expected {} argument(s), got {}", inputs.len(), args.len()),
            ));
        }
        inputs
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                LenientTokenizer::tokenize(&param.kind, arg)
                    .map_err(|_| HarnessError::invalid_value(&param.name, arg))
            })
            .collect()
    }

    pub fn deployment_tx<M: Middleware>(
        &self,
        args: &[String],
        client: Arc<M>,
    ) -> Result<TypedTransaction> {
        let bytecode = self
            .bytecode
            .clone()
            .ok_or_else(|| HarnessError::MissingBytecode(self.name.clone()))?;
        let tokens = self.constructor_tokens(args)?;

        let deployer = ContractFactory::new(self.abi.clone(), bytecode, client)
            .deploy_tokens(tokens)
            .map_err(|e| HarnessError::Contract(e.to_string()))?;
        Ok(deployer.legacy().tx)
    }

    /// Deploys through the context's default signer and waits for the receipt.
    pub async fn deploy<P: Transport>(
        &self,
        args: &[String],
        context: &RuntimeContext<P>,
    ) -> Result<ContractHandle<Client<P>>> {
        let client = context.client()?;
        let tx = self.deployment_tx(args, client.clone())?;
        log::info!("deploying {} from {:?}", self.name, client.address());

        let tx_hash = send_transaction(client.as_ref(), tx).await?;
        let receipt = wait_transaction(
            client.as_ref(),
            tx_hash,
            context.confirmation_timeout(),
            POLL_INTERVAL,
        )
        .await?;
        let address = deployed_address(&receipt)?;

        let mut handle = self.attach_with(address, client);
        handle.deploy_tx = Some(tx_hash);
        Ok(handle)
    }

    /// Binds the interface to an existing address without sending anything.
    pub fn attach<P: Transport>(
        &self,
        address: Address,
        context: &RuntimeContext<P>,
    ) -> ContractHandle<Provider<P>> {
        self.attach_with(address, Arc::new(context.provider().clone()))
    }

    pub fn attach_with<M: Middleware>(
        &self,
        address: Address,
        client: Arc<M>,
    ) -> ContractHandle<M> {
        ContractHandle {
            interface_name: self.name.clone(),
            contract: Contract::new(address, self.abi.clone(), client),
            deploy_tx: None,
        }
    }
}

/// Contract address from a deployment receipt, or why there is none.
pub fn deployed_address(receipt: &TransactionReceipt) -> Result<Address> {
    let reverted = HarnessError::DeploymentReverted {
        tx_hash: receipt.transaction_hash,
        block: receipt.block_number,
    };
    if receipt.status.map(|s| s.is_zero()).unwrap_or(false) {
        return Err(reverted);
    }
    receipt.contract_address.ok_or(reverted)
}

/// An interface bound to an address on the active network.
#[derive(Debug)]
pub struct ContractHandle<M> {
    interface_name: String,
    contract: Contract<M>,
    deploy_tx: Option<H256>,
}

impl<M: Middleware> ContractHandle<M> {
    pub fn address(&self) -> Address {
        self.contract.address()
    }

    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    pub fn deploy_tx(&self) -> Option<H256> {
        self.deploy_tx
    }
}

impl<M: Middleware> fmt::Display for ContractHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} at {}",
            self.interface_name,
            to_checksum(&self.address(), None)
        )?;
        let abi = self.contract.abi();
        let functions: Vec<&str> = abi.functions.keys().map(String::as_str).collect();
        write!(f, "  functions: {}", functions.join(", "))?;
        let events: Vec<&str> = abi.events.keys().map(String::as_str).collect();
        if !events.is_empty() {
            write!(f, "\n  events: {}", events.join(", "))?;
        }
        Ok(())
    }
}

/// Resolves interface names to factories: built-in interfaces first, then artifacts.
#[derive(Debug, Clone)]
pub struct FactoryResolver {
    artifacts: PathBuf,
}

impl FactoryResolver {
    pub fn new(artifacts: impl Into<PathBuf>) -> Self {
        Self {
            artifacts: artifacts.into(),
        }
    }

    pub fn factory_for(&self, name: &str) -> Result<Factory> {
        match name {
            "IWETH" => return Ok(Factory::new(name, IWETH_ABI.clone(), None)),
            "IERC20" => return Ok(Factory::new(name, IERC20_ABI.clone(), None)),
            _ => {}
        }

        let path = self
            .candidates(name)
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| HarnessError::UnknownInterface(name.to_string()))?;
        load_artifact(name, &path)
    }

    fn candidates(&self, name: &str) -> Vec<PathBuf> {
        let file = format!("{name}.json");
        let source = format!("{name}.sol");
        vec![
            self.artifacts.join(&file),
            self.artifacts.join("contracts").join(&source).join(&file),
            self.artifacts.join(&source).join(&file),
        ]
    }
}

fn load_artifact(name: &str, path: &Path) -> Result<Factory> {
    let invalid = |reason: String| HarnessError::InvalidArtifact {
        name: name.to_string(),
        reason,
    };
    let json = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let artifact: ArtifactFile = serde_json::from_str(&json).map_err(|e| invalid(e.to_string()))?;
    log::debug!("loaded artifact {name} from {}", path.display());

    Ok(Factory::new(
        name,
        artifact.abi,
        artifact.bytecode.and_then(BytecodeField::into_bytes),
    ))
}
