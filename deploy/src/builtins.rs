use std::sync::Arc;

use ethers::{
    contract::ContractError,
    providers::Middleware,
    types::{Address, BlockId, BlockNumber, H256},
    utils::to_checksum,
};

use crate::{
    commands::{CommandDefinition, HandlerFuture, ParamKind, ParamSpec, ResolvedParams},
    config::HarnessConfig,
    contracts::IERC20,
    deploy::Deploy,
    error::{HarnessError, Result},
    factory::FactoryResolver,
    provider::{RuntimeContext, Transport},
    utils::{format_amount, get_transaction_receipt},
};

const ETHER_DECIMALS: u32 = 18;

const BALANCE_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("account", "The account's address", ParamKind::Address),
    ParamSpec::optional("block", "Block to read at, latest if absent", ParamKind::Uint),
];

const STORAGE_AT_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("address", "The contract's address", ParamKind::Address),
    ParamSpec::required("slot", "Storage slot index", ParamKind::Uint),
];

const RECEIPT_PARAMS: &[ParamSpec] =
    &[ParamSpec::required("hash", "The transaction hash", ParamKind::Hash)];

const TOKEN_BALANCE_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("token", "The token contract's address", ParamKind::Address),
    ParamSpec::required("account", "The account's address", ParamKind::Address),
];

/// The commands shipped with the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Deploy,
    GetWeth,
    Balance,
    Accounts,
    BlockNumber,
    StorageAt,
    Receipt,
    TokenBalance,
}

impl Builtin {
    pub const ALL: [Self; 8] = [
        Self::Deploy,
        Self::GetWeth,
        Self::Balance,
        Self::Accounts,
        Self::BlockNumber,
        Self::StorageAt,
        Self::Receipt,
        Self::TokenBalance,
    ];

    pub fn definition<P: Transport>(self) -> CommandDefinition<P> {
        match self {
            Self::Deploy => CommandDefinition {
                name: "deploy",
                description: "Deploys the configured exploit contract",
                params: &[],
                handler: deploy,
            },
            Self::GetWeth => CommandDefinition {
                name: "getWETH",
                description: "Attaches to the WETH contract of the active network",
                params: &[],
                handler: get_weth,
            },
            Self::Balance => CommandDefinition {
                name: "balance",
                description: "Prints an account's balance",
                params: BALANCE_PARAMS,
                handler: balance,
            },
            Self::Accounts => CommandDefinition {
                name: "accounts",
                description: "Prints the signer addresses of the active network",
                params: &[],
                handler: accounts,
            },
            Self::BlockNumber => CommandDefinition {
                name: "blockNumber",
                description: "Prints the latest block number",
                params: &[],
                handler: block_number,
            },
            Self::StorageAt => CommandDefinition {
                name: "storageAt",
                description: "Prints a raw storage slot of a contract",
                params: STORAGE_AT_PARAMS,
                handler: storage_at,
            },
            Self::Receipt => CommandDefinition {
                name: "receipt",
                description: "Prints a transaction receipt",
                params: RECEIPT_PARAMS,
                handler: receipt,
            },
            Self::TokenBalance => CommandDefinition {
                name: "tokenBalance",
                description: "Prints an account's ERC-20 token balance",
                params: TOKEN_BALANCE_PARAMS,
                handler: token_balance,
            },
        }
    }
}

fn deploy<'a, P: Transport>(
    _: &'a ResolvedParams,
    context: &'a RuntimeContext<P>,
    config: &'a HarnessConfig,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let handle = Deploy::new(context, config)
            .run(&config.exploit, &config.exploit_args)
            .await?;
        Ok(format!(
            "{} deployed to: {}",
            handle.interface_name(),
            to_checksum(&handle.address(), None)
        ))
    })
}

fn get_weth<'a, P: Transport>(
    _: &'a ResolvedParams,
    context: &'a RuntimeContext<P>,
    config: &'a HarnessConfig,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let factory = FactoryResolver::new(&config.artifacts).factory_for("IWETH")?;
        let weth = factory.attach(context.profile().weth_address(), context);
        Ok(weth.to_string())
    })
}

fn balance<'a, P: Transport>(
    params: &'a ResolvedParams,
    context: &'a RuntimeContext<P>,
    _: &'a HarnessConfig,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let account = params.address("account")?;
        let wei = match params.optional_uint("block") {
            Some(block) => {
                let number = u64::try_from(block)
                    .map_err(|_| HarnessError::invalid_value("block", &block.to_string()))?;
                let at = BlockId::Number(BlockNumber::Number(number.into()));
                context
                    .provider()
                    .get_balance(account, Some(at))
                    .await
                    .map_err(HarnessError::rpc)?
            }
            None => context.get_balance(account).await?,
        };
        Ok(format!("{} ETH", format_amount(wei, ETHER_DECIMALS)?))
    })
}

fn accounts<'a, P: Transport>(
    _: &'a ResolvedParams,
    context: &'a RuntimeContext<P>,
    _: &'a HarnessConfig,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let lines: Vec<String> = context
            .accounts()
            .iter()
            .enumerate()
            .map(|(i, address)| format!("({i}) {}", to_checksum(address, None)))
            .collect();
        Ok(lines.join("\n"))
    })
}

fn block_number<'a, P: Transport>(
    _: &'a ResolvedParams,
    context: &'a RuntimeContext<P>,
    _: &'a HarnessConfig,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let number = context
            .provider()
            .get_block_number()
            .await
            .map_err(HarnessError::rpc)?;
        Ok(number.to_string())
    })
}

fn storage_at<'a, P: Transport>(
    params: &'a ResolvedParams,
    context: &'a RuntimeContext<P>,
    _: &'a HarnessConfig,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let address = params.address("address")?;
        let mut slot = [0u8; 32];
        params.uint("slot")?.to_big_endian(&mut slot);
        let slot = H256::from(slot);
        let word = context
            .provider()
            .get_storage_at(address, slot, None)
            .await
            .map_err(HarnessError::rpc)?;
        Ok(format!("{word:?}"))
    })
}

fn receipt<'a, P: Transport>(
    params: &'a ResolvedParams,
    context: &'a RuntimeContext<P>,
    _: &'a HarnessConfig,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let hash = params.hash("hash")?;
        match get_transaction_receipt(context.provider(), hash).await? {
            Some(receipt) => serde_json::to_string_pretty(&receipt)
                .map_err(|e| HarnessError::Rpc(e.to_string())),
            None => Ok(format!("transaction {hash:?} is pending or unknown")),
        }
    })
}

fn token_balance<'a, P: Transport>(
    params: &'a ResolvedParams,
    context: &'a RuntimeContext<P>,
    _: &'a HarnessConfig,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let token = IERC20::new(params.address("token")?, Arc::new(context.provider().clone()));
        erc20_balance(&token, params.address("account")?).await
    })
}

async fn erc20_balance<M: Middleware>(token: &IERC20<M>, account: Address) -> Result<String> {
    let contract = |e: ContractError<M>| HarnessError::Contract(e.to_string());
    let amount = token.balance_of(account).call().await.map_err(contract)?;
    let decimals = token.decimals().call().await.map_err(contract)?;
    let symbol = token.symbol().call().await.map_err(contract)?;
    Ok(format!("{} {symbol}", format_amount(amount, u32::from(decimals))?))
}
