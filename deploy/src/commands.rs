use std::{
    collections::{btree_map::Entry, BTreeMap},
    fmt::{self, Write as _},
    future::Future,
    pin::Pin,
};

use ethers::{
    providers::Http,
    types::{Address, H256, U256},
};

use crate::{
    builtins::Builtin,
    config::{HarnessConfig, NetworkProfile},
    error::{HarnessError, Result},
    provider::{RuntimeContext, Transport},
};

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + 'a>>;

/// A command body. It receives coerced parameters and a fresh connection and
/// returns the text to print.
pub type Handler<P = Http> =
    for<'a> fn(&'a ResolvedParams, &'a RuntimeContext<P>, &'a HarnessConfig) -> HandlerFuture<'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Address,
    Uint,
    Hash,
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

impl ParamSpec {
    pub const fn required(name: &'static str, description: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            description,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, description: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            description,
            kind,
            required: false,
        }
    }

    fn coerce(&self, raw: &str) -> Result<ParamValue> {
        let invalid = || HarnessError::invalid_value(self.name, raw);
        Ok(match self.kind {
            ParamKind::Address => ParamValue::Address(raw.parse().map_err(|_| invalid())?),
            ParamKind::Uint => ParamValue::Uint(parse_uint(raw).ok_or_else(invalid)?),
            ParamKind::Hash => ParamValue::Hash(raw.parse().map_err(|_| invalid())?),
        })
    }
}

/// Decimal or `0x` hex; anything else, including an empty digit string, is rejected.
fn parse_uint(raw: &str) -> Option<U256> {
    let (digits, radix) = match raw.strip_prefix("0x") {
        Some(hex) => (hex, 16),
        None => (raw, 10),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    U256::from_str_radix(digits, radix).ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Address(Address),
    Uint(U256),
    Hash(H256),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolvedParams(BTreeMap<&'static str, ParamValue>);

impl ResolvedParams {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn address(&self, name: &str) -> Result<Address> {
        match self.get(name) {
            Some(ParamValue::Address(address)) => Ok(*address),
            _ => Err(HarnessError::MissingRequiredParameter(name.to_string())),
        }
    }

    pub fn uint(&self, name: &str) -> Result<U256> {
        match self.get(name) {
            Some(ParamValue::Uint(value)) => Ok(*value),
            _ => Err(HarnessError::MissingRequiredParameter(name.to_string())),
        }
    }

    pub fn hash(&self, name: &str) -> Result<H256> {
        match self.get(name) {
            Some(ParamValue::Hash(hash)) => Ok(*hash),
            _ => Err(HarnessError::MissingRequiredParameter(name.to_string())),
        }
    }

    pub fn optional_uint(&self, name: &str) -> Option<U256> {
        self.uint(name).ok()
    }
}

pub struct CommandDefinition<P = Http> {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    pub handler: Handler<P>,
}

impl<P> fmt::Debug for CommandDefinition<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDefinition")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl<P> CommandDefinition<P> {
    /// Checks `--name value` / `--name=value` pairs against the declared parameters.
    pub fn resolve(&self, raw_args: &[String]) -> Result<ResolvedParams> {
        let mut resolved = BTreeMap::new();
        for (name, value) in split_args(raw_args)? {
            let spec = self
                .params
                .iter()
                .find(|p| p.name == name)
                .ok_or_else(|| HarnessError::UnexpectedParameter(name.to_string()))?;
            if resolved.insert(spec.name, spec.coerce(value)?).is_some() {
                return Err(HarnessError::UnexpectedParameter(format!("{name} (repeated)")));
            }
        }

        if let Some(missing) = self
            .params
            .iter()
            .find(|p| p.required && !resolved.contains_key(p.name))
        {
            return Err(HarnessError::MissingRequiredParameter(missing.name.to_string()));
        }
        Ok(ResolvedParams(resolved))
    }
}

fn split_args(raw_args: &[String]) -> Result<Vec<(&str, &str)>> {
    let mut pairs = Vec::new();
    let mut iter = raw_args.iter();
    while let Some(arg) = iter.next() {
        let flag = arg
            .strip_prefix("--")
            .filter(|f| !f.is_empty())
            .ok_or_else(|| HarnessError::UnexpectedParameter(arg.clone()))?;
        match flag.split_once('=') {
            Some((name, value)) => pairs.push((name, value)),
            None => {
                let value = iter
                    .next()
                    .ok_or_else(|| HarnessError::invalid_value(flag, ""))?;
                pairs.push((flag, value.as_str()));
            }
        }
    }
    Ok(pairs)
}

/// Command name to definition, populated once at startup.
#[derive(Debug)]
pub struct CommandRegistry<P = Http> {
    commands: BTreeMap<&'static str, CommandDefinition<P>>,
}

impl<P> Default for CommandRegistry<P> {
    fn default() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }
}

impl CommandRegistry<Http> {
    /// Validates, connects to `profile` and runs the handler.
    pub async fn dispatch(
        &self,
        name: &str,
        raw_args: &[String],
        profile: &NetworkProfile,
        config: &HarnessConfig,
    ) -> Result<String> {
        let (definition, params) = self.prepare(name, raw_args)?;
        log::info!("running {name} on {}", profile.name);

        let context = RuntimeContext::connect(profile, config).await?;
        (definition.handler)(&params, &context, config).await
    }
}

impl<P: Transport> CommandRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        for builtin in Builtin::ALL {
            registry.register(builtin.definition())?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, definition: CommandDefinition<P>) -> Result<()> {
        match self.commands.entry(definition.name) {
            Entry::Occupied(_) => Err(HarnessError::DuplicateCommand(definition.name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(definition);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Result<&CommandDefinition<P>> {
        self.commands
            .get(name)
            .ok_or_else(|| HarnessError::UnknownCommand(name.to_string()))
    }

    /// Validates the invocation without touching the network.
    pub fn prepare(
        &self,
        name: &str,
        raw_args: &[String],
    ) -> Result<(&CommandDefinition<P>, ResolvedParams)> {
        let definition = self.get(name)?;
        let params = definition.resolve(raw_args)?;
        Ok((definition, params))
    }

    /// Validates and runs the handler on an already connected context.
    pub async fn invoke(
        &self,
        name: &str,
        raw_args: &[String],
        context: &RuntimeContext<P>,
        config: &HarnessConfig,
    ) -> Result<String> {
        let (definition, params) = self.prepare(name, raw_args)?;
        (definition.handler)(&params, context, config).await
    }

    pub fn help(&self) -> String {
        let mut out = String::from("commands:\n");
        for definition in self.commands.values() {
            let _ = writeln!(out, "  {:<14}{}", definition.name, definition.description);
            for param in definition.params {
                let _ = writeln!(
                    out,
                    "      --{} <{:?}>{}  {}",
                    param.name,
                    param.kind,
                    if param.required { "" } else { " (optional)" },
                    param.description
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    static CALLS: AtomicUsize = AtomicUsize::new(0);

    const PARAMS: &[ParamSpec] = &[
        ParamSpec::required("account", "The account's address", ParamKind::Address),
        ParamSpec::optional("amount", "Amount in wei", ParamKind::Uint),
    ];

    fn counting<'a>(
        params: &'a ResolvedParams,
        _: &'a RuntimeContext,
        _: &'a HarnessConfig,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{:?}", params.address("account")?))
        })
    }

    fn definition(name: &'static str) -> CommandDefinition {
        CommandDefinition {
            name,
            description: "test command",
            params: PARAMS,
            handler: counting,
        }
    }

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn unreachable_config() -> HarnessConfig {
        HarnessConfig::from_json(
            r#"{"defaultNetwork": "dead", "networks": {"dead": {"rpcUrl": "http://127.0.0.1:1"}}}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_builtins_register() {
        let registry: CommandRegistry = CommandRegistry::with_builtins().unwrap();
        for name in ["deploy", "getWETH", "balance", "accounts", "blockNumber"] {
            assert!(registry.get(name).is_ok(), "{name} missing");
        }
        assert!(registry.help().contains("--account <Address>"));
    }

    #[test]
    fn test_duplicate_command() {
        let mut registry = CommandRegistry::new();
        registry.register(definition("echo")).unwrap();
        assert!(matches!(
            registry.register(definition("echo")),
            Err(HarnessError::DuplicateCommand(name)) if name == "echo"
        ));
    }

    #[test]
    fn test_unknown_command() {
        let registry: CommandRegistry = CommandRegistry::new();
        assert!(matches!(
            registry.prepare("nope", &[]),
            Err(HarnessError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_resolve_params() {
        let def = definition("echo");
        let params = def
            .resolve(&args(&[
                "--account",
                "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2",
                "--amount=0x10",
            ]))
            .unwrap();
        assert_eq!(
            params.address("account").unwrap(),
            crate::contracts::MAINNET_WETH
        );
        assert_eq!(params.uint("amount").unwrap(), U256::from(16));

        let params = def
            .resolve(&args(&["--account", "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"]))
            .unwrap();
        assert!(params.get("amount").is_none());
    }

    #[test]
    fn test_missing_required_parameter() {
        let def = definition("echo");
        assert!(matches!(
            def.resolve(&args(&["--amount", "5"])),
            Err(HarnessError::MissingRequiredParameter(name)) if name == "account"
        ));
    }

    #[test]
    fn test_unexpected_parameter() {
        let def = definition("echo");
        let account = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";
        assert!(matches!(
            def.resolve(&args(&["--account", account, "--extra", "1"])),
            Err(HarnessError::UnexpectedParameter(name)) if name == "extra"
        ));
        assert!(matches!(
            def.resolve(&args(&[account])),
            Err(HarnessError::UnexpectedParameter(_))
        ));
        assert!(matches!(
            def.resolve(&args(&["--account", account, "--account", account])),
            Err(HarnessError::UnexpectedParameter(_))
        ));
    }

    #[test]
    fn test_invalid_parameter_value() {
        let def = definition("echo");
        assert!(matches!(
            def.resolve(&args(&["--account", "0x1234"])),
            Err(HarnessError::InvalidParameterValue { name, value })
                if name == "account" && value == "0x1234"
        ));
        assert!(matches!(
            def.resolve(&args(&["--account"])),
            Err(HarnessError::InvalidParameterValue { .. })
        ));
        assert!(matches!(
            def.resolve(&args(&[
                "--account",
                "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2",
                "--amount",
                "-1"
            ])),
            Err(HarnessError::InvalidParameterValue { name, .. }) if name == "amount"
        ));
    }

    #[test]
    fn test_blank_or_malformed_uint_rejected() {
        let def = definition("echo");
        let account = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";
        for raw in ["--amount=", "--amount=0x", "--amount=0x0x5", "--amount=12a", "--amount=+3"] {
            let err = def.resolve(&args(&["--account", account, raw])).unwrap_err();
            let value = raw.trim_start_matches("--amount=");
            assert!(
                matches!(
                    &err,
                    HarnessError::InvalidParameterValue { name, value: got }
                        if name == "amount" && got == value
                ),
                "{raw}: {err:?}"
            );
        }
        let params = def
            .resolve(&args(&["--account", account, "--amount=0x00ff"]))
            .unwrap();
        assert_eq!(params.uint("amount").unwrap(), U256::from(255));
    }

    #[tokio::test]
    async fn test_dispatch_rejects_before_handler_and_network() {
        let mut registry = CommandRegistry::new();
        registry.register(definition("echo")).unwrap();
        let config = unreachable_config();
        let profile = config.profiles.default_profile().unwrap();

        let before = CALLS.load(Ordering::SeqCst);
        let err = registry
            .dispatch("echo", &args(&["--amount", "1"]), profile, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::MissingRequiredParameter(_)));
        assert_eq!(CALLS.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn test_dispatch_reports_connection_failure() {
        let mut registry = CommandRegistry::new();
        registry.register(definition("echo")).unwrap();
        let config = unreachable_config();
        let profile = config.profiles.default_profile().unwrap();

        let err = registry
            .dispatch(
                "echo",
                &args(&["--account", "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"]),
                profile,
                &config,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Connection { .. }));
    }
}
