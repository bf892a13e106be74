use ethers::types::Address;

use crate::{
    config::HarnessConfig,
    error::Result,
    factory::{ContractHandle, FactoryResolver},
    provider::{Client, RuntimeContext, Transport},
};

pub struct Deploy<'a, P> {
    context: &'a RuntimeContext<P>,
    factories: FactoryResolver,
}

impl<'a, P: Transport> Deploy<'a, P> {
    pub fn new(context: &'a RuntimeContext<P>, config: &HarnessConfig) -> Self {
        Self {
            context,
            factories: FactoryResolver::new(&config.artifacts),
        }
    }

    pub async fn run(&self, interface: &str, args: &[String]) -> Result<ContractHandle<Client<P>>> {
        let factory = self.factories.factory_for(interface)?;
        let handle = factory.deploy(args, self.context).await?;
        log::info!(
            "{} deployed at {:?} on {} by {:?}",
            factory.name(),
            handle.address(),
            self.context.profile().name,
            handle.deploy_tx()
        );
        Ok(handle)
    }
}

/// Resolve profile, connect, deploy `interface` and return its address.
pub async fn run(
    config: &HarnessConfig,
    network: Option<&str>,
    interface: &str,
    args: &[String],
) -> Result<Address> {
    let profile = config.profiles.select(network)?;
    let context = RuntimeContext::connect(profile, config).await?;
    let handle = Deploy::new(&context, config).run(interface, args).await?;
    Ok(handle.address())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarnessError;

    #[tokio::test]
    async fn test_unknown_profile_never_connects() {
        let config = HarnessConfig::from_json(
            r#"{"networks": {"ctf": {"rpcUrl": "http://127.0.0.1:1"}}}"#,
        )
        .unwrap();
        let err = run(&config, Some("mainnet"), "Exploit", &[]).await.unwrap_err();
        assert!(matches!(err, HarnessError::UnknownProfile(name) if name == "mainnet"));
    }

    #[tokio::test]
    async fn test_missing_default_profile() {
        let config = HarnessConfig::from_json(r#"{}"#).unwrap();
        let err = run(&config, None, "Exploit", &[]).await.unwrap_err();
        assert!(matches!(err, HarnessError::NoDefaultProfile));
    }

    #[tokio::test]
    async fn test_connection_failure_propagates() {
        let config = HarnessConfig::from_json(
            r#"{"defaultNetwork": "ctf", "networks": {"ctf": {"rpcUrl": "http://127.0.0.1:1"}}}"#,
        )
        .unwrap();
        let err = run(&config, None, "Exploit", &[]).await.unwrap_err();
        assert!(matches!(err, HarnessError::Connection { .. }));
    }
}
