use std::time::{Duration, Instant};

use ethers::{
    providers::Middleware,
    types::{transaction::eip2718::TypedTransaction, TransactionReceipt, H256, U256},
    utils::format_units,
};

use crate::error::{HarnessError, Result};

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub async fn send_transaction<M: Middleware>(client: &M, mut tx: TypedTransaction) -> Result<H256> {
    client
        .fill_transaction(&mut tx, None)
        .await
        .map_err(HarnessError::rpc)?;

    let transaction_hash = client
        .send_transaction(tx, None)
        .await
        .map_err(HarnessError::rpc)?
        .tx_hash();
    log::info!("transaction hash:{:?}", transaction_hash);
    Ok(transaction_hash)
}

/// Polls for the receipt of `transaction_hash` until it is mined or `timeout` elapses.
pub async fn wait_transaction<M: Middleware>(
    client: &M,
    transaction_hash: H256,
    timeout: Duration,
    interval: Duration,
) -> Result<TransactionReceipt> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(receipt) = get_transaction_receipt(client, transaction_hash).await? {
            log::info!(
                "transaction {:?} mined in block {:?}",
                transaction_hash,
                receipt.block_number
            );
            return Ok(receipt);
        }
        if Instant::now() >= deadline {
            return Err(HarnessError::DeploymentTimeout {
                tx_hash: transaction_hash,
                secs: timeout.as_secs(),
            });
        }
        log::debug!("waiting for transaction {:?}", transaction_hash);
        tokio::time::sleep(interval).await;
    }
}

pub async fn get_transaction_receipt<M: Middleware>(
    client: &M,
    transaction_hash: H256,
) -> Result<Option<TransactionReceipt>> {
    client
        .get_transaction_receipt(transaction_hash)
        .await
        .map_err(HarnessError::rpc)
}

/// Formats a base-unit amount with `decimals` places, dropping trailing zeros.
pub fn format_amount(amount: U256, decimals: u32) -> Result<String> {
    let formatted = format_units(amount, decimals).map_err(|e| HarnessError::Rpc(e.to_string()))?;
    Ok(trim_decimal(&formatted))
}

fn trim_decimal(value: &str) -> String {
    if !value.contains('.') {
        return value.to_string();
    }
    value.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use ethers::{providers::Provider, types::U64};

    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(U256::zero(), 18).unwrap(), "0");
        assert_eq!(
            format_amount(U256::exp10(18) * 3 / 2, 18).unwrap(),
            "1.5"
        );
        assert_eq!(format_amount(U256::from(1_000_000u64), 6).unwrap(), "1");
        assert_eq!(format_amount(U256::from(1u64), 18).unwrap(), "0.000000000000000001");
    }

    #[test]
    fn test_trim_decimal() {
        assert_eq!(trim_decimal("10.000"), "10");
        assert_eq!(trim_decimal("100"), "100");
        assert_eq!(trim_decimal("0.120"), "0.12");
    }

    #[tokio::test]
    async fn test_wait_transaction_returns_receipt() {
        let (provider, mock) = Provider::mocked();
        let receipt = TransactionReceipt {
            block_number: Some(U64::from(7)),
            status: Some(U64::from(1)),
            ..Default::default()
        };
        // responses are served last-in first-out
        mock.push(Some(receipt.clone())).unwrap();
        mock.push(None::<TransactionReceipt>).unwrap();

        let got = wait_transaction(
            &provider,
            H256::zero(),
            Duration::from_secs(5),
            Duration::from_millis(1),
        )
        .await
        .unwrap();
        assert_eq!(got.block_number, Some(U64::from(7)));
    }

    #[tokio::test]
    async fn test_wait_transaction_times_out() {
        let (provider, mock) = Provider::mocked();
        for _ in 0..200 {
            mock.push(None::<TransactionReceipt>).unwrap();
        }
        let err = wait_transaction(
            &provider,
            H256::repeat_byte(1),
            Duration::from_millis(30),
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::DeploymentTimeout { tx_hash, .. } if tx_hash == H256::repeat_byte(1)
        ));
    }
}
