use std::{process::Stdio, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines},
    process::{Child, ChildStdout, Command},
};

use crate::error::{HarnessError, Result};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Parameters for a local node replaying another chain's state.
#[derive(Debug, Clone)]
pub struct ForkSpec {
    pub program: String,
    pub upstream: String,
    pub block_number: Option<u64>,
    pub chain_id: Option<u64>,
}

impl ForkSpec {
    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--fork-url".to_string(),
            self.upstream.clone(),
            "--port".to_string(),
            "0".to_string(),
        ];
        if let Some(block) = self.block_number {
            args.push("--fork-block-number".to_string());
            args.push(block.to_string());
        }
        if let Some(chain_id) = self.chain_id {
            args.push("--chain-id".to_string());
            args.push(chain_id.to_string());
        }
        args
    }
}

/// A running fork node. The process is killed when this is dropped.
#[derive(Debug)]
pub struct ForkNode {
    _child: Child,
    endpoint: String,
    keys: Vec<String>,
}

impl ForkNode {
    pub async fn spawn(spec: &ForkSpec) -> Result<Self> {
        log::info!(
            "forking {} at block {}",
            redact(&spec.upstream),
            spec.block_number
                .map(|b| b.to_string())
                .unwrap_or_else(|| "latest".to_string())
        );

        let mut child = Command::new(&spec.program)
            .args(spec.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HarnessError::Connection {
                url: redact(&spec.upstream),
                reason: format!("cannot start {}: {e}", spec.program),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| HarnessError::Connection {
            url: redact(&spec.upstream),
            reason: "fork node stdout unavailable".to_string(),
        })?;
        let mut lines = BufReader::new(stdout).lines();

        let banner = tokio::time::timeout(STARTUP_TIMEOUT, read_banner(&mut lines))
            .await
            .map_err(|_| HarnessError::Connection {
                url: redact(&spec.upstream),
                reason: format!("fork node not ready after {}s", STARTUP_TIMEOUT.as_secs()),
            })??;

        let endpoint = banner.endpoint.ok_or_else(|| HarnessError::Connection {
            url: redact(&spec.upstream),
            reason: "fork node exited before listening".to_string(),
        })?;
        log::info!("fork node listening on {endpoint}");

        // the node logs every request; keep the pipe drained
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                log::trace!("anvil: {line}");
            }
        });

        Ok(Self {
            _child: child,
            endpoint,
            keys: banner.keys,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Dev account private keys, in the order the node lists them.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

#[derive(Debug, Default, PartialEq)]
struct Banner {
    keys: Vec<String>,
    endpoint: Option<String>,
    in_keys: bool,
}

impl Banner {
    /// Feeds one stdout line; returns true once the node is listening.
    fn feed(&mut self, line: &str) -> bool {
        let line = line.trim();
        if line.starts_with("Private Keys") {
            self.in_keys = true;
        } else if line.starts_with("Wallet") || line.starts_with("Chain ID") {
            self.in_keys = false;
        } else if let Some(addr) = line.strip_prefix("Listening on ") {
            self.endpoint = Some(format!("http://{}", addr.trim()));
            return true;
        } else if self.in_keys && line.starts_with('(') {
            if let Some((_, key)) = line.split_once(' ') {
                self.keys.push(key.trim().to_string());
            }
        }
        false
    }
}

async fn read_banner(lines: &mut Lines<BufReader<ChildStdout>>) -> Result<Banner> {
    let mut banner = Banner::default();
    while let Some(line) = lines.next_line().await? {
        if banner.feed(&line) {
            break;
        }
    }
    Ok(banner)
}

/// Strips path and query from a URL so access tokens stay out of logs.
pub fn redact(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let host = rest.split(['/', '?']).next().unwrap_or_default();
            if host.len() == rest.len() {
                url.to_string()
            } else {
                format!("{scheme}://{host}/…")
            }
        }
        None => url.to_string(),
    }
}
