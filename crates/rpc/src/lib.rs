//! Chain client pool: one resilient RPC gateway per configured chain,
//! with endpoint rotation, adaptive log-range chunking, and an
//! exponential-backoff retry budget before a chain is declared fatally
//! unavailable, rotating across candidate RPC endpoints the way an
//! upstream peer pool rotates across candidate peers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address as AlloyAddress, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use droplets_core::config::RpcConfig;
use droplets_core::error::{ChainFatalError, ChainTransientError, DomainError};
use droplets_core::ids::{Address, BlockNumber, ChainId};
use tracing::{debug, warn};

/// A decoded contract log, chain-agnostic at this layer; classification
/// into `ShareEvent`/`IntegrationEvent` happens one layer up in
/// `droplets-chain`.
#[derive(Debug, Clone)]
pub struct RawLog {
    pub chain: ChainId,
    pub address: Address,
    pub block_number: BlockNumber,
    pub log_index: u32,
    pub tx_hash: [u8; 32],
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_block_number(&self, chain: ChainId) -> Result<BlockNumber, DomainError>;

    async fn get_block_timestamp(
        &self,
        chain: ChainId,
        block: BlockNumber,
    ) -> Result<i64, DomainError>;

    /// Fetches logs for `address` over `[from_block, to_block]`
    /// inclusive, transparently halving the range on `RangeTooLarge`
    /// and retrying transient failures with backoff before giving up.
    async fn get_logs(
        &self,
        chain: ChainId,
        address: Address,
        from_block: BlockNumber,
        to_block: BlockNumber,
    ) -> Result<Vec<RawLog>, DomainError>;
}

struct EndpointRotation {
    urls: Vec<String>,
    next: AtomicUsize,
}

impl EndpointRotation {
    fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            next: AtomicUsize::new(0),
        }
    }

    fn current(&self) -> &str {
        let idx = self.next.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[idx]
    }

    fn rotate(&self) {
        self.next.fetch_add(1, Ordering::Relaxed);
    }
}

struct ChainHandle {
    chain: ChainId,
    rotation: EndpointRotation,
    consecutive_errors: AtomicU32,
    max_log_chunk: u64,
}

/// Multi-chain RPC gateway. Holds one [`ChainHandle`] per configured
/// chain and fans requests out to whichever endpoint is currently
/// rotated in.
pub struct ChainPool {
    chains: HashMap<ChainId, Arc<ChainHandle>>,
    rpc_config: RpcConfig,
}

impl ChainPool {
    pub fn new(
        chains: impl IntoIterator<Item = (ChainId, Vec<String>, u64)>,
        rpc_config: RpcConfig,
    ) -> Self {
        let chains = chains
            .into_iter()
            .map(|(chain, urls, max_log_chunk)| {
                (
                    chain,
                    Arc::new(ChainHandle {
                        chain,
                        rotation: EndpointRotation::new(urls),
                        consecutive_errors: AtomicU32::new(0),
                        max_log_chunk,
                    }),
                )
            })
            .collect();
        Self { chains, rpc_config }
    }

    fn handle(&self, chain: ChainId) -> Result<&Arc<ChainHandle>, DomainError> {
        self.chains.get(&chain).ok_or_else(|| {
            DomainError::Internal(format!("chain {chain} is not registered in the pool"))
        })
    }

    fn backoff_policy(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(self.rpc_config.initial_backoff_ms),
            max_interval: Duration::from_millis(self.rpc_config.max_backoff_ms),
            max_elapsed_time: Some(Duration::from_millis(
                self.rpc_config.max_backoff_ms * self.rpc_config.max_retries as u64,
            )),
            ..ExponentialBackoff::default()
        }
    }

    /// Records a transient failure, rotating to the next endpoint and
    /// escalating to [`ChainFatalError`] once the chain's consecutive
    /// error budget (`rpc.max_consecutive_errors`) is spent.
    fn record_transient(
        &self,
        handle: &ChainHandle,
        err: ChainTransientError,
    ) -> Result<(), DomainError> {
        handle.rotation.rotate();
        let attempts = handle.consecutive_errors.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(chain = %handle.chain, attempts, "transient chain RPC error: {err}");
        if attempts >= self.rpc_config.max_consecutive_errors {
            return Err(ChainFatalError {
                chain: handle.chain,
                attempts,
                last: err,
            }
            .into());
        }
        Ok(())
    }

    fn record_success(&self, handle: &ChainHandle) {
        handle.consecutive_errors.store(0, Ordering::Relaxed);
    }

    fn provider_for(&self, handle: &ChainHandle) -> Result<impl Provider, DomainError> {
        let url = handle
            .rotation
            .current()
            .parse()
            .map_err(|e| DomainError::Internal(format!("invalid RPC url: {e}")))?;
        Ok(ProviderBuilder::new().on_http(url))
    }

    async fn get_logs_range(
        &self,
        handle: &ChainHandle,
        address: Address,
        from_block: BlockNumber,
        to_block: BlockNumber,
    ) -> Result<Vec<Log>, ChainTransientError> {
        let provider = self.provider_for(handle).map_err(|e| {
            ChainTransientError::MalformedResponse {
                chain: handle.chain,
                detail: e.to_string(),
            }
        })?;
        let filter = Filter::new()
            .address(AlloyAddress::from(address.0))
            .from_block(from_block)
            .to_block(to_block);

        provider.get_logs(&filter).await.map_err(|e| {
            let detail = e.to_string();
            if detail.contains("range") || detail.contains("block range") {
                ChainTransientError::RangeTooLarge {
                    chain: handle.chain,
                    detail,
                }
            } else if detail.contains("rate") || detail.contains("429") {
                ChainTransientError::RateLimited {
                    chain: handle.chain,
                    detail,
                }
            } else {
                ChainTransientError::Timeout {
                    chain: handle.chain,
                    detail,
                }
            }
        })
    }

    /// Fetches `[from_block, to_block]` in chunks no larger than
    /// `handle.max_log_chunk`, halving a chunk further whenever the
    /// endpoint rejects it as too large. Never silently drops a
    /// sub-range — a halved chunk that still fails keeps halving.
    async fn chunked_get_logs(
        &self,
        handle: &ChainHandle,
        address: Address,
        from_block: BlockNumber,
        to_block: BlockNumber,
    ) -> Result<Vec<Log>, DomainError> {
        let mut out = Vec::new();
        let mut cursor = from_block;
        let mut chunk = handle.max_log_chunk.max(1);

        while cursor <= to_block {
            let end = (cursor + chunk - 1).min(to_block);
            let attempt = backoff::future::retry(self.backoff_policy(), || async {
                match self.get_logs_range(handle, address, cursor, end).await {
                    Ok(logs) => Ok(logs),
                    Err(ChainTransientError::RangeTooLarge { .. }) if chunk > 1 => {
                        Err(backoff::Error::permanent(ChainTransientError::RangeTooLarge {
                            chain: handle.chain,
                            detail: "range too large, narrowing".to_string(),
                        }))
                    }
                    Err(e) => Err(backoff::Error::transient(e)),
                }
            })
            .await;

            match attempt {
                Ok(logs) => {
                    self.record_success(handle);
                    out.extend(logs);
                    cursor = end + 1;
                }
                Err(ChainTransientError::RangeTooLarge { .. }) if chunk > 1 => {
                    debug!(chain = %handle.chain, chunk, "halving log chunk after RangeTooLarge");
                    chunk = (chunk / 2).max(1);
                }
                Err(e) => {
                    self.record_transient(handle, e)?;
                }
            }
        }

        Ok(out)
    }
}

#[async_trait]
impl ChainClient for ChainPool {
    async fn get_block_number(&self, chain: ChainId) -> Result<BlockNumber, DomainError> {
        let handle = self.handle(chain)?;
        let provider = self.provider_for(handle)?;
        let number = provider.get_block_number().await.map_err(|e| {
            ChainTransientError::Timeout {
                chain,
                detail: e.to_string(),
            }
        });
        match number {
            Ok(n) => {
                self.record_success(handle);
                Ok(n)
            }
            Err(e) => {
                self.record_transient(handle, e)?;
                Err(DomainError::Internal(format!(
                    "get_block_number retries exhausted for chain {chain}"
                )))
            }
        }
    }

    async fn get_block_timestamp(
        &self,
        chain: ChainId,
        block: BlockNumber,
    ) -> Result<i64, DomainError> {
        let handle = self.handle(chain)?;
        let provider = self.provider_for(handle)?;
        let result = provider
            .get_block_by_number(block.into(), false.into())
            .await
            .map_err(|e| ChainTransientError::Timeout {
                chain,
                detail: e.to_string(),
            });
        match result {
            Ok(Some(block)) => {
                self.record_success(handle);
                Ok(block.header.timestamp as i64)
            }
            Ok(None) => Err(DomainError::Internal(format!(
                "block {block} not found on chain {chain}"
            ))),
            Err(e) => {
                self.record_transient(handle, e)?;
                Err(DomainError::Internal(format!(
                    "get_block_timestamp retries exhausted for chain {chain}"
                )))
            }
        }
    }

    async fn get_logs(
        &self,
        chain: ChainId,
        address: Address,
        from_block: BlockNumber,
        to_block: BlockNumber,
    ) -> Result<Vec<RawLog>, DomainError> {
        let handle = self.handle(chain)?;
        let logs = self
            .chunked_get_logs(handle, address, from_block, to_block)
            .await?;

        Ok(logs
            .into_iter()
            .filter_map(|log| {
                let block_number = log.block_number?;
                let log_index = log.log_index? as u32;
                let tx_hash = log.transaction_hash?;
                let topics: Vec<[u8; 32]> = log.topics().iter().map(|t| B256::from(*t).0).collect();
                Some(RawLog {
                    chain,
                    address,
                    block_number,
                    log_index,
                    tx_hash: tx_hash.0,
                    topics,
                    data: log.data().data.to_vec(),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool(max_consecutive_errors: u32) -> (ChainPool, ChainId) {
        let chain = ChainId(1);
        let rpc_config = RpcConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            max_consecutive_errors,
        };
        let pool = ChainPool::new(
            vec![(chain, vec!["https://a.invalid".to_string(), "https://b.invalid".to_string()], 2_000)],
            rpc_config,
        );
        (pool, chain)
    }

    #[test]
    fn endpoint_rotation_cycles_through_configured_urls() {
        let rotation = EndpointRotation::new(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(rotation.current(), "a");
        rotation.rotate();
        assert_eq!(rotation.current(), "b");
        rotation.rotate();
        assert_eq!(rotation.current(), "c");
        rotation.rotate();
        assert_eq!(rotation.current(), "a");
    }

    #[test]
    fn transient_errors_rotate_the_endpoint_and_escalate_after_the_budget_is_spent() {
        let (pool, chain) = test_pool(3);
        let handle = pool.handle(chain).unwrap().clone();

        for _ in 0..2 {
            let result = pool.record_transient(
                &handle,
                ChainTransientError::Timeout {
                    chain,
                    detail: "slow".to_string(),
                },
            );
            assert!(result.is_ok());
        }

        let fatal = pool.record_transient(
            &handle,
            ChainTransientError::Timeout {
                chain,
                detail: "slow".to_string(),
            },
        );
        assert!(matches!(fatal, Err(DomainError::ChainFatal(_))));
    }

    #[test]
    fn a_success_resets_the_consecutive_error_count() {
        let (pool, chain) = test_pool(2);
        let handle = pool.handle(chain).unwrap().clone();

        pool.record_transient(
            &handle,
            ChainTransientError::Timeout {
                chain,
                detail: "slow".to_string(),
            },
        )
        .unwrap();
        pool.record_success(&handle);

        let result = pool.record_transient(
            &handle,
            ChainTransientError::Timeout {
                chain,
                detail: "slow".to_string(),
            },
        );
        assert!(result.is_ok());
    }

    #[test]
    fn unregistered_chain_is_rejected_before_touching_any_endpoint() {
        let (pool, _chain) = test_pool(3);
        let err = pool.handle(ChainId(999)).unwrap_err();
        assert!(matches!(err, DomainError::Internal(_)));
    }
}
