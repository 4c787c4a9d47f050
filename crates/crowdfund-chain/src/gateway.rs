use std::future::Future;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;

use crowdfund_types::events::ChainEvent;

use crate::ChainError;

/// Live contract events. The stream ends or yields a transport error when
/// the underlying connection drops; dropping it detaches the subscription.
pub type EventStream = BoxStream<'static, Result<ChainEvent, ChainError>>;

/// Connection parameters for the deployed contract.
#[derive(Debug, Clone, Default)]
pub struct ChainConfig {
    /// WebSocket RPC endpoint.
    pub rpc_url: Option<String>,
    pub contract_address: Option<String>,
}

/// Snapshot of one campaign as returned by `getCampaigns()`.
#[derive(Debug, Clone, PartialEq)]
pub struct OnChainCampaign {
    pub id: u64,
    pub owner: String,
    pub title: String,
    pub description: String,
    pub target: String,
    pub deadline: u64,
    pub amount_collected: String,
    pub image: String,
    /// (address, amount) pairs in donation order.
    pub donations: Vec<(String, String)>,
    pub withdrawn: bool,
}

/// Read and subscribe access to the crowdfunding contract.
pub trait ChainGateway: Send + Sync + 'static {
    fn subscribe(&self) -> impl Future<Output = Result<EventStream, ChainError>> + Send;

    fn get_campaigns(&self) -> impl Future<Output = Result<Vec<OnChainCampaign>, ChainError>> + Send;

    fn get_donators(
        &self,
        campaign_id: u64,
    ) -> impl Future<Output = Result<Vec<(String, String)>, ChainError>> + Send;
}

/// Object-safe read access to the contract, for holders that are not
/// generic over the gateway. Every [`ChainGateway`] is a `ChainReader`.
pub trait ChainReader: Send + Sync {
    fn campaigns(&self) -> BoxFuture<'_, Result<Vec<OnChainCampaign>, ChainError>>;

    fn donators(&self, campaign_id: u64) -> BoxFuture<'_, Result<Vec<(String, String)>, ChainError>>;
}

impl<G: ChainGateway> ChainReader for G {
    fn campaigns(&self) -> BoxFuture<'_, Result<Vec<OnChainCampaign>, ChainError>> {
        self.get_campaigns().boxed()
    }

    fn donators(&self, campaign_id: u64) -> BoxFuture<'_, Result<Vec<(String, String)>, ChainError>> {
        self.get_donators(campaign_id).boxed()
    }
}
