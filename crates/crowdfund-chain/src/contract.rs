use futures_util::StreamExt;
use tracing::{debug, info, warn};
use web3::Web3;
use web3::contract::{Contract, Options};
use web3::ethabi::{self, RawLog, Token};
use web3::transports::WebSocket;
use web3::types::{Address, FilterBuilder, Log, U256};

use crowdfund_types::events::ChainEvent;

use crate::ChainError;
use crate::gateway::{ChainConfig, ChainGateway, EventStream, OnChainCampaign};

/// The subset of the CrowdFunding contract ABI this service reads.
const CONTRACT_ABI: &str = r#"[
  {"anonymous": false, "name": "CampaignCreated", "type": "event", "inputs": [
    {"indexed": true, "name": "campaignId", "type": "uint256"},
    {"indexed": true, "name": "owner", "type": "address"},
    {"indexed": false, "name": "title", "type": "string"},
    {"indexed": false, "name": "target", "type": "uint256"},
    {"indexed": false, "name": "deadline", "type": "uint256"}
  ]},
  {"anonymous": false, "name": "DonationReceived", "type": "event", "inputs": [
    {"indexed": true, "name": "campaignId", "type": "uint256"},
    {"indexed": true, "name": "donator", "type": "address"},
    {"indexed": false, "name": "amount", "type": "uint256"}
  ]},
  {"name": "getCampaigns", "type": "function", "stateMutability": "view", "inputs": [], "outputs": [
    {"name": "", "type": "tuple[]", "components": [
      {"name": "id", "type": "uint256"},
      {"name": "owner", "type": "address"},
      {"name": "title", "type": "string"},
      {"name": "description", "type": "string"},
      {"name": "target", "type": "uint256"},
      {"name": "deadline", "type": "uint256"},
      {"name": "amountCollected", "type": "uint256"},
      {"name": "image", "type": "string"},
      {"name": "donators", "type": "address[]"},
      {"name": "donations", "type": "uint256[]"},
      {"name": "withdrawn", "type": "bool"}
    ]}
  ]},
  {"name": "getDonators", "type": "function", "stateMutability": "view",
    "inputs": [{"name": "_id", "type": "uint256"}],
    "outputs": [{"name": "", "type": "address[]"}, {"name": "", "type": "uint256[]"}]}
]"#;

const CAMPAIGN_CREATED: &str = "CampaignCreated";
const DONATION_RECEIVED: &str = "DonationReceived";

/// [`ChainGateway`] over a WebSocket JSON-RPC endpoint.
///
/// Every call opens its own connection; the reconciler holds one open for
/// as long as its subscription lives.
#[derive(Debug, Clone)]
pub struct Web3Gateway {
    rpc_url: String,
    address: Address,
    abi: ethabi::Contract,
}

impl Web3Gateway {
    /// Fails with [`ChainError::Config`] when the endpoint or contract
    /// address is missing or malformed.
    pub fn new(config: &ChainConfig) -> Result<Self, ChainError> {
        let rpc_url = config
            .rpc_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ChainError::Config("RPC URL is not configured".into()))?;
        if !rpc_url.starts_with("ws://") && !rpc_url.starts_with("wss://") {
            return Err(ChainError::Config(format!(
                "RPC URL must be a ws:// or wss:// endpoint, got `{}`",
                rpc_url
            )));
        }
        if rpc_url.starts_with("wss://") && !cfg!(feature = "tls") {
            return Err(ChainError::Config(
                "wss:// RPC URLs need the `tls` feature enabled".into(),
            ));
        }

        let raw_address = config
            .contract_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ChainError::Config("contract address is not configured".into()))?;
        let address: Address = raw_address
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| ChainError::Config(format!("invalid contract address `{}`: {:?}", raw_address, e)))?;

        let abi = ethabi::Contract::load(CONTRACT_ABI.as_bytes())
            .map_err(|e| ChainError::Config(format!("contract ABI: {}", e)))?;

        info!("Chain gateway configured for contract {:?}", address);
        Ok(Self {
            rpc_url: rpc_url.to_string(),
            address,
            abi,
        })
    }

    async fn connect(&self) -> Result<Web3<WebSocket>, ChainError> {
        let transport = WebSocket::new(&self.rpc_url)
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        Ok(Web3::new(transport))
    }

    async fn contract(&self) -> Result<Contract<WebSocket>, ChainError> {
        let web3 = self.connect().await?;
        Ok(Contract::new(web3.eth(), self.address, self.abi.clone()))
    }
}

impl ChainGateway for Web3Gateway {
    async fn subscribe(&self) -> Result<EventStream, ChainError> {
        let created = self.abi.event(CAMPAIGN_CREATED).map_err(decode_err)?.signature();
        let donated = self.abi.event(DONATION_RECEIVED).map_err(decode_err)?.signature();

        let web3 = self.connect().await?;
        let filter = FilterBuilder::default()
            .address(vec![self.address])
            .topics(Some(vec![created, donated]), None, None, None)
            .build();
        let logs = web3
            .eth_subscribe()
            .subscribe_logs(filter)
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        info!("Subscribed to contract events on {:?}", self.address);

        let abi = self.abi.clone();
        let events = logs.filter_map(move |item| {
            let decoded = match item {
                Ok(log) => decode_log(&abi, log).transpose(),
                Err(e) => Some(Err(ChainError::Transport(e.to_string()))),
            };
            async move { decoded }
        });

        Ok(events.boxed())
    }

    async fn get_campaigns(&self) -> Result<Vec<OnChainCampaign>, ChainError> {
        let contract = self.contract().await?;
        let raw: Token = contract
            .query("getCampaigns", (), None, Options::default(), None)
            .await
            .map_err(contract_err)?;

        let Token::Array(items) = raw else {
            return Err(ChainError::Decode(format!("getCampaigns returned {:?}", raw)));
        };
        let campaigns = items
            .into_iter()
            .map(campaign_from_token)
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Fetched {} campaigns from chain", campaigns.len());
        Ok(campaigns)
    }

    async fn get_donators(&self, campaign_id: u64) -> Result<Vec<(String, String)>, ChainError> {
        let contract = self.contract().await?;
        let (donators, donations): (Vec<Address>, Vec<U256>) = contract
            .query("getDonators", (U256::from(campaign_id),), None, Options::default(), None)
            .await
            .map_err(contract_err)?;

        Ok(pair_donations(donators, donations))
    }
}

fn decode_err(e: ethabi::Error) -> ChainError {
    ChainError::Decode(e.to_string())
}

fn contract_err(e: web3::contract::Error) -> ChainError {
    match e {
        web3::contract::Error::Api(e) => ChainError::Transport(e.to_string()),
        other => ChainError::Decode(other.to_string()),
    }
}

/// Decodes one subscription log. Logs from other events or removed by a
/// reorg yield `None`.
fn decode_log(abi: &ethabi::Contract, log: Log) -> Result<Option<ChainEvent>, ChainError> {
    if log.removed == Some(true) {
        warn!("Ignoring removed log {:?}", log.transaction_hash);
        return Ok(None);
    }
    let Some(topic) = log.topics.first().copied() else {
        return Ok(None);
    };
    let transaction_hash = log.transaction_hash.map(|h| format!("{:?}", h));
    let raw = RawLog {
        topics: log.topics,
        data: log.data.0,
    };

    let created = abi.event(CAMPAIGN_CREATED).map_err(decode_err)?;
    if topic == created.signature() {
        let parsed = created.parse_log(raw).map_err(decode_err)?;
        return Ok(Some(ChainEvent::CampaignCreated {
            campaign_id: to_u64(uint_param(&parsed, "campaignId")?)?,
            owner: format!("{:?}", address_param(&parsed, "owner")?),
            title: string_param(&parsed, "title")?,
            target: uint_param(&parsed, "target")?.to_string(),
            deadline: to_u64(uint_param(&parsed, "deadline")?)?,
            transaction_hash,
        }));
    }

    let donated = abi.event(DONATION_RECEIVED).map_err(decode_err)?;
    if topic == donated.signature() {
        let parsed = donated.parse_log(raw).map_err(decode_err)?;
        return Ok(Some(ChainEvent::DonationReceived {
            campaign_id: to_u64(uint_param(&parsed, "campaignId")?)?,
            donator: format!("{:?}", address_param(&parsed, "donator")?),
            amount: uint_param(&parsed, "amount")?.to_string(),
            transaction_hash,
        }));
    }

    Ok(None)
}

fn param(log: &ethabi::Log, name: &str) -> Result<Token, ChainError> {
    log.params
        .iter()
        .find(|p| p.name == name)
        .map(|p| p.value.clone())
        .ok_or_else(|| ChainError::Decode(format!("log has no `{}` parameter", name)))
}

fn uint_param(log: &ethabi::Log, name: &str) -> Result<U256, ChainError> {
    param(log, name)?
        .into_uint()
        .ok_or_else(|| ChainError::Decode(format!("`{}` is not a uint", name)))
}

fn address_param(log: &ethabi::Log, name: &str) -> Result<Address, ChainError> {
    param(log, name)?
        .into_address()
        .ok_or_else(|| ChainError::Decode(format!("`{}` is not an address", name)))
}

fn string_param(log: &ethabi::Log, name: &str) -> Result<String, ChainError> {
    param(log, name)?
        .into_string()
        .ok_or_else(|| ChainError::Decode(format!("`{}` is not a string", name)))
}

fn to_u64(value: U256) -> Result<u64, ChainError> {
    if value.bits() > 64 {
        return Err(ChainError::Decode(format!("{} does not fit in u64", value)));
    }
    Ok(value.low_u64())
}

fn pair_donations(donators: Vec<Address>, donations: Vec<U256>) -> Vec<(String, String)> {
    if donators.len() != donations.len() {
        warn!(
            "Donator list length {} differs from donation list length {}",
            donators.len(),
            donations.len()
        );
    }
    donators
        .into_iter()
        .zip(donations)
        .map(|(a, v)| (format!("{:?}", a), v.to_string()))
        .collect()
}

fn campaign_from_token(token: Token) -> Result<OnChainCampaign, ChainError> {
    let Token::Tuple(fields) = token else {
        return Err(ChainError::Decode(format!("campaign entry is not a tuple: {:?}", token)));
    };
    let [id, owner, title, description, target, deadline, collected, image, donators, donations, withdrawn]: [Token; 11] =
        fields
            .try_into()
            .map_err(|f: Vec<Token>| ChainError::Decode(format!("campaign tuple has {} fields", f.len())))?;

    let uint = |t: Token, name: &str| {
        t.into_uint()
            .ok_or_else(|| ChainError::Decode(format!("campaign `{}` is not a uint", name)))
    };
    let text = |t: Token, name: &str| {
        t.into_string()
            .ok_or_else(|| ChainError::Decode(format!("campaign `{}` is not a string", name)))
    };
    let list = |t: Token, name: &str| {
        t.into_array()
            .ok_or_else(|| ChainError::Decode(format!("campaign `{}` is not an array", name)))
    };

    let donators = list(donators, "donators")?
        .into_iter()
        .map(|t| t.into_address())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| ChainError::Decode("campaign donators are not addresses".into()))?;
    let donations = list(donations, "donations")?
        .into_iter()
        .map(|t| t.into_uint())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| ChainError::Decode("campaign donations are not uints".into()))?;

    Ok(OnChainCampaign {
        id: to_u64(uint(id, "id")?)?,
        owner: owner
            .into_address()
            .map(|a| format!("{:?}", a))
            .ok_or_else(|| ChainError::Decode("campaign owner is not an address".into()))?,
        title: text(title, "title")?,
        description: text(description, "description")?,
        target: uint(target, "target")?.to_string(),
        deadline: to_u64(uint(deadline, "deadline")?)?,
        amount_collected: uint(collected, "amountCollected")?.to_string(),
        image: text(image, "image")?,
        donations: pair_donations(donators, donations),
        withdrawn: withdrawn
            .into_bool()
            .ok_or_else(|| ChainError::Decode("campaign withdrawn is not a bool".into()))?,
    })
}
