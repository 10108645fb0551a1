use anyhow::Context;
use clap::Parser;
use stakeship_deploy::NetworkConfig;
use tracing::level_filters::LevelFilter;

/// The default network to deploy to.
const DEFAULT_NETWORK: Network = Network::BscTestnet;

/// Networks with built-in endpoints.
///
/// Anything else parses as `Custom` and must bring its own `--rpc-url`
/// and `--chain-id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Network {
    BscTestnet,
    Bsc,
    Localhost,
    #[strum(default)]
    Custom(String),
}

impl Network {
    pub fn chain_id(&self) -> Option<u64> {
        match self {
            Network::BscTestnet => Some(97),
            Network::Bsc => Some(56),
            Network::Localhost => Some(31337),
            Network::Custom(_) => None,
        }
    }

    pub fn rpc_url(&self) -> Option<&'static str> {
        match self {
            Network::BscTestnet => Some("https://data-seed-prebsc-1-s1.bnbchain.org:8545"),
            Network::Bsc => Some("https://bsc-dataseed.bnbchain.org"),
            Network::Localhost => Some("http://127.0.0.1:8545"),
            Network::Custom(_) => None,
        }
    }

    /// Verification registry endpoint, for networks that have one.
    pub fn registry_url(&self) -> Option<&'static str> {
        match self {
            Network::BscTestnet => Some("https://api-testnet.bscscan.com/api"),
            Network::Bsc => Some("https://api.bscscan.com/api"),
            Network::Localhost | Network::Custom(_) => None,
        }
    }
}

#[derive(Parser)]
#[command(name = "stakeship")]
#[command(
    author,
    version,
    about = "Deploy, wire, verify and export a contract stack in one run"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "STAKESHIP_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to an existing Stakeship.toml manifest (or a directory containing one).
    ///
    /// When not provided, a starter manifest for the selected network is
    /// generated and saved so it can be tuned and re-run.
    #[arg(short, long, alias = "conf", env = "STAKESHIP_MANIFEST")]
    pub manifest: Option<String>,

    /// The network to deploy to (name or custom).
    #[arg(short, long, env = "STAKESHIP_NETWORK", default_value_t = DEFAULT_NETWORK)]
    pub network: Network,

    /// The URL of the ledger RPC endpoint.
    ///
    /// Overrides the manifest; required for custom networks.
    #[arg(long, alias = "rpc", env = "STAKESHIP_RPC_URL")]
    pub rpc_url: Option<String>,

    /// The chain id to record in the export. Required for custom networks.
    #[arg(long, env = "STAKESHIP_CHAIN_ID")]
    pub chain_id: Option<u64>,

    /// The URL of the verification registry. Overrides the manifest.
    #[arg(long, env = "STAKESHIP_REGISTRY_URL")]
    pub registry_url: Option<String>,

    /// API key sent along with verification requests.
    #[arg(long, env = "STAKESHIP_REGISTRY_API_KEY", hide_env_values = true)]
    pub registry_api_key: Option<String>,

    /// Skip the verification stage.
    #[arg(long, env = "STAKESHIP_SKIP_VERIFY", default_value_t = false)]
    pub skip_verify: bool,

    /// Skip writing the export record.
    #[arg(long, env = "STAKESHIP_SKIP_EXPORT", default_value_t = false)]
    pub skip_export: bool,

    /// Directory the export record and interface copies are written to.
    ///
    /// Overrides the manifest's export directory.
    #[arg(long, alias = "out", env = "STAKESHIP_EXPORT_DIR")]
    pub export_dir: Option<String>,
}

impl Cli {
    /// Network description assembled from the selected network and any
    /// explicit overrides.
    pub fn network_config(&self) -> anyhow::Result<NetworkConfig> {
        let chain_id = self
            .chain_id
            .or_else(|| self.network.chain_id())
            .context("--chain-id is required for custom networks")?;

        let rpc_url = match &self.rpc_url {
            Some(url) => url.clone(),
            None => self
                .network
                .rpc_url()
                .context("--rpc-url is required for custom networks")?
                .to_string(),
        };

        Ok(NetworkConfig {
            name: self.network.to_string(),
            chain_id,
            rpc_url,
        })
    }
}
