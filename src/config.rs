//! Configuration for the facilitator server.

use clap::Parser;
use std::net::IpAddr;
use std::time::Duration;
use url::Url;

use pay402_types::Network;

/// Runtime configuration, read from CLI flags or the environment. `.env`
/// values are loaded before parsing.
#[derive(Parser, Debug, Clone)]
#[command(name = "pay402")]
#[command(about = "X402 facilitator HTTP server")]
pub struct Config {
    /// Address to bind to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to bind to.
    #[arg(long, env = "PORT", default_value_t = 8402)]
    pub port: u16,

    /// JSON-RPC endpoint of the ledger node this facilitator settles
    /// against.
    #[arg(long, env = "LEDGER_RPC_URL")]
    pub ledger_rpc_url: Url,

    /// Network label advertised in requirements and matched against
    /// payments.
    #[arg(long, env = "NETWORK", default_value = "localnet")]
    pub network: Network,

    /// Per-call timeout for ledger RPC requests, in seconds.
    #[arg(long, env = "LEDGER_RPC_TIMEOUT", default_value_t = 30)]
    pub ledger_rpc_timeout: u64,
}

impl Config {
    pub fn load() -> Result<Self, clap::Error> {
        Config::try_parse()
    }

    pub fn ledger_rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_rpc_timeout)
    }
}
