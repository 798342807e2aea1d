use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::{Args, Subcommand};
use comfolink_frame::DeviceId;
use comfolink_session::{Identity, SensorId, SessionConfig};
use comfolink_transport::DEFAULT_PORT;

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod apps;
pub mod discover;
pub mod listen;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Broadcast a search and print the first gateway that answers.
    Discover(DiscoverArgs),
    /// Open a session, register sensors and print received messages.
    Listen(ListenArgs),
    /// List the apps registered on the gateway.
    Apps(AppsArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Discover(args) => discover::run(args, format).await,
        Command::Listen(args) => listen::run(args, format).await,
        Command::Apps(args) => apps::run(args, format).await,
        Command::Version(args) => version::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Address the search request is sent to.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::BROADCAST))]
    pub broadcast: IpAddr,
    /// Gateway discovery port.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Local address to bind. Default: 0.0.0.0 on the discovery port.
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// How long to wait for an answer (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

/// Where the gateway is and who we are.
#[derive(Args, Debug)]
pub struct GatewayArgs {
    /// Gateway host name or IP address.
    #[arg(long, env = "COMFOLINK_HOST")]
    pub host: String,
    /// Gateway identifier (32 hex digits, as printed by `discover`).
    #[arg(long, env = "COMFOLINK_DEVICE_ID")]
    pub device_id: DeviceId,
    /// Identifier of this client. Default: random per run.
    #[arg(long, env = "COMFOLINK_CLIENT_ID")]
    pub client_id: Option<DeviceId>,
    /// Gateway TCP port.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// PIN used for app registration.
    #[arg(long, env = "COMFOLINK_PIN", default_value_t = 0, hide_env_values = true)]
    pub pin: u32,
    /// How long to wait for the gateway to confirm (e.g. 15s, 500ms).
    #[arg(long, default_value = "15s")]
    pub timeout: String,
}

impl GatewayArgs {
    pub async fn session_config(&self) -> CliResult<SessionConfig> {
        let address = resolve(&self.host, self.port).await?;
        let local = self.client_id.unwrap_or_else(DeviceId::random);
        let mut config = SessionConfig::new(address, Identity::new(local, self.device_id));
        config.pin = self.pin;
        config.start_timeout = parse_timeout(&self.timeout)?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub gateway: GatewayArgs,
    /// Take the session over from another client.
    #[arg(long)]
    pub force: bool,
    /// Sensor to subscribe to, as PDID:TYPE. Repeatable.
    #[arg(long = "sensor", value_name = "PDID:TYPE")]
    pub sensors: Vec<SensorId>,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct AppsArgs {
    #[command(flatten)]
    pub gateway: GatewayArgs,
    /// Take the session over from another client.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

async fn resolve(host: &str, port: u16) -> CliResult<SocketAddr> {
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|err| io_error(&format!("cannot resolve {host}"), err))?;
    addrs
        .next()
        .ok_or_else(|| CliError::new(USAGE, format!("no address found for {host}")))
}

pub fn parse_timeout(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
