use std::net::{Ipv4Addr, SocketAddr};

use comfolink_session::{discover, DiscoveryConfig, GatewayCodec};

use crate::cmd::{parse_timeout, DiscoverArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_discovered, OutputFormat};

pub async fn run(args: DiscoverArgs, format: OutputFormat) -> CliResult<i32> {
    let config = DiscoveryConfig {
        bind: args
            .bind
            .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port))),
        target: SocketAddr::new(args.broadcast, args.port),
        timeout: parse_timeout(&args.timeout)?,
    };

    let found = discover(&config, &GatewayCodec)
        .await
        .map_err(|err| session_error("discovery failed", err))?;
    print_discovered(&found, format);
    Ok(SUCCESS)
}
