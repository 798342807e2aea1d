use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct VersionOutput {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    profile: &'static str,
    git_hash: &'static str,
}

impl VersionOutput {
    fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            target: option_env!("COMFOLINK_BUILD_TARGET").unwrap_or("unknown"),
            profile: option_env!("COMFOLINK_BUILD_PROFILE").unwrap_or("unknown"),
            git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
        }
    }
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    let out = VersionOutput::current();

    if !args.extended {
        println!("{} {}", out.name, out.version);
        return Ok(SUCCESS);
    }

    if format == OutputFormat::Json {
        println!(
            "{}",
            serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
        );
        return Ok(SUCCESS);
    }

    println!("name: {}", out.name);
    println!("version: {}", out.version);
    println!("target: {}", out.target);
    println!("profile: {}", out.profile);
    println!("git_hash: {}", out.git_hash);
    println!("default_port: {}", comfolink_transport::DEFAULT_PORT);

    Ok(SUCCESS)
}
