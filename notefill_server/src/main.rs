// CLI entry point for the notefill bridge.
//
// Loads `ServiceConfig` from `--config` (if given), applies flag overrides,
// builds the configured upstream backend and serves until killed.
//
// Usage:
//   notefill [OPTIONS]
//     --config <PATH>         JSON config file
//     --bind <ADDR>           Listen address (default: 127.0.0.1)
//     --port <PORT>           Listen port (default: 3456)
//     --upstream <URL>        Upstream base URL (default: http://127.0.0.1:3457)
//     --upstream-kind <KIND>  piece | midi-file | legacy
//     --checkpoint <PATH>     Model checkpoint passed to the upstream
//     --timeout <SECS>        Upstream timeout
//     --no-cache              Disable the result cache

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use notefill_server::{ServiceConfig, UpstreamKind, backend_from_config, start_server};

#[derive(Debug, Parser)]
#[command(version, about = "Bridge a DAW host's infill calls to a generation model service")]
struct Args {
    /// JSON config file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    bind: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Upstream base URL (the XML-RPC endpoint for `legacy`).
    #[arg(long)]
    upstream: Option<String>,

    #[arg(long, value_enum)]
    upstream_kind: Option<UpstreamKind>,

    #[arg(long)]
    checkpoint: Option<String>,

    /// Upstream request timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    #[arg(long)]
    no_cache: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => ServiceConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(url) = self.upstream {
            config.upstream.url = url;
        }
        if let Some(kind) = self.upstream_kind {
            config.upstream.kind = kind;
        }
        if let Some(checkpoint) = self.checkpoint {
            config.upstream.checkpoint = checkpoint;
        }
        if let Some(timeout) = self.timeout {
            config.upstream.timeout_secs = timeout;
        }
        if self.no_cache {
            config.cache_enabled = false;
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config()?;
    let backend = backend_from_config(&config).context("creating upstream client")?;
    let (handle, addr) = start_server(&config, backend)
        .with_context(|| format!("binding {}", config.listen_addr()))?;

    log::info!("notefill listening on http://{addr} (upstream {})", config.upstream.url);
    handle.wait();
    Ok(())
}
