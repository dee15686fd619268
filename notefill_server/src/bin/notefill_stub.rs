// Stub upstream generation service.
//
// Serves `/health`, `/generate` and `/generate_from_midi` with deterministic
// content so the bridge can be exercised without a model.

use anyhow::Context;
use clap::Parser;

use notefill_server::config::DEFAULT_UPSTREAM_PORT;
use notefill_server::start_stub_service;

#[derive(Debug, Parser)]
#[command(version, about = "Deterministic stand-in for the generation model service")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    #[arg(long, default_value_t = DEFAULT_UPSTREAM_PORT)]
    port: u16,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.bind, args.port);
    let (handle, bound) = start_stub_service(&addr).with_context(|| format!("binding {addr}"))?;
    log::info!("stub generation service listening on http://{bound}");
    handle.wait();
    Ok(())
}
