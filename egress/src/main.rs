use egress_config::EgressConfig;
use utils::init_tracing;

mod app;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cfg = EgressConfig::from_file_or_default("egress.conf");
    cfg.print();

    server::run(cfg).await
}
