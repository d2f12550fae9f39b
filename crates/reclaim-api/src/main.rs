use reclaim_core::Config;

// musl's allocator fragments badly under upload bursts.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    let (_state, router) = reclaim_api::setup::initialize_app(config.clone()).await?;

    reclaim_api::setup::server::start_server(&config, router).await?;

    Ok(())
}
