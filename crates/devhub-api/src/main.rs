use anyhow::Result;

use devhub_api::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = telemetry::init("devhub-api")?;
    devhub_api::server::run().await
}
