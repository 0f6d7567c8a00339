use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tabcast_cli::cli::run().await
}
