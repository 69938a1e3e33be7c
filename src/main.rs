use anyhow::Result;
use calendai::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
