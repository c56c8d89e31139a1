use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    gantry_cli::run_app().await
}
