//! PosterMaker binary entry point

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    postermaker::cli::main().await
}
