#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = sheetgrade::run().await {
        eprintln!("sheetgrade fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
