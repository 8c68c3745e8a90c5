#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = quiz_attempts::run().await {
        eprintln!("quiz-attempts fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
