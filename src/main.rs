#[tokio::main]
async fn main() -> anyhow::Result<()> {
    screenclick_lib::run().await
}
