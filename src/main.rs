use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    oximon::run().await
}
