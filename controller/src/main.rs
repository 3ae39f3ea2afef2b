mod control;
mod error;
mod host;
mod ifttt;
mod inhibit;
mod nest;
#[cfg(test)]
mod stub_http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
