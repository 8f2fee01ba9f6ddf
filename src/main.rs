#[tokio::main]
async fn main() {
    if let Err(e) = querygate::run().await {
        eprintln!("querygate: {}", e);
        std::process::exit(1);
    }
}
