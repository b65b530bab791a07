#[tokio::main]
async fn main() {
    if let Err(err) = ideasbox::run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
