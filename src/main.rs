#[tokio::main]
async fn main() {
    dentalink::run().await;
}
