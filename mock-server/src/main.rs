use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    let addr = listener.local_addr()?;
    println!("mock auth server on http://{addr} (user {:?}, password {:?})", mock_server::USER, mock_server::PASSWORD);
    mock_server::run(listener).await
}
