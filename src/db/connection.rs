use redis::aio::ConnectionManager;
use redis::Client;

/// Creates a Redis client
///
/// Stream consumers open their own connections from it so a blocking read
/// never stalls store commands.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Opens a reconnecting, multiplexed connection shared by the stores and the
/// trigger publisher
pub async fn connect_manager(client: Client) -> anyhow::Result<ConnectionManager> {
    let manager = ConnectionManager::new(client).await?;
    Ok(manager)
}
