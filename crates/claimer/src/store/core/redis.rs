use crate::error::ClaimerError;
#[cfg(test)]
use log::debug;
use log::info;
use redis::Client;
#[cfg(test)]
use redis_test::server::RedisServer;
#[cfg(test)]
use std::sync::Arc;
#[cfg(test)]
use std::thread;
#[cfg(test)]
use std::time::Duration;

#[derive(Clone)]
pub struct RedisStore {
    pub client: Client,
    #[allow(dead_code)]
    #[cfg(test)]
    server: Option<Arc<RedisServer>>,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self, ClaimerError> {
        let client = Client::open(redis_url)?;
        info!("Using Redis at {redis_url}");
        Ok(Self {
            client,
            #[cfg(test)]
            server: None,
        })
    }

    /// Round-trips a PING so startup fails fast on a dead server.
    pub async fn ping(&self) -> Result<(), ClaimerError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut con).await?;
        Ok(())
    }

    #[cfg(test)]
    pub fn new_test() -> Self {
        let server = RedisServer::new();

        let (host, port) = match server.client_addr() {
            redis::ConnectionAddr::Tcp(host, port) => (host.clone(), *port),
            _ => panic!("Expected TCP connection"),
        };

        let redis_url = format!("redis://{host}:{port}");
        debug!("Starting test Redis server at {redis_url}");

        thread::sleep(Duration::from_millis(100));

        let client = loop {
            if let Ok(client) = Client::open(redis_url.clone()) {
                if let Ok(mut conn) = client.get_connection() {
                    if redis::cmd("PING").query::<String>(&mut conn).is_ok() {
                        break client;
                    }
                }
            }
            thread::sleep(Duration::from_millis(100));
        };

        Self {
            client,
            server: Some(Arc::new(server)),
        }
    }
}
