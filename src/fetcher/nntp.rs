//! Production [`Connector`] backed by `nntp-rs`.

use super::{ArticleConnection, Connector};
use crate::config::ServerConfig;
use std::sync::Arc;

/// Connects to the configured server and authenticates when credentials are set
pub struct NntpConnector {
    server: Arc<nntp_rs::ServerConfig>,
    authenticate: bool,
}

impl NntpConnector {
    /// Build a connector from the server section of the configuration
    pub fn new(server: &ServerConfig) -> Self {
        Self {
            authenticate: server.username.is_some(),
            server: Arc::new(server.clone().into()),
        }
    }
}

#[async_trait::async_trait]
impl Connector for NntpConnector {
    async fn connect(&self) -> nntp_rs::Result<Box<dyn ArticleConnection>> {
        let mut client = nntp_rs::NntpClient::connect(self.server.clone()).await?;

        if self.authenticate {
            client.authenticate().await?;
        }

        tracing::debug!(
            host = %self.server.host,
            port = self.server.port,
            tls = self.server.tls,
            "Connected to NNTP server"
        );

        Ok(Box::new(NntpConnection { client }))
    }
}

struct NntpConnection {
    client: nntp_rs::NntpClient,
}

#[async_trait::async_trait]
impl ArticleConnection for NntpConnection {
    async fn fetch_body(&mut self, message_id: &str) -> nntp_rs::Result<Vec<u8>> {
        let response = self.client.fetch_body_binary(&bracketed(message_id)).await?;
        Ok(response.data)
    }

    async fn quit(&mut self) -> nntp_rs::Result<()> {
        self.client.quit().await
    }
}

/// NNTP wants message-IDs in angle brackets; manifests usually omit them
fn bracketed(message_id: &str) -> String {
    let trimmed = message_id.trim();
    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        trimmed.to_string()
    } else {
        format!("<{}>", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_are_bracketed_once() {
        assert_eq!(bracketed("part1of2@example.com"), "<part1of2@example.com>");
        assert_eq!(bracketed("<part1of2@example.com>"), "<part1of2@example.com>");
        assert_eq!(bracketed(" abc@x "), "<abc@x>");
    }

    #[test]
    fn credentials_enable_authentication() {
        let mut server = ServerConfig {
            host: "news.example.com".to_string(),
            port: 563,
            tls: true,
            username: None,
            password: None,
        };
        assert!(!NntpConnector::new(&server).authenticate);

        server.username = Some("user".to_string());
        server.password = Some("pass".to_string());
        let connector = NntpConnector::new(&server);
        assert!(connector.authenticate);
        assert_eq!(connector.server.port, 563);
    }
}
