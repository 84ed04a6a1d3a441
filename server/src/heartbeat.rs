//! Periodic listing heartbeat to the server directory.

use crate::server::Server;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

pub const SOFTWARE: &str = "Midnight";

/// Form fields posted on every heartbeat.
pub fn form_fields(server: &Server) -> Vec<(&'static str, String)> {
    vec![
        ("name", server.name().to_string()),
        ("port", server.port().to_string()),
        ("users", server.player_count().to_string()),
        ("max", server.max_users().to_string()),
        ("public", server.is_public().to_string()),
        ("salt", server.salt().to_string()),
        ("software", SOFTWARE.to_string()),
        ("web", "false".to_string()),
    ]
}

async fn send_heartbeat(
    client: &reqwest::Client,
    url: &str,
    server: &Server,
) -> Result<String, reqwest::Error> {
    client
        .post(url)
        .form(&form_fields(server))
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
}

/// Posts a heartbeat every `heartbeat_interval_secs` until the task is
/// aborted. Failures are logged and retried on the next beat.
pub async fn run_heartbeat(server: Arc<Server>) {
    let url = server.config().heartbeat_url.clone();
    let every = Duration::from_secs(server.config().heartbeat_interval_secs.max(1));
    let client = reqwest::Client::new();

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut announced = false;

    info!("Starting heartbeat to {}", url);
    loop {
        ticker.tick().await;

        match send_heartbeat(&client, &url, &server).await {
            Ok(body) if !announced => {
                info!("Heartbeat accepted: {}", body.trim());
                announced = true;
            }
            Ok(body) => debug!("Heartbeat sent: {}", body.trim()),
            Err(e) => warn!("Heartbeat failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::world::World;

    #[test]
    fn test_form_fields() {
        let mut config = ServerConfig {
            server_name: "Night Shift".to_string(),
            port: 4321,
            max_users: 20,
            public: false,
            ..ServerConfig::default()
        };
        config.debug.override_salt = true;
        config.debug.salt = "abc".to_string();
        let server = Server::with_world(config, World::new("t", 2, 2, 2).unwrap());

        let fields = form_fields(&server);
        let get = |key: &str| {
            fields
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.as_str())
        };

        assert_eq!(get("name"), Some("Night Shift"));
        assert_eq!(get("port"), Some("4321"));
        assert_eq!(get("users"), Some("0"));
        assert_eq!(get("max"), Some("20"));
        assert_eq!(get("public"), Some("false"));
        assert_eq!(get("salt"), Some("abc"));
        assert_eq!(get("software"), Some("Midnight"));
        assert_eq!(fields.len(), 8);
    }
}
