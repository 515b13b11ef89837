//! MongoDB client construction.

use crate::config::Config;
use mongodb::bson::doc;
use mongodb::options::{ClientOptions, Credential};
use mongodb::Client;

/// Build a pooled client from configuration and check the deployment
/// answers a ping.
pub async fn create_client(config: &Config) -> mongodb::error::Result<Client> {
    let mut options = ClientOptions::parse(&config.mongodb_uri).await?;

    if config.has_credentials() {
        options.credential = Some(
            Credential::builder()
                .username(config.username.clone())
                .password(config.password.clone())
                .build(),
        );
    }
    options.server_selection_timeout = Some(config.connect_timeout);
    options.connect_timeout = Some(config.connect_timeout);
    options.app_name = Some("keel".to_string());

    let client = Client::with_options(options)?;
    client.database("admin").run_command(doc! { "ping": 1 }).await?;

    Ok(client)
}
