use std::path::PathBuf;

use clap::Parser;

use crate::config::Settings;

#[derive(Parser, Debug)]
#[command(
    name = "wallet-relay",
    version,
    about = "Relays requests to a Wallet Provider, adding user identity headers"
)]
pub struct Cli {
    /// Path to a YAML configuration file (default: wallet-relay.yaml, if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen address (overrides LISTEN and the config file)
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Upstream base URL (overrides API_HOST and the config file)
    #[arg(short, long)]
    pub upstream: Option<String>,

    /// User identifier sent as x-iowallet-user-id (overrides USER_ID)
    #[arg(long)]
    pub user_id: Option<String>,

    /// Application key sent as x-functions-key (overrides APP_KEY)
    #[arg(long)]
    pub app_key: Option<String>,
}

impl Cli {
    /// Overlays the flags that were given onto `settings`.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(listen) = &self.listen {
            settings.listen_addr = Some(listen.clone());
        }
        if let Some(upstream) = &self.upstream {
            settings.upstream.base_url = Some(upstream.clone());
        }
        if let Some(user_id) = &self.user_id {
            settings.upstream.user_id = Some(user_id.clone());
        }
        if let Some(app_key) = &self.app_key {
            settings.upstream.app_key = Some(app_key.clone());
        }
    }
}
