//! `unfuzzed` -- submit one prompt and download its latent.
//!
//! ```text
//! unfuzzed [--confirm-18plus] <positive prompt> [negative prompt]
//! ```
//!
//! # Environment variables
//!
//! | Variable                  | Required | Default | Description                         |
//! |---------------------------|----------|---------|-------------------------------------|
//! | `UNFUZZED_CONFIRM_18PLUS` | yes      | --      | `true` confirms age (or `--confirm-18plus`) |
//! | `UNFUZZED_WS_URL`         | no       | see [`ClientConfig`] | Relay WebSocket endpoint |
//! | `UNFUZZED_DATA_URL`       | no       | see [`ClientConfig`] | Content store base URL   |
//! | `UNFUZZED_OUTPUT_DIR`     | no       | temp dir | Where latents are written          |

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unfuzzed_client::client::UnfuzzedClient;
use unfuzzed_client::config::ClientConfig;
use unfuzzed_core::age_check::{self, AGE_CHECK_INSTRUCTIONS};

#[derive(Parser, Debug)]
#[command(name = "unfuzzed")]
#[command(version)]
#[command(about = "Submit one prompt and download its latent")]
struct Args {
    /// Prompt describing what the image should contain
    positive: String,

    /// Prompt describing what the image should avoid
    #[arg(default_value = "")]
    negative: String,

    /// Confirm that you are 18 or older
    #[arg(long = "confirm-18plus", env = "UNFUZZED_CONFIRM_18PLUS")]
    confirm_18plus: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unfuzzed_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let key = match age_check::confirmation_key(AGE_CHECK_INSTRUCTIONS, args.confirm_18plus) {
        Ok(key) => key,
        Err(e) => {
            tracing::error!(error = %e, "Age check failed");
            std::process::exit(1);
        }
    };

    let config = ClientConfig::from_env();
    tracing::info!(ws_url = %config.ws_url, data_url = %config.data_url, "Starting unfuzzed client");

    let mut client = UnfuzzedClient::new(&config);

    match client.sample(&key, &args.positive, &args.negative).await {
        Ok(latent) => {
            tracing::info!(shape = ?latent.shape(), "Latent received");
        }
        Err(e) => {
            tracing::error!(error = %e, "Sampling failed");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn negative_prompt_defaults_to_empty() {
        let args = Args::try_parse_from(["unfuzzed", "--confirm-18plus", "a cat"]).unwrap();
        assert_eq!(args.positive, "a cat");
        assert_eq!(args.negative, "");
        assert!(args.confirm_18plus);
    }

    #[test]
    fn both_prompts_are_positional() {
        let args =
            Args::try_parse_from(["unfuzzed", "--confirm-18plus", "a cat", "blurry"]).unwrap();
        assert_eq!(args.positive, "a cat");
        assert_eq!(args.negative, "blurry");
    }

    #[test]
    fn positive_prompt_is_required() {
        assert!(Args::try_parse_from(["unfuzzed"]).is_err());
    }
}
