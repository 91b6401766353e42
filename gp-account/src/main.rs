//! gp-account - Token and account utilities for the Instagram Graph API

use clap::{Parser, Subcommand};
use libgraphpost::config::{Config, Overrides};
use libgraphpost::graph::{ClientConfig, GraphClient, OwnedPage, TokenInfo};
use libgraphpost::{GraphpostError, Result};

#[derive(Parser, Debug)]
#[command(name = "gp-account")]
#[command(version)]
#[command(about = "Exchange tokens and look up Instagram accounts")]
#[command(long_about = "\
gp-account - Token and account utilities for the Instagram Graph API

DESCRIPTION:
    Exchanges short-lived user tokens for long-lived ones, inspects tokens
    and finds the Instagram user ID linked to a Facebook Page or to the
    Pages owned by a business.

USAGE:
    gp-account token exchange --short-token EAAB...
    gp-account token debug
    gp-account lookup --page-id 100000000000000
    gp-account owned-pages --business-id 200000000000000

CONFIGURATION:
    IG_APP_ID and IG_APP_SECRET (token exchange), IG_ACCESS_TOKEN,
    IG_PAGE_ID, IG_BUSINESS_ID, read from the environment or a .env file,
    overlaid by the selected profile (see gp-creds).

EXIT CODES:
    0 - Success
    1 - Runtime or configuration error
    2 - Invalid or expired access token
    3 - Invalid input
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Profile providing IDs and the stored access token
    #[arg(long, global = true, env = "GRAPHPOST_PROFILE", default_value = "default")]
    profile: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Access token utilities
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Print the Instagram user ID linked to a Facebook Page
    Lookup {
        /// Facebook Page ID (overrides IG_PAGE_ID and the profile)
        #[arg(long)]
        page_id: Option<String>,
    },

    /// List the Pages owned by a business and their Instagram user IDs
    OwnedPages {
        /// Business ID (overrides IG_BUSINESS_ID and the profile)
        #[arg(long)]
        business_id: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum TokenAction {
    /// Exchange a short-lived user token for a long-lived one
    Exchange {
        /// Short-lived user token
        #[arg(long)]
        short_token: String,
    },

    /// Show validity, expiry and owner of a token
    Debug {
        /// Token to inspect (defaults to the configured access token)
        #[arg(long)]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libgraphpost::logging::init_for_cli(cli.verbose);

    match run(cli).await {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<Vec<String>> {
    match cli.command {
        // App credentials only; the credential store is never opened
        Commands::Token {
            action: TokenAction::Exchange { short_token },
        } => exchange(&Config::load()?, &short_token).await,
        command => {
            let config = Config::load_with_profile(&cli.profile)?;
            run_with_profile(command, config).await
        }
    }
}

async fn exchange(config: &Config, short_token: &str) -> Result<Vec<String>> {
    config.validate_for_token_exchange()?;
    if short_token.trim().is_empty() {
        return Err(GraphpostError::Validation("provide --short-token".to_string()));
    }

    // The exchange authenticates with the app credentials alone
    let client = GraphClient::new(ClientConfig::new(config.graph_version.as_str(), None, ""));
    let token = client
        .exchange_token(&config.app_id, &config.app_secret, short_token.trim())
        .await?;
    Ok(vec![format!("ACCESS_TOKEN={}", token)])
}

/// Commands that act with the profile's stored token
async fn run_with_profile(command: Commands, mut config: Config) -> Result<Vec<String>> {
    match command {
        Commands::Token {
            action: TokenAction::Exchange { short_token },
        } => exchange(&config, &short_token).await,

        Commands::Token {
            action: TokenAction::Debug { token },
        } => {
            let input_token = match token.filter(|t| !t.trim().is_empty()) {
                Some(token) => token,
                None => {
                    config.validate_for_token_debug()?;
                    config.access_token.clone()
                }
            };

            let client = GraphClient::new(debug_client_config(&config, &input_token));
            let info = client.debug_token(&input_token).await?;
            Ok(token_info_lines(&info))
        }

        Commands::Lookup { page_id } => {
            config.apply_overrides(&Overrides {
                page_id,
                ..Default::default()
            });
            config.validate_for_account_lookup()?;

            let client = GraphClient::new(config.client_config());
            let ig_user_id = client.fetch_ig_user_id(&config.page_id).await?;
            Ok(vec![format!("IG_USER_ID={}", ig_user_id)])
        }

        Commands::OwnedPages { business_id } => {
            config.apply_overrides(&Overrides {
                business_id,
                ..Default::default()
            });
            config.validate_for_business_lookup()?;

            let client = GraphClient::new(config.client_config());
            let pages = client.fetch_owned_pages(&config.business_id).await?;
            Ok(owned_pages_lines(&pages))
        }
    }
}

/// Authenticate with the configured token, or the inspected one when none is set
fn debug_client_config(config: &Config, input_token: &str) -> ClientConfig {
    let mut client_config = config.client_config();
    if client_config.access_token.is_none() {
        client_config.access_token = Some(input_token.to_string());
    }
    client_config
}

fn token_info_lines(info: &TokenInfo) -> Vec<String> {
    vec![
        format!("IS_VALID={}", info.is_valid),
        format!("APP_ID={}", info.app_id),
        format!("APPLICATION={}", info.application),
        format!("TYPE={}", info.token_type),
        format!("EXPIRES_AT={}", info.expires_at),
        format!("DATA_ACCESS_EXPIRES_AT={}", info.data_access_expires_at),
        format!("USER_ID={}", info.user_id),
    ]
}

fn owned_pages_lines(pages: &[OwnedPage]) -> Vec<String> {
    if pages.is_empty() {
        return vec!["NO_PAGES_FOUND".to_string()];
    }

    pages
        .iter()
        .flat_map(|page| {
            [
                format!("PAGE_ID={}", page.id),
                format!("PAGE_NAME={}", page.name),
                format!("IG_USER_ID={}", page.ig_user_id),
                "---".to_string(),
            ]
        })
        .collect()
}
