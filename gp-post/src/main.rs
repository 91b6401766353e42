//! gp-post - Publish photos, reels and carousels to Instagram

use clap::{Parser, Subcommand};
use libgraphpost::config::{Config, Overrides};
use libgraphpost::publisher::{MediaSource, Publisher};
use libgraphpost::upload::UguuUploader;
use libgraphpost::Result;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "gp-post")]
#[command(version)]
#[command(about = "Publish media through the Instagram Graph API")]
#[command(long_about = "\
gp-post - Publish media through the Instagram Graph API

DESCRIPTION:
    Creates a media container from a public HTTPS URL, waits for the Graph
    API to finish processing it and publishes it. Local files are uploaded
    to a temporary public host first.

USAGE:
    gp-post photo --url https://example.com/photo.jpg -c \"Hello\"
    gp-post reel --file clip.mp4
    gp-post carousel --files a.jpg --files b.mp4 -c \"Album\"

OUTPUT:
    KEY=value lines on stdout: CREATION_ID and PUBLISHED_MEDIA_ID for
    photo/reel, CHILD_IDS and PUBLISHED_MEDIA_ID for carousel.

CONFIGURATION:
    IG_ACCESS_TOKEN, IG_USER_ID, IG_GRAPH_VERSION, IG_POLL_INTERVAL,
    IG_POLL_TIMEOUT, read from the environment or a .env file, overlaid
    by the selected profile (see gp-creds).

SIGNALS:
    SIGINT, SIGTERM - Cancel the run (exit code 1)

EXIT CODES:
    0 - Published
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

    /// Instagram user ID (overrides IG_USER_ID and the profile)
    #[arg(long, global = true)]
    user_id: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish a single photo
    Photo {
        /// Local image file to upload
        #[arg(long)]
        file: Option<PathBuf>,

        /// Public HTTPS URL of the image
        #[arg(long)]
        url: Option<String>,

        /// Caption text
        #[arg(short, long)]
        caption: Option<String>,
    },

    /// Publish a single reel
    Reel {
        /// Local video file to upload
        #[arg(long)]
        file: Option<PathBuf>,

        /// Public HTTPS URL of the video
        #[arg(long)]
        url: Option<String>,

        /// Caption text
        #[arg(short, long)]
        caption: Option<String>,
    },

    /// Publish a carousel of local images and videos, in the given order
    Carousel {
        /// Media file (repeat for each item)
        #[arg(long = "files", value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Caption text
        #[arg(short, long)]
        caption: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libgraphpost::logging::init_for_cli(cli.verbose);

    let cancel = CancellationToken::new();
    if let Err(e) = cancel_on_signal(cancel.clone()) {
        warn!("Signal setup failed: {}", e);
    }

    let outcome = tokio::select! {
        result = run(cli, cancel.clone()) => result,
        _ = cancel.cancelled() => Err(libgraphpost::GraphpostError::Cancelled),
    };

    match outcome {
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

/// Validated work for one invocation
enum Job {
    Photo(MediaSource),
    Reel(MediaSource),
    Carousel(Vec<PathBuf>),
}

/// Run the selected workflow and return the stdout lines
async fn run(cli: Cli, cancel: CancellationToken) -> Result<Vec<String>> {
    // Argument problems are reported before configuration is touched
    let (job, caption) = match cli.command {
        Commands::Photo { file, url, caption } => {
            (Job::Photo(MediaSource::from_args(file, url)?), caption)
        }
        Commands::Reel { file, url, caption } => {
            (Job::Reel(MediaSource::from_args(file, url)?), caption)
        }
        Commands::Carousel { files, caption } => (Job::Carousel(files), caption),
    };

    let mut config = Config::load_with_profile(&cli.profile)?;
    config.apply_overrides(&Overrides {
        user_id: cli.user_id,
        ..Default::default()
    });

    let publisher =
        Publisher::from_config(&config, UguuUploader::new())?.with_cancellation(cancel);
    let caption = caption.as_deref();

    let lines = match job {
        Job::Photo(source) => {
            let result = publisher.publish_photo(&source, caption).await?;
            vec![
                format!("CREATION_ID={}", result.creation_id),
                format!("PUBLISHED_MEDIA_ID={}", result.published_media_id),
            ]
        }
        Job::Reel(source) => {
            let result = publisher.publish_reel(&source, caption).await?;
            vec![
                format!("CREATION_ID={}", result.creation_id),
                format!("PUBLISHED_MEDIA_ID={}", result.published_media_id),
            ]
        }
        Job::Carousel(files) => {
            let carousel = publisher.publish_carousel(&files, caption).await?;
            vec![
                format!("CHILD_IDS={}", carousel.child_ids.join(",")),
                format!("PUBLISHED_MEDIA_ID={}", carousel.result.published_media_id),
            ]
        }
    };

    Ok(lines)
}

/// Cancel `cancel` on the first SIGINT or SIGTERM
fn cancel_on_signal(cancel: CancellationToken) -> std::io::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!(signal, "Received shutdown signal, cancelling");
            cancel.cancel();
        }
    });

    Ok(())
}
