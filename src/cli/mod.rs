pub mod commands;

use clap::{Args, Parser, Subcommand};
use crate::error::Result;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nairobi-tea")]
#[command(about = "Local news publishing: read, like and manage NAIROBIAN TEA articles")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default configuration and create the data directory
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// List articles, newest first
    List {
        /// Only show one category (politics, business, sports, entertainment, life)
        #[arg(short = 'C', long)]
        category: Option<String>,
    },

    /// Read an article (counts one view per session)
    Show {
        /// Article id
        id: String,
    },

    /// Like an article (once per session)
    Like {
        /// Article id
        id: String,
    },

    /// Log in to the admin panel
    Login {
        /// Admin password
        #[arg(short, long, env = "NAIROBI_TEA_LOGIN_PASSWORD", hide_env_values = true)]
        password: String,

        /// Admin username, when one is configured
        #[arg(short, long)]
        username: Option<String>,
    },

    /// Log out of the admin panel
    Logout,

    /// Show storage, image provider and admin status
    Status,

    /// Publish a new article (admin only)
    Create(CreateArgs),

    /// Edit fields of an existing article (admin only)
    Edit(EditArgs),

    /// Delete an article (admin only)
    Delete {
        /// Article id
        id: String,
    },

    /// Send feedback to the editors
    Feedback(FeedbackArgs),

    /// End the reading session so views and likes can be counted again
    EndSession,

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Headline
    #[arg(short, long)]
    pub title: String,

    /// Article body; paragraphs are separated by newlines
    #[arg(long, conflicts_with = "content_file", required_unless_present = "content_file")]
    pub content: Option<String>,

    /// Read the article body from a file
    #[arg(long)]
    pub content_file: Option<PathBuf>,

    /// Category
    #[arg(short = 'C', long)]
    pub category: String,

    /// Author name (defaults to the configured default author)
    #[arg(short, long)]
    pub author: Option<String>,

    /// Read time label, e.g. "5 min"
    #[arg(long)]
    pub read_time: Option<String>,

    /// Image file to upload
    #[arg(long, conflicts_with = "image_url")]
    pub image: Option<PathBuf>,

    /// Already hosted image URL
    #[arg(long)]
    pub image_url: Option<String>,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    /// Article id
    pub id: String,

    #[arg(short, long)]
    pub title: Option<String>,

    #[arg(long, conflicts_with = "content_file")]
    pub content: Option<String>,

    #[arg(long)]
    pub content_file: Option<PathBuf>,

    #[arg(short = 'C', long)]
    pub category: Option<String>,

    #[arg(short, long)]
    pub author: Option<String>,

    #[arg(long)]
    pub read_time: Option<String>,

    /// Replace the image with an uploaded file
    #[arg(long, conflicts_with_all = ["image_url", "clear_image"])]
    pub image: Option<PathBuf>,

    /// Replace the image with a hosted URL
    #[arg(long, conflicts_with = "clear_image")]
    pub image_url: Option<String>,

    /// Remove the image
    #[arg(long)]
    pub clear_image: bool,
}

#[derive(Args, Debug)]
pub struct FeedbackArgs {
    #[arg(short, long)]
    pub name: String,

    #[arg(short, long)]
    pub email: String,

    /// general, bug, feature, content or other
    #[arg(short, long, default_value = "general")]
    pub subject: String,

    #[arg(short, long)]
    pub message: String,

    /// 1 to 5
    #[arg(short, long, default_value_t = 5)]
    pub rating: u8,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let required = !matches!(self.command, Commands::Init { .. } | Commands::Completions { .. });
        let config = commands::load_config(self.config.as_deref(), required)?;
        let _log_guard = commands::init_logging(self.debug, self.verbose, &config.logging)?;

        match self.command {
            Commands::Init { force } => {
                commands::init(self.config, force).await
            }
            Commands::Completions { shell } => {
                commands::generate_completions(shell);
                Ok(())
            }
            Commands::Feedback(args) => {
                commands::send_feedback(&config, args).await
            }
            Commands::List { category } => {
                commands::App::from_config(config)?.list(category).await
            }
            Commands::Show { id } => {
                commands::App::from_config(config)?.show(&id).await
            }
            Commands::Like { id } => {
                commands::App::from_config(config)?.like(&id).await
            }
            Commands::Login { password, username } => {
                commands::App::from_config(config)?.login(username.as_deref(), &password)
            }
            Commands::Logout => {
                commands::App::from_config(config)?.logout()
            }
            Commands::Status => {
                commands::App::from_config(config)?.status().await
            }
            Commands::Create(args) => {
                commands::App::from_config(config)?.create(args).await
            }
            Commands::Edit(args) => {
                commands::App::from_config(config)?.edit(args).await
            }
            Commands::Delete { id } => {
                commands::App::from_config(config)?.delete(&id).await
            }
            Commands::EndSession => {
                commands::App::from_config(config)?.end_session()
            }
        }
    }
}
