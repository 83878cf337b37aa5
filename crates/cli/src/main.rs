//! Emporium CLI - database migrations and store management.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! emporium migrate
//!
//! # Create an admin account (password from --password or ADMIN_PASSWORD)
//! emporium admin create -e admin@example.com -n "Admin Name"
//!
//! # Promote or demote an existing account
//! emporium admin promote -e someone@example.com
//! emporium admin demote -e someone@example.com
//!
//! # Load products from a YAML file
//! emporium seed --file products.yaml
//!
//! # Anonymize orders past their retention date
//! emporium gdpr anonymize --dry-run
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

use emporium_core::UserRole;

mod commands;

use commands::CommandError;

#[derive(Parser)]
#[command(name = "emporium")]
#[command(author, version, about = "Emporium CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage admin accounts
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Seed the catalog from a file
    Seed {
        /// YAML or JSON file with a `products` list
        #[arg(short, long)]
        file: String,
    },
    /// Personal data retention
    Gdpr {
        #[command(subcommand)]
        action: GdprAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Create a new, already verified admin account
    Create {
        /// Admin email address
        #[arg(short, long)]
        email: String,

        /// Admin display name
        #[arg(short, long)]
        name: String,

        /// Initial password
        #[arg(short, long, env = "ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Give an existing account the admin role
    Promote {
        #[arg(short, long)]
        email: String,
    },
    /// Return an admin account to the customer role
    Demote {
        #[arg(short, long)]
        email: String,
    },
}

#[derive(Subcommand)]
enum GdprAction {
    /// Strip personal data from orders past their retention date
    Anonymize {
        /// Report how many orders would change without changing them
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Admin { action } => match action {
            AdminAction::Create {
                email,
                name,
                password,
            } => {
                commands::admin::create_user(&email, &name, &password).await?;
            }
            AdminAction::Promote { email } => {
                commands::admin::set_role(&email, UserRole::Admin).await?;
            }
            AdminAction::Demote { email } => {
                commands::admin::set_role(&email, UserRole::User).await?;
            }
        },
        Commands::Seed { file } => {
            commands::seed::products(&file).await?;
        }
        Commands::Gdpr { action } => match action {
            GdprAction::Anonymize { dry_run } => {
                commands::gdpr::anonymize(dry_run).await?;
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, Commands, GdprAction};

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_gdpr_dry_run() {
        let cli = Cli::try_parse_from(["emporium", "gdpr", "anonymize", "--dry-run"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Gdpr {
                action: GdprAction::Anonymize { dry_run: true }
            })
        ));
    }

    #[test]
    fn test_seed_requires_file() {
        assert!(Cli::try_parse_from(["emporium", "seed"]).is_err());
    }
}
