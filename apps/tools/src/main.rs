use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use backend::{RowQuery, SortOrder, TableStore};
use clap::{Parser, Subcommand};
use shared::domain::{ContactMessage, CONTACT_TABLE, RESUME_BUCKET};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/portfolio.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates the admin account, or resets its password.
    CreateAdmin { email: String, password: String },
    /// Inserts the sample projects when the table is empty.
    SeedProjects,
    UploadResume {
        path: PathBuf,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        content_type: Option<String>,
    },
    ListMessages {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateAdmin { email, password } => {
            let user_id = storage.create_admin(&email, &password).await?;
            println!("admin ready user_id={user_id}");
        }
        Command::SeedProjects => {
            let seeded = storage.seed_projects().await?;
            println!("seeded {seeded} projects");
        }
        Command::UploadResume {
            path,
            name,
            content_type,
        } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            let name = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(str::to_string)
                    .context("resume path has no file name; pass --name")?,
            };
            let content_type = content_type.or_else(|| content_type_for(&path).map(str::to_string));
            storage
                .put_object(RESUME_BUCKET, &name, content_type.as_deref(), &bytes)
                .await?;
            println!("uploaded {name} ({} bytes)", bytes.len());
        }
        Command::ListMessages { limit } => {
            let query = RowQuery::new()
                .order_by("created_at", SortOrder::Descending)
                .limit(limit);
            let rows = storage.select(CONTACT_TABLE, &query).await?;
            for row in rows {
                let message: ContactMessage = serde_json::from_value(row)?;
                println!(
                    "{} {} <{}>: {}",
                    message.created_at.format("%Y-%m-%d %H:%M"),
                    message.name,
                    message.email,
                    message.message
                );
            }
        }
    }

    Ok(())
}

/// Guessed from the file extension.
fn content_type_for(path: &Path) -> Option<&'static str> {
    mime_guess::from_path(path).first_raw()
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
