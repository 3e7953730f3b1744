use anyhow::{Context, Result};
use base64::Engine as _;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "vigil", about = "Vigil face identification CLI")]
struct Cli {
    /// Talk to a daemon on the session bus instead of the system bus
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll (or replace) the face of a resident
    Enroll {
        /// Resident identity id
        #[arg(short, long)]
        identity: String,
        /// Image file containing exactly one face
        image: PathBuf,
    },
    /// Identify the face in an image
    Recognize {
        image: PathBuf,
    },
    /// Remove the encoding of a resident
    Remove {
        identity: String,
    },
    /// List enrolled identities
    List,
    /// Show daemon status
    Status,
}

#[zbus::proxy(
    interface = "org.vigil.Gate1",
    default_service = "org.vigil.Gate1",
    default_path = "/org/vigil/Gate1"
)]
trait Gate {
    fn enroll(&self, request: &str) -> zbus::Result<String>;
    fn recognize(&self, request: &str) -> zbus::Result<String>;
    fn remove_encoding(&self, identity_id: &str) -> zbus::Result<bool>;
    fn list_encodings(&self) -> zbus::Result<String>;
    fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = if cli.session {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
    .context("connecting to D-Bus")?;
    let proxy = GateProxy::new(&conn)
        .await
        .context("vigild is not reachable on D-Bus")?;

    let ok = match cli.command {
        Commands::Enroll { identity, image } => {
            let request = enroll_request(&identity, &read_image(&image)?);
            print_response(&proxy.enroll(&request).await?)?
        }
        Commands::Recognize { image } => {
            let request = recognize_request(&read_image(&image)?);
            print_response(&proxy.recognize(&request).await?)?
        }
        Commands::Remove { identity } => {
            let removed = proxy.remove_encoding(&identity).await?;
            if removed {
                println!("Removed encoding for {identity}");
            } else {
                println!("No encoding enrolled for {identity}");
            }
            removed
        }
        Commands::List => {
            let list: serde_json::Value = serde_json::from_str(&proxy.list_encodings().await?)?;
            match list.as_array() {
                Some(rows) if rows.is_empty() => println!("No faces enrolled"),
                _ => println!("{}", serde_json::to_string_pretty(&list)?),
            }
            true
        }
        Commands::Status => print_response(&proxy.status().await?)?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn read_image(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading image {}", path.display()))?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "image loaded");
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

fn enroll_request(identity: &str, image_b64: &str) -> String {
    serde_json::json!({ "identity_id": identity, "image": image_b64 }).to_string()
}

fn recognize_request(image_b64: &str) -> String {
    serde_json::json!({ "image": image_b64 }).to_string()
}

/// Pretty-print a daemon response. Returns false for error bodies.
fn print_response(body: &str) -> Result<bool> {
    let value: serde_json::Value =
        serde_json::from_str(body).context("daemon returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(value.get("status").and_then(|s| s.as_str()) != Some("error"))
}
