use ad_agreement::config::{self, AppConfig, CONFIG_FILE_NAME};
use ad_agreement::error::AppError;
use ad_agreement::notifier::Notifier;
use ad_agreement::pipeline;
use ad_agreement::session::AgreementSession;
use ad_agreement::signature::PngFile;
use ad_agreement::web::{self, AppState};
use chrono::Local;
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Ad Manager & Partnership Agreement signing service.")]
struct Cli {
    #[clap(short, long, default_value = CONFIG_FILE_NAME, help = "Path to the TOML configuration file.")]
    config: PathBuf,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the signing form over HTTP.
    Serve {
        #[clap(short, long, help = "Address to listen on (overrides config and AGREEMENT_BIND).")]
        bind: Option<String>,
    },
    /// Render a signed agreement from a session file and two signature PNGs.
    Render {
        #[clap(long, help = "TOML file with the form values.")]
        session: PathBuf,
        #[clap(long, help = "700x180 PNG of the client signature.")]
        client_signature: PathBuf,
        #[clap(long, help = "700x180 PNG of the agency signature.")]
        agency_signature: PathBuf,
        #[clap(short, long, default_value = ".", help = "Directory for the generated PDF.")]
        out_dir: PathBuf,
        #[clap(
            long,
            help = "Email the PDF after writing it. Without this flag no mail is sent, even when SMTP credentials are configured."
        )]
        send: bool,
    },
}

fn build_notifier(config: &AppConfig) -> Option<Notifier> {
    let Some(settings) = config.mail_settings() else {
        warn!("Email not configured. Agreements are download-only.");
        return None;
    };
    match Notifier::from_settings(&settings) {
        Ok(notifier) => {
            info!("Email enabled via {}:{}", settings.smtp_server, settings.port);
            Some(notifier)
        }
        Err(e) => {
            error!("Could not set up SMTP transport ({}). Agreements are download-only.", e);
            None
        }
    }
}

fn load_session(path: &Path) -> Result<AgreementSession, AppError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

fn render_command(
    config: &AppConfig,
    session: &Path,
    client_signature: &Path,
    agency_signature: &Path,
    out_dir: &Path,
    send: bool,
) -> Result<PathBuf, AppError> {
    let session = load_session(session)?;
    let now = Local::now().naive_local();
    let agreement = pipeline::produce(&session, &PngFile(client_signature), &PngFile(agency_signature), now)?;

    fs::create_dir_all(out_dir)?;
    let out_path = out_dir.join(agreement.file_name_on_disk());
    fs::write(&out_path, agreement.bytes())?;
    info!(
        "Wrote {} ({} pages, {} bytes)",
        out_path.display(),
        agreement.page_count(),
        agreement.bytes().len()
    );

    let notifier = if send { build_notifier(config) } else { None };
    let notification = pipeline::deliver(&session, &agreement, notifier.as_ref(), now);
    if let Some(message) = notification.message() {
        info!("{}", message);
    }
    Ok(out_path)
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    match dotenv::dotenv() {
        Ok(path) => info!("Loaded .env file from: {:?}", path),
        Err(_) => warn!("No .env file found or failed to load. Relying on environment variables."),
    }

    let cli = Cli::parse();
    let mut app_config = config::load_or_default(&cli.config);
    app_config.apply_env(|key| std::env::var(key).ok());

    match cli.command {
        Command::Serve { bind } => {
            let addr: SocketAddr = bind.unwrap_or_else(|| app_config.server.bind.clone()).parse()?;
            let state = AppState::new(build_notifier(&app_config));
            web::serve(addr, state).await?;
        }
        Command::Render {
            session,
            client_signature,
            agency_signature,
            out_dir,
            send,
        } => {
            render_command(&app_config, &session, &client_signature, &agency_signature, &out_dir, send)?;
        }
    }
    Ok(())
}
