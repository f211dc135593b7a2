use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use clap::Parser;
use engine::{QueryClient, Region};

use crate::{
    auth::{Auth, AuthError},
    client::HttpClient,
    commands::{Command, Context},
    error::{AppError, Result},
    settings::Cli,
};

mod auth;
mod client;
mod commands;
mod error;
mod settings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = settings::load(&cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "tally={level},engine={level}",
            level = settings.level
        ))
        .init();

    let region: Region = settings
        .region
        .parse()
        .map_err(|err| AppError::Setting(format!("{err}, expected `my` or `in`")))?;
    let timezone: Tz = settings
        .timezone
        .parse()
        .map_err(|err| AppError::Setting(format!("invalid timezone: {err}")))?;
    let today = Utc::now().with_timezone(&timezone).date_naive();

    let http = reqwest::Client::builder().build()?;
    let auth = Arc::new(Auth::new(http.clone(), settings.auth.clone()));
    let command = cli.command;

    let refresh = if matches!(command, Command::Login { .. }) {
        None
    } else {
        if !auth.init().await? {
            tracing::error!("no valid session, run `tally login` and store the tokens in the config");
            return Err(AuthError::SessionExpired.into());
        }
        tracing::info!(%region, "session ready");
        Some(tokio::spawn(auth::run_refresh_loop(auth.clone())))
    };

    let client = HttpClient::new(&settings.base_url, http, auth.clone())?;
    let ctx = Context {
        client: QueryClient::new(client),
        auth,
        region,
        today,
    };
    let result = commands::run(command, &ctx).await;
    if let Some(refresh) = refresh {
        refresh.abort();
    }
    result
}
