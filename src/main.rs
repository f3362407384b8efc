use anyhow::{Context, Result};
use bookmark_site::{Cli, MaudTemplates, PgBookmarkSource, Settings, publish};
use chrono::Utc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() -> Result<()> {
    // A missing .env file is not an error.
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli).context("Invalid configuration")?;

    info!(
        config_path = %cli.config.display(),
        uri = %settings.git.uri,
        clone_dir = %settings.git.clone_dir.display(),
        time_zone = %settings.site.time_zone,
        "Starting bookmark-site"
    );

    let mut source = PgBookmarkSource::connect(
        &settings.database.url,
        settings.site.time_zone,
        settings.database.fetch_size,
    )
    .context("Failed to connect to bookmark database")?;

    let templates = MaudTemplates::new(settings.blog.clone(), settings.site.time_zone);

    let report = publish(&settings, &mut source, &templates, Utc::now())?;

    info!(
        months = report.pipeline.months,
        chunks = report.pipeline.chunks,
        commit = report.commit.as_deref().unwrap_or("none"),
        branch = %report.branch,
        "Done"
    );

    Ok(())
}
