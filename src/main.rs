use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, eyre};
use futures_util::future::join_all;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use sender_avatars::application::{AvatarService, AvatarView};
use sender_avatars::domain::entities::{AvatarImage, AvatarSource, Resolution};
use sender_avatars::domain::ports::ContactPhotoPort;
use sender_avatars::infrastructure::image::sniff_mime_type;
use sender_avatars::infrastructure::{
    AppConfig, CliArgs, Command, ConfigFile, DirectoryContacts, DiskStore, HttpClient,
    ImageNormalizer, TargetSize,
};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let file =
        ConfigFile::locate(args.config.as_deref()).wrap_err("Failed to locate configuration file")?;
    let mut config = file
        .load()
        .wrap_err_with(|| format!("Failed to load {}", file.path().display()))?;
    config.merge_with_args(args);
    Ok(config)
}

async fn create_service(config: &AppConfig) -> Result<AvatarService> {
    let cache_dir = config
        .effective_cache_dir()
        .ok_or_else(|| eyre!("Failed to determine cache directory"))?;
    let store = DiskStore::open(cache_dir)
        .await
        .wrap_err("Failed to open avatar cache")?;
    let http = HttpClient::with_timeout(config.resolver.request_timeout())
        .wrap_err("Failed to create HTTP client")?;
    let contacts = config.contacts_dir.clone().map(|dir| {
        debug!(dir = %dir.display(), "Using contact photo directory");
        Arc::new(DirectoryContacts::new(dir)) as Arc<dyn ContactPhotoPort>
    });

    Ok(AvatarService::from_config(
        config,
        Arc::new(http),
        Arc::new(store),
        contacts,
    ))
}

async fn resolve(
    service: &AvatarService,
    authors: &[String],
    unalias: bool,
    json: bool,
    png_dir: Option<&Path>,
) -> Result<()> {
    let identities: Vec<_> = authors
        .iter()
        .map(|author| {
            let identity = service.identity(author);
            if unalias { identity.unalias() } else { identity }
        })
        .collect();

    let resolutions = join_all(
        identities
            .iter()
            .map(|identity| service.resolve_identity_and_wait(identity.clone())),
    )
    .await;

    if let Some(dir) = png_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .wrap_err_with(|| format!("Failed to create {}", dir.display()))?;
    }

    for (identity, resolution) in identities.iter().zip(&resolutions) {
        let view = AvatarView::new(identity, resolution);
        if json {
            println!("{}", serde_json::to_string(&view)?);
        } else {
            println!("{view}");
        }

        if let (Some(dir), Resolution::Image(image)) = (png_dir, resolution) {
            let png = service
                .to_png(image, TargetSize::default())
                .await
                .wrap_err_with(|| format!("Failed to convert avatar of {}", identity.email()))?;
            let file_name = format!("{}.png", identity.email().replace(['/', '\\'], "_"));
            let path = dir.join(file_name);
            tokio::fs::write(&path, &png)
                .await
                .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Wrote avatar");
        }
    }

    Ok(())
}

async fn convert(config: &AppConfig, input: &Path, output: &Path, target: TargetSize) -> Result<()> {
    let bytes = tokio::fs::read(input)
        .await
        .wrap_err_with(|| format!("Failed to read {}", input.display()))?;
    let mime_type = sniff_mime_type(&bytes).unwrap_or_default();
    let image = AvatarImage::new(bytes, mime_type, AvatarSource::Contacts);

    let png = ImageNormalizer::new(config.resolver.svg_size)
        .to_png(&image, target)
        .await
        .wrap_err_with(|| format!("Failed to convert {}", input.display()))?;

    tokio::fs::write(output, &png)
        .await
        .wrap_err_with(|| format!("Failed to write {}", output.display()))?;
    println!("{} -> {} ({} bytes)", input.display(), output.display(), png.len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(version = sender_avatars::VERSION, "Starting {}", sender_avatars::NAME);

    match &args.command {
        Command::Resolve {
            authors,
            unalias,
            json,
            png,
        } => {
            let service = create_service(&config).await?;
            resolve(&service, authors, *unalias, *json, png.as_deref()).await
        }
        Command::CacheSize => {
            let service = create_service(&config).await?;
            let size = service.cache_size().await.wrap_err("Failed to measure cache")?;
            println!("{} ({} images)", size.human_readable(), size.icons_count);
            Ok(())
        }
        Command::ClearCache => {
            let service = create_service(&config).await?;
            let removed = service.clear_cache().await.wrap_err("Failed to clear cache")?;
            println!("Removed {removed} entries");
            Ok(())
        }
        Command::Convert {
            input,
            output,
            width,
            height,
        } => {
            let target = TargetSize {
                width: *width,
                height: *height,
            };
            convert(&config, input, output, target).await
        }
    }
}
