//! Command handlers.

use crate::config::CliConfig;
use cachet_core::{BackendOptions, BackendRegistry, ItemInfo, StoreBackend};
use cachet_s3::{S3StoreBackend, SCHEME};
use console::style;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

type HandlerResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Registry with the S3 backend built from the CLI's settings.
pub fn registry(config: &CliConfig) -> BackendRegistry {
    let settings = config.s3_settings();
    let mut registry = BackendRegistry::new();
    registry.register(SCHEME, move || {
        Box::new(S3StoreBackend::with_settings(settings.clone()))
    });
    registry
}

async fn open_backend(
    registry: &BackendRegistry,
    location: &str,
    verbose: u32,
) -> HandlerResult<Box<dyn StoreBackend>> {
    Ok(registry
        .open_location(location, verbose, BackendOptions::default())
        .await?)
}

/// List items under a location.
pub async fn list(
    registry: &BackendRegistry,
    location: &str,
    json: bool,
    verbose: u32,
) -> HandlerResult {
    let backend = open_backend(registry, location, verbose).await?;
    let mut items = backend.list_items(location).await?;
    items.sort_by(|a, b| a.path.cmp(&b.path));

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("{} No items under {}", style("i").blue(), location);
        return Ok(());
    }

    for item in &items {
        println!("{}", format_item(item));
    }
    let total: u64 = items.iter().map(|i| i.size_bytes).sum();
    println!(
        "{} {} items, {}",
        style("✓").green(),
        items.len(),
        format_size(total)
    );
    Ok(())
}

/// Check whether an item exists.
pub async fn exists(
    registry: &BackendRegistry,
    location: &str,
    verbose: u32,
) -> HandlerResult<bool> {
    let backend = open_backend(registry, location, verbose).await?;
    let found = backend.item_exists(location).await?;
    println!("{}", found);
    Ok(found)
}

/// Stream an item to stdout.
pub async fn cat(registry: &BackendRegistry, location: &str, verbose: u32) -> HandlerResult {
    let backend = open_backend(registry, location, verbose).await?;
    let mut reader = backend
        .open_item(location, "rb")
        .await?
        .into_reader()
        .ok_or("item not opened for reading")?;
    let mut stdout = tokio::io::stdout();
    tokio::io::copy(&mut reader, &mut stdout).await?;
    stdout.flush().await?;
    Ok(())
}

/// Upload a file or stdin as an item.
pub async fn put(
    registry: &BackendRegistry,
    location: &str,
    file: Option<&Path>,
    verbose: u32,
) -> HandlerResult {
    let bytes = match file {
        Some(path) => tokio::fs::read(path).await?,
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin().read_to_end(&mut buf).await?;
            buf
        }
    };

    let backend = open_backend(registry, location, verbose).await?;
    let mut writer = backend
        .open_item(location, "wb")
        .await?
        .into_writer()
        .ok_or("item not opened for writing")?;
    writer.write_all(&bytes).await?;
    writer.finish().await?;

    eprintln!(
        "{} Stored {} ({})",
        style("✓").green(),
        location,
        format_size(bytes.len() as u64)
    );
    Ok(())
}

/// Move an item.
pub async fn move_item(
    registry: &BackendRegistry,
    src: &str,
    dst: &str,
    verbose: u32,
) -> HandlerResult {
    let backend = open_backend(registry, src, verbose).await?;
    backend.move_item(src, dst).await?;
    eprintln!("{} Moved {} to {}", style("✓").green(), src, dst);
    Ok(())
}

/// Clear a location.
pub async fn clear(registry: &BackendRegistry, location: &str, verbose: u32) -> HandlerResult {
    println!("Clearing {}...", style(location).bold());
    let backend = open_backend(registry, location, verbose).await?;
    backend.clear_location(location).await?;
    println!("{} Location cleared", style("✓").green());
    Ok(())
}

/// Show configuration.
pub fn show_config(config: &CliConfig) -> HandlerResult {
    println!("{}", serde_yaml::to_string(config)?);
    println!("Config file: {}", CliConfig::config_path()?.display());
    Ok(())
}

/// Set a configuration value.
pub fn set_config(key: &str, value: &str) -> HandlerResult {
    let mut config = CliConfig::load().unwrap_or_default();
    config.set(key, value)?;
    config.save()?;
    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(())
}

fn format_item(item: &ItemInfo) -> String {
    format!(
        "{:>10}  {}  {}",
        format_size(item.size_bytes),
        item.last_access.format("%Y-%m-%d %H:%M:%S"),
        item.path
    )
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn test_format_item() {
        let item = ItemInfo {
            path: "s3://bucket/cache/out.pkl".to_string(),
            size_bytes: 2048,
            last_access: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        };
        assert_eq!(
            format_item(&item),
            "   2.0 KiB  2024-01-02 03:04:05  s3://bucket/cache/out.pkl"
        );
    }

    #[test]
    fn test_registry_serves_s3() {
        let registry = registry(&CliConfig::default());
        assert_eq!(registry.names(), vec!["s3".to_string()]);
    }
}
