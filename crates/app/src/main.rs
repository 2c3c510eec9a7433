use anyhow::{bail, Context, Result};
use ledgerfold_import::{import, RunConfig};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const HOME_VAR: &str = "LEDGERFOLD_HOME";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let home = std::env::var_os(HOME_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let out_dir = run(&home).await?;
    tracing::info!("Output written to {}", out_dir.display());
    Ok(())
}

/// Picks `<stem>.toml` over `<stem>.json` when both exist.
fn find_config(home: &Path, stem: &str) -> Result<PathBuf> {
    ["toml", "json"]
        .iter()
        .map(|ext| home.join(format!("{stem}.{ext}")))
        .find(|path| path.is_file())
        .with_context(|| format!("No {stem}.toml or {stem}.json in {}", home.display()))
}

async fn run(home: &Path) -> Result<PathBuf> {
    let config = import::load_config(&find_config(home, "config")?, &find_config(home, "providers")?)?;
    tracing::info!(providers = config.providers.len(), tags = config.tags.len(), "Loaded configuration");

    let input = home.join("input");
    if !input.is_dir() {
        bail!("Input directory {} does not exist", input.display());
    }

    let batch = import::ingest(&input, &config)?;
    let records = import::process(batch.records, &config);

    let out_dir = home.join("output").join(&batch.fingerprint);
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    write_audit(&out_dir, &records, &config).await?;
    write_exports(&out_dir, &records, &config)?;
    Ok(out_dir)
}

async fn write_audit(out_dir: &Path, records: &[ledgerfold_core::Record], config: &RunConfig) -> Result<()> {
    let db_path = out_dir.join("budget.sqlite");
    let db = ledgerfold_storage::create_db(&db_path)
        .await
        .with_context(|| format!("Failed to open {}", db_path.display()))?;
    ledgerfold_storage::write_audit(&db, records, config.tags.tag_names()).await?;

    for total in ledgerfold_storage::get_tag_totals(&db).await? {
        tracing::info!(tag = %total.tag, total_cents = total.total_cents, "Spending per tag");
    }
    db.close().await;
    Ok(())
}

fn write_exports(out_dir: &Path, records: &[ledgerfold_core::Record], config: &RunConfig) -> Result<()> {
    for export in import::exports(records, config) {
        let path = out_dir.join(export.file_name());
        let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        import::write_export(&export, BufWriter::new(file))?;
        tracing::info!(account = %export.account, rows = export.rows.len(), "Wrote {}", path.display());
    }
    Ok(())
}
