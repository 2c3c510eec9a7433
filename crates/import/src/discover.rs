use ledgerfold_core::Origin;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::Providers;
use crate::csv::ProviderSchema;

#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("Failed to scan {}: {source}", .root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// A CSV file found under a provider's input directory, with the schema it
/// is read with.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub provider: String,
    pub schema: ProviderSchema,
    /// Parent directory relative to the input root, components joined by `_`.
    pub account: String,
    /// Path relative to the input root, `/`-separated.
    pub relative_path: String,
    pub path: PathBuf,
}

impl InputFile {
    pub fn origin(&self) -> Origin {
        Origin {
            provider: self.provider.clone(),
            account: self.account.clone(),
            source_file: self.relative_path.clone(),
        }
    }
}

/// Finds `*.csv` files under `input_root/<provider>` for each configured
/// provider, in provider order, then sorted by path within a provider.
pub fn discover(input_root: &Path, providers: &Providers) -> Result<Vec<InputFile>, DiscoverError> {
    let mut files = Vec::new();

    for (provider, schema) in providers.iter() {
        let provider_root = input_root.join(provider);
        if !provider_root.is_dir() {
            tracing::warn!(provider, dir = %provider_root.display(), "No input directory for provider");
            continue;
        }

        for entry in WalkDir::new(&provider_root).sort_by_file_name() {
            let entry = entry.map_err(|source| DiscoverError::Walk {
                root: provider_root.clone(),
                source,
            })?;
            if !entry.file_type().is_file() || !is_csv(entry.path()) {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(input_root) else {
                continue;
            };
            let components: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let dirs = components.split_last().map(|(_, dirs)| dirs).unwrap_or_default();

            files.push(InputFile {
                provider: provider.to_string(),
                schema: schema.clone(),
                account: dirs.join("_"),
                relative_path: components.join("/"),
                path: entry.into_path(),
            });
        }
    }

    Ok(files)
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.eq_ignore_ascii_case("csv"))
}

/// Run identity derived from the discovered paths only, never file contents.
pub fn fingerprint(files: &[InputFile]) -> String {
    let mut hasher = Sha256::new();
    for file in files {
        hasher.update(file.provider.as_bytes());
        hasher.update(b"_");
        hasher.update(file.relative_path.as_bytes());
    }
    to_hex(&hasher.finalize().into())
}

fn to_hex(hash: &[u8; 32]) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn providers(names: &[&str]) -> Providers {
        names
            .iter()
            .map(|n| (n.to_string(), ProviderSchema::default()))
            .collect()
    }

    fn touch(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn discovers_csv_files_with_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "bankB/b.csv", "");
        touch(root, "bankA/2024.csv", "");
        touch(root, "bankA/savings/jan.CSV", "");
        touch(root, "bankA/savings/notes.txt", "");
        touch(root, "ignored/x.csv", "");

        let files = discover(root, &providers(&["bankA", "bankB"])).unwrap();
        let seen: Vec<_> = files
            .iter()
            .map(|f| (f.provider.as_str(), f.account.as_str(), f.relative_path.as_str()))
            .collect();
        assert_eq!(
            seen,
            vec![
                ("bankA", "bankA", "bankA/2024.csv"),
                ("bankA", "bankA_savings", "bankA/savings/jan.CSV"),
                ("bankB", "bankB", "bankB/b.csv"),
            ]
        );
        assert_eq!(files[1].origin().account, "bankA_savings");
        assert_eq!(files[1].origin().source_file, "bankA/savings/jan.CSV");
    }

    #[test]
    fn files_carry_their_provider_schema() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "bankA/a.csv", "");
        touch(dir.path(), "paypal/p.csv", "");
        let mut p = providers(&["bankA"]);
        p.insert(
            "paypal".to_string(),
            ProviderSchema {
                separator: ";".to_string(),
                ..ProviderSchema::default()
            },
        );

        let files = discover(dir.path(), &p).unwrap();
        assert_eq!(files[0].schema.separator, ",");
        assert_eq!(files[1].provider, "paypal");
        assert_eq!(files[1].schema.separator, ";");
    }

    #[test]
    fn missing_provider_directory_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "bankA/a.csv", "");
        let files = discover(dir.path(), &providers(&["bankA", "absent"])).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn fingerprint_depends_on_paths_not_contents() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        touch(first.path(), "bankA/a.csv", "one");
        touch(second.path(), "bankA/a.csv", "completely different");

        let p = providers(&["bankA"]);
        let a = fingerprint(&discover(first.path(), &p).unwrap());
        let b = fingerprint(&discover(second.path(), &p).unwrap());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        touch(second.path(), "bankA/b.csv", "");
        let c = fingerprint(&discover(second.path(), &p).unwrap());
        assert_ne!(a, c);
    }

    #[test]
    fn fingerprint_of_nothing_is_sha256_of_empty_input() {
        assert_eq!(
            fingerprint(&[]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
