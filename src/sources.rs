//! Document sources: where the knowledge base text comes from.
//!
//! Three kinds, all optional and combinable:
//!
//! | Source | Config | Produces |
//! |--------|--------|----------|
//! | `json` | `[sources] json = "path"` | one document per record of a scraped-pages JSON array |
//! | `directory` | `[sources.directory]` | one document per matching file under a root |
//! | `catalog` | `[[sources.catalog]]` | one document per inline section |
//!
//! Document ids must be unique across everything loaded; chunk ids are
//! derived from them.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{Config, DirectorySourceConfig};
use crate::models::Document;

/// Which sources a build reads.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSelector {
    /// Every configured source.
    All,
    /// One configured source by kind: `json`, `directory`, or `catalog`.
    Named(String),
    /// A JSON file given on the command line instead of the configured sources.
    JsonFile(PathBuf),
}

pub fn load_documents(config: &Config, selector: &SourceSelector) -> Result<Vec<Document>> {
    let sources = &config.sources;
    let mut documents = Vec::new();

    match selector {
        SourceSelector::JsonFile(path) => documents.extend(load_json_documents(path)?),
        SourceSelector::Named(name) => match name.as_str() {
            "json" => match &sources.json {
                Some(path) => documents.extend(load_json_documents(path)?),
                None => bail!("Source 'json' is not configured"),
            },
            "directory" => match &sources.directory {
                Some(dir) => documents.extend(scan_directory(dir)?),
                None => bail!("Source 'directory' is not configured"),
            },
            "catalog" => {
                if sources.catalog.is_empty() {
                    bail!("Source 'catalog' is not configured");
                }
                documents.extend(catalog_documents(config));
            }
            other => bail!(
                "Unknown source: '{}'. Available: json, directory, catalog",
                other
            ),
        },
        SourceSelector::All => {
            if let Some(path) = &sources.json {
                documents.extend(load_json_documents(path)?);
            }
            if let Some(dir) = &sources.directory {
                documents.extend(scan_directory(dir)?);
            }
            documents.extend(catalog_documents(config));
            if sources.json.is_none() && sources.directory.is_none() && sources.catalog.is_empty()
            {
                bail!("No sources configured. Add [sources] json, [sources.directory], or [[sources.catalog]] to the config.");
            }
        }
    }

    check_unique_ids(&documents)?;
    tracing::info!(documents = documents.len(), "loaded documents");
    Ok(documents)
}

fn check_unique_ids(documents: &[Document]) -> Result<()> {
    let mut seen = HashSet::new();
    for doc in documents {
        if !seen.insert(doc.id.as_str()) {
            bail!("Duplicate document id '{}' across sources", doc.id);
        }
    }
    Ok(())
}

// ============ JSON ============

/// One scraped page. Fields beyond these are ignored.
#[derive(Debug, Deserialize)]
struct JsonRecord {
    id: Option<String>,
    url: Option<String>,
    title: Option<String>,
    #[serde(default)]
    content: String,
    section: Option<String>,
    scraped_at: Option<String>,
    retrieved_at: Option<String>,
}

/// Load a JSON array of `{url, title, content, scraped_at, ...}` records.
pub fn load_json_documents(path: &Path) -> Result<Vec<Document>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON source: {}", path.display()))?;
    let records: Vec<JsonRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse JSON source: {}", path.display()))?;

    let mut documents = Vec::with_capacity(records.len());
    for (i, record) in records.into_iter().enumerate() {
        if record.content.trim().is_empty() {
            tracing::warn!(record = i, url = ?record.url, "skipping record with blank content");
            continue;
        }

        let id = match record.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => derive_id(
                record
                    .url
                    .as_deref()
                    .or(record.title.as_deref())
                    .unwrap_or(record.content.as_str()),
            ),
        };
        let retrieved_at = record
            .retrieved_at
            .as_deref()
            .or(record.scraped_at.as_deref())
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        let title = record
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        documents.push(Document {
            id,
            title,
            body: record.content,
            source_url: record.url.filter(|u| !u.trim().is_empty()),
            retrieved_at,
            section: record.section,
        });
    }
    Ok(documents)
}

/// `doc_` followed by the first 12 hex digits of SHA-256 of `key`.
pub fn derive_id(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let hex: String = digest.iter().take(6).map(|b| format!("{:02x}", b)).collect();
    format!("doc_{}", hex)
}

/// Accepts the scraper's `%Y-%m-%d %H:%M:%S` (taken as UTC) or RFC 3339.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ============ Directory ============

/// Walk `dir.root` and turn every included text file into a document.
pub fn scan_directory(dir: &DirectorySourceConfig) -> Result<Vec<Document>> {
    let root = &dir.root;
    if !root.exists() {
        bail!("Directory source root does not exist: {}", root.display());
    }

    let include_set = build_globset(&dir.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(dir.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut documents = Vec::new();

    for entry in WalkDir::new(root).follow_links(dir.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        match file_to_document(path, relative, &rel_str)? {
            Some(doc) => documents.push(doc),
            None => tracing::warn!(path = %rel_str, "skipping empty file"),
        }
    }

    documents.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(documents)
}

fn file_to_document(path: &Path, relative: &Path, rel_str: &str) -> Result<Option<Document>> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if body.trim().is_empty() {
        return Ok(None);
    }

    let modified: DateTime<Utc> = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    let title = markdown_title(&body).unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| rel_str.to_string())
    });
    let section = relative
        .parent()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .filter(|p| !p.is_empty());

    Ok(Some(Document {
        id: rel_str.to_string(),
        title,
        body,
        source_url: Some(format!("file://{}", path.display())),
        retrieved_at: modified,
        section,
    }))
}

/// Text of the first `# ` heading, if any.
fn markdown_title(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

// ============ Catalog ============

pub fn catalog_documents(config: &Config) -> Vec<Document> {
    let now = Utc::now();
    config
        .sources
        .catalog
        .iter()
        .map(|section| Document {
            id: section.id.clone(),
            title: section.title.clone(),
            body: section.body.clone(),
            source_url: section.url.clone(),
            retrieved_at: now,
            section: None,
        })
        .collect()
}

/// Run the `gw sources` command.
pub fn list_sources(config: &Config) -> Result<()> {
    let sources = &config.sources;

    let json_status = match &sources.json {
        Some(path) if path.exists() => ("OK".to_string(), path.display().to_string()),
        Some(path) => ("MISSING".to_string(), path.display().to_string()),
        None => ("NOT CONFIGURED".to_string(), String::new()),
    };
    let dir_status = match &sources.directory {
        Some(dir) if dir.root.exists() => ("OK".to_string(), dir.root.display().to_string()),
        Some(dir) => ("MISSING".to_string(), dir.root.display().to_string()),
        None => ("NOT CONFIGURED".to_string(), String::new()),
    };
    let catalog_status = if sources.catalog.is_empty() {
        ("NOT CONFIGURED".to_string(), String::new())
    } else {
        (
            "OK".to_string(),
            format!("{} section(s)", sources.catalog.len()),
        )
    };

    println!("{:<12} {:<16} DETAIL", "SOURCE", "STATUS");
    for (name, (status, detail)) in [
        ("json", json_status),
        ("directory", dir_status),
        ("catalog", catalog_status),
    ] {
        println!("{:<12} {:<16} {}", name, status, detail);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CatalogSection;
    use std::fs;

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_json_records() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(
            tmp.path(),
            "pages.json",
            r#"[
                {"url": "https://example.edu/fees", "title": "Fees", "content": "Tuition is 1,20,000.",
                 "scraped_at": "2024-05-01 10:30:00", "word_count": 3, "headings": []},
                {"url": "https://example.edu/blank", "title": "Blank", "content": "   "},
                {"id": "custom", "content": "No title here."}
            ]"#,
        );
        let docs = load_json_documents(&path).unwrap();
        assert_eq!(docs.len(), 2);

        assert_eq!(docs[0].id, derive_id("https://example.edu/fees"));
        assert!(docs[0].id.starts_with("doc_"));
        assert_eq!(docs[0].id.len(), 16);
        assert_eq!(docs[0].title, "Fees");
        assert_eq!(
            docs[0].retrieved_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2024-05-01 10:30:00"
        );

        assert_eq!(docs[1].id, "custom");
        assert_eq!(docs[1].title, "Untitled");
        assert!(docs[1].source_url.is_none());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-05-01 10:30:00").is_some());
        assert!(parse_timestamp("2024-05-01T10:30:00+02:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_invalid_json_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "bad.json", "{ not json");
        assert!(load_json_documents(&path).is_err());
    }

    #[test]
    fn test_scan_directory() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "admissions.md", "# Admissions\n\nApply by June.");
        write(tmp.path(), "guides/hostel.txt", "Rooms are shared.");
        write(tmp.path(), "notes.rs", "fn main() {}");
        write(tmp.path(), "node_modules/x/readme.md", "# Vendored");
        write(tmp.path(), "empty.md", "  \n");

        let dir = DirectorySourceConfig {
            root: tmp.path().to_path_buf(),
            include_globs: vec!["**/*.md".to_string(), "**/*.txt".to_string()],
            exclude_globs: vec![],
            follow_symlinks: false,
        };
        let docs = scan_directory(&dir).unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["admissions.md", "guides/hostel.txt"]);
        assert_eq!(docs[0].title, "Admissions");
        assert_eq!(docs[1].title, "hostel");
        assert_eq!(docs[1].section.as_deref(), Some("guides"));
    }

    #[test]
    fn test_load_all_and_duplicates() {
        let tmp = tempfile::tempdir().unwrap();
        let json = write(
            tmp.path(),
            "pages.json",
            r#"[{"id": "fees", "title": "Fees", "content": "Tuition."}]"#,
        );
        let mut config = Config::default();
        config.sources.json = Some(json);
        config.sources.catalog.push(CatalogSection {
            id: "hours".to_string(),
            title: "Hours".to_string(),
            body: "Open 9 to 5.".to_string(),
            url: None,
        });

        let docs = load_documents(&config, &SourceSelector::All).unwrap();
        assert_eq!(docs.len(), 2);

        let catalog_only =
            load_documents(&config, &SourceSelector::Named("catalog".to_string())).unwrap();
        assert_eq!(catalog_only.len(), 1);
        assert_eq!(catalog_only[0].id, "hours");

        config.sources.catalog.push(CatalogSection {
            id: "fees".to_string(),
            title: "Fees again".to_string(),
            body: "Duplicate.".to_string(),
            url: None,
        });
        let err = load_documents(&config, &SourceSelector::All).unwrap_err();
        assert!(err.to_string().contains("Duplicate document id 'fees'"));
    }

    #[test]
    fn test_unconfigured_sources() {
        let config = Config::default();
        assert!(load_documents(&config, &SourceSelector::All).is_err());
        assert!(load_documents(&config, &SourceSelector::Named("json".to_string())).is_err());
        assert!(load_documents(&config, &SourceSelector::Named("web".to_string())).is_err());
    }
}
