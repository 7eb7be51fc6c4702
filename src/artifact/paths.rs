use std::path::{Path, PathBuf};

/// Locations of every artifact for one target domain
///
/// All artifacts of a domain live below `<data-dir>/<domain>/`.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    root: PathBuf,
}

impl ArtifactPaths {
    pub fn new(data_dir: &Path, domain: &str) -> Self {
        let dir_name: String = domain
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        Self {
            root: data_dir.join(dir_name),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn checkpoint(&self) -> PathBuf {
        self.root.join("crawl.checkpoint.json")
    }

    pub fn urls(&self) -> PathBuf {
        self.root.join("urls.csv")
    }

    pub fn templates(&self) -> PathBuf {
        self.root.join("templates.json")
    }

    pub fn recipe(&self) -> PathBuf {
        self.root.join("recipe.toml")
    }

    pub fn sample(&self) -> PathBuf {
        self.root.join("sample.ndjson")
    }

    pub fn probe_report(&self) -> PathBuf {
        self.root.join("probe_report.json")
    }

    pub fn approved(&self) -> PathBuf {
        self.root.join("approved.json")
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.root.join("pages")
    }

    pub fn fetch_meta(&self) -> PathBuf {
        self.root.join("fetch_meta.ndjson")
    }

    pub fn extracted(&self) -> PathBuf {
        self.root.join("extracted.ndjson")
    }

    pub fn unique(&self) -> PathBuf {
        self.root.join("unique.ndjson")
    }

    pub fn duplicates(&self) -> PathBuf {
        self.root.join("duplicates.ndjson")
    }

    pub fn catalog_csv(&self) -> PathBuf {
        self.root.join("catalog.csv")
    }

    pub fn catalog_ndjson(&self) -> PathBuf {
        self.root.join("catalog.ndjson")
    }

    pub fn validation_report(&self) -> PathBuf {
        self.root.join("validation_report.json")
    }

    pub fn file_store(&self) -> PathBuf {
        self.root.join("store").join("catalog.json")
    }

    pub fn database(&self) -> PathBuf {
        self.root.join("catalog.db")
    }

    pub fn refresh_mapping(&self) -> PathBuf {
        self.root.join("refresh_mapping.json")
    }

    pub fn run_summary(&self) -> PathBuf {
        self.root.join("run_summary.json")
    }

    pub fn gate_marker(&self, gate: &str) -> PathBuf {
        self.root.join("gates").join(format!("{}.confirmed", gate))
    }

    pub fn stats(&self, stage: &str) -> PathBuf {
        self.root.join("stats").join(format!("{}.json", stage))
    }

    /// Resolves a path stored relative to the domain directory
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }
}
