use std::path::Path;

use anyhow::Context;
use cluster_proto::Solver;

/// One named entry in the on-disk solver catalog (`solvers/*.solve`); the
/// filename stem, sans extension, is the name.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub name: String,
    pub text: String,
}

/// Glob `dir/*.solve` and load each file's text. Unparseable solver files
/// are skipped with a warning rather than failing startup — the catalog is
/// just a convenience list the console offers; an operator can still `POST`
/// arbitrary solver text via `/console_update`.
pub fn load(dir: &Path) -> anyhow::Result<Vec<CatalogEntry>> {
    let pattern = dir.join("*.solve");
    let pattern = pattern
        .to_str()
        .context("solvers directory path is not valid UTF-8")?;

    let mut entries = Vec::new();
    for path in glob::glob(pattern).context("invalid solvers glob pattern")? {
        let path = path.context("error reading solvers directory entry")?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                if let Err(err) = Solver::parse(&text) {
                    tracing::warn!(solver = %name, %err, "skipping unparseable solver file");
                    continue;
                }
                entries.push(CatalogEntry { name, text });
            }
            Err(err) => {
                tracing::warn!(solver = %name, %err, "failed to read solver file");
            }
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}
