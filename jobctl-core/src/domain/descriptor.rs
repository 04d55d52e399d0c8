//! Job descriptor types
//!
//! A descriptor is a scheduler-native batch script stored as
//! `<store>/<name>.sbatch`. jobctl never edits descriptors; it only parses the
//! `#SBATCH` directives for display and hands the file to the scheduler.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// File extension of descriptors in the store
pub const DESCRIPTOR_EXTENSION: &str = "sbatch";

const DIRECTIVE_PREFIX: &str = "#SBATCH";

/// One resource or scheduling request from a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    /// Option name without leading dashes (`time`, `N`, `gres`)
    pub key: String,
    /// Option value, empty for flag-only options
    pub value: String,
}

/// A submittable unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub name: String,
    pub file_path: PathBuf,
    pub directives: Vec<Directive>,
}

impl JobDescriptor {
    /// Load a descriptor file and parse its directives
    pub fn load(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Configuration(format!("invalid descriptor path {:?}", path)))?
            .to_string();

        let content = fs::read_to_string(path)?;

        Ok(Self {
            name,
            file_path: path.to_path_buf(),
            directives: parse_directives(&content),
        })
    }
}

/// Parse the `#SBATCH` directives of a batch script
///
/// Directives are only honoured before the first executable line, so parsing
/// stops there. Both `--key=value`, `--key value`, `-K value` and `-Kvalue`
/// forms are accepted; trailing ` # comment` text is ignored.
pub fn parse_directives(script: &str) -> Vec<Directive> {
    let mut directives = Vec::new();

    for line in script.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }

        let Some(rest) = line.strip_prefix(DIRECTIVE_PREFIX) else {
            if line.starts_with('#') {
                continue;
            }
            break;
        };

        // "#SBATCHX" is an ordinary comment
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            continue;
        }

        let rest = match rest.find(" #") {
            Some(idx) => &rest[..idx],
            None => rest,
        };

        if let Some(directive) = parse_directive(rest.trim()) {
            directives.push(directive);
        }
    }

    directives
}

fn parse_directive(text: &str) -> Option<Directive> {
    let mut tokens = text.split_whitespace();
    let first = tokens.next()?;
    let remainder = tokens.collect::<Vec<_>>().join(" ");

    if let Some(long) = first.strip_prefix("--") {
        return Some(match long.split_once('=') {
            Some((key, value)) => Directive {
                key: key.to_string(),
                value: value.to_string(),
            },
            None => Directive {
                key: long.to_string(),
                value: remainder,
            },
        });
    }

    let short = first.strip_prefix('-')?;
    let mut chars = short.chars();
    let key = chars.next()?;
    let attached = chars.as_str();

    Some(Directive {
        key: key.to_string(),
        value: if attached.is_empty() {
            remainder
        } else {
            attached.to_string()
        },
    })
}

/// Directory of job descriptors, one file per job type
#[derive(Debug, Clone)]
pub struct DescriptorStore {
    dir: PathBuf,
}

impl DescriptorStore {
    /// Creates a store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory of the store
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a descriptor with this name would have
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, DESCRIPTOR_EXTENSION))
    }

    /// Names of all descriptors, in directory iteration order
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            Error::Configuration(format!(
                "cannot read descriptor store {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(DESCRIPTOR_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }

        Ok(names)
    }

    /// Resolve a job name to its descriptor
    ///
    /// # Errors
    /// `Error::NotFound` when no descriptor file has this name.
    pub fn find(&self, name: &str) -> Result<JobDescriptor> {
        let path = self.path_for(name);
        if !path.is_file() {
            return Err(Error::NotFound(format!(
                "job descriptor '{}' ({})",
                name,
                path.display()
            )));
        }
        JobDescriptor::load(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"#!/bin/bash
#SBATCH --job-name=train_model
#SBATCH --time=04:00:00
#SBATCH -N 2
#SBATCH -pgpu
#SBATCH --gres gpu:4   # four per node
#SBATCH --exclusive
## disabled: #SBATCH --mem=64G

module load cuda
#SBATCH --mem=1G
"#;

    #[test]
    fn test_parse_directives() {
        let directives = parse_directives(SCRIPT);
        let pairs: Vec<(&str, &str)> = directives
            .iter()
            .map(|d| (d.key.as_str(), d.value.as_str()))
            .collect();

        assert_eq!(
            pairs,
            vec![
                ("job-name", "train_model"),
                ("time", "04:00:00"),
                ("N", "2"),
                ("p", "gpu"),
                ("gres", "gpu:4"),
                ("exclusive", ""),
            ]
        );
    }

    #[test]
    fn test_parse_ignores_lookalike_comment() {
        assert!(parse_directives("#SBATCHED --time=1\n").is_empty());
    }

    #[test]
    fn test_store_lists_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.sbatch"), "#!/bin/bash\n").unwrap();
        fs::write(dir.path().join("b.sbatch"), "#!/bin/bash\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "not a job").unwrap();
        fs::create_dir(dir.path().join("c.sbatch")).unwrap();

        let store = DescriptorStore::new(dir.path());
        let mut names = store.list().unwrap();
        names.sort();

        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_store_find() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("train.sbatch"), SCRIPT).unwrap();
        let store = DescriptorStore::new(dir.path());

        let descriptor = store.find("train").unwrap();
        assert_eq!(descriptor.name, "train");
        assert_eq!(descriptor.file_path, dir.path().join("train.sbatch"));
        assert_eq!(descriptor.directives.len(), 6);

        let err = store.find("missing").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_store_missing_directory() {
        let store = DescriptorStore::new("/nonexistent/jobctl/store");
        assert!(matches!(store.list(), Err(Error::Configuration(_))));
    }
}
