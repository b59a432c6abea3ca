//! Ruleset seed files: a JSON array of rulesets, loaded by `parley seed`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use parley_core::domain::ruleset::Ruleset;

use crate::repositories::{RepositoryError, RulesetRepository};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("could not read seed file `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse seed file `{path}`: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("seed file `{path}` names ruleset `{name}` more than once")]
    DuplicateName { path: PathBuf, name: String },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeedResult {
    pub rulesets_saved: usize,
    pub names: Vec<String>,
}

pub fn load_ruleset_seed(path: &Path) -> Result<Vec<Ruleset>, SeedError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| SeedError::Read { path: path.to_path_buf(), source })?;
    let rulesets: Vec<Ruleset> = serde_json::from_str(&raw)
        .map_err(|source| SeedError::Parse { path: path.to_path_buf(), source })?;

    let mut seen = std::collections::BTreeSet::new();
    for ruleset in &rulesets {
        if !seen.insert(ruleset.name.as_str()) {
            return Err(SeedError::DuplicateName {
                path: path.to_path_buf(),
                name: ruleset.name.clone(),
            });
        }
    }

    Ok(rulesets)
}

/// Saves every ruleset, replacing existing ones with the same name.
pub async fn seed_rulesets<R>(repository: &R, rulesets: Vec<Ruleset>) -> Result<SeedResult, SeedError>
where
    R: RulesetRepository + ?Sized,
{
    let mut names = Vec::with_capacity(rulesets.len());
    for ruleset in rulesets {
        let saved = repository.save(ruleset).await?;
        names.push(saved.name);
    }

    Ok(SeedResult { rulesets_saved: names.len(), names })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use parley_core::ports::RulesetStore;
    use tempfile::TempDir;

    use super::{load_ruleset_seed, seed_rulesets, SeedError};
    use crate::repositories::InMemoryRulesetStore;

    #[test]
    fn duplicate_names_are_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("seed.json");
        fs::write(&path, r#"[{"name": "UBOT"}, {"name": "UBOT"}]"#).expect("write");

        let error = load_ruleset_seed(&path).expect_err("duplicate");
        assert!(matches!(error, SeedError::DuplicateName { ref name, .. } if name == "UBOT"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = TempDir::new().expect("tempdir");
        let error = load_ruleset_seed(&dir.path().join("absent.json")).expect_err("missing");
        assert!(matches!(error, SeedError::Read { .. }));
    }

    #[tokio::test]
    async fn seeding_saves_every_ruleset() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("seed.json");
        fs::write(
            &path,
            r#"[
                {"id": "rs-1", "name": "personality", "rules": [{"kind": "text", "value": "Be brief."}]},
                {"name": "UBOT", "meta": {"type": "bot"}}
            ]"#,
        )
        .expect("write");

        let store = InMemoryRulesetStore::default();
        let result =
            seed_rulesets(&store, load_ruleset_seed(&path).expect("load")).await.expect("seed");

        assert_eq!(result.rulesets_saved, 2);
        assert_eq!(result.names, vec!["personality", "UBOT"]);
        assert!(store.find_by_name("UBOT").await.expect("lookup").is_some_and(|r| r.is_bot()));
    }
}
