//! TOML request files.
//!
//! ```toml
//! [static]
//! datafile = "example1.csv"
//! outcome = "Jadas6"
//! treatment = "treatment_group"
//! x_explanatory = ["age", "Female", "chaq_score"]
//! x_confounding = "age,Jadas0,chaq_score"
//! method = "GP"
//!
//! [download]
//! datafile = "https://github.com/pcats-api/pcats_api_examples/raw/main/casedata/example1.csv"
//!
//! [[cate]]
//! x = "RF_pos"
//! control_tr = "0"
//! treat_tr = "1"
//! ```
//!
//! A dynamic job uses `[dynamic]` with `[dynamic.stg1]` and `[dynamic.stg2]`.

use super::{AnalysisRequest, CateRequest, DynamicRequest, RunParams, StageParams, StaticRequest};
use crate::error::{ClientError, ClientResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Remote locations of data files that are fetched when missing locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadSources {
    pub datafile: Option<String>,
    pub mi_datafile: Option<String>,
}

/// Contents of a request file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestFile {
    #[serde(rename = "static", default, skip_serializing_if = "Option::is_none")]
    pub static_job: Option<StaticRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic: Option<DynamicRequest>,

    #[serde(default)]
    pub download: DownloadSources,

    /// CATE follow-ups submitted after the main job completes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cate: Vec<CateRequest>,
}

impl RequestFile {
    /// Load a request file, resolving relative data paths against its directory.
    pub fn load(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::validation(
                path.display().to_string(),
                format!("cannot read request file: {}", e),
            )
        })?;

        let mut file = Self::parse(&content).map_err(|e| match e {
            ClientError::Validation { reason, .. } => {
                ClientError::validation(path.display().to_string(), reason)
            }
            other => other,
        })?;

        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        if let Some(ref mut r) = file.static_job {
            r.run.resolve_paths(&base);
        }
        if let Some(ref mut r) = file.dynamic {
            r.run.resolve_paths(&base);
        }

        Ok(file)
    }

    /// Parse request file contents (paths are left as written).
    ///
    /// Unknown keys are logged as warnings; everything that is recognised
    /// must still be valid.
    pub fn parse(content: &str) -> ClientResult<Self> {
        let file: Self = toml::from_str(content)
            .map_err(|e| ClientError::validation("request file", e.message().to_string()))?;

        for key in Self::unknown_keys(content) {
            warn!(key = %key, "ignoring unknown request file key");
        }
        Ok(file)
    }

    /// Dotted paths of keys no request parameter uses, e.g. `static.tr_hter`.
    pub fn unknown_keys(content: &str) -> Vec<String> {
        let Ok(root) = content.parse::<toml::Table>() else {
            return Vec::new();
        };

        let mut unknown = Vec::new();
        for (section, value) in &root {
            match (section.as_str(), value) {
                ("static", toml::Value::Table(table)) => {
                    // Flattened: a key is unknown only if neither part uses it
                    let run = ignored_keys::<RunParams>(table);
                    let stage = ignored_keys::<StageParams>(table);
                    unknown.extend(
                        run.intersection(&stage)
                            .map(|key| format!("static.{}", key)),
                    );
                }
                ("dynamic", toml::Value::Table(table)) => {
                    for key in ignored_keys::<RunParams>(table) {
                        if key != "stg1" && key != "stg2" {
                            unknown.push(format!("dynamic.{}", key));
                        }
                    }
                    for stage in ["stg1", "stg2"] {
                        if let Some(toml::Value::Table(t)) = table.get(stage) {
                            unknown.extend(
                                ignored_keys::<StageParams>(t)
                                    .into_iter()
                                    .map(|key| format!("dynamic.{}.{}", stage, key)),
                            );
                        }
                    }
                }
                ("download", toml::Value::Table(table)) => unknown.extend(
                    ignored_keys::<DownloadSources>(table)
                        .into_iter()
                        .map(|key| format!("download.{}", key)),
                ),
                ("cate", toml::Value::Array(items)) => {
                    for (i, item) in items.iter().enumerate() {
                        if let toml::Value::Table(t) = item {
                            unknown.extend(
                                ignored_keys::<CateRequest>(t)
                                    .into_iter()
                                    .map(|key| format!("cate[{}].{}", i, key)),
                            );
                        }
                    }
                }
                ("static" | "dynamic" | "download" | "cate", _) => {}
                (other, _) => unknown.push(other.to_string()),
            }
        }
        unknown
    }

    /// The single analysis this file describes.
    pub fn analysis(&self) -> ClientResult<AnalysisRequest> {
        match (&self.static_job, &self.dynamic) {
            (Some(r), None) => Ok(AnalysisRequest::Static(r.clone())),
            (None, Some(r)) => Ok(AnalysisRequest::Dynamic(r.clone())),
            (Some(_), Some(_)) => Err(ClientError::validation(
                "request file",
                "contains both [static] and [dynamic]; expected exactly one",
            )),
            (None, None) => Err(ClientError::validation(
                "request file",
                "needs a [static] or [dynamic] section",
            )),
        }
    }

    /// `(url, local path)` pairs for data files that are not present locally.
    pub fn missing_downloads(&self, analysis: &AnalysisRequest) -> Vec<(String, PathBuf)> {
        let run = analysis.run();
        let mut wanted = Vec::new();

        if let Some(ref url) = self.download.datafile {
            wanted.push((url.clone(), run.datafile.clone()));
        }
        if let (Some(url), Some(path)) = (&self.download.mi_datafile, &run.mi_datafile) {
            wanted.push((url.clone(), path.clone()));
        }

        wanted.retain(|(_, path)| !path.exists());
        wanted
    }

    /// Generate the content of an example request file.
    pub fn example_toml() -> String {
        EXAMPLE_REQUEST.to_string()
    }
}

impl AnalysisRequest {
    /// Point the data file paths at `base` when they are relative.
    pub fn resolve_paths(&mut self, base: &Path) {
        self.run_mut().resolve_paths(base);
    }
}

/// Keys of `table` that deserializing a `T` skips over.
fn ignored_keys<T: DeserializeOwned>(table: &toml::Table) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    let _: Result<T, _> = serde_ignored::deserialize(toml::Value::Table(table.clone()), |path| {
        keys.insert(path.to_string());
    });
    keys
}

const EXAMPLE_REQUEST: &str = r#"# Juvenile idiopathic arthritis example (static GP with CATE follow-up)

[static]
datafile = "example1.csv"
mi_datafile = "example1_midata.csv"
outcome = "Jadas6"
treatment = "treatment_group"
x_explanatory = "age,Female,chaq_score,RF_pos,private,Jadas0,timediag"
x_confounding = "age,Jadas0,chaq_score,diffvisit,timediag"
burn_num = 500
mcmc_num = 500
outcome_type = "Continuous"
method = "GP"
tr_type = "Discrete"
outcome_lb = 0
outcome_ub = 40
outcome_bound_censor = "bounded"
x_categorical = "Female,RF_pos,private"
pr_values = "5,10,15"

[download]
datafile = "https://github.com/pcats-api/pcats_api_examples/raw/main/casedata/example1.csv"
mi_datafile = "https://github.com/pcats-api/pcats_api_examples/raw/main/casedata/example1_midata.csv"

[[cate]]
x = "RF_pos"
control_tr = "0"
treat_tr = "1"
pr_values = "5,10,15"
"#;
