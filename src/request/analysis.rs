//! Static, dynamic and CATE analysis requests.

use super::{FormFields, Method, StageParams, ValueList, VarList};
use crate::error::{ClientError, ClientResult};
use crate::models::JobKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Form part name for the primary data file.
pub const DATA_PART: &str = "data";
/// Form part name for the multiple-imputation data file.
pub const MI_DATA_PART: &str = "mi_data";

/// Parameters shared by every analysis job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunParams {
    /// CSV data file uploaded with the job.
    pub datafile: PathBuf,
    /// Optional multiple-imputation data file, passed through unchanged.
    pub mi_datafile: Option<PathBuf>,
    /// Burn-in iterations.
    pub burn_num: u32,
    /// MCMC iterations kept after burn-in.
    pub mcmc_num: u32,
    pub method: Method,
    /// Variables to treat as categorical.
    pub x_categorical: VarList,
    /// Thresholds c for the probability of treatment benefit (PrTE).
    pub pr_values: ValueList,
    /// Clinically meaningful margin.
    pub c_margin: ValueList,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            datafile: PathBuf::new(),
            mi_datafile: None,
            burn_num: 500,
            mcmc_num: 500,
            method: Method::default(),
            x_categorical: VarList::default(),
            pr_values: ValueList::default(),
            c_margin: ValueList::default(),
        }
    }
}

impl RunParams {
    pub fn new(datafile: impl Into<PathBuf>) -> Self {
        Self {
            datafile: datafile.into(),
            ..Self::default()
        }
    }

    fn validate(&self, stages: &[&StageParams]) -> ClientResult<()> {
        if self.datafile.as_os_str().is_empty() {
            return Err(ClientError::validation("datafile", "must be set"));
        }
        if self.burn_num == 0 {
            return Err(ClientError::validation(
                "burn_num",
                "must be a positive integer",
            ));
        }
        if self.mcmc_num == 0 {
            return Err(ClientError::validation(
                "mcmc_num",
                "must be a positive integer",
            ));
        }
        self.pr_values.ensure_numeric("pr_values")?;
        self.c_margin.ensure_numeric("c_margin")?;

        // A categorical variable nobody refers to is almost always a typo
        for name in self.x_categorical.names() {
            let referenced = stages
                .iter()
                .any(|stage| stage.referenced_variables().any(|v| v == name));
            if !referenced {
                return Err(ClientError::validation(
                    "x_categorical",
                    format!("'{}' is not used by any stage", name),
                ));
            }
        }

        Ok(())
    }

    fn write_fields(&self, form: &mut FormFields) {
        form.text("burn_num", self.burn_num.to_string())
            .text("mcmc_num", self.mcmc_num.to_string())
            .text("method", self.method.as_wire())
            .vars("x_categorical", &self.x_categorical)
            .values("pr_values", &self.pr_values)
            .values("c_margin", &self.c_margin);
    }

    fn attachments(&self) -> Vec<(&'static str, &Path)> {
        let mut parts = vec![(DATA_PART, self.datafile.as_path())];
        if let Some(ref mi) = self.mi_datafile {
            parts.push((MI_DATA_PART, mi.as_path()));
        }
        parts
    }

    pub(crate) fn resolve_paths(&mut self, base: &Path) {
        if self.datafile.is_relative() && !self.datafile.as_os_str().is_empty() {
            self.datafile = base.join(&self.datafile);
        }
        if let Some(ref mut mi) = self.mi_datafile {
            if mi.is_relative() {
                *mi = base.join(&*mi);
            }
        }
    }
}

/// Single-stage treatment-effect estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticRequest {
    #[serde(flatten)]
    pub run: RunParams,
    #[serde(flatten)]
    pub stage: StageParams,
}

impl StaticRequest {
    pub fn new(datafile: impl Into<PathBuf>, stage: StageParams) -> Self {
        Self {
            run: RunParams::new(datafile),
            stage,
        }
    }

    pub fn validate(&self) -> ClientResult<()> {
        self.stage.validate("")?;
        self.run.validate(&[&self.stage])
    }

    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut form = FormFields::new();
        self.run.write_fields(&mut form);
        self.stage.write_fields(&mut form);
        form.into_vec()
    }

    pub fn attachments(&self) -> Vec<(&'static str, &Path)> {
        self.run.attachments()
    }
}

/// Two-stage (sequential treatment) estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicRequest {
    #[serde(flatten)]
    pub run: RunParams,
    #[serde(default)]
    pub stg1: StageParams,
    #[serde(default)]
    pub stg2: StageParams,
}

impl DynamicRequest {
    pub fn new(datafile: impl Into<PathBuf>, stg1: StageParams, stg2: StageParams) -> Self {
        Self {
            run: RunParams::new(datafile),
            stg1,
            stg2,
        }
    }

    /// Validate both stages independently, then the shared parameters.
    ///
    /// Stage 2 may use stage-1 variables (e.g. the stage-1 outcome) as
    /// covariates.
    pub fn validate(&self) -> ClientResult<()> {
        self.stg1.validate("stg1_")?;
        self.stg2.validate("stg2_")?;

        if self.stg1.outcome.trim() == self.stg2.outcome.trim() {
            return Err(ClientError::validation(
                "stg2_outcome",
                format!("must differ from stage 1 outcome '{}'", self.stg1.outcome),
            ));
        }

        self.run.validate(&[&self.stg1, &self.stg2])
    }

    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut form = FormFields::new();
        self.run.write_fields(&mut form);
        self.stg1.write_fields(form.with_prefix("stg1_"));
        self.stg2.write_fields(form.with_prefix("stg2_"));
        form.into_vec()
    }

    pub fn attachments(&self) -> Vec<(&'static str, &Path)> {
        self.run.attachments()
    }
}

/// A static or dynamic analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisRequest {
    Static(StaticRequest),
    Dynamic(DynamicRequest),
}

impl AnalysisRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            AnalysisRequest::Static(_) => JobKind::Static,
            AnalysisRequest::Dynamic(_) => JobKind::Dynamic,
        }
    }

    pub fn validate(&self) -> ClientResult<()> {
        match self {
            AnalysisRequest::Static(r) => r.validate(),
            AnalysisRequest::Dynamic(r) => r.validate(),
        }
    }

    pub fn run(&self) -> &RunParams {
        match self {
            AnalysisRequest::Static(r) => &r.run,
            AnalysisRequest::Dynamic(r) => &r.run,
        }
    }

    pub(crate) fn run_mut(&mut self) -> &mut RunParams {
        match self {
            AnalysisRequest::Static(r) => &mut r.run,
            AnalysisRequest::Dynamic(r) => &mut r.run,
        }
    }
}

/// Conditional average treatment effect follow-up on a completed static job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CateRequest {
    /// Covariate defining the subgroups.
    pub x: String,
    /// Treatment values for the control arm.
    pub control_tr: ValueList,
    /// Treatment values for the treated arm.
    pub treat_tr: ValueList,
    #[serde(default)]
    pub pr_values: ValueList,
}

impl CateRequest {
    pub fn new(
        x: impl Into<String>,
        control_tr: impl Into<ValueList>,
        treat_tr: impl Into<ValueList>,
    ) -> Self {
        Self {
            x: x.into().trim().to_string(),
            control_tr: control_tr.into(),
            treat_tr: treat_tr.into(),
            pr_values: ValueList::default(),
        }
    }

    pub fn with_pr_values(mut self, pr_values: impl Into<ValueList>) -> Self {
        self.pr_values = pr_values.into();
        self
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.x.trim().is_empty() {
            return Err(ClientError::validation("x", "must not be empty"));
        }
        if self.control_tr.is_empty() {
            return Err(ClientError::validation("control_tr", "must not be empty"));
        }
        if self.treat_tr.is_empty() {
            return Err(ClientError::validation("treat_tr", "must not be empty"));
        }
        if self.control_tr.len() != self.treat_tr.len() {
            return Err(ClientError::validation(
                "treat_tr",
                format!(
                    "has {} values but control_tr has {}",
                    self.treat_tr.len(),
                    self.control_tr.len()
                ),
            ));
        }
        self.pr_values.ensure_numeric("pr_values")
    }

    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut form = FormFields::new();
        form.text("x", self.x.trim())
            .values("control_tr", &self.control_tr)
            .values("treat_tr", &self.treat_tr)
            .values("pr_values", &self.pr_values);
        form.into_vec()
    }
}
