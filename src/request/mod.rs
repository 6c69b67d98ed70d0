//! Analysis request model.
//!
//! Requests are typed and validated locally before anything is sent to
//! the service, so a typo in a method name or a zero MCMC count is caught
//! without a network round trip.

pub mod analysis;
pub mod file;
pub mod stage;

pub use analysis::{AnalysisRequest, CateRequest, DynamicRequest, RunParams, StaticRequest};
pub use file::{DownloadSources, RequestFile};
pub use stage::StageParams;

use crate::error::{ClientError, ClientResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Estimation method run by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Method {
    /// Gaussian process
    #[default]
    #[serde(rename = "GP", alias = "gp")]
    Gp,
    /// Bayesian additive regression trees
    #[serde(rename = "BART", alias = "bart")]
    Bart,
}

impl Method {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Method::Gp => "GP",
            Method::Bart => "BART",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Type of an outcome or treatment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    #[serde(alias = "continuous")]
    Continuous,
    #[serde(alias = "discrete")]
    Discrete,
}

impl VariableType {
    pub fn as_wire(&self) -> &'static str {
        match self {
            VariableType::Continuous => "Continuous",
            VariableType::Discrete => "Discrete",
        }
    }
}

/// How outcome limits are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundCensor {
    /// Outcome is bounded by `outcome_lb` / `outcome_ub`.
    Bounded,
    /// Outcome is censored by per-row limit columns.
    Censored,
}

impl BoundCensor {
    pub fn as_wire(&self) -> &'static str {
        match self {
            BoundCensor::Bounded => "bounded",
            BoundCensor::Censored => "censored",
        }
    }
}

/// Raw forms a list may take in a request file.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListRepr {
    Joined(String),
    Items(Vec<String>),
}

/// List of variable (column) names.
///
/// Accepts `"age,Female"` or `["age", "Female"]`; sent comma-joined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ListRepr", into = "String")]
pub struct VarList(Vec<String>);

impl VarList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            names
                .into_iter()
                .map(Into::into)
                .map(|s: String| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }

    pub fn parse(joined: &str) -> Self {
        Self::new(joined.split(','))
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn joined(&self) -> String {
        self.0.join(",")
    }
}

impl From<ListRepr> for VarList {
    fn from(repr: ListRepr) -> Self {
        match repr {
            ListRepr::Joined(s) => Self::parse(&s),
            ListRepr::Items(items) => Self::new(items),
        }
    }
}

impl From<VarList> for String {
    fn from(list: VarList) -> Self {
        list.joined()
    }
}

impl From<&str> for VarList {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ValueItem {
    Number(f64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ValueRepr {
    Number(f64),
    Text(String),
    Items(Vec<ValueItem>),
}

/// List of values (thresholds, treatment levels, contrasts).
///
/// Accepts a number (`180`), a comma-joined string (`"5,10,15"`) or an
/// array mixing numbers and strings; sent comma-joined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ValueRepr", into = "String")]
pub struct ValueList(Vec<String>);

impl ValueList {
    pub fn parse(joined: &str) -> Self {
        Self(
            joined
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    pub fn numbers(values: &[f64]) -> Self {
        Self(values.iter().copied().map(format_number).collect())
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn joined(&self) -> String {
        self.0.join(",")
    }

    /// Fail unless every value parses as a number.
    pub fn ensure_numeric(&self, field: &str) -> ClientResult<()> {
        match self.0.iter().find(|v| v.parse::<f64>().is_err()) {
            Some(bad) => Err(ClientError::validation(
                field,
                format!("'{}' is not a number", bad),
            )),
            None => Ok(()),
        }
    }
}

impl From<ValueRepr> for ValueList {
    fn from(repr: ValueRepr) -> Self {
        match repr {
            ValueRepr::Number(n) => Self(vec![format_number(n)]),
            ValueRepr::Text(s) => Self::parse(&s),
            ValueRepr::Items(items) => Self(
                items
                    .into_iter()
                    .flat_map(|item| match item {
                        ValueItem::Number(n) => vec![format_number(n)],
                        ValueItem::Text(s) => Self::parse(&s).0,
                    })
                    .collect(),
            ),
        }
    }
}

impl From<ValueList> for String {
    fn from(list: ValueList) -> Self {
        list.joined()
    }
}

impl From<&str> for ValueList {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

/// Integral values print without a fractional part (`180`, not `180.0`).
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Collects `(name, value)` text fields for a multipart form.
#[derive(Debug, Default)]
pub(crate) struct FormFields {
    prefix: &'static str,
    fields: Vec<(String, String)>,
}

impl FormFields {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Prefix applied to names pushed until the next call.
    pub(crate) fn with_prefix(&mut self, prefix: &'static str) -> &mut Self {
        self.prefix = prefix;
        self
    }

    pub(crate) fn text(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.fields
            .push((format!("{}{}", self.prefix, name), value.into()));
        self
    }

    pub(crate) fn opt_text(&mut self, name: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.text(name, value);
        }
        self
    }

    pub(crate) fn opt_number(&mut self, name: &str, value: Option<f64>) -> &mut Self {
        if let Some(value) = value {
            self.text(name, format_number(value));
        }
        self
    }

    pub(crate) fn vars(&mut self, name: &str, list: &VarList) -> &mut Self {
        if !list.is_empty() {
            self.text(name, list.joined());
        }
        self
    }

    pub(crate) fn values(&mut self, name: &str, list: &ValueList) -> &mut Self {
        if !list.is_empty() {
            self.text(name, list.joined());
        }
        self
    }

    pub(crate) fn into_vec(self) -> Vec<(String, String)> {
        self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Probe {
        vars: VarList,
        values: ValueList,
    }

    #[test]
    fn test_var_list_accepts_joined_and_array() {
        let joined: Probe = toml::from_str(
            r#"
vars = "age, Female ,chaq_score,"
values = "5,10,15"
"#,
        )
        .unwrap();
        assert_eq!(joined.vars.names(), ["age", "Female", "chaq_score"]);
        assert_eq!(joined.values.joined(), "5,10,15");

        let array: Probe = toml::from_str(
            r#"
vars = ["age", "Female"]
values = [0, 1.5, "2"]
"#,
        )
        .unwrap();
        assert_eq!(array.vars.joined(), "age,Female");
        assert_eq!(array.values.values(), ["0", "1.5", "2"]);
    }

    #[test]
    fn test_value_list_from_single_number() {
        let probe: Probe = toml::from_str(
            r#"
vars = "A"
values = 180
"#,
        )
        .unwrap();
        assert_eq!(probe.values.joined(), "180");
    }

    #[test]
    fn test_method_rejects_unknown_names() {
        #[derive(Deserialize)]
        struct M {
            method: Method,
        }
        assert_eq!(toml::from_str::<M>("method = \"BART\"").unwrap().method, Method::Bart);
        assert_eq!(toml::from_str::<M>("method = \"gp\"").unwrap().method, Method::Gp);
        assert!(toml::from_str::<M>("method = \"GPP\"").is_err());
    }

    #[test]
    fn test_ensure_numeric() {
        assert!(ValueList::parse("-1,0,1").ensure_numeric("tr2_values").is_ok());
        let err = ValueList::parse("1,low").ensure_numeric("pr_values").unwrap_err();
        assert!(err.to_string().contains("'low' is not a number"));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(500.0), "500");
        assert_eq!(format_number(-1.0), "-1");
        assert_eq!(format_number(0.25), "0.25");
    }

    #[test]
    fn test_form_fields_prefix_and_omission() {
        let mut form = FormFields::new();
        form.text("method", "GP")
            .with_prefix("stg1_")
            .text("outcome", "L1")
            .opt_text("time", None)
            .opt_number("time_value", Some(90.0))
            .vars("tr_hte", &VarList::default());
        assert_eq!(
            form.into_vec(),
            vec![
                ("method".to_string(), "GP".to_string()),
                ("stg1_outcome".to_string(), "L1".to_string()),
                ("stg1_time_value".to_string(), "90".to_string()),
            ]
        );
    }
}
