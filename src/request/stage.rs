//! Per-stage model parameters.
//!
//! A static job has one stage (fields sent unprefixed); a dynamic job has
//! two, sent with `stg1_` / `stg2_` prefixes.

use super::{BoundCensor, FormFields, ValueList, VarList, VariableType};
use crate::error::{ClientError, ClientResult};
use serde::{Deserialize, Serialize};

/// Outcome, treatment and covariate specification for one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageParams {
    /// Outcome variable.
    pub outcome: String,
    /// Treatment variable, optionally followed by a second (continuous) treatment.
    pub treatment: VarList,
    /// Prognostic covariates (W).
    pub x_explanatory: VarList,
    /// Confounders (V).
    pub x_confounding: VarList,
    /// Variables modifying the treatment effect.
    pub tr_hte: VarList,
    /// Variables modifying the second treatment's effect.
    pub tr2_hte: VarList,
    /// Values of the second treatment at which effects are reported.
    pub tr2_values: ValueList,
    pub tr2_type: Option<VariableType>,
    pub outcome_type: Option<VariableType>,
    pub tr_type: Option<VariableType>,
    pub outcome_lb: Option<f64>,
    pub outcome_ub: Option<f64>,
    pub outcome_bound_censor: Option<BoundCensor>,
    /// Column holding each row's lower censoring limit.
    pub outcome_censor_lv: Option<String>,
    /// Column holding each row's upper censoring limit.
    pub outcome_censor_uv: Option<String>,
    /// Column flagging censored rows.
    pub outcome_censor_yn: Option<String>,
    /// Time variable.
    pub time: Option<String>,
    pub time_value: Option<f64>,
}

impl StageParams {
    /// Minimal stage with the required fields set.
    pub fn new(
        outcome: impl Into<String>,
        treatment: impl Into<VarList>,
        x_explanatory: impl Into<VarList>,
        x_confounding: impl Into<VarList>,
    ) -> Self {
        Self {
            outcome: outcome.into().trim().to_string(),
            treatment: treatment.into(),
            x_explanatory: x_explanatory.into(),
            x_confounding: x_confounding.into(),
            ..Self::default()
        }
    }

    /// Validate this stage. `prefix` qualifies field names in errors.
    pub fn validate(&self, prefix: &str) -> ClientResult<()> {
        let field = |name: &str| format!("{}{}", prefix, name);

        if self.outcome.trim().is_empty() {
            return Err(ClientError::validation(field("outcome"), "must not be empty"));
        }
        if self.treatment.is_empty() {
            return Err(ClientError::validation(field("treatment"), "must not be empty"));
        }
        if self.treatment.len() > 2 {
            return Err(ClientError::validation(
                field("treatment"),
                format!("at most two treatments allowed, got {}", self.treatment.len()),
            ));
        }
        if self.x_explanatory.is_empty() {
            return Err(ClientError::validation(
                field("x_explanatory"),
                "must not be empty",
            ));
        }
        if self.x_confounding.is_empty() {
            return Err(ClientError::validation(
                field("x_confounding"),
                "must not be empty",
            ));
        }

        for (name, list) in [
            ("x_explanatory", &self.x_explanatory),
            ("x_confounding", &self.x_confounding),
        ] {
            if list.contains(&self.outcome) {
                return Err(ClientError::validation(
                    field(name),
                    format!("outcome '{}' cannot be its own covariate", self.outcome),
                ));
            }
        }

        // tr2_type and tr2_values describe a second treatment; tr2_hte does not
        if self.treatment.len() < 2 {
            let second_treatment_option = if self.tr2_type.is_some() {
                Some("tr2_type")
            } else if !self.tr2_values.is_empty() {
                Some("tr2_values")
            } else {
                None
            };
            if let Some(name) = second_treatment_option {
                return Err(ClientError::validation(
                    field(name),
                    "requires a second treatment variable",
                ));
            }
        }
        self.tr2_values.ensure_numeric(&field("tr2_values"))?;

        self.validate_limits(&field)?;

        if self.time_value.is_some() && self.time.as_deref().map_or(true, |t| t.trim().is_empty())
        {
            return Err(ClientError::validation(
                field("time_value"),
                "requires a time variable",
            ));
        }

        Ok(())
    }

    fn validate_limits(&self, field: &dyn Fn(&str) -> String) -> ClientResult<()> {
        let has_bounds = self.outcome_lb.is_some() || self.outcome_ub.is_some();
        let has_censor_columns = self.outcome_censor_lv.is_some()
            || self.outcome_censor_uv.is_some()
            || self.outcome_censor_yn.is_some();

        if let (Some(lb), Some(ub)) = (self.outcome_lb, self.outcome_ub) {
            if lb >= ub {
                return Err(ClientError::validation(
                    field("outcome_lb"),
                    format!("lower bound {} must be below upper bound {}", lb, ub),
                ));
            }
        }

        match self.outcome_bound_censor {
            Some(BoundCensor::Bounded) => {
                if !has_bounds {
                    return Err(ClientError::validation(
                        field("outcome_bound_censor"),
                        "bounded outcome needs outcome_lb or outcome_ub",
                    ));
                }
                if has_censor_columns {
                    return Err(ClientError::validation(
                        field("outcome_bound_censor"),
                        "censoring columns require outcome_bound_censor = censored",
                    ));
                }
            }
            Some(BoundCensor::Censored) => {
                if self.outcome_censor_lv.is_none() && self.outcome_censor_uv.is_none() {
                    return Err(ClientError::validation(
                        field("outcome_bound_censor"),
                        "censored outcome needs outcome_censor_lv or outcome_censor_uv",
                    ));
                }
                if has_bounds {
                    return Err(ClientError::validation(
                        field("outcome_bound_censor"),
                        "outcome_lb/outcome_ub require outcome_bound_censor = bounded",
                    ));
                }
            }
            None => {
                if has_bounds || has_censor_columns {
                    return Err(ClientError::validation(
                        field("outcome_bound_censor"),
                        "must be set when outcome limits are given",
                    ));
                }
            }
        }

        Ok(())
    }

    /// Every variable name this stage refers to.
    pub fn referenced_variables(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.outcome.as_str()).chain(
            [
                &self.treatment,
                &self.x_explanatory,
                &self.x_confounding,
                &self.tr_hte,
                &self.tr2_hte,
            ]
            .into_iter()
            .flat_map(|list| list.names().iter().map(String::as_str)),
        )
    }

    pub(crate) fn write_fields(&self, form: &mut FormFields) {
        form.text("outcome", self.outcome.trim())
            .vars("treatment", &self.treatment)
            .vars("x_explanatory", &self.x_explanatory)
            .vars("x_confounding", &self.x_confounding)
            .vars("tr_hte", &self.tr_hte)
            .vars("tr2_hte", &self.tr2_hte)
            .values("tr2_values", &self.tr2_values)
            .opt_text("tr2_type", self.tr2_type.as_ref().map(VariableType::as_wire))
            .opt_text(
                "outcome_type",
                self.outcome_type.as_ref().map(VariableType::as_wire),
            )
            .opt_text("tr_type", self.tr_type.as_ref().map(VariableType::as_wire))
            .opt_number("outcome_lb", self.outcome_lb)
            .opt_number("outcome_ub", self.outcome_ub)
            .opt_text(
                "outcome_bound_censor",
                self.outcome_bound_censor.as_ref().map(BoundCensor::as_wire),
            )
            .opt_text("outcome_censor_lv", self.outcome_censor_lv.as_deref())
            .opt_text("outcome_censor_uv", self.outcome_censor_uv.as_deref())
            .opt_text("outcome_censor_yn", self.outcome_censor_yn.as_deref())
            .opt_text("time", self.time.as_deref())
            .opt_number("time_value", self.time_value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> StageParams {
        StageParams::new("Y", "A", "X", "X")
    }

    #[test]
    fn test_minimal_stage_is_valid() {
        assert!(stage().validate("").is_ok());
    }

    #[test]
    fn test_required_fields() {
        let mut s = stage();
        s.outcome = "  ".to_string();
        let err = s.validate("stg1_").unwrap_err();
        assert!(matches!(err, ClientError::Validation { ref field, .. } if field == "stg1_outcome"));

        let mut s = stage();
        s.x_confounding = VarList::default();
        let err = s.validate("").unwrap_err();
        assert!(matches!(err, ClientError::Validation { ref field, .. } if field == "x_confounding"));

        let mut s = stage();
        s.treatment = VarList::parse("A,B,C");
        assert!(s.validate("").is_err());
    }

    #[test]
    fn test_outcome_cannot_be_covariate() {
        let s = StageParams::new("Y", "A", "X,Y", "X");
        let err = s.validate("").unwrap_err();
        assert!(err.to_string().contains("own covariate"));
    }

    #[test]
    fn test_second_treatment_options() {
        let mut s = stage();
        s.tr2_type = Some(VariableType::Continuous);
        assert!(s.validate("").is_err());

        let mut s = StageParams::new("Y", "A,Z", "X", "X");
        s.tr2_type = Some(VariableType::Continuous);
        s.tr2_values = ValueList::parse("-1,0,1");
        s.tr_hte = VarList::parse("Gender");
        assert!(s.validate("").is_ok());

        s.tr2_values = ValueList::parse("low");
        assert!(s.validate("").is_err());
    }

    #[test]
    fn test_tr2_hte_with_single_treatment() {
        let mut s = StageParams::new("BMI2", "A1", "MET,BMI1", "BMI0,BMI1");
        s.tr2_hte = VarList::parse("BMI1");
        assert!(s.validate("stg2_").is_ok());

        let mut form = FormFields::new();
        form.with_prefix("stg2_");
        s.write_fields(&mut form);
        assert!(form
            .into_vec()
            .contains(&("stg2_tr2_hte".to_string(), "BMI1".to_string())));
    }

    #[test]
    fn test_bounded_and_censored_outcomes() {
        let mut s = stage();
        s.outcome_lb = Some(0.0);
        s.outcome_ub = Some(40.0);
        assert!(s.validate("").is_err(), "limits without mode");

        s.outcome_bound_censor = Some(BoundCensor::Bounded);
        assert!(s.validate("").is_ok());

        s.outcome_lb = Some(50.0);
        assert!(s.validate("").is_err(), "lb above ub");

        let mut s = stage();
        s.outcome_bound_censor = Some(BoundCensor::Censored);
        assert!(s.validate("").is_err(), "censored without columns");
        s.outcome_censor_lv = Some("lv".to_string());
        s.outcome_censor_uv = Some("uv".to_string());
        s.outcome_censor_yn = Some("censor".to_string());
        assert!(s.validate("").is_ok());
    }

    #[test]
    fn test_time_value_requires_time() {
        let mut s = stage();
        s.time_value = Some(90.0);
        assert!(s.validate("").is_err());
        s.time = Some("time1".to_string());
        assert!(s.validate("").is_ok());
    }

    #[test]
    fn test_write_fields_with_prefix() {
        let mut s = StageParams::new("BMI1", "A0", "MET,Gender", "BMI0,AGE");
        s.outcome_type = Some(VariableType::Continuous);
        s.time = Some("time1".to_string());
        s.time_value = Some(90.0);

        let mut form = FormFields::new();
        form.with_prefix("stg1_");
        s.write_fields(&mut form);
        let fields = form.into_vec();

        assert!(fields.contains(&("stg1_outcome".to_string(), "BMI1".to_string())));
        assert!(fields.contains(&("stg1_x_explanatory".to_string(), "MET,Gender".to_string())));
        assert!(fields.contains(&("stg1_outcome_type".to_string(), "Continuous".to_string())));
        assert!(fields.contains(&("stg1_time_value".to_string(), "90".to_string())));
        assert!(!fields.iter().any(|(k, _)| k == "stg1_tr_type"));
    }
}
