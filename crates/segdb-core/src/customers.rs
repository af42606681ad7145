use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

pub const MAX_AGE: i32 = 120;
pub const MAX_SPENDING_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    #[default]
    Other,
}

impl Gender {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            _ => Err(CoreError::InvalidGender(s.to_string())),
        }
    }
}

/// A customer's current segmentation. Cluster id and label are set together
/// or not at all, so the pair is modelled as one optional value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub cluster_id: i32,
    pub label: String,
}

/// A stored customer with its live segmentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Customer {
    pub customer_id: i64,
    pub gender: Gender,
    pub age: i32,
    pub annual_income: f64,
    pub spending_score: f64,
    pub segment: Option<Segment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// The identifier and feature columns sent to the clustering engine.
    /// Assignment state is never part of the payload.
    #[must_use]
    pub fn to_record(&self) -> CustomerRecord {
        CustomerRecord {
            customer_id: self.customer_id,
            gender: self.gender,
            age: self.age,
            annual_income: self.annual_income,
            spending_score: self.spending_score,
        }
    }
}

/// Identifier, demographics and segmentation features of one customer, in
/// the engine's wire shape (`CustomerID`, `Gender`, `Age`, `AnnualIncome`,
/// `SpendingScore`). Snake-case aliases are accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    #[serde(rename = "CustomerID", alias = "customer_id", alias = "id")]
    pub customer_id: i64,
    #[serde(rename = "Gender", alias = "gender", default)]
    pub gender: Gender,
    #[serde(rename = "Age", alias = "age")]
    pub age: i32,
    #[serde(rename = "AnnualIncome", alias = "annual_income")]
    pub annual_income: f64,
    #[serde(rename = "SpendingScore", alias = "spending_score")]
    pub spending_score: f64,
}

impl CustomerRecord {
    /// Checks the value ranges the customer table enforces.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCustomer`] naming the first offending field.
    pub fn validate(&self) -> Result<(), CoreError> {
        let fail = |reason: String| CoreError::InvalidCustomer {
            customer_id: self.customer_id,
            reason,
        };

        if !(0..=MAX_AGE).contains(&self.age) {
            return Err(fail(format!(
                "age {} outside 0..={MAX_AGE}",
                self.age
            )));
        }
        if !self.annual_income.is_finite() || self.annual_income < 0.0 {
            return Err(fail(format!(
                "annual income {} must be a non-negative number",
                self.annual_income
            )));
        }
        if !self.spending_score.is_finite()
            || !(0.0..=MAX_SPENDING_SCORE).contains(&self.spending_score)
        {
            return Err(fail(format!(
                "spending score {} outside 0..={MAX_SPENDING_SCORE}",
                self.spending_score
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CustomerRecord {
        CustomerRecord {
            customer_id: 7,
            gender: Gender::Female,
            age: 31,
            annual_income: 72.0,
            spending_score: 55.0,
        }
    }

    #[test]
    fn record_serializes_in_engine_shape() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["CustomerID"], 7);
        assert_eq!(json["Gender"], "Female");
        assert_eq!(json["Age"], 31);
        assert!(json.get("customer_id").is_none());
    }

    #[test]
    fn record_accepts_snake_case_input_and_defaults_gender() {
        let parsed: CustomerRecord = serde_json::from_value(serde_json::json!({
            "customer_id": 3,
            "age": 40,
            "annual_income": 15,
            "spending_score": 39
        }))
        .unwrap();
        assert_eq!(parsed.customer_id, 3);
        assert_eq!(parsed.gender, Gender::Other);
        assert!((parsed.annual_income - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut r = record();
        r.age = 121;
        assert!(r.validate().is_err());

        let mut r = record();
        r.annual_income = -1.0;
        assert!(r.validate().is_err());

        let mut r = record();
        r.spending_score = f64::NAN;
        assert!(r.validate().is_err());

        assert!(record().validate().is_ok());
    }

    #[test]
    fn gender_parses_case_insensitively() {
        assert_eq!("FEMALE".parse::<Gender>().unwrap(), Gender::Female);
        assert!("unknown".parse::<Gender>().is_err());
    }
}
