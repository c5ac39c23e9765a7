use std::collections::HashMap;

use meterline_core::error::{MeterError, Result};

use crate::config::BillingSection;

/// Static `kind -> credits` table, loaded once from config.
#[derive(Debug, Clone)]
pub struct CostSchedule {
    costs: HashMap<String, i64>,
}

impl CostSchedule {
    pub fn new<I, K>(costs: I) -> Self
    where
        I: IntoIterator<Item = (K, i64)>,
        K: Into<String>,
    {
        Self {
            costs: costs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn from_config(billing: &BillingSection) -> Self {
        Self::new(billing.costs.iter().map(|(k, v)| (k.clone(), *v)))
    }

    pub fn cost(&self, kind: &str) -> Result<i64> {
        self.costs
            .get(kind)
            .copied()
            .ok_or_else(|| MeterError::UnknownEventKind(kind.to_string()))
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.costs.keys().map(String::as_str).collect();
        v.sort_unstable();
        v
    }
}

impl Default for CostSchedule {
    fn default() -> Self {
        Self::from_config(&BillingSection::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_matches_published_prices() {
        let s = CostSchedule::default();
        assert_eq!(s.cost("question").unwrap(), 1);
        assert_eq!(s.cost("report").unwrap(), 3);
        assert_eq!(s.cost("file_upload").unwrap(), 1);
        assert_eq!(s.cost("research_file_upload").unwrap(), 1);
        assert_eq!(s.cost("live_data").unwrap(), 1);
        assert_eq!(s.kinds().len(), 5);
    }

    #[test]
    fn unknown_kind_is_typed() {
        let s = CostSchedule::new([("question", 2)]);
        let err = s.cost("premium").unwrap_err();
        assert!(matches!(err, MeterError::UnknownEventKind(k) if k == "premium"));
    }
}
