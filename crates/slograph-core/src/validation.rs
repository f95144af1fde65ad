use crate::{Result, SloGraphError};

/// Checks that `value` is a finite ratio in `[0, 1]`.
pub fn ensure_ratio(field: &str, value: f64) -> Result<f64> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(SloGraphError::validation(format!(
            "{} must be a ratio in [0, 1], got {}",
            field, value
        )));
    }
    Ok(value)
}

/// Checks that an SLO target percentage lies in `(0, 100]`.
pub fn ensure_slo_target(target_pct: f64) -> Result<f64> {
    if !target_pct.is_finite() || target_pct <= 0.0 || target_pct > 100.0 {
        return Err(SloGraphError::validation(format!(
            "SLO target must be a percentage in (0, 100], got {}",
            target_pct
        )));
    }
    Ok(target_pct)
}

pub fn ensure_business_id(business_id: &str) -> Result<()> {
    if business_id.trim().is_empty() {
        return Err(SloGraphError::validation("service business id must not be empty"));
    }
    Ok(())
}
