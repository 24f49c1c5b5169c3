//! Welch two-sample t-test (unequal variances) and the urban vs. rural comparisons.
//!
//! ```text
//! t  = (m_a − m_b) / sqrt(se_a² + se_b²)
//! df = (se_a² + se_b²)² / (se_a⁴/(n_a − 1) + se_b⁴/(n_b − 1))      (Welch–Satterthwaite)
//! ```
//!
//! with `se = s/√n`. The p-value is two-sided.
use serde::Serialize;
use tracing::info;

use crate::{
    condition::Habitat,
    stats::{distributions::student_t_two_sided_p, mean, std_error},
    territory_errors::TerritoryError,
};

use super::ModelRecord;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WelchTest {
    pub t: f64,
    pub df: f64,
    pub p_value: f64,
    pub mean_a: f64,
    pub mean_b: f64,
    pub n_a: usize,
    pub n_b: usize,
}

impl WelchTest {
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

/// Welch test from group summaries (mean, standard error, size).
///
/// Arguments
/// -----------------
/// * `mean_a`, `se_a`, `n_a`: first group.
/// * `mean_b`, `se_b`, `n_b`: second group.
///
/// Return
/// ----------
/// * `Err(InsufficientData)` if a group has fewer than 2 members.
/// * `Err(DegenerateGeometry)` if both standard errors are zero.
pub fn welch_from_summary(
    mean_a: f64,
    se_a: f64,
    n_a: usize,
    mean_b: f64,
    se_b: f64,
    n_b: usize,
) -> Result<WelchTest, TerritoryError> {
    for n in [n_a, n_b] {
        if n < 2 {
            return Err(TerritoryError::insufficient(2, n, "Welch t-test group"));
        }
    }
    if !(se_a >= 0.0 && se_b >= 0.0) {
        return Err(TerritoryError::InvalidParameter(
            "standard errors must be non-negative".into(),
        ));
    }
    let va = se_a * se_a;
    let vb = se_b * se_b;
    let pooled = va + vb;
    if pooled <= 0.0 {
        return Err(TerritoryError::DegenerateGeometry(
            "both groups have zero variance".into(),
        ));
    }

    let t = (mean_a - mean_b) / pooled.sqrt();
    let df = pooled * pooled / (va * va / (n_a - 1) as f64 + vb * vb / (n_b - 1) as f64);
    Ok(WelchTest {
        t,
        df,
        p_value: student_t_two_sided_p(t, df),
        mean_a,
        mean_b,
        n_a,
        n_b,
    })
}

/// Welch test on two raw samples.
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Result<WelchTest, TerritoryError> {
    let summary = |x: &[f64]| match (mean(x), std_error(x)) {
        (Some(m), Some(se)) if x.len() >= 2 => Ok((m, se)),
        _ => Err(TerritoryError::insufficient(2, x.len(), "Welch t-test group")),
    };
    let (ma, sea) = summary(a)?;
    let (mb, seb) = summary(b)?;
    welch_from_summary(ma, sea, a.len(), mb, seb, b.len())
}

/// Urban (group a) vs. rural (group b) comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HabitatComparisons {
    pub comm_distance: WelchTest,
    /// On `sqrt(area_75)`
    pub sqrt_area: WelchTest,
}

pub fn habitat_comparisons(records: &[ModelRecord]) -> Result<HabitatComparisons, TerritoryError> {
    if let Some(r) = records.iter().find(|r| r.area_75 < 0.0) {
        return Err(TerritoryError::InvalidParameter(format!(
            "negative area_75 for bird {}",
            r.bird_id
        )));
    }
    let column = |habitat: Habitat, f: fn(&ModelRecord) -> f64| -> Vec<f64> {
        records
            .iter()
            .filter(|r| r.habitat == habitat)
            .map(f)
            .collect()
    };

    let comm_distance = welch_t_test(
        &column(Habitat::Urban, |r| r.comm_distance),
        &column(Habitat::Rural, |r| r.comm_distance),
    )?;
    let sqrt_area = welch_t_test(
        &column(Habitat::Urban, |r| r.area_75.sqrt()),
        &column(Habitat::Rural, |r| r.area_75.sqrt()),
    )?;

    info!(
        t = comm_distance.t,
        p = comm_distance.p_value,
        "urban vs rural communication distance"
    );
    info!(t = sqrt_area.t, p = sqrt_area.p_value, "urban vs rural sqrt(area_75)");
    Ok(HabitatComparisons {
        comm_distance,
        sqrt_area,
    })
}

#[cfg(test)]
mod welch_test {
    use super::*;
    use crate::models::models_test::record;
    use approx::assert_relative_eq;

    #[test]
    fn test_summary_statistics_case() {
        let w = welch_from_summary(5440.0, 800.0, 12, 2328.0, 400.0, 11).unwrap();
        assert_relative_eq!(w.t, 3.479_322, epsilon = 1e-5);
        assert_relative_eq!(w.df, 16.082, epsilon = 1e-3);
        assert!(w.is_significant(0.05));
        assert!(w.p_value > 0.001 && w.p_value < 0.01);
    }

    #[test]
    fn test_raw_samples() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 4.0, 6.0, 8.0, 10.0, 12.0];
        let w = welch_t_test(&a, &b).unwrap();
        // var a = 2.5, var b = 14; se² = 0.5 and 2.333…
        assert_relative_eq!(w.t, -4.0 / (0.5f64 + 14.0 / 6.0).sqrt(), epsilon = 1e-12);
        let va: f64 = 0.5;
        let vb: f64 = 14.0 / 6.0;
        let df = (va + vb).powi(2) / (va * va / 4.0 + vb * vb / 5.0);
        assert_relative_eq!(w.df, df, epsilon = 1e-12);
        assert!(w.p_value > 0.0 && w.p_value < 1.0);
    }

    #[test]
    fn test_symmetry() {
        let a = [3.1, 2.9, 3.4, 3.0];
        let b = [2.0, 2.5, 2.2];
        let ab = welch_t_test(&a, &b).unwrap();
        let ba = welch_t_test(&b, &a).unwrap();
        assert_relative_eq!(ab.t, -ba.t, epsilon = 1e-12);
        assert_relative_eq!(ab.p_value, ba.p_value, epsilon = 1e-12);
    }

    #[test]
    fn test_small_groups() {
        assert_eq!(
            welch_t_test(&[1.0], &[1.0, 2.0]),
            Err(TerritoryError::insufficient(2, 1, "Welch t-test group"))
        );
        assert!(matches!(
            welch_t_test(&[1.0, 1.0], &[2.0, 2.0]),
            Err(TerritoryError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn test_habitat_comparisons() {
        let records = vec![
            record(1, Habitat::Urban, "SY", 120.0, 10.0, 60.0, 10_000.0),
            record(2, Habitat::Urban, "SY", 130.0, 10.0, 61.0, 12_100.0),
            record(3, Habitat::Urban, "ASY", 125.0, 10.0, 62.0, 14_400.0),
            record(4, Habitat::Rural, "SY", 90.0, 10.0, 40.0, 2_500.0),
            record(5, Habitat::Rural, "ASY", 95.0, 10.0, 41.0, 3_600.0),
        ];
        let c = habitat_comparisons(&records).unwrap();
        assert_eq!((c.comm_distance.n_a, c.comm_distance.n_b), (3, 2));
        assert_relative_eq!(c.comm_distance.mean_a, 125.0);
        assert_relative_eq!(c.sqrt_area.mean_a, 110.0, epsilon = 1e-12);
        assert_relative_eq!(c.sqrt_area.mean_b, 55.0, epsilon = 1e-12);
        assert!(c.sqrt_area.t > 0.0);

        let only_urban: Vec<_> = records[..3].to_vec();
        assert!(matches!(
            habitat_comparisons(&only_urban),
            Err(TerritoryError::InsufficientData { .. })
        ));
    }
}
