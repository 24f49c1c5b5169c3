//! # Descriptive statistics and simple regressions
//!
//! Small numerical helpers shared by the validator, the condition index and the model
//! selector. Everything here works on `f64` slices and returns `None` (or an error) rather
//! than NaN when the statistic is undefined for the input.
//!
//! * [`mean`], [`sample_variance`], [`std_dev`], [`std_error`] – sample moments (Bessel-corrected).
//! * [`pearson`] – Pearson product-moment correlation.
//! * [`ols_slope`] – slope and intercept of a simple least-squares line `y = a + b·x`.
//!
//! The Student t machinery used for p-values lives in [`distributions`].
pub mod distributions;

use crate::territory_errors::TerritoryError;

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Sample variance with denominator `n - 1`, `None` when `n < 2`.
///
/// Uses Welford's update so that large offsets (UTM northings are ~10⁶ m)
/// do not cancel catastrophically.
pub fn sample_variance(data: &[f64]) -> Option<f64> {
    if data.len() < 2 {
        return None;
    }
    let mut running_mean = 0.0;
    let mut m2 = 0.0;
    for (i, &x) in data.iter().enumerate() {
        let delta = x - running_mean;
        running_mean += delta / (i + 1) as f64;
        m2 += delta * (x - running_mean);
    }
    Some(m2 / (data.len() - 1) as f64)
}

/// Sample standard deviation.
pub fn std_dev(data: &[f64]) -> Option<f64> {
    sample_variance(data).map(f64::sqrt)
}

/// Standard error of the mean, `sd / sqrt(n)`.
pub fn std_error(data: &[f64]) -> Option<f64> {
    std_dev(data).map(|sd| sd / (data.len() as f64).sqrt())
}

/// Centered cross products `(Sxx, Syy, Sxy)` of two equally sized samples.
fn cross_products(x: &[f64], y: &[f64]) -> (f64, f64, f64) {
    let mx = mean(x).unwrap_or(0.0);
    let my = mean(y).unwrap_or(0.0);
    x.iter()
        .zip(y)
        .fold((0.0, 0.0, 0.0), |(sxx, syy, sxy), (&xi, &yi)| {
            let dx = xi - mx;
            let dy = yi - my;
            (sxx + dx * dx, syy + dy * dy, sxy + dx * dy)
        })
}

fn check_paired(x: &[f64], y: &[f64], needed: usize, context: &str) -> Result<(), TerritoryError> {
    if x.len() != y.len() {
        return Err(TerritoryError::InvalidParameter(format!(
            "{context}: samples have different lengths ({} vs {})",
            x.len(),
            y.len()
        )));
    }
    if x.len() < needed {
        return Err(TerritoryError::insufficient(needed, x.len(), context));
    }
    Ok(())
}

/// Pearson correlation coefficient of two paired samples.
///
/// Return
/// ----------
/// * `Err(InsufficientData)` with fewer than 3 pairs.
/// * `Err(DegenerateGeometry)` if either sample has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Result<f64, TerritoryError> {
    check_paired(x, y, 3, "Pearson correlation")?;
    let (sxx, syy, sxy) = cross_products(x, y);
    if sxx <= 0.0 || syy <= 0.0 {
        return Err(TerritoryError::DegenerateGeometry(
            "correlation undefined for a constant sample".into(),
        ));
    }
    Ok(sxy / (sxx * syy).sqrt())
}

/// Least-squares line of `y` on `x`.
///
/// Return
/// ----------
/// * `(intercept, slope)`
pub fn ols_slope(x: &[f64], y: &[f64]) -> Result<(f64, f64), TerritoryError> {
    check_paired(x, y, 3, "least-squares slope")?;
    let (sxx, _, sxy) = cross_products(x, y);
    if sxx <= 0.0 {
        return Err(TerritoryError::DegenerateGeometry(
            "regression slope undefined: predictor is constant".into(),
        ));
    }
    let slope = sxy / sxx;
    let intercept = mean(y).unwrap_or(0.0) - slope * mean(x).unwrap_or(0.0);
    Ok((intercept, slope))
}

#[cfg(test)]
mod stats_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_moments() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&v).unwrap(), 5.0);
        assert_relative_eq!(sample_variance(&v).unwrap(), 32.0 / 7.0, epsilon = 1e-12);
        assert_relative_eq!(
            std_error(&v).unwrap(),
            (32.0_f64 / 7.0).sqrt() / 8.0_f64.sqrt(),
            epsilon = 1e-12
        );
        assert!(mean(&[]).is_none());
        assert!(sample_variance(&[1.0]).is_none());
    }

    #[test]
    fn test_variance_large_offset() {
        let v: Vec<f64> = [1.0, 2.0, 3.0].iter().map(|x| x + 4_500_000.0).collect();
        assert_relative_eq!(sample_variance(&v).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_pearson_and_slope() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.1, 3.9, 6.2, 7.8, 10.1];
        let r = pearson(&x, &y).unwrap();
        assert!(r > 0.99 && r <= 1.0);

        let (a, b) = ols_slope(&x, &y).unwrap();
        assert_relative_eq!(b, 1.99, epsilon = 1e-12);
        assert_relative_eq!(a, 6.02 - 1.99 * 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pearson_errors() {
        assert_eq!(
            pearson(&[1.0, 2.0], &[1.0, 2.0]),
            Err(TerritoryError::insufficient(2 + 1, 2, "Pearson correlation"))
        );
        assert!(matches!(
            pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]),
            Err(TerritoryError::DegenerateGeometry(_))
        ));
        assert!(matches!(
            ols_slope(&[1.0, 2.0, 3.0], &[1.0, 2.0]),
            Err(TerritoryError::InvalidParameter(_))
        ));
    }
}
