//! # Geographic → UTM projection
//!
//! Converts WGS84 longitude/latitude pairs into planar UTM coordinates (meters) so that
//! kernel areas can be computed in square meters, and back.
//!
//! ## Projection string
//!
//! The target projection is given as a PROJ.4-style definition, as found in the
//! metadata of the field data sheets:
//!
//! ```text
//! +proj=utm +zone=17 +datum=WGS84 +units=m
//! +proj=utm +zone=21 +south +ellps=WGS84 +units=m +no_defs
//! ```
//!
//! Only `utm` on the WGS84 datum/ellipsoid with metric units is accepted; anything else
//! yields [`TerritoryError::ProjectionError`].
//!
//! ## Algorithm
//!
//! Transverse Mercator through the 6th-order Krüger series in the third flattening `n`
//! (Karney, 2011, *J. Geodesy* 85:475–485). The series is accurate to a few nanometers
//! within the zone and the transform is a pure deterministic function of its inputs.
//! The inverse converts conformal latitude back with a Newton iteration on `tan φ`.
//!
//! ## Per-record policy
//!
//! [`project_relocations`] projects a batch of raw relocations. A record whose
//! coordinates fall outside the projection domain is skipped and counted in the returned
//! [`ProjectionReport`]; the rest of the batch is still projected.
use std::str::FromStr;

use tracing::warn;

use crate::{
    constants::{
        Degree, Meter, UTM_FALSE_EASTING, UTM_FALSE_NORTHING_SOUTH, UTM_K0, UTM_MAX_LAT,
        UTM_MAX_LON_OFFSET, UTM_MIN_LAT, WGS84_A, WGS84_INV_F,
    },
    observations::{Observation, RawRelocation},
    territory_errors::TerritoryError,
};

/// A Universal Transverse Mercator zone on the WGS84 ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtmProjection {
    zone: u8,
    south: bool,
    central_meridian: Degree,
    /// Rectifying radius A, scaled by k0
    k0_a: f64,
    e: f64,
    alpha: [f64; 6],
    beta: [f64; 6],
}

impl UtmProjection {
    /// Build a projection for a given zone (1..=60) and hemisphere.
    pub fn new(zone: u8, south: bool) -> Result<Self, TerritoryError> {
        if !(1..=60).contains(&zone) {
            return Err(TerritoryError::ProjectionError(format!(
                "UTM zone must be in 1..=60, got {zone}"
            )));
        }

        let f = 1.0 / WGS84_INV_F;
        let n = f / (2.0 - f);
        let n2 = n * n;
        let n3 = n2 * n;
        let n4 = n3 * n;
        let n5 = n4 * n;
        let n6 = n5 * n;

        let a_rect = WGS84_A / (1.0 + n) * (1.0 + n2 / 4.0 + n4 / 64.0 + n6 / 256.0);

        let alpha = [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0 + 41.0 * n4 / 180.0 - 127.0 * n5 / 288.0
                + 7891.0 * n6 / 37800.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0 + 557.0 * n4 / 1440.0 + 281.0 * n5 / 630.0
                - 1983433.0 * n6 / 1935360.0,
            61.0 * n3 / 240.0 - 103.0 * n4 / 140.0 + 15061.0 * n5 / 26880.0
                + 167603.0 * n6 / 181440.0,
            49561.0 * n4 / 161280.0 - 179.0 * n5 / 168.0 + 6601661.0 * n6 / 7257600.0,
            34729.0 * n5 / 80640.0 - 3418889.0 * n6 / 1995840.0,
            212378941.0 * n6 / 319334400.0,
        ];

        let beta = [
            n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0 - n4 / 360.0 - 81.0 * n5 / 512.0
                + 96199.0 * n6 / 604800.0,
            n2 / 48.0 + n3 / 15.0 - 437.0 * n4 / 1440.0 + 46.0 * n5 / 105.0
                - 1118711.0 * n6 / 3870720.0,
            17.0 * n3 / 480.0 - 37.0 * n4 / 840.0 - 209.0 * n5 / 4480.0 + 5569.0 * n6 / 90720.0,
            4397.0 * n4 / 161280.0 - 11.0 * n5 / 504.0 - 830251.0 * n6 / 7257600.0,
            4583.0 * n5 / 161280.0 - 108847.0 * n6 / 3991680.0,
            20648693.0 * n6 / 638668800.0,
        ];

        Ok(UtmProjection {
            zone,
            south,
            central_meridian: (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0,
            k0_a: UTM_K0 * a_rect,
            e: (f * (2.0 - f)).sqrt(),
            alpha,
            beta,
        })
    }

    /// Parse a PROJ.4-style definition, e.g. `"+proj=utm +zone=17 +datum=WGS84 +units=m"`.
    pub fn from_proj_str(definition: &str) -> Result<Self, TerritoryError> {
        let malformed =
            |why: &str| TerritoryError::ProjectionError(format!("{why} in '{definition}'"));

        let mut proj = None;
        let mut zone = None;
        let mut south = false;
        let mut ellipsoid_ok = false;
        let mut units = None;

        for token in definition.split_whitespace() {
            let token = token
                .strip_prefix('+')
                .ok_or_else(|| malformed("parameter without leading '+'"))?;
            match token.split_once('=') {
                Some(("proj", v)) => proj = Some(v.to_ascii_lowercase()),
                Some(("zone", v)) => {
                    zone = Some(
                        v.parse::<u8>()
                            .map_err(|_| malformed("zone is not an integer"))?,
                    )
                }
                Some(("datum", v)) | Some(("ellps", v)) => {
                    if !v.eq_ignore_ascii_case("WGS84") {
                        return Err(malformed("only the WGS84 datum is supported"));
                    }
                    ellipsoid_ok = true;
                }
                Some(("units", v)) => units = Some(v.to_string()),
                Some(("towgs84", _)) => {}
                Some((key, _)) => return Err(malformed(&format!("unsupported parameter '{key}'"))),
                None if token == "south" => south = true,
                None if token == "north" || token == "no_defs" => {}
                None => return Err(malformed(&format!("unknown flag '{token}'"))),
            }
        }

        if proj.as_deref() != Some("utm") {
            return Err(malformed("only '+proj=utm' is supported"));
        }
        if !ellipsoid_ok {
            return Err(malformed("missing '+datum=WGS84'"));
        }
        if units.as_deref().is_some_and(|u| u != "m") {
            return Err(malformed("units must be meters"));
        }
        let zone = zone.ok_or_else(|| malformed("missing '+zone'"))?;
        Self::new(zone, south)
    }

    pub fn zone(&self) -> u8 {
        self.zone
    }

    pub fn is_south(&self) -> bool {
        self.south
    }

    pub fn central_meridian(&self) -> Degree {
        self.central_meridian
    }

    fn check_domain(&self, lon: Degree, lat: Degree) -> Result<(), TerritoryError> {
        if !lon.is_finite() || !lat.is_finite() {
            return Err(TerritoryError::ProjectionError(format!(
                "non-finite coordinate ({lon}, {lat})"
            )));
        }
        if !(UTM_MIN_LAT..=UTM_MAX_LAT).contains(&lat) {
            return Err(TerritoryError::ProjectionError(format!(
                "latitude {lat} outside the UTM domain [{UTM_MIN_LAT}, {UTM_MAX_LAT}]"
            )));
        }
        if lon.abs() > 180.0 {
            return Err(TerritoryError::ProjectionError(format!(
                "longitude {lon} outside [-180, 180]"
            )));
        }
        if self.meridian_offset(lon).abs() > UTM_MAX_LON_OFFSET {
            return Err(TerritoryError::ProjectionError(format!(
                "longitude {lon} is too far from the central meridian {} of zone {}",
                self.central_meridian, self.zone
            )));
        }
        Ok(())
    }

    /// Signed distance of `lon` from the central meridian, taken across the antimeridian
    /// when that is shorter (zones 1 and 60).
    #[inline]
    fn meridian_offset(&self, lon: Degree) -> Degree {
        wrap_longitude(lon - self.central_meridian)
    }

    /// Project a geographic coordinate (degrees) to `(easting, northing)` in meters.
    pub fn forward(&self, lon: Degree, lat: Degree) -> Result<(Meter, Meter), TerritoryError> {
        self.check_domain(lon, lat)?;

        let phi = lat.to_radians();
        let lambda = self.meridian_offset(lon).to_radians();
        let e = self.e;

        // conformal latitude
        let tau = phi.tan();
        let sigma = (e * (e * tau / (1.0 + tau * tau).sqrt()).atanh()).sinh();
        let tau_p = tau * (1.0 + sigma * sigma).sqrt() - sigma * (1.0 + tau * tau).sqrt();

        let (sin_l, cos_l) = lambda.sin_cos();
        let xi_p = tau_p.atan2(cos_l);
        let eta_p = (sin_l / (tau_p * tau_p + cos_l * cos_l).sqrt()).asinh();

        let (mut xi, mut eta) = (xi_p, eta_p);
        for (j, a) in self.alpha.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            xi += a * (k * xi_p).sin() * (k * eta_p).cosh();
            eta += a * (k * xi_p).cos() * (k * eta_p).sinh();
        }

        let easting = UTM_FALSE_EASTING + self.k0_a * eta;
        let northing = self.k0_a * xi + if self.south { UTM_FALSE_NORTHING_SOUTH } else { 0.0 };
        Ok((easting, northing))
    }

    /// Inverse projection: `(easting, northing)` in meters back to `(longitude, latitude)` in degrees.
    pub fn inverse(&self, easting: Meter, northing: Meter) -> Result<(Degree, Degree), TerritoryError> {
        if !easting.is_finite() || !northing.is_finite() {
            return Err(TerritoryError::ProjectionError(format!(
                "non-finite planar coordinate ({easting}, {northing})"
            )));
        }
        let y = northing - if self.south { UTM_FALSE_NORTHING_SOUTH } else { 0.0 };
        let eta = (easting - UTM_FALSE_EASTING) / self.k0_a;
        let xi = y / self.k0_a;

        let (mut xi_p, mut eta_p) = (xi, eta);
        for (j, b) in self.beta.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            xi_p -= b * (k * xi).sin() * (k * eta).cosh();
            eta_p -= b * (k * xi).cos() * (k * eta).sinh();
        }

        let sinh_eta_p = eta_p.sinh();
        let (sin_xi_p, cos_xi_p) = xi_p.sin_cos();
        let tau_p = sin_xi_p / (sinh_eta_p * sinh_eta_p + cos_xi_p * cos_xi_p).sqrt();

        let e = self.e;
        let e2 = e * e;
        let mut tau = tau_p;
        for _ in 0..20 {
            let sigma = (e * (e * tau / (1.0 + tau * tau).sqrt()).atanh()).sinh();
            let tau_i = tau * (1.0 + sigma * sigma).sqrt() - sigma * (1.0 + tau * tau).sqrt();
            let delta = (tau_p - tau_i) / (1.0 + tau_i * tau_i).sqrt()
                * (1.0 + (1.0 - e2) * tau * tau)
                / ((1.0 - e2) * (1.0 + tau * tau).sqrt());
            tau += delta;
            if delta.abs() < 1e-14 {
                break;
            }
        }

        let lat = tau.atan().to_degrees();
        let lon = wrap_longitude(self.central_meridian + sinh_eta_p.atan2(cos_xi_p).to_degrees());
        Ok((lon, lat))
    }

    /// Project an ordered sequence of `(longitude, latitude)` pairs.
    ///
    /// Return
    /// ----------
    /// * A vector of `(easting, northing)` with the same length and order as the input,
    ///   or the first [`TerritoryError::ProjectionError`] encountered.
    pub fn project_all(&self, coords: &[(Degree, Degree)]) -> Result<Vec<(Meter, Meter)>, TerritoryError> {
        coords
            .iter()
            .map(|&(lon, lat)| self.forward(lon, lat))
            .collect()
    }
}

/// Bring a longitude (or a longitude difference) into `[-180, 180)`.
#[inline]
fn wrap_longitude(lon: Degree) -> Degree {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

impl FromStr for UtmProjection {
    type Err = TerritoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UtmProjection::from_proj_str(s)
    }
}

impl std::fmt::Display for UtmProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "+proj=utm +zone={}", self.zone)?;
        if self.south {
            write!(f, " +south")?;
        }
        write!(f, " +datum=WGS84 +units=m")
    }
}

/// Outcome counters for a batch projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionReport {
    pub projected: usize,
    /// `(row index, cause)` of every skipped record
    pub skipped: Vec<(usize, String)>,
}

/// Project raw relocations into [`Observation`]s, skipping records outside the projection domain.
pub fn project_relocations(
    projection: &UtmProjection,
    relocations: &[RawRelocation],
) -> (Vec<Observation>, ProjectionReport) {
    let mut report = ProjectionReport::default();
    let mut observations = Vec::with_capacity(relocations.len());

    for (row, reloc) in relocations.iter().enumerate() {
        match projection.forward(reloc.longitude, reloc.latitude) {
            Ok((easting, northing)) => {
                observations.push(Observation {
                    bird_id: reloc.bird_id.clone(),
                    longitude: reloc.longitude,
                    latitude: reloc.latitude,
                    easting,
                    northing,
                    recorded_at: reloc.recorded_at.clone(),
                });
                report.projected += 1;
            }
            Err(err) => {
                warn!(row, bird = %reloc.bird_id, "skipping relocation: {err}");
                report.skipped.push((row, err.to_string()));
            }
        }
    }
    (observations, report)
}

#[cfg(test)]
mod projection_test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_parse_proj_string() {
        let p = UtmProjection::from_proj_str("+proj=utm +zone=17 +datum=WGS84 +units=m").unwrap();
        assert_eq!(p.zone(), 17);
        assert!(!p.is_south());
        assert_eq!(p.central_meridian(), -81.0);

        let p: UtmProjection = "+proj=utm +zone=21 +south +ellps=WGS84 +units=m +no_defs"
            .parse()
            .unwrap();
        assert_eq!(p.zone(), 21);
        assert!(p.is_south());
        assert_eq!(
            p.to_string(),
            "+proj=utm +zone=21 +south +datum=WGS84 +units=m"
        );
    }

    #[test]
    fn test_parse_proj_string_errors() {
        for bad in [
            "+proj=longlat +datum=WGS84",
            "+proj=utm +zone=61 +datum=WGS84",
            "+proj=utm +zone=ab +datum=WGS84",
            "+proj=utm +zone=17 +datum=NAD27",
            "+proj=utm +zone=17",
            "+proj=utm +zone=17 +datum=WGS84 +units=ft",
            "proj=utm zone=17",
            "",
        ] {
            assert!(
                matches!(
                    UtmProjection::from_proj_str(bad),
                    Err(TerritoryError::ProjectionError(_))
                ),
                "'{bad}' should be rejected"
            );
        }
    }

    #[test]
    fn test_forward_central_meridian_equator() {
        let p = UtmProjection::new(31, false).unwrap();
        let (e, n) = p.forward(3.0, 0.0).unwrap();
        assert_abs_diff_eq!(e, 500_000.0, epsilon = 1e-6);
        assert_abs_diff_eq!(n, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_forward_meridian_arc() {
        // On the central meridian the northing is k0 times the meridian arc length,
        // 4 984 944.378 m from the equator to 45°N on WGS84.
        let p = UtmProjection::new(17, false).unwrap();
        let (e, n) = p.forward(-81.0, 45.0).unwrap();
        assert_abs_diff_eq!(e, 500_000.0, epsilon = 1e-6);
        assert_abs_diff_eq!(n, 0.9996 * 4_984_944.378, epsilon = 1e-2);

        // Eastings mirror around the central meridian
        let (e_west, n_west) = p.forward(-82.5, 45.0).unwrap();
        let (e_east, n_east) = p.forward(-79.5, 45.0).unwrap();
        assert_abs_diff_eq!(e_west + e_east, 1_000_000.0, epsilon = 1e-6);
        assert_abs_diff_eq!(n_west, n_east, epsilon = 1e-6);
    }

    #[test]
    fn test_round_trip() {
        let north = UtmProjection::new(17, false).unwrap();
        let south = UtmProjection::new(21, true).unwrap();
        for (proj, lats) in [(north, [0.5, 23.1, 44.9, 83.5]), (south, [-0.5, -23.1, -44.9, -79.5])] {
            let cm = proj.central_meridian();
            for lat in lats {
                for dlon in [-5.5, -2.0, 0.0, 1.3, 3.0, 8.5] {
                    let lon = cm + dlon;
                    let (e, n) = proj.forward(lon, lat).unwrap();
                    let (lon2, lat2) = proj.inverse(e, n).unwrap();
                    assert_abs_diff_eq!(lon2, lon, epsilon = 1e-6);
                    assert_abs_diff_eq!(lat2, lat, epsilon = 1e-6);
                }
            }
        }
    }

    #[test]
    fn test_zones_next_to_the_antimeridian() {
        // zone 60 (cm 177°E) reaches past 180°, zone 1 (cm 177°W) starts before it
        let z60 = UtmProjection::new(60, false).unwrap();
        let z1 = UtmProjection::new(1, true).unwrap();
        for (proj, lon, mirror) in [(&z60, -179.5, 173.5), (&z1, 179.0, -173.0)] {
            let (e, n) = proj.forward(lon, 10.0 * if proj.south { -1.0 } else { 1.0 }).unwrap();
            let (e_m, n_m) = proj.forward(mirror, 10.0 * if proj.south { -1.0 } else { 1.0 }).unwrap();
            assert_abs_diff_eq!(e + e_m, 1_000_000.0, epsilon = 1e-6);
            assert_abs_diff_eq!(n, n_m, epsilon = 1e-6);

            let (lon2, _) = proj.inverse(e, n).unwrap();
            assert_abs_diff_eq!(lon2, lon, epsilon = 1e-6);
        }
        assert!(z60.forward(-179.5, 10.0).unwrap().0 > 500_000.0);
        assert!(z1.forward(179.0, -10.0).unwrap().0 < 500_000.0);

        // 11° away across the antimeridian is still out of zone
        assert!(z60.forward(-172.0, 10.0).is_err());
        assert!(z1.forward(172.0, -10.0).is_err());
    }

    #[test]
    fn test_forward_domain_errors() {
        let p = UtmProjection::new(17, false).unwrap();
        assert!(p.forward(-81.0, 85.0).is_err());
        assert!(p.forward(-81.0, -81.0).is_err());
        assert!(p.forward(f64::NAN, 40.0).is_err());
        assert!(p.forward(-100.0, 40.0).is_err());
        assert!(p.forward(190.0, 40.0).is_err());
    }

    #[test]
    fn test_project_all_preserves_order() {
        let p = UtmProjection::new(17, false).unwrap();
        let coords = [(-81.2, 42.1), (-80.9, 42.3), (-81.0, 42.2)];
        let out = p.project_all(&coords).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out[0].0 < out[2].0 && out[2].0 < out[1].0);
        assert!(p.project_all(&[(-81.2, 42.1), (-81.0, 89.0)]).is_err());
    }

    #[test]
    fn test_project_relocations_skips_bad_records() {
        let p = UtmProjection::new(17, false).unwrap();
        let relocs = vec![
            RawRelocation::new("A", -81.2, 42.1),
            RawRelocation::new("A", -81.2, 95.0),
            RawRelocation::new("B", -80.9, 42.3),
        ];
        let (obs, report) = project_relocations(&p, &relocs);
        assert_eq!(obs.len(), 2);
        assert_eq!(report.projected, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, 1);
        assert_eq!(obs[1].bird_id.as_str(), "B");
    }
}
