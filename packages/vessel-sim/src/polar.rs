//! Polar performance tables — achievable boat speed by true wind angle/speed.
//!
//! The table is a 2-D grid: rows are true wind angles in [0°, 180°]
//! (port/starboard symmetry assumed), columns are true wind speeds in knots,
//! both axes strictly increasing. Lookups fold the query angle into range,
//! clamp wind speed to the table edge (flat extrapolation — never invent
//! performance beyond recorded polar data), and bilinearly interpolate
//! between the two nearest rows and columns.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolarTableError {
    #[error("polar table axis needs at least two points")]
    AxisTooShort,
    #[error("true wind angle axis is not strictly increasing")]
    NonMonotonicAngles,
    #[error("true wind speed axis is not strictly increasing")]
    NonMonotonicSpeeds,
    #[error("polar grid shape does not match its axes")]
    GridShape,
    #[error("true wind angle {0} outside [0, 180]")]
    AngleOutOfRange(f64),
}

/// Serialized form (TOML profile files use this layout).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolarTableSpec {
    pub angles_deg: Vec<f64>,
    pub speeds_kn: Vec<f64>,
    /// One row of boat speeds per angle, one column per wind speed.
    pub rows: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PolarTableSpec", into = "PolarTableSpec")]
pub struct PolarTable {
    angles_deg: Vec<f64>,
    speeds_kn: Vec<f64>,
    rows: Vec<Vec<f64>>,
}

impl TryFrom<PolarTableSpec> for PolarTable {
    type Error = PolarTableError;

    fn try_from(spec: PolarTableSpec) -> Result<Self, Self::Error> {
        PolarTable::new(spec.angles_deg, spec.speeds_kn, spec.rows)
    }
}

impl From<PolarTable> for PolarTableSpec {
    fn from(t: PolarTable) -> Self {
        PolarTableSpec {
            angles_deg: t.angles_deg,
            speeds_kn: t.speeds_kn,
            rows: t.rows,
        }
    }
}

/// Fold an arbitrary angle into [0°, 180°] using port/starboard symmetry.
pub fn fold_angle(deg: f64) -> f64 {
    let a = deg.rem_euclid(360.0);
    if a > 180.0 {
        360.0 - a
    } else {
        a
    }
}

impl PolarTable {
    pub fn new(
        angles_deg: Vec<f64>,
        speeds_kn: Vec<f64>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, PolarTableError> {
        // Bilinear interpolation needs a cell to interpolate within, so both
        // axes must carry at least two points.
        if angles_deg.len() < 2 || speeds_kn.len() < 2 {
            return Err(PolarTableError::AxisTooShort);
        }
        if !angles_deg.windows(2).all(|w| w[0] < w[1]) {
            return Err(PolarTableError::NonMonotonicAngles);
        }
        if let Some(&a) = angles_deg
            .iter()
            .find(|&&a| !(0.0..=180.0).contains(&a))
        {
            return Err(PolarTableError::AngleOutOfRange(a));
        }
        if !speeds_kn.windows(2).all(|w| w[0] < w[1]) {
            return Err(PolarTableError::NonMonotonicSpeeds);
        }
        if rows.len() != angles_deg.len() || rows.iter().any(|r| r.len() != speeds_kn.len()) {
            return Err(PolarTableError::GridShape);
        }
        Ok(Self {
            angles_deg,
            speeds_kn,
            rows,
        })
    }

    /// Achievable boat speed (knots) at the given true wind angle (degrees,
    /// any reference — folded by symmetry) and true wind speed (knots).
    ///
    /// Flat extrapolation at the speed-axis edges; zero wind is zero boat speed.
    pub fn boat_speed(&self, twa_deg: f64, tws_kn: f64) -> f64 {
        if tws_kn <= 0.0 {
            return 0.0;
        }
        let twa = fold_angle(twa_deg).clamp(
            self.angles_deg[0],
            *self.angles_deg.last().unwrap_or(&180.0),
        );
        let tws = tws_kn.clamp(self.speeds_kn[0], *self.speeds_kn.last().unwrap_or(&0.0));

        let (ai, af) = Self::bracket(&self.angles_deg, twa);
        let (si, sf) = Self::bracket(&self.speeds_kn, tws);

        let v00 = self.rows[ai][si];
        let v01 = self.rows[ai][si + 1];
        let v10 = self.rows[ai + 1][si];
        let v11 = self.rows[ai + 1][si + 1];

        let low = v00 + (v01 - v00) * sf;
        let high = v10 + (v11 - v10) * sf;
        low + (high - low) * af
    }

    /// Bracket `x` on a strictly increasing axis of at least two points:
    /// returns the lower cell index and the fractional position within that
    /// cell. O(log n) via binary search.
    fn bracket(axis: &[f64], x: f64) -> (usize, f64) {
        let upper = axis.partition_point(|&v| v < x).clamp(1, axis.len() - 1);
        let lower = upper - 1;
        let span = axis[upper] - axis[lower];
        let frac = if span > 0.0 {
            ((x - axis[lower]) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        (lower, frac)
    }

    /// Optimal sailing angle for velocity made good at the given wind speed.
    ///
    /// Fixed 2° scan over the angle axis maximizing `speed × cos(angle)`
    /// upwind, or `speed × cos(180° − angle)` downwind. Returns (angle, vmg);
    /// zero wind yields (0, 0) — no division by zero anywhere in the scan.
    pub fn vmg_optimal_angle(&self, tws_kn: f64, upwind: bool) -> (f64, f64) {
        if tws_kn <= 0.0 {
            return (0.0, 0.0);
        }
        let mut best_angle = 0.0;
        let mut best_vmg = 0.0;
        let mut angle = 0.0;
        while angle <= 180.0 {
            let speed = self.boat_speed(angle, tws_kn);
            let vmg = if upwind {
                speed * angle.to_radians().cos()
            } else {
                speed * (180.0 - angle).to_radians().cos()
            };
            if vmg > best_vmg {
                best_vmg = vmg;
                best_angle = angle;
            }
            angle += 2.0;
        }
        (best_angle, best_vmg)
    }

    /// Uniformly scaled copy (used to derive cruiser profiles from a measured
    /// racer grid).
    pub fn scaled(&self, factor: f64) -> PolarTable {
        PolarTable {
            angles_deg: self.angles_deg.clone(),
            speeds_kn: self.speeds_kn.clone(),
            rows: self
                .rows
                .iter()
                .map(|r| r.iter().map(|v| v * factor).collect())
                .collect(),
        }
    }

    pub fn angle_axis(&self) -> &[f64] {
        &self.angles_deg
    }

    pub fn speed_axis(&self) -> &[f64] {
        &self.speeds_kn
    }
}

/// Polar grid for the J/35, the default built-in profile. Boat speeds in
/// knots, derived from published class performance curves and smoothed onto
/// a regular grid.
pub fn j35_polar() -> PolarTable {
    let angles = vec![
        0.0, 30.0, 36.0, 45.0, 52.0, 60.0, 70.0, 80.0, 90.0, 110.0, 120.0, 135.0, 150.0, 165.0,
        180.0,
    ];
    let speeds = vec![4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0, 20.0];
    let rows = vec![
        vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        vec![2.1, 2.9, 3.6, 4.1, 4.4, 4.6, 4.7, 4.8],
        vec![3.4, 4.6, 5.4, 5.9, 6.2, 6.4, 6.5, 6.6],
        vec![4.0, 5.2, 6.0, 6.4, 6.7, 6.9, 7.0, 7.1],
        vec![4.3, 5.5, 6.3, 6.7, 7.0, 7.1, 7.2, 7.3],
        vec![4.5, 5.7, 6.4, 6.8, 7.1, 7.2, 7.3, 7.4],
        vec![4.6, 5.8, 6.5, 6.9, 7.2, 7.3, 7.4, 7.5],
        vec![4.6, 5.8, 6.5, 7.0, 7.2, 7.4, 7.5, 7.6],
        vec![4.5, 5.8, 6.5, 7.0, 7.3, 7.5, 7.6, 7.8],
        vec![4.2, 5.6, 6.4, 7.0, 7.3, 7.5, 7.7, 8.0],
        vec![3.9, 5.3, 6.2, 6.8, 7.2, 7.5, 7.8, 8.2],
        vec![3.4, 4.7, 5.7, 6.4, 6.9, 7.3, 7.7, 8.4],
        vec![2.9, 4.1, 5.1, 5.9, 6.5, 7.0, 7.5, 8.3],
        vec![2.6, 3.7, 4.6, 5.4, 6.1, 6.6, 7.2, 8.0],
        vec![2.4, 3.5, 4.4, 5.2, 5.9, 6.4, 7.0, 7.8],
    ];
    PolarTable::new(angles, speeds, rows).expect("built-in J35 polar grid is well formed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_angle_symmetry() {
        assert_eq!(fold_angle(0.0), 0.0);
        assert_eq!(fold_angle(180.0), 180.0);
        assert_eq!(fold_angle(190.0), 170.0);
        assert_eq!(fold_angle(270.0), 90.0);
        assert_eq!(fold_angle(-45.0), 45.0);
        assert_eq!(fold_angle(405.0), 45.0);
    }

    #[test]
    fn test_grid_point_exact() {
        let polar = j35_polar();
        // Exact grid points come back unchanged
        assert!((polar.boat_speed(90.0, 12.0) - 7.3).abs() < 1e-9);
        assert!((polar.boat_speed(45.0, 8.0) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_bilinear_midpoint() {
        let polar = j35_polar();
        // Midpoint between (90°,12kn)=7.3 and (90°,14kn)=7.5
        let v = polar.boat_speed(90.0, 13.0);
        assert!((v - 7.4).abs() < 1e-9, "got {v}");
    }

    #[test]
    fn test_port_side_mirrors_starboard() {
        let polar = j35_polar();
        assert_eq!(polar.boat_speed(-120.0, 10.0), polar.boat_speed(120.0, 10.0));
        assert_eq!(polar.boat_speed(250.0, 10.0), polar.boat_speed(110.0, 10.0));
    }

    #[test]
    fn test_zero_wind_zero_speed() {
        let polar = j35_polar();
        assert_eq!(polar.boat_speed(90.0, 0.0), 0.0);
        assert_eq!(polar.boat_speed(90.0, -3.0), 0.0);
    }

    #[test]
    fn test_flat_extrapolation_beyond_speed_axis() {
        let polar = j35_polar();
        // Beyond the last column the curve is flat, not extrapolated
        assert_eq!(polar.boat_speed(90.0, 35.0), polar.boat_speed(90.0, 20.0));
        assert_eq!(polar.boat_speed(90.0, 1.0), polar.boat_speed(90.0, 4.0));
    }

    #[test]
    fn test_interpolation_continuity() {
        let polar = j35_polar();
        // Fine probes across the whole surface: adjacent samples never jump
        // by more than one knot.
        for tws10 in (40..=200).step_by(5) {
            let tws = tws10 as f64 / 10.0;
            let mut prev = polar.boat_speed(0.0, tws);
            let mut angle = 1.0;
            while angle <= 180.0 {
                let v = polar.boat_speed(angle, tws);
                assert!(
                    (v - prev).abs() <= 1.0,
                    "discontinuity at twa={angle} tws={tws}: {prev} -> {v}"
                );
                prev = v;
                angle += 1.0;
            }
        }
    }

    #[test]
    fn test_vmg_upwind_angle_reasonable() {
        let polar = j35_polar();
        let (angle, vmg) = polar.vmg_optimal_angle(12.0, true);
        // A 35-foot racer beats somewhere in the 30–60° band
        assert!((30.0..=60.0).contains(&angle), "upwind angle {angle}");
        assert!(vmg > 0.0);
    }

    #[test]
    fn test_vmg_downwind_angle_reasonable() {
        let polar = j35_polar();
        let (angle, vmg) = polar.vmg_optimal_angle(12.0, false);
        assert!((130.0..=180.0).contains(&angle), "downwind angle {angle}");
        assert!(vmg > 0.0);
    }

    #[test]
    fn test_vmg_zero_wind_guarded() {
        let polar = j35_polar();
        assert_eq!(polar.vmg_optimal_angle(0.0, true), (0.0, 0.0));
    }

    #[test]
    fn test_rejects_bad_axes() {
        assert!(matches!(
            PolarTable::new(vec![], vec![6.0, 8.0], vec![]),
            Err(PolarTableError::AxisTooShort)
        ));
        assert!(matches!(
            PolarTable::new(vec![0.0, 90.0, 45.0], vec![6.0, 8.0], vec![vec![0.0, 0.0]; 3]),
            Err(PolarTableError::NonMonotonicAngles)
        ));
        assert!(matches!(
            PolarTable::new(vec![0.0, 90.0], vec![8.0, 6.0], vec![vec![0.0, 0.0]; 2]),
            Err(PolarTableError::NonMonotonicSpeeds)
        ));
        assert!(matches!(
            PolarTable::new(vec![0.0, 90.0], vec![6.0, 8.0], vec![vec![0.0]]),
            Err(PolarTableError::GridShape)
        ));
    }

    #[test]
    fn test_rejects_degenerate_single_column_axes() {
        // A one-column table has no cell to interpolate within; it must be
        // refused at construction rather than fault on the first lookup.
        assert!(matches!(
            PolarTable::new(
                vec![45.0, 90.0, 135.0],
                vec![10.0],
                vec![vec![5.0], vec![6.0], vec![5.5]],
            ),
            Err(PolarTableError::AxisTooShort)
        ));
        assert!(matches!(
            PolarTable::new(vec![90.0], vec![6.0, 10.0], vec![vec![5.0, 6.0]]),
            Err(PolarTableError::AxisTooShort)
        ));
    }
}
