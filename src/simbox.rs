use crate::error::{ConfigurationError, Result};
use nalgebra::{Matrix3, Vector3};

/// Simulation box. Columns of `h` are the edge vectors; each axis may be
/// periodic or open.
#[derive(Clone, Debug)]
pub struct SimBox {
    h: Matrix3<f64>,
    h_inv: Matrix3<f64>,
    pbc: Vector3<bool>,
    /// Bumped every time the box matrix changes.
    generation: u64,
}

impl SimBox {
    pub fn new(h: Matrix3<f64>, pbc: Vector3<bool>) -> Result<Self> {
        let h_inv = h.try_inverse().ok_or(ConfigurationError::SingularBox)?;
        Ok(Self {
            h,
            h_inv,
            pbc,
            generation: 0,
        })
    }

    /// Fully periodic cubic box of edge `side`.
    pub fn cubic(side: f64) -> Result<Self> {
        Self::orthorhombic(side, side, side)
    }

    /// Fully periodic rectangular box.
    pub fn orthorhombic(lx: f64, ly: f64, lz: f64) -> Result<Self> {
        Self::new(
            Matrix3::from_diagonal(&Vector3::new(lx, ly, lz)),
            Vector3::new(true, true, true),
        )
    }

    pub fn to_fractional(&self, cart: &Vector3<f64>) -> Vector3<f64> {
        self.h_inv * cart
    }

    pub fn to_cartesian(&self, frac: &Vector3<f64>) -> Vector3<f64> {
        self.h * frac
    }

    pub fn h(&self) -> &Matrix3<f64> {
        &self.h
    }

    pub fn pbc(&self) -> &Vector3<bool> {
        &self.pbc
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replaces the box matrix, e.g. after an accepted volume move. Lists
    /// built on the old box must be rebuilt with `global_update(force = true)`.
    pub fn set_h(&mut self, h: Matrix3<f64>) -> Result<()> {
        self.h_inv = h.try_inverse().ok_or(ConfigurationError::SingularBox)?;
        self.h = h;
        self.generation += 1;
        Ok(())
    }

    /// Lengths of the three edge vectors.
    pub fn box_sides(&self) -> Vector3<f64> {
        Vector3::new(
            self.h.column(0).norm(),
            self.h.column(1).norm(),
            self.h.column(2).norm(),
        )
    }

    pub fn volume(&self) -> f64 {
        self.h.determinant().abs()
    }

    /// Returns the perpendicular widths of the box (distances between parallel faces).
    /// d_i = 1 / |h_inv.row(i)|
    pub fn perpendicular_widths(&self) -> Vector3<f64> {
        Vector3::new(
            1.0 / self.h_inv.row(0).norm(),
            1.0 / self.h_inv.row(1).norm(),
            1.0 / self.h_inv.row(2).norm(),
        )
    }

    /// Fails if some periodic axis cannot hold two interaction ranges, in which
    /// case the minimum image of a pair within range is not unique.
    pub fn check_range(&self, range: f64) -> Result<()> {
        let widths = self.perpendicular_widths();
        for axis in 0..3 {
            if self.pbc[axis] && widths[axis] < 2.0 * range {
                return Err(ConfigurationError::BoxTooSmall {
                    axis,
                    width: widths[axis],
                    range,
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn wrap(&self, cart: &Vector3<f64>) -> Vector3<f64> {
        let frac = self.to_fractional(cart);
        let wrapped_frac = Vector3::new(
            if self.pbc.x {
                frac.x - frac.x.floor()
            } else {
                frac.x
            },
            if self.pbc.y {
                frac.y - frac.y.floor()
            } else {
                frac.y
            },
            if self.pbc.z {
                frac.z - frac.z.floor()
            } else {
                frac.z
            },
        );
        self.to_cartesian(&wrapped_frac)
    }

    /// Image shift of `r_j` closest to `r_i` and the displacement `r_j' - r_i`.
    pub fn get_shift_and_displacement(
        &self,
        r_i: &Vector3<f64>,
        r_j: &Vector3<f64>,
    ) -> (Vector3<i32>, Vector3<f64>) {
        let d_frac = self.to_fractional(&(r_j - r_i));
        let shift_frac = Vector3::new(
            if self.pbc.x { -d_frac.x.round() } else { 0.0 },
            if self.pbc.y { -d_frac.y.round() } else { 0.0 },
            if self.pbc.z { -d_frac.z.round() } else { 0.0 },
        );
        let shift = Vector3::new(
            shift_frac.x as i32,
            shift_frac.y as i32,
            shift_frac.z as i32,
        );
        let r_j_img = r_j + self.h * shift_frac;
        let disp = r_j_img - r_i;
        (shift, disp)
    }

    /// Minimum-image displacement from `r_i` to `r_j`.
    pub fn min_image(&self, r_i: &Vector3<f64>, r_j: &Vector3<f64>) -> Vector3<f64> {
        self.get_shift_and_displacement(r_i, r_j).1
    }

    pub fn sqr_min_image_distance(&self, r_i: &Vector3<f64>, r_j: &Vector3<f64>) -> f64 {
        self.min_image(r_i, r_j).norm_squared()
    }
}
