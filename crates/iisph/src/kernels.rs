//! SPH smoothing kernels.
//!
//! Positions arrive as `Vec3` but every kernel is evaluated in `f64`; the
//! `(h² - r²)³` and `(h - r)²` terms cancel badly in single precision near
//! the edge of the support.

use glam::Vec3;
use std::f64::consts::PI;

/// Kernel family used for density and pressure summations.
///
/// Owns the support radius and its cached powers. All evaluation methods are
/// pure; they return zero outside the support `|r| >= h`.
#[derive(Clone, Copy, Debug)]
pub struct KernelFunctions {
    h: f64,
    h2: f64,
    h3: f64,
    h4: f64,
    h5: f64,
    h6: f64,
    h9: f64,
}

impl KernelFunctions {
    /// Create kernels with support radius `h`.
    pub fn new(h: f32) -> Self {
        let mut kernels = Self {
            h: 0.0,
            h2: 0.0,
            h3: 0.0,
            h4: 0.0,
            h5: 0.0,
            h6: 0.0,
            h9: 0.0,
        };
        kernels.set_radius(h);
        kernels
    }

    /// Change the support radius and recompute the cached powers.
    pub fn set_radius(&mut self, h: f32) {
        assert!(h > 0.0 && h.is_finite(), "kernel radius must be positive, got {}", h);
        let h = h as f64;
        self.h = h;
        self.h2 = h * h;
        self.h3 = self.h2 * h;
        self.h4 = self.h3 * h;
        self.h5 = self.h4 * h;
        self.h6 = self.h5 * h;
        self.h9 = self.h6 * self.h3;
    }

    /// Support radius.
    pub fn radius(&self) -> f32 {
        self.h as f32
    }

    /// Poly6 density kernel: `315/(64π) (h² - r²)³ / h⁹`.
    #[inline]
    pub fn poly6(&self, r: Vec3) -> f64 {
        let r2 = r.as_dvec3().length_squared();
        if r2 >= self.h2 {
            return 0.0;
        }
        let diff = self.h2 - r2;
        315.0 / (64.0 * PI) * diff * diff * diff / self.h9
    }

    /// Spiky kernel: `15/π (h - r)³ / h⁶`.
    #[inline]
    pub fn spiky(&self, r: Vec3) -> f64 {
        let len = r.as_dvec3().length();
        if len >= self.h {
            return 0.0;
        }
        let diff = self.h - len;
        15.0 / PI * diff * diff * diff / self.h6
    }

    /// Gradient of the spiky kernel with respect to `r`.
    ///
    /// Zero for `r == 0`, so self pairs contribute nothing.
    #[inline]
    pub fn spiky_gradient(&self, r: Vec3) -> Vec3 {
        let r = r.as_dvec3();
        let len = r.length();
        if len == 0.0 || len >= self.h {
            return Vec3::ZERO;
        }
        let diff = self.h - len;
        let scale = -45.0 / PI * diff * diff / (len * self.h6);
        (r * scale).as_vec3()
    }

    /// Viscosity kernel: `15/(2π) (-r³/(2h³) + r²/h² + h/(2r) - 1) / h³`.
    #[inline]
    pub fn viscous(&self, r: Vec3) -> f64 {
        let len = r.as_dvec3().length();
        if len == 0.0 || len >= self.h {
            return 0.0;
        }
        let poly = -0.5 * len * len * len / self.h3 + len * len / self.h2 + 0.5 * self.h / len - 1.0;
        15.0 / (2.0 * PI) * poly / self.h3
    }

    /// Laplacian of the viscosity kernel: `45/π (h - r) / h⁶`.
    #[inline]
    pub fn viscous_laplacian(&self, r: Vec3) -> f64 {
        let len = r.as_dvec3().length();
        if len >= self.h {
            return 0.0;
        }
        45.0 / PI * (self.h - len) / self.h6
    }

    /// Cubic spline kernel, two pieces split at `q = r/h = 1/2`.
    #[inline]
    pub fn spline(&self, r: Vec3) -> f64 {
        let q = r.as_dvec3().length() / self.h;
        let sigma = 8.0 / (PI * self.h3);
        if q >= 1.0 {
            0.0
        } else if q <= 0.5 {
            sigma * (6.0 * (q * q * q - q * q) + 1.0)
        } else {
            let inv = 1.0 - q;
            sigma * 2.0 * inv * inv * inv
        }
    }

    /// Gradient of the cubic spline kernel. Zero for `r == 0`.
    #[inline]
    pub fn spline_gradient(&self, r: Vec3) -> Vec3 {
        let r = r.as_dvec3();
        let len = r.length();
        if len == 0.0 || len >= self.h {
            return Vec3::ZERO;
        }
        (r * self.spline_derivative_over_r(len)).as_vec3()
    }

    /// Laplacian of the cubic spline kernel, `W'' + 2W'/r`.
    #[inline]
    pub fn spline_laplacian(&self, r: Vec3) -> f64 {
        let len = r.as_dvec3().length();
        if len >= self.h {
            return 0.0;
        }
        let q = len / self.h;
        let second = if q <= 0.5 {
            48.0 / PI * (6.0 * q - 2.0) / self.h5
        } else {
            48.0 / PI * (2.0 - 2.0 * q) / self.h5
        };
        second + 2.0 * self.spline_derivative_over_r(len)
    }

    /// `W'(r) / r`, finite at `r == 0`.
    #[inline]
    fn spline_derivative_over_r(&self, len: f64) -> f64 {
        let q = len / self.h;
        if q <= 0.5 {
            48.0 / PI * (3.0 * q - 2.0) / self.h5
        } else {
            let inv = 1.0 - q;
            -48.0 / PI * inv * inv / (self.h4 * len)
        }
    }
}

impl Default for KernelFunctions {
    fn default() -> Self {
        Self::new(crate::constants::KERNEL_RADIUS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_rel(actual: f64, expected: f64) {
        let rel = ((actual - expected) / expected).abs();
        assert!(
            rel < 1e-4,
            "expected {} within 0.01%, got {} (rel err {})",
            expected,
            actual,
            rel
        );
    }

    #[test]
    fn test_poly6_reference_values() {
        let k = KernelFunctions::new(0.1);
        assert_rel(k.poly6(Vec3::new(0.05, 0.05, 0.05)), 24.4794);
        assert_rel(k.poly6(Vec3::new(0.03, 0.04, 0.05)), 195.835);
        assert_rel(k.poly6(Vec3::new(0.003, 0.002, 0.001)), 1560.11);
        assert_eq!(k.poly6(Vec3::new(0.1, 0.1, 0.1)), 0.0);
    }

    #[test]
    fn test_spiky_reference_values() {
        let k = KernelFunctions::new(0.1);
        assert_rel(k.spiky(Vec3::new(0.05, 0.05, 0.05)), 11.4819);
        assert_rel(k.spiky(Vec3::new(0.03, 0.04, 0.05)), 119.969);
        assert_rel(k.spiky(Vec3::new(0.003, 0.002, 0.001)), 4258.50);
        assert_eq!(k.spiky(Vec3::new(0.1, 0.1, 0.1)), 0.0);
    }

    #[test]
    fn test_zero_at_and_beyond_support() {
        let k = KernelFunctions::new(0.1);
        for r in [Vec3::new(0.1, 0.0, 0.0), Vec3::new(0.0, -0.1, 0.0), Vec3::new(0.2, 0.0, 0.0)] {
            assert_eq!(k.poly6(r), 0.0);
            assert_eq!(k.spiky(r), 0.0);
            assert_eq!(k.spiky_gradient(r), Vec3::ZERO);
            assert_eq!(k.viscous(r), 0.0);
            assert_eq!(k.viscous_laplacian(r), 0.0);
            assert_eq!(k.spline(r), 0.0);
            assert_eq!(k.spline_gradient(r), Vec3::ZERO);
        }
    }

    #[test]
    fn test_spiky_gradient_zero_offset() {
        let k = KernelFunctions::new(0.1);
        assert_eq!(k.spiky_gradient(Vec3::ZERO), Vec3::ZERO);
        assert_eq!(k.spline_gradient(Vec3::ZERO), Vec3::ZERO);
    }

    #[test]
    fn test_spiky_gradient_points_toward_origin() {
        // For r = x_i - x_j the gradient points back toward j; the pressure
        // force negates it to push i away.
        let k = KernelFunctions::new(0.1);
        let g = k.spiky_gradient(Vec3::new(0.03, 0.0, 0.0));
        assert!(g.x < 0.0);
        assert_eq!(g.y, 0.0);
        assert_eq!(g.z, 0.0);
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let k = KernelFunctions::new(0.1);
        let eps = 1e-4_f32;
        for x in [0.01_f32, 0.03, 0.06, 0.08] {
            let r = Vec3::new(x, 0.0, 0.0);
            let numeric = (k.spiky(r + Vec3::X * eps) - k.spiky(r - Vec3::X * eps)) / (2.0 * eps as f64);
            let analytic = k.spiky_gradient(r).x as f64;
            assert!(
                ((numeric - analytic) / analytic).abs() < 1e-2,
                "spiky at {}: numeric {} analytic {}",
                x,
                numeric,
                analytic
            );

            let numeric = (k.spline(r + Vec3::X * eps) - k.spline(r - Vec3::X * eps)) / (2.0 * eps as f64);
            let analytic = k.spline_gradient(r).x as f64;
            assert!(
                ((numeric - analytic) / analytic).abs() < 1e-2,
                "spline at {}: numeric {} analytic {}",
                x,
                numeric,
                analytic
            );
        }
    }

    #[test]
    fn test_spline_is_continuous_at_half_radius() {
        let k = KernelFunctions::new(0.1);
        let below = k.spline(Vec3::new(0.0499999, 0.0, 0.0));
        let above = k.spline(Vec3::new(0.0500001, 0.0, 0.0));
        assert!((below - above).abs() / below < 1e-4, "{} vs {}", below, above);
    }

    #[test]
    fn test_spline_laplacian_finite_at_origin() {
        let k = KernelFunctions::new(0.1);
        let lap = k.spline_laplacian(Vec3::ZERO);
        assert!(lap.is_finite());
        assert!(lap < 0.0);
    }

    #[test]
    fn test_viscous_laplacian_positive_inside_support() {
        let k = KernelFunctions::new(0.1);
        assert!(k.viscous_laplacian(Vec3::new(0.02, 0.02, 0.0)) > 0.0);
        assert!(k.viscous(Vec3::new(0.02, 0.02, 0.0)) > 0.0);
    }

    #[test]
    fn test_set_radius_rescales() {
        let mut k = KernelFunctions::new(0.1);
        let r = Vec3::new(0.15, 0.0, 0.0);
        assert_eq!(k.poly6(r), 0.0);
        k.set_radius(0.2);
        assert!(k.poly6(r) > 0.0);
        assert_eq!(k.radius(), 0.2);
    }

    #[test]
    #[should_panic(expected = "kernel radius must be positive")]
    fn test_rejects_non_positive_radius() {
        KernelFunctions::new(0.0);
    }
}
