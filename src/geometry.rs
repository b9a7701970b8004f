//! Slab geometry and macroscopic cross sections.
//!
//! These are the read-only value objects describing the physical problem: a
//! one-dimensional slab divided into a uniform mesh of spatial bins, and the
//! macroscopic cross sections of the (homogeneous) medium filling it. They
//! are supplied by the caller at construction time, validated once, and then
//! referenced by the fission source and the transport cycle. No file format
//! or loader is part of this crate; build them directly.

use crate::error::{ArnoldiError, ArnoldiErrorKind};

/// A one-dimensional slab `[x_min, x_max)` divided into `bins` equal-width
/// spatial bins.
///
/// The bin edges and centers are precomputed because both sampling (drawing a
/// position uniformly inside a bin) and result export (densities tabulated
/// against bin centers) need them repeatedly.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    bins: usize,
    x_min: f64,
    x_max: f64,
    edges: Vec<f64>,
    centers: Vec<f64>,
}

impl Geometry {
    /// Creates a uniform mesh over `[x_min, x_max)` with `bins` bins.
    ///
    /// Fails fast on a degenerate mesh: zero bins, a non-finite bound, or
    /// `x_max <= x_min`.
    pub fn new(bins: usize, x_min: f64, x_max: f64) -> Result<Self, ArnoldiError> {
        if bins == 0 {
            return Err(
                ArnoldiErrorKind::InvalidInput("geometry must have at least one bin".into()).into(),
            );
        }
        if !x_min.is_finite() || !x_max.is_finite() || x_max <= x_min {
            return Err(ArnoldiErrorKind::InvalidInput(format!(
                "geometry bounds [{x_min}, {x_max}] are not a valid interval"
            ))
            .into());
        }

        let width = (x_max - x_min) / bins as f64;
        let edges: Vec<f64> = (0..=bins).map(|i| x_min + i as f64 * width).collect();
        let centers: Vec<f64> = (0..bins).map(|i| edges[i] + 0.5 * width).collect();

        Ok(Self {
            bins,
            x_min,
            x_max,
            edges,
            centers,
        })
    }

    /// Number of spatial bins; this is also the dimension of every vector the
    /// eigensolver works with.
    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn x_min(&self) -> f64 {
        self.x_min
    }

    pub fn x_max(&self) -> f64 {
        self.x_max
    }

    /// The `bins + 1` bin edges, ascending.
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// The bin midpoints, used when exporting densities.
    pub fn centers(&self) -> &[f64] {
        &self.centers
    }

    pub fn bin_width(&self) -> f64 {
        (self.x_max - self.x_min) / self.bins as f64
    }

    /// Returns the index of the bin containing `x`, or `None` if `x` lies
    /// outside the slab. Bins are `[min, max)` except the last, which is
    /// closed so that the upper boundary itself still scores.
    pub fn bin_of(&self, x: f64) -> Option<usize> {
        if x < self.x_min || x > self.x_max {
            return None;
        }
        let raw = ((x - self.x_min) / self.bin_width()) as usize;
        Some(raw.min(self.bins - 1))
    }
}

/// Macroscopic cross sections of a homogeneous medium.
///
/// The absorption and total cross sections are derived, never stored, so the
/// components can never fall out of agreement with the totals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossSection {
    scatter: f64,
    fission: f64,
    capture: f64,
    nu: f64,
}

impl CrossSection {
    /// Creates a cross-section set. All components must be finite and
    /// non-negative, and the total cross section must be positive (a vacuum
    /// has no collision distance to sample).
    pub fn new(scatter: f64, fission: f64, capture: f64, nu: f64) -> Result<Self, ArnoldiError> {
        for (name, value) in [
            ("scatter", scatter),
            ("fission", fission),
            ("capture", capture),
            ("nu", nu),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ArnoldiErrorKind::InvalidInput(format!(
                    "cross section component `{name}` must be finite and non-negative, got {value}"
                ))
                .into());
            }
        }
        if scatter + fission + capture <= 0.0 {
            return Err(ArnoldiErrorKind::InvalidInput(
                "total cross section must be positive".into(),
            )
            .into());
        }
        Ok(Self {
            scatter,
            fission,
            capture,
            nu,
        })
    }

    pub fn scatter(&self) -> f64 {
        self.scatter
    }

    pub fn fission(&self) -> f64 {
        self.fission
    }

    pub fn capture(&self) -> f64 {
        self.capture
    }

    /// Mean number of neutrons emitted per fission.
    pub fn nu(&self) -> f64 {
        self.nu
    }

    pub fn absorption(&self) -> f64 {
        self.capture + self.fission
    }

    pub fn total(&self) -> f64 {
        self.absorption() + self.scatter
    }
}
