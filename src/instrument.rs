//! The INTEGRAL instruments we serve and the kinds of products we make.

use std::fmt;

use serde::Serialize;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    Isgri,
    Jemx,
}

impl Instrument {
    pub const ALL: [Instrument; 2] = [Instrument::Isgri, Instrument::Jemx];

    pub fn name(&self) -> &'static str {
        match self {
            Instrument::Isgri => "isgri",
            Instrument::Jemx => "jemx",
        }
    }

    /// Default search radius in degrees.
    pub fn default_radius(&self) -> f64 {
        match self {
            Instrument::Isgri => 15.0,
            Instrument::Jemx => 5.0,
        }
    }

    /// Default energy band in keV.
    pub fn default_energy_band(&self) -> (f64, f64) {
        match self {
            Instrument::Isgri => (20., 40.),
            Instrument::Jemx => (3., 35.),
        }
    }

    /// Hard limits on the energy band in keV, if the instrument has any.
    pub fn energy_limits(&self) -> Option<(f64, f64)> {
        match self {
            Instrument::Isgri => Some((15., 800.)),
            Instrument::Jemx => None,
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    Image,
    Spectrum,
    LightCurve,
    SpectralFit,
}

impl ProductKind {
    /// Kinds that become a job on the data server.
    pub const BACKEND: [ProductKind; 3] = [
        ProductKind::Image,
        ProductKind::Spectrum,
        ProductKind::LightCurve,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProductKind::Image => "image",
            ProductKind::Spectrum => "spectrum",
            ProductKind::LightCurve => "lc",
            ProductKind::SpectralFit => "spectral_fit",
        }
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
