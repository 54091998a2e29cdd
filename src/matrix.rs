//! Which data-server modules to load for which product and OSA release.
//!
//! Each OSA base release belongs to a family, and each family has one module
//! set per (product, instrument). The table is checked for completeness when
//! it is built, so a missing combination shows up at startup rather than in
//! the middle of a user request.

use std::collections::BTreeMap;

use crate::{
    error::{OsaError, Result},
    instrument::{Instrument, ProductKind},
};

/// Closes every module list.
pub const DELEGATE_MODULE: &str = "git://ddosa_delegate/staging-1-3";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OsaFamily {
    Osa10,
    Osa11,
}

impl OsaFamily {
    pub const ALL: [OsaFamily; 2] = [OsaFamily::Osa10, OsaFamily::Osa11];

    pub fn from_base(base: &str) -> Option<Self> {
        match base {
            "OSA10.2" => Some(OsaFamily::Osa10),
            "OSA11.0" | "OSA11.1" | "OSA11.2" => Some(OsaFamily::Osa11),
            _ => None,
        }
    }
}

const OSA10_CORE: &[&str] = &["git://ddosa/staging-1-3"];
const OSA11_CORE: &[&str] = &[
    "git://ddosa/staging-1-3",
    "git://findic/staging-1-3-icversion",
    "git://ddosa11/staging-1-3",
];

/// The modules of one job, minus the request-dependent extras and the
/// trailing delegate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleTemplate {
    pub core: &'static [&'static str],
    pub product: &'static [&'static str],
}

impl ModuleTemplate {
    /// Core modules, product modules, `extra`, then the delegate.
    pub fn render(&self, extra: &[String]) -> Vec<String> {
        self.core
            .iter()
            .chain(self.product)
            .map(|s| s.to_string())
            .chain(extra.iter().cloned())
            .chain(std::iter::once(DELEGATE_MODULE.to_owned()))
            .collect()
    }
}

type Key = (ProductKind, Instrument, OsaFamily);

#[derive(Clone, Debug)]
pub struct ModuleMatrix {
    entries: BTreeMap<Key, ModuleTemplate>,
}

impl ModuleMatrix {
    /// Build a matrix, failing if any backend product lacks a template.
    pub fn new(entries: BTreeMap<Key, ModuleTemplate>) -> Result<Self> {
        let mut missing = Vec::new();

        for kind in ProductKind::BACKEND {
            for instrument in Instrument::ALL {
                for family in OsaFamily::ALL {
                    if !entries.contains_key(&(kind, instrument, family)) {
                        missing.push(format!("{}/{}/{:?}", kind, instrument, family));
                    }
                }
            }
        }

        if !missing.is_empty() {
            return Err(OsaError::ConfigProblem(format!(
                "module matrix incomplete, missing {}",
                missing.join(", ")
            )));
        }

        Ok(ModuleMatrix { entries })
    }

    /// The module sets currently deployed on the data server.
    pub fn standard() -> Result<Self> {
        use Instrument::*;
        use OsaFamily::*;
        use ProductKind::*;

        let isgri_spectra: &'static [&'static str] =
            &["git://useresponse/cd7855bf7", "git://process_isgri_spectra/osa10"];
        let isgri_lc: &'static [&'static str] = &["git://process_isgri_lc/staging-1-3"];
        let jemx: &'static [&'static str] = &["git://ddjemx/staging-1-3"];

        let mut entries = BTreeMap::new();

        for (family, core) in [(Osa10, OSA10_CORE), (Osa11, OSA11_CORE)] {
            let t = |product: &'static [&'static str]| ModuleTemplate { core, product };
            entries.insert((Image, Isgri, family), t(&[]));
            entries.insert((Spectrum, Isgri, family), t(isgri_spectra));
            entries.insert((LightCurve, Isgri, family), t(isgri_lc));
            entries.insert((Image, Jemx, family), t(jemx));
            entries.insert((Spectrum, Jemx, family), t(jemx));
            entries.insert((LightCurve, Jemx, family), t(jemx));
        }

        Self::new(entries)
    }

    pub fn template(
        &self,
        kind: ProductKind,
        instrument: Instrument,
        base: &str,
    ) -> Result<&ModuleTemplate> {
        OsaFamily::from_base(base)
            .and_then(|family| self.entries.get(&(kind, instrument, family)))
            .ok_or_else(|| OsaError::UnsupportedVersion {
                product: kind.to_string(),
                instrument: instrument.to_string(),
                base: base.to_owned(),
            })
    }
}
