//! The product queries the plugin exposes to the host.
//!
//! Each query name maps to one capability object. Backend products build a
//! job, turn results into products, and can serve canned products for dry
//! runs; the spectral fit is handled by the host's own fitting service and
//! never reaches the data server.

use std::path::Path;

use once_cell::sync::Lazy;

use crate::{
    error::{OsaError, Result},
    instrument::{Instrument, ProductKind},
    jobspec::{build_job_spec, JobContext, PreparedJob},
    matrix::ModuleMatrix,
    params::InstrumentParams,
    products::{build_dummy_products, build_product_list, Product, ResultHandle},
    version::VersionIdentifier,
};

pub trait ProductQuery: Send + Sync {
    fn name(&self) -> &'static str;

    fn instrument(&self) -> Instrument;

    fn kind(&self) -> ProductKind;

    /// The data-server job, or `None` if this query needs no backend job.
    fn build_job_spec(
        &self,
        matrix: &ModuleMatrix,
        params: &InstrumentParams,
        version: &VersionIdentifier,
    ) -> Result<Option<PreparedJob>>;

    fn build_products(&self, res: &ResultHandle, prefix: Option<&str>) -> Result<Vec<Product>>;

    fn build_dummy_products(&self, dummy_cache: &Path) -> Result<Vec<Product>>;
}

/// An image, spectrum or light curve computed by the data server.
#[derive(Clone, Debug)]
pub struct OsaProduct {
    name: &'static str,
    instrument: Instrument,
    kind: ProductKind,
}

impl ProductQuery for OsaProduct {
    fn name(&self) -> &'static str {
        self.name
    }

    fn instrument(&self) -> Instrument {
        self.instrument
    }

    fn kind(&self) -> ProductKind {
        self.kind
    }

    fn build_job_spec(
        &self,
        matrix: &ModuleMatrix,
        params: &InstrumentParams,
        version: &VersionIdentifier,
    ) -> Result<Option<PreparedJob>> {
        let ctx = JobContext::from_params(params, self.instrument, self.kind)?;
        let job = build_job_spec(matrix, self.kind, &ctx, version)?;
        Ok(Some(PreparedJob {
            job,
            scw: ctx.base.scw,
        }))
    }

    fn build_products(&self, res: &ResultHandle, prefix: Option<&str>) -> Result<Vec<Product>> {
        build_product_list(self.kind, self.instrument, res, prefix)
    }

    fn build_dummy_products(&self, dummy_cache: &Path) -> Result<Vec<Product>> {
        build_dummy_products(self.kind, self.instrument, dummy_cache)
    }
}

#[derive(Clone, Debug)]
pub struct SpectralFit {
    instrument: Instrument,
}

impl ProductQuery for SpectralFit {
    fn name(&self) -> &'static str {
        "spectral_fit"
    }

    fn instrument(&self) -> Instrument {
        self.instrument
    }

    fn kind(&self) -> ProductKind {
        ProductKind::SpectralFit
    }

    fn build_job_spec(
        &self,
        _matrix: &ModuleMatrix,
        _params: &InstrumentParams,
        _version: &VersionIdentifier,
    ) -> Result<Option<PreparedJob>> {
        Ok(None)
    }

    fn build_products(&self, _res: &ResultHandle, _prefix: Option<&str>) -> Result<Vec<Product>> {
        Ok(Vec::new())
    }

    fn build_dummy_products(&self, _dummy_cache: &Path) -> Result<Vec<Product>> {
        Ok(Vec::new())
    }
}

pub struct ProductRegistry {
    queries: Vec<Box<dyn ProductQuery>>,
}

static STANDARD: Lazy<ProductRegistry> = Lazy::new(|| {
    use Instrument::*;
    use ProductKind::{Image, LightCurve, Spectrum};

    let osa = |name, instrument, kind| -> Box<dyn ProductQuery> {
        Box::new(OsaProduct {
            name,
            instrument,
            kind,
        })
    };

    ProductRegistry {
        queries: vec![
            osa("isgri_image", Isgri, Image),
            osa("isgri_spectrum", Isgri, Spectrum),
            osa("isgri_lc", Isgri, LightCurve),
            Box::new(SpectralFit { instrument: Isgri }),
            osa("jemx_image", Jemx, Image),
            osa("jemx_spectrum", Jemx, Spectrum),
            osa("jemx_lc", Jemx, LightCurve),
        ],
    }
});

impl ProductRegistry {
    /// The queries of the deployed ISGRI and JEM-X instruments.
    pub fn standard() -> &'static ProductRegistry {
        &STANDARD
    }

    pub fn get(&self, name: &str) -> Result<&dyn ProductQuery> {
        self.queries
            .iter()
            .find(|q| q.name() == name)
            .map(|q| q.as_ref())
            .ok_or_else(|| OsaError::UnknownProduct(name.to_owned()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.queries.iter().map(|q| q.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup() {
        let reg = ProductRegistry::standard();
        assert_eq!(reg.names().count(), 7);

        let q = reg.get("jemx_lc").unwrap();
        assert_eq!(q.instrument(), Instrument::Jemx);
        assert_eq!(q.kind(), ProductKind::LightCurve);

        assert!(matches!(
            reg.get("isgri_polarization"),
            Err(OsaError::UnknownProduct(_))
        ));
    }

    #[test]
    fn job_comes_with_its_selection() {
        let matrix = ModuleMatrix::standard().unwrap();
        let version = VersionIdentifier::parse_default("OSA10.2").unwrap();
        let params = InstrumentParams::from_value(serde_json::json!({
            "RA": 83.63,
            "DEC": 22.01,
            "T1": "2003-03-15T23:27:40.0",
            "T2": "2003-03-16T00:03:15.0",
            "osa_version": "OSA10.2",
        }))
        .unwrap();

        let prepared = ProductRegistry::standard()
            .get("isgri_image")
            .unwrap()
            .build_job_spec(&matrix, &params, &version)
            .unwrap()
            .unwrap();

        assert_eq!(prepared.scw.root, "rangequery.TimeDirectionScWList");
        assert_eq!(prepared.job.assume[1], prepared.scw.assumption.to_string());
    }

    #[test]
    fn spectral_fit_is_registered() {
        let q = ProductRegistry::standard().get("spectral_fit").unwrap();
        assert_eq!(q.name(), "spectral_fit");
        assert_eq!(q.instrument(), Instrument::Isgri);
        assert_eq!(q.kind(), ProductKind::SpectralFit);
    }
}
