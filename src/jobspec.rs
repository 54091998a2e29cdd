//! Job specifications: what we ask the data server to compute.
//!
//! A job is a target node, an ordered module list and an ordered assume list.
//! The ordering encodes a dependency graph on the server side, so nothing in
//! here ever sorts or deduplicates either list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    assume::{build_scw_assumption, Assumption, EnergyBinStyle, ScwAssumption},
    catalog::CATALOG_MODULE,
    error::{OsaError, Result},
    instrument::{Instrument, ProductKind},
    matrix::ModuleMatrix,
    params::InstrumentParams,
    version::VersionIdentifier,
};

pub const RANGEQUERY_MODULE: &str = "git://rangequery";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSpecification {
    pub target: String,
    pub modules: Vec<String>,
    pub assume: Vec<String>,
    #[serde(default)]
    pub inject: Vec<Value>,
}

/// A job together with the science-window selection it was built from.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedJob {
    pub job: JobSpecification,
    pub scw: ScwAssumption,
}

/// The request-independent part every product job starts from: the
/// science-window selection plus whatever the selection and the user catalog
/// drag in.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryBase {
    pub scw: ScwAssumption,
    pub extra_modules: Vec<String>,
    pub inject: Vec<Value>,
}

impl QueryBase {
    pub fn from_params(params: &InstrumentParams, instrument: Instrument) -> Result<Self> {
        let scw = build_scw_assumption(
            params.scw_list.as_deref(),
            params.t1.as_deref(),
            params.t2.as_deref(),
            params.ra,
            params.dec,
            params.radius(instrument)?,
            params.max_pointings(),
        )?;

        let mut extra_modules = Vec::new();

        if scw.is_range_query() {
            extra_modules.push(RANGEQUERY_MODULE.to_owned());
        }

        let mut inject = Vec::new();

        if let Some(cat) = params.user_catalog.as_ref().filter(|c| !c.is_empty()) {
            extra_modules.push(CATALOG_MODULE.to_owned());
            inject.push(cat.to_injection()?);
        }

        Ok(QueryBase {
            scw,
            extra_modules,
            inject,
        })
    }

    /// A base with a given selection and nothing else.
    pub fn bare(scw: ScwAssumption) -> Self {
        QueryBase {
            scw,
            extra_modules: Vec::new(),
            inject: Vec::new(),
        }
    }
}

/// Everything product-specific that the job builder needs.
#[derive(Clone, Debug, PartialEq)]
pub struct JobContext {
    pub instrument: Instrument,
    pub base: QueryBase,
    pub energy_band: (f64, f64),
    pub time_bin_seconds: Option<f64>,
    pub jemx_unit: u8,
}

impl JobContext {
    /// Collect and validate the parameters `kind` needs.
    pub fn from_params(
        params: &InstrumentParams,
        instrument: Instrument,
        kind: ProductKind,
    ) -> Result<Self> {
        let time_bin_seconds = if kind == ProductKind::LightCurve {
            Some(params.time_bin_seconds()?)
        } else {
            None
        };

        let jemx_unit = if instrument == Instrument::Jemx {
            params.jemx_unit()?
        } else {
            1
        };

        Ok(JobContext {
            instrument,
            base: QueryBase::from_params(params, instrument)?,
            energy_band: params.energy_band(instrument)?,
            time_bin_seconds,
            jemx_unit,
        })
    }
}

fn target_and_input(kind: ProductKind, instrument: Instrument) -> Option<(&'static str, &'static str)> {
    use Instrument::*;
    use ProductKind::*;

    match (kind, instrument) {
        (Image, Isgri) => Some(("mosaic_ii_skyimage", "ddosa.ImageGroups")),
        (Image, Jemx) => Some(("mosaic_jemx", "ddjemx.JMXScWImageList")),
        (Spectrum, Isgri) => Some(("ISGRISpectraSum", "process_isgri_spectra.ScWSpectraList")),
        (Spectrum, Jemx) => Some(("spe_pick", "ddjemx.JMXImageSpectraGroups")),
        (LightCurve, Isgri) => Some(("ISGRILCSum", "process_isgri_lc.ScWLCList")),
        (LightCurve, Jemx) => Some(("lc_pick", "ddjemx.JMXLCGroups")),
        (SpectralFit, _) => None,
    }
}

/// The product-specific directives that follow the science-window pair.
fn product_directives(kind: ProductKind, ctx: &JobContext) -> Result<Vec<Assumption>> {
    use Instrument::*;
    use ProductKind::*;

    let (e1, e2) = ctx.energy_band;

    let isgri_bins = |node| Assumption::EnergyBins {
        node,
        style: EnergyBinStyle::Versioned,
        e1,
        e2,
    };

    let jemx_bins = |node| Assumption::EnergyBins {
        node,
        style: EnergyBinStyle::Plain,
        e1,
        e2,
    };

    let time_bin = || {
        ctx.time_bin_seconds
            .ok_or_else(|| OsaError::invalid_parameter("time_bin", "required for light curves"))
    };

    Ok(match (kind, ctx.instrument) {
        (Image, Isgri) => vec![
            isgri_bins("ddosa.ImageBins"),
            Assumption::Fixed(r#"ddosa.ImagingConfig(use_SouFit=0,use_version="soufit0")"#),
        ],

        (Image, Jemx) => vec![
            jemx_bins("ddjemx.JEnergyBins"),
            Assumption::JemxUnit(ctx.jemx_unit),
        ],

        (Spectrum, Isgri) => vec![
            isgri_bins("ddosa.ImageBins"),
            Assumption::Fixed("process_isgri_spectra.ISGRISpectraSum(use_extract_all=True)"),
            Assumption::Fixed(
                r#"ddosa.ImagingConfig(use_SouFit=0,use_DoPart2=1,use_version="soufit0_p2")"#,
            ),
            Assumption::Fixed("ddosa.CatForSpectraFromImaging(use_minsig=3)"),
        ],

        (Spectrum, Jemx) => vec![
            jemx_bins("ddjemx.JEnergyBins"),
            Assumption::JemxUnit(ctx.jemx_unit),
        ],

        (LightCurve, Isgri) => vec![
            isgri_bins("ddosa.ImageBins"),
            isgri_bins("ddosa.LCEnergyBins"),
            Assumption::Fixed(
                r#"ddosa.ImagingConfig(use_SouFit=0,use_version="soufit0_p2",use_DoPart2=1)"#,
            ),
            Assumption::Fixed("ddosa.CatForLC(use_minsig=3)"),
            Assumption::TimeBin {
                node: "ddosa.LCTimeBin",
                seconds: time_bin()?,
            },
        ],

        (LightCurve, Jemx) => vec![
            jemx_bins("ddjemx.JEnergyBinsLC"),
            Assumption::TimeBin {
                node: "ddjemx.LCTimeBin",
                seconds: time_bin()?,
            },
            Assumption::JemxUnit(ctx.jemx_unit),
        ],

        (SpectralFit, _) => Vec::new(),
    })
}

/// Build the job for one product.
///
/// The assume list is: the product's input node pointed at the
/// science-window root, the science-window directive itself, the product
/// directives, and finally the IC-root override if a sub-version was asked
/// for.
pub fn build_job_spec(
    matrix: &ModuleMatrix,
    kind: ProductKind,
    ctx: &JobContext,
    version: &VersionIdentifier,
) -> Result<JobSpecification> {
    let template = matrix.template(kind, ctx.instrument, &version.base)?;

    let (target, input_node) =
        target_and_input(kind, ctx.instrument).ok_or_else(|| OsaError::UnsupportedVersion {
            product: kind.to_string(),
            instrument: ctx.instrument.to_string(),
            base: version.base.clone(),
        })?;

    let mut directives = vec![
        Assumption::ScwInput {
            node: input_node,
            scwlist_root: ctx.base.scw.root.clone(),
        },
        ctx.base.scw.assumption.clone(),
    ];

    directives.extend(product_directives(kind, ctx)?);

    if !version.is_default_subversion() {
        directives.push(Assumption::IcRootOverride(version.subversion.clone()));
    }

    Ok(JobSpecification {
        target: target.to_owned(),
        modules: template.render(&ctx.base.extra_modules),
        assume: directives.iter().map(ToString::to_string).collect(),
        inject: ctx.base.inject.clone(),
    })
}

/// The job that lists the science windows a range query resolves to.
pub fn scw_report_job(scw: &ScwAssumption) -> JobSpecification {
    JobSpecification {
        target: "ReportScWList".to_owned(),
        modules: vec![RANGEQUERY_MODULE.to_owned()],
        assume: vec![
            Assumption::ScwInput {
                node: "rangequery.ReportScWList",
                scwlist_root: scw.root.clone(),
            }
            .to_string(),
            scw.assumption.to_string(),
        ],
        inject: Vec::new(),
    }
}
