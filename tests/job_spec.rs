use cdci_osa_plugin::{
    assume::ScwAssumption,
    error::OsaError,
    instrument::{Instrument, ProductKind},
    jobspec::{build_job_spec, JobContext, JobSpecification, QueryBase},
    knowledge::StaticVersionRegistry,
    matrix::ModuleMatrix,
    version::VersionIdentifier,
    Services,
};
use serde_json::{json, Value};

fn isgri_image_ctx() -> JobContext {
    JobContext {
        instrument: Instrument::Isgri,
        base: QueryBase::bare(ScwAssumption::from_parts("sa", "sb")),
        energy_band: (25., 80.),
        time_bin_seconds: None,
        jemx_unit: 1,
    }
}

#[test]
fn isgri_image_fixture() {
    let matrix = ModuleMatrix::standard().unwrap();
    let version = VersionIdentifier::parse_default("OSA10.2").unwrap();

    let job = build_job_spec(&matrix, ProductKind::Image, &isgri_image_ctx(), &version).unwrap();

    assert_eq!(job.target, "mosaic_ii_skyimage");
    assert_eq!(
        job.modules,
        ["git://ddosa/staging-1-3", "git://ddosa_delegate/staging-1-3"]
    );
    assert_eq!(
        job.assume,
        [
            "ddosa.ImageGroups(input_scwlist=sa)",
            "sb",
            "ddosa.ImageBins(use_ebins=[(25.0,80.0)],use_version=\"onebin_25.0_80.0\")",
            "ddosa.ImagingConfig(use_SouFit=0,use_version=\"soufit0\")",
        ]
    );
    assert!(job.inject.is_empty());
}

fn osa10_job(kind: ProductKind, ctx: &JobContext) -> JobSpecification {
    let matrix = ModuleMatrix::standard().unwrap();
    let version = VersionIdentifier::parse_default("OSA10.2").unwrap();
    build_job_spec(&matrix, kind, ctx, &version).unwrap()
}

#[test]
fn isgri_spectrum_fixture() {
    let job = osa10_job(ProductKind::Spectrum, &isgri_image_ctx());

    assert_eq!(job.target, "ISGRISpectraSum");
    assert_eq!(
        job.modules,
        [
            "git://ddosa/staging-1-3",
            "git://useresponse/cd7855bf7",
            "git://process_isgri_spectra/osa10",
            "git://ddosa_delegate/staging-1-3",
        ]
    );
    assert_eq!(
        job.assume,
        [
            "process_isgri_spectra.ScWSpectraList(input_scwlist=sa)",
            "sb",
            "ddosa.ImageBins(use_ebins=[(25.0,80.0)],use_version=\"onebin_25.0_80.0\")",
            "process_isgri_spectra.ISGRISpectraSum(use_extract_all=True)",
            "ddosa.ImagingConfig(use_SouFit=0,use_DoPart2=1,use_version=\"soufit0_p2\")",
            "ddosa.CatForSpectraFromImaging(use_minsig=3)",
        ]
    );
}

#[test]
fn isgri_light_curve_fixture() {
    let ctx = JobContext {
        time_bin_seconds: Some(1000.),
        ..isgri_image_ctx()
    };
    let job = osa10_job(ProductKind::LightCurve, &ctx);

    assert_eq!(job.target, "ISGRILCSum");
    assert_eq!(
        job.modules,
        [
            "git://ddosa/staging-1-3",
            "git://process_isgri_lc/staging-1-3",
            "git://ddosa_delegate/staging-1-3",
        ]
    );
    assert_eq!(
        job.assume,
        [
            "process_isgri_lc.ScWLCList(input_scwlist=sa)",
            "sb",
            "ddosa.ImageBins(use_ebins=[(25.0,80.0)],use_version=\"onebin_25.0_80.0\")",
            "ddosa.LCEnergyBins(use_ebins=[(25.0,80.0)],use_version=\"onebin_25.0_80.0\")",
            "ddosa.ImagingConfig(use_SouFit=0,use_version=\"soufit0_p2\",use_DoPart2=1)",
            "ddosa.CatForLC(use_minsig=3)",
            "ddosa.LCTimeBin(use_time_bin_seconds=1000.000000)",
        ]
    );
}

#[test]
fn jemx_image_fixture() {
    let ctx = JobContext {
        instrument: Instrument::Jemx,
        energy_band: (3., 35.),
        jemx_unit: 2,
        ..isgri_image_ctx()
    };
    let job = osa10_job(ProductKind::Image, &ctx);

    assert_eq!(job.target, "mosaic_jemx");
    assert_eq!(
        job.modules,
        [
            "git://ddosa/staging-1-3",
            "git://ddjemx/staging-1-3",
            "git://ddosa_delegate/staging-1-3",
        ]
    );
    assert_eq!(
        job.assume,
        [
            "ddjemx.JMXScWImageList(input_scwlist=sa)",
            "sb",
            "ddjemx.JEnergyBins(use_bins=[(3.0,35.0)])",
            "ddjemx.JEMX(use_num=2)",
        ]
    );
}

#[test]
fn dev_subversion_pins_ic_root() {
    let matrix = ModuleMatrix::standard().unwrap();
    let version = VersionIdentifier::parse_default("OSA11.0-dev").unwrap();

    let job = build_job_spec(&matrix, ProductKind::Image, &isgri_image_ctx(), &version).unwrap();

    assert_eq!(
        job.modules,
        [
            "git://ddosa/staging-1-3",
            "git://findic/staging-1-3-icversion",
            "git://ddosa11/staging-1-3",
            "git://ddosa_delegate/staging-1-3",
        ]
    );
    assert_eq!(job.assume.len(), 5);
    assert_eq!(
        job.assume.last().unwrap(),
        "ddosa.ICRoot(use_ic_root_version=\"dev\")"
    );
}

#[test]
fn unsupported_base() {
    let matrix = ModuleMatrix::standard().unwrap();
    let version = VersionIdentifier::parse_default("OSA9.9").unwrap();

    assert!(matches!(
        build_job_spec(&matrix, ProductKind::Image, &isgri_image_ctx(), &version),
        Err(OsaError::UnsupportedVersion { .. })
    ));
}

fn services() -> Services {
    Services::new(Box::new(StaticVersionRegistry::new(["dev", "devsmth"]))).unwrap()
}

fn params(extra: Value) -> Value {
    let mut v = json!({
        "RA": 83.63,
        "DEC": 22.01,
        "radius": 10.,
        "T1": "2003-03-15T23:27:40.0",
        "T2": "2003-03-16T00:03:15.0",
        "osa_version": "OSA11.2",
    });

    if let (Value::Object(m), Value::Object(e)) = (&mut v, extra) {
        m.extend(e);
    }

    v
}

#[test]
fn range_query_job() {
    let job = services()
        .job_spec("isgri_image", params(json!({"max_pointings": 50})))
        .unwrap()
        .unwrap();

    assert_eq!(
        job.modules,
        [
            "git://ddosa/staging-1-3",
            "git://findic/staging-1-3-icversion",
            "git://ddosa11/staging-1-3",
            "git://rangequery",
            "git://ddosa_delegate/staging-1-3",
        ]
    );
    assert_eq!(
        job.assume[0],
        "ddosa.ImageGroups(input_scwlist=rangequery.TimeDirectionScWList)"
    );
    assert_eq!(
        job.assume[1],
        "rangequery.TimeDirectionScWList(use_coordinates=dict(RA=83.63,DEC=22.01,radius=10.0),\
         use_timespan=dict(T1=\"2003-03-15T23:27:40.000\",T2=\"2003-03-16T00:03:15.000\"),\
         use_max_pointings=50,use_scwversion=\"any\")"
    );
}

#[test]
fn explicit_scw_list_and_catalog() {
    let job = services()
        .job_spec(
            "jemx_lc",
            params(json!({
                "scw_list": ["066500230010.001", "066500250010.001"],
                "jemx_num": "jemx2",
                "E1_keV": 3.,
                "E2_keV": 20.,
                "time_bin": 500.,
                "user_catalog": {
                    "cat_column_names": ["ra", "dec", "src_names"],
                    "cat_column_list": [[83.63], [22.01], ["Crab"]],
                },
            })),
        )
        .unwrap()
        .unwrap();

    assert_eq!(job.target, "lc_pick");
    assert_eq!(
        job.modules,
        [
            "git://ddosa/staging-1-3",
            "git://findic/staging-1-3-icversion",
            "git://ddosa11/staging-1-3",
            "git://ddjemx/staging-1-3",
            "git://gencat",
            "git://ddosa_delegate/staging-1-3",
        ]
    );
    assert_eq!(
        job.assume,
        [
            "ddjemx.JMXLCGroups(input_scwlist=ddosa.IDScWList)",
            "ddosa.IDScWList(use_scwid_list=[\"066500230010.001\", \"066500250010.001\"])",
            "ddjemx.JEnergyBinsLC(use_bins=[(3.0,20.0)])",
            "ddjemx.LCTimeBin(use_time_bin_seconds=500.000000)",
            "ddjemx.JEMX(use_num=2)",
        ]
    );
    assert_eq!(job.inject.len(), 1);
    assert_eq!(job.inject[0][0], json!("SourceCatalog"));
    assert_eq!(job.inject[0][1]["catalog"][0]["NAME"], json!("Crab"));
}

#[test]
fn spectral_fit_has_no_job() {
    assert!(services()
        .job_spec("spectral_fit", params(json!({})))
        .unwrap()
        .is_none());
}

#[test]
fn validation_before_submission() {
    let svcs = services();

    assert!(matches!(
        svcs.job_spec("isgri_image", params(json!({"osa_version": "OSA11.0"}))),
        Err(OsaError::Deprecated { .. })
    ));
    assert!(matches!(
        svcs.job_spec("isgri_image", params(json!({"osa_version": "OSA11.2-nosuch"}))),
        Err(OsaError::UnknownDevVersion { .. })
    ));
    assert!(matches!(
        svcs.job_spec("isgri_image", params(json!({"osa_version": "OSA9.0"}))),
        Err(OsaError::InvalidVersion { .. })
    ));
    assert!(matches!(
        svcs.job_spec("isgri_image", params(json!({"scw_list": ["0665002300.001"]}))),
        Err(OsaError::BadScwFormat { .. })
    ));
    assert!(matches!(
        svcs.job_spec("isgri_lc", params(json!({"time_bin": 5000.}))),
        Err(OsaError::InvalidParameter { .. })
    ));
    assert!(matches!(
        svcs.job_spec("osa_polarization", params(json!({}))),
        Err(OsaError::UnknownProduct(_))
    ));

    // obsolete releases stay usable with an explicit build
    assert!(svcs
        .job_spec("isgri_image", params(json!({"osa_version": "OSA11.0-dev"})))
        .unwrap()
        .is_some());
}

#[test]
fn init_can_be_repeated() {
    let registry = || Box::new(StaticVersionRegistry::new(["dev"]));

    assert!(Services::init(registry()).is_ok());
    assert!(Services::init(registry()).is_ok());
}
