//! Turning data-server results into the files the host hands out.
//!
//! The data server answers with a handle whose attributes point at files in
//! its cache. Which attributes matter depends on the product: images come as
//! `skyima` + `srclres`, ISGRI spectra and light curves are listed in
//! `extracted_sources`, and JEM-X results carry one `lc_<source>` or
//! `spectrum_<source>` attribute per source.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    error::{OsaError, Result},
    instrument::{Instrument, ProductKind},
    output::QueryOutput,
};

/// What a successful data-server query hands back.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultHandle {
    #[serde(default)]
    pub ddcache_root_local: Option<String>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub warning: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl ResultHandle {
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    fn missing(name: &str) -> OsaError {
        OsaError::Unknown {
            message: format!("data server result lacks `{}`", name),
            debug_message: String::new(),
        }
    }

    /// A file-valued attribute, resolved against the local cache root.
    pub fn path_attribute(&self, name: &str) -> Result<PathBuf> {
        let text = self
            .attribute(name)
            .and_then(Value::as_str)
            .ok_or_else(|| Self::missing(name))?;

        let p = PathBuf::from(text);

        Ok(match &self.ddcache_root_local {
            Some(root) if p.is_relative() => Path::new(root).join(p),
            _ => p,
        })
    }

    /// The rows of `extracted_sources`; each is a source name followed by
    /// the names of the attributes holding its files.
    pub fn extracted_sources(&self) -> Result<Vec<Vec<String>>> {
        let rows = self
            .attribute("extracted_sources")
            .and_then(Value::as_array)
            .ok_or_else(|| Self::missing("extracted_sources"))?;

        rows.iter()
            .map(|row| {
                row.as_array()
                    .map(|cells| {
                        cells
                            .iter()
                            .filter_map(|c| c.as_str().map(str::to_owned))
                            .collect::<Vec<_>>()
                    })
                    .ok_or_else(|| Self::missing("extracted_sources"))
            })
            .collect()
    }

    /// Attributes named `<prefix><source>`, as (source name, attribute name)
    /// with underscores in the source name turned into spaces.
    pub fn per_source_attributes(&self, prefix: &str) -> Vec<(String, String)> {
        self.attributes
            .keys()
            .filter_map(|k| {
                k.strip_prefix(prefix)
                    .map(|src| (src.replace('_', " "), k.clone()))
            })
            .collect()
    }
}

/// One file to hand out: where it is, and what to call it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProductFile {
    pub source: PathBuf,
    pub file_name: String,
}

impl ProductFile {
    fn new(source: PathBuf, file_name: String) -> Self {
        ProductFile { source, file_name }
    }

    /// Keep the source's own file name, with an optional prefix.
    fn renamed(source: PathBuf, prefix: Option<&str>) -> Self {
        let base = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = prefixed(prefix, &base);
        ProductFile { source, file_name }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Product {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_name: Option<String>,
    pub file: ProductFile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arf: Option<ProductFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rmf: Option<ProductFile>,
}

impl Product {
    fn single(name: &str, src_name: Option<String>, file: ProductFile) -> Self {
        Product {
            name: name.to_owned(),
            src_name,
            file,
            arf: None,
            rmf: None,
        }
    }
}

fn prefixed(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{}_{}", p, name),
        _ => name.to_owned(),
    }
}

fn mosaic_file_name(instrument: Instrument) -> String {
    format!("{}_query_mosaic.fits", instrument.name())
}

/// The default file prefix of each product kind.
pub fn default_prefix(kind: ProductKind) -> Option<&'static str> {
    match kind {
        ProductKind::Spectrum => Some("query_spectrum"),
        _ => None,
    }
}

/// Build the product list from a data-server result.
pub fn build_product_list(
    kind: ProductKind,
    instrument: Instrument,
    res: &ResultHandle,
    prefix: Option<&str>,
) -> Result<Vec<Product>> {
    use Instrument::*;
    use ProductKind::*;

    match (kind, instrument) {
        (Image, _) => Ok(vec![
            Product::single(
                "mosaic_image",
                None,
                ProductFile::new(
                    res.path_attribute("skyima")?,
                    prefixed(prefix, &mosaic_file_name(instrument)),
                ),
            ),
            Product::single(
                "mosaic_catalog",
                None,
                ProductFile::new(
                    res.path_attribute("srclres")?,
                    prefixed(prefix, "query_catalog.fits"),
                ),
            ),
        ]),

        (Spectrum, Isgri) => {
            let mut products = Vec::new();

            for row in res.extracted_sources()? {
                let [src, spec, rmf, arf] = row.as_slice() else {
                    return Err(ResultHandle::missing("extracted_sources"));
                };

                products.push(Product {
                    name: src.clone(),
                    src_name: Some(src.clone()),
                    file: ProductFile::renamed(res.path_attribute(spec)?, prefix),
                    arf: Some(ProductFile::renamed(res.path_attribute(arf)?, prefix)),
                    rmf: Some(ProductFile::renamed(res.path_attribute(rmf)?, prefix)),
                });
            }

            Ok(products)
        }

        (Spectrum, Jemx) => res
            .per_source_attributes("spectrum_")
            .into_iter()
            .map(|(src, attr)| -> Result<Product> {
                let suffix = &attr["spectrum_".len()..];
                let companion = |role: &str| -> Result<Option<ProductFile>> {
                    let name = format!("{}_{}", role, suffix);
                    if res.attribute(&name).is_none() {
                        return Ok(None);
                    }
                    Ok(Some(ProductFile::renamed(res.path_attribute(&name)?, prefix)))
                };

                Ok(Product {
                    name: src.clone(),
                    src_name: Some(src),
                    file: ProductFile::renamed(res.path_attribute(&attr)?, prefix),
                    arf: companion("arf")?,
                    rmf: companion("rmf")?,
                })
            })
            .collect(),

        (LightCurve, Isgri) => res
            .extracted_sources()?
            .into_iter()
            .map(|row| -> Result<Product> {
                let [src, lc] = row.as_slice() else {
                    return Err(ResultHandle::missing("extracted_sources"));
                };

                Ok(Product::single(
                    "isgri_lc",
                    Some(src.clone()),
                    ProductFile::renamed(res.path_attribute(lc)?, prefix),
                ))
            })
            .collect(),

        (LightCurve, Jemx) => res
            .per_source_attributes("lc_")
            .into_iter()
            .map(|(src, attr)| -> Result<Product> {
                Ok(Product::single(
                    "jemx_lc",
                    Some(src),
                    ProductFile::renamed(res.path_attribute(&attr)?, prefix),
                ))
            })
            .collect(),

        (SpectralFit, _) => Ok(Vec::new()),
    }
}

fn cache_file(dummy_cache: &Path, name: &str) -> Result<PathBuf> {
    let p = dummy_cache.join(name);

    if !p.is_file() {
        return Err(OsaError::ConfigProblem(format!(
            "dummy product {} is missing",
            p.display()
        )));
    }

    Ok(p)
}

fn cache_glob(dummy_cache: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = dummy_cache.join(pattern);
    let full = full.to_string_lossy();

    let entries = glob::glob(&full)
        .map_err(|e| OsaError::ConfigProblem(format!("bad dummy pattern {}: {}", full, e)))?;

    let mut paths = Vec::new();

    for entry in entries {
        paths.push(entry.map_err(|e| OsaError::ConfigProblem(e.to_string()))?);
    }

    paths.sort();
    Ok(paths)
}

/// Canned products served when the host asks for a dry run.
pub fn build_dummy_products(
    kind: ProductKind,
    instrument: Instrument,
    dummy_cache: &Path,
) -> Result<Vec<Product>> {
    use Instrument::*;
    use ProductKind::*;

    match (kind, instrument) {
        (Image, _) => {
            let mosaic = mosaic_file_name(instrument);
            Ok(vec![
                Product::single(
                    "mosaic_image",
                    None,
                    ProductFile::new(cache_file(dummy_cache, &mosaic)?, mosaic),
                ),
                Product::single(
                    "mosaic_catalog",
                    None,
                    ProductFile::new(
                        cache_file(dummy_cache, "query_catalog.fits")?,
                        "query_catalog.fits".to_owned(),
                    ),
                ),
            ])
        }

        (Spectrum, _) => {
            let lead = format!("query_spectrum_{}_sum_", instrument.name());
            let mut products = Vec::new();

            for spec in cache_glob(dummy_cache, &format!("{}*.fits", lead))? {
                let file_name = spec
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let src = file_name
                    .trim_start_matches(lead.as_str())
                    .trim_end_matches(".fits")
                    .to_owned();

                let companion = |role: &str| -> Result<ProductFile> {
                    let pattern = format!("query_spectrum_{}_sum*{}*.fits.gz", role, src);
                    let found = cache_glob(dummy_cache, &pattern)?
                        .into_iter()
                        .next()
                        .ok_or_else(|| {
                            OsaError::ConfigProblem(format!(
                                "no dummy {} for source {}",
                                role, src
                            ))
                        })?;
                    Ok(ProductFile::renamed(found, None))
                };

                products.push(Product {
                    name: src.clone(),
                    src_name: Some(src.clone()),
                    arf: Some(companion("arf")?),
                    rmf: Some(companion("rmf")?),
                    file: ProductFile::new(spec, file_name),
                });
            }

            Ok(products)
        }

        (LightCurve, Isgri) => Ok(vec![Product::single(
            "isgri_lc",
            Some("dummy_src".to_owned()),
            ProductFile::renamed(cache_file(dummy_cache, "isgri_query_lc.fits")?, None),
        )]),

        (LightCurve, Jemx) => Ok(vec![Product::single(
            "jemx_lc",
            Some("crab".to_owned()),
            ProductFile::renamed(cache_file(dummy_cache, "jemx_query_lc.fits.gz")?, None),
        )]),

        (SpectralFit, _) => Ok(Vec::new()),
    }
}

fn file_names<'a>(files: impl Iterator<Item = &'a ProductFile>) -> Value {
    Value::Array(files.map(|f| json!(f.file_name)).collect())
}

/// Describe `products` the way the host presents them.
pub fn process_products(kind: ProductKind, products: &[Product]) -> QueryOutput {
    let mut out = QueryOutput::new();
    let d = &mut out.prod_dictionary;

    match kind {
        ProductKind::Image => {
            d.insert(
                "file_name".to_owned(),
                file_names(products.iter().map(|p| &p.file)),
            );
            d.insert("download_file_name".to_owned(), json!("image.tgz"));
        }

        ProductKind::Spectrum => {
            d.insert(
                "spectrum_name".to_owned(),
                Value::Array(products.iter().map(|p| json!(p.name)).collect()),
            );
            d.insert(
                "ph_file_name".to_owned(),
                file_names(products.iter().map(|p| &p.file)),
            );
            d.insert(
                "arf_file_name".to_owned(),
                file_names(products.iter().filter_map(|p| p.arf.as_ref())),
            );
            d.insert(
                "rmf_file_name".to_owned(),
                file_names(products.iter().filter_map(|p| p.rmf.as_ref())),
            );
            d.insert("download_file_name".to_owned(), json!("spectra.tar.gz"));
        }

        ProductKind::LightCurve => {
            d.insert(
                "name".to_owned(),
                Value::Array(
                    products
                        .iter()
                        .map(|p| json!(p.src_name.as_deref().unwrap_or(&p.name)))
                        .collect(),
                ),
            );
            d.insert(
                "file_name".to_owned(),
                file_names(products.iter().map(|p| &p.file)),
            );
            d.insert(
                "download_file_name".to_owned(),
                json!("light_curve.fits.gz"),
            );
        }

        ProductKind::SpectralFit => {}
    }

    d.insert("prod_process_message".to_owned(), json!(""));
    out
}
