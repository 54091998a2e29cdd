//! Query parameters as handed over by the host dispatcher.
//!
//! The host has already checked types, but nothing else: ranges, formats and
//! cross-parameter consistency are checked here.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    catalog::UserCatalog,
    error::{OsaError, Result},
    instrument::Instrument,
};

pub const DEFAULT_MAX_POINTINGS: usize = 500;
pub const DEFAULT_TIME_BIN_SECONDS: f64 = 1000.;
pub const MAX_TIME_BIN_SECONDS: f64 = 4000.;

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum ScwListRepr {
    List(Vec<String>),
    Text(String),
}

fn scw_list<'de, D>(de: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let repr: Option<ScwListRepr> = Option::deserialize(de)?;

    let items = match repr {
        None => return Ok(None),
        Some(ScwListRepr::List(l)) => l,
        Some(ScwListRepr::Text(t)) => t.split(',').map(str::to_owned).collect(),
    };

    let items: Vec<String> = items
        .into_iter()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect();

    Ok(if items.is_empty() { None } else { Some(items) })
}

#[derive(Clone, Debug, Deserialize)]
pub struct InstrumentParams {
    #[serde(rename = "RA")]
    pub ra: f64,
    #[serde(rename = "DEC")]
    pub dec: f64,
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(rename = "T1", default)]
    pub t1: Option<String>,
    #[serde(rename = "T2", default)]
    pub t2: Option<String>,
    #[serde(default, deserialize_with = "scw_list")]
    pub scw_list: Option<Vec<String>>,
    #[serde(default)]
    pub max_pointings: Option<usize>,
    pub osa_version: String,
    #[serde(rename = "E1_keV", default)]
    pub e1_kev: Option<f64>,
    #[serde(rename = "E2_keV", default)]
    pub e2_kev: Option<f64>,
    #[serde(default)]
    pub jemx_num: Option<Value>,
    #[serde(default)]
    pub time_bin: Option<f64>,
    #[serde(default)]
    pub time_bin_format: Option<String>,
    #[serde(default)]
    pub src_name: Option<String>,
    #[serde(default)]
    pub user_catalog: Option<UserCatalog>,

    #[serde(skip)]
    raw: Map<String, Value>,
}

impl InstrumentParams {
    pub fn from_value(value: Value) -> Result<Self> {
        let raw = match &value {
            Value::Object(m) => m.clone(),
            _ => {
                return Err(OsaError::invalid_parameter(
                    "parameters",
                    "expected a JSON object",
                ))
            }
        };

        let mut params: InstrumentParams = serde_json::from_value(value)
            .map_err(|e| OsaError::invalid_parameter("parameters", e.to_string()))?;
        params.raw = raw;
        Ok(params)
    }

    /// Host-style lookup of any parameter, including ones the core ignores
    /// (`detection_threshold`, `image_scale_min`, ...).
    pub fn get_par_by_name(&self, name: &str) -> Option<&Value> {
        self.raw.get(name).filter(|v| !v.is_null())
    }

    pub fn radius(&self, instrument: Instrument) -> Result<f64> {
        let r = self.radius.unwrap_or_else(|| instrument.default_radius());

        if !(r.is_finite() && r > 0.) {
            return Err(OsaError::invalid_parameter("radius", "must be positive"));
        }

        Ok(r)
    }

    pub fn max_pointings(&self) -> usize {
        self.max_pointings.unwrap_or(DEFAULT_MAX_POINTINGS)
    }

    /// The requested energy band in keV, checked against instrument limits.
    pub fn energy_band(&self, instrument: Instrument) -> Result<(f64, f64)> {
        let (d1, d2) = instrument.default_energy_band();
        let e1 = self.e1_kev.unwrap_or(d1);
        let e2 = self.e2_kev.unwrap_or(d2);

        for (name, e) in [("E1_keV", e1), ("E2_keV", e2)] {
            if !(e.is_finite() && e > 0.) {
                return Err(OsaError::invalid_parameter(name, "must be a positive energy"));
            }

            if let Some((lo, hi)) = instrument.energy_limits() {
                if e < lo || e > hi {
                    return Err(OsaError::invalid_parameter(
                        name,
                        format!(
                            "{} energy range is restricted to {} - {} keV",
                            instrument.name().to_uppercase(),
                            lo,
                            hi
                        ),
                    ));
                }
            }
        }

        if e1 >= e2 {
            return Err(OsaError::invalid_parameter(
                "E2_keV",
                "must be larger than E1_keV",
            ));
        }

        Ok((e1, e2))
    }

    /// Light-curve bin size in seconds.
    pub fn time_bin_seconds(&self) -> Result<f64> {
        let value = self.time_bin.unwrap_or(DEFAULT_TIME_BIN_SECONDS);

        let scale = match self.time_bin_format.as_deref() {
            None | Some("sec") | Some("s") => 1.,
            Some("jd") | Some("day") => 86400.,
            Some(other) => {
                return Err(OsaError::invalid_parameter(
                    "time_bin_format",
                    format!("unsupported format `{}`", other),
                ))
            }
        };

        let seconds = value * scale;

        if !(seconds.is_finite() && seconds > 0.) {
            return Err(OsaError::invalid_parameter("time_bin", "must be positive"));
        }

        if seconds > MAX_TIME_BIN_SECONDS {
            return Err(OsaError::invalid_parameter(
                "time_bin",
                format!("time bin max value exceeded ({} s)", MAX_TIME_BIN_SECONDS),
            ));
        }

        Ok(seconds)
    }

    /// JEM-X unit number, from `jemx1`/`jemx2` or a bare number.
    pub fn jemx_unit(&self) -> Result<u8> {
        let unit = match &self.jemx_num {
            None | Some(Value::Null) => return Ok(1),
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim_start_matches("jemx").parse().ok(),
            Some(_) => None,
        };

        match unit {
            Some(1) => Ok(1),
            Some(2) => Ok(2),
            _ => Err(OsaError::invalid_parameter(
                "jemx_num",
                "must be jemx1 or jemx2",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(extra: Value) -> InstrumentParams {
        let mut v = json!({
            "RA": 83.63,
            "DEC": 22.01,
            "osa_version": "OSA11.2",
        });

        if let (Value::Object(m), Value::Object(e)) = (&mut v, extra) {
            m.extend(e);
        }

        InstrumentParams::from_value(v).unwrap()
    }

    #[test]
    fn scw_list_spellings() {
        let p = params(json!({"scw_list": "066500230010.001, 066500250010.001"}));
        assert_eq!(p.scw_list.unwrap().len(), 2);

        let p = params(json!({"scw_list": []}));
        assert!(p.scw_list.is_none());

        let p = params(json!({"scw_list": null}));
        assert!(p.scw_list.is_none());
    }

    #[test]
    fn isgri_energy_limits() {
        let p = params(json!({"E1_keV": 10., "E2_keV": 40.}));
        assert!(p.energy_band(Instrument::Isgri).is_err());
        assert_eq!(p.energy_band(Instrument::Jemx).unwrap(), (10., 40.));

        let p = params(json!({"E1_keV": 80., "E2_keV": 25.}));
        assert!(p.energy_band(Instrument::Isgri).is_err());

        let p = params(json!({}));
        assert_eq!(p.energy_band(Instrument::Isgri).unwrap(), (20., 40.));
    }

    #[test]
    fn time_bins() {
        assert_eq!(params(json!({})).time_bin_seconds().unwrap(), 1000.);
        assert!(params(json!({"time_bin": 5000.})).time_bin_seconds().is_err());
        assert_eq!(
            params(json!({"time_bin": 0.03125, "time_bin_format": "jd"}))
                .time_bin_seconds()
                .unwrap(),
            2700.
        );
    }

    #[test]
    fn jemx_units() {
        assert_eq!(params(json!({})).jemx_unit().unwrap(), 1);
        assert_eq!(params(json!({"jemx_num": "jemx2"})).jemx_unit().unwrap(), 2);
        assert_eq!(params(json!({"jemx_num": 2})).jemx_unit().unwrap(), 2);
        assert!(params(json!({"jemx_num": "jemx3"})).jemx_unit().is_err());
    }

    #[test]
    fn raw_lookup() {
        let p = params(json!({"detection_threshold": 7.0}));
        assert_eq!(p.get_par_by_name("detection_threshold"), Some(&json!(7.0)));
        assert_eq!(p.get_par_by_name("RA"), Some(&json!(83.63)));
        assert!(p.get_par_by_name("nothing").is_none());
    }
}
