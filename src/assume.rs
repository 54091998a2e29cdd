//! Assumption directives for the data server.
//!
//! The data server is told what to compute through a list of "assumption"
//! strings. Each one names a node of the analysis graph and overrides some of
//! its parameters, in a syntax that the server evaluates as Python. The exact
//! text matters: the strings become part of the server's cache keys, so the
//! same request must always serialize to the same bytes.
//!
//! Directives are built as [`Assumption`] values and only turned into text by
//! their `Display` impl.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::{OsaError, Result};

pub const FIXED_SCW_LIST_NODE: &str = "ddosa.IDScWList";
pub const RANGE_QUERY_NODE: &str = "rangequery.TimeDirectionScWList";

/// Format used for T1/T2 in range queries.
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Python literal rendering.
pub mod py {
    /// `repr()` of a Python float.
    pub fn float(x: f64) -> String {
        if x.is_nan() {
            return "nan".to_owned();
        }

        if x.is_infinite() {
            return if x > 0. { "inf" } else { "-inf" }.to_owned();
        }

        let a = x.abs();

        if a != 0. && !(1e-4..1e16).contains(&a) {
            // Rust gives `1e16` / `1.5e-5`; Python wants `1e+16` / `1.5e-05`.
            let s = format!("{:e}", x);
            if let Some((mantissa, exp)) = s.split_once('e') {
                let (sign, digits) = match exp.strip_prefix('-') {
                    Some(d) => ('-', d),
                    None => ('+', exp),
                };
                return format!("{}e{}{:0>2}", mantissa, sign, digits);
            }
            return s;
        }

        let s = x.to_string();

        if s.contains('.') {
            s
        } else {
            s + ".0"
        }
    }

    /// A double-quoted Python string.
    pub fn string(s: &str) -> String {
        let mut r = String::with_capacity(s.len() + 2);
        r.push('"');

        for c in s.chars() {
            match c {
                '\\' => r.push_str("\\\\"),
                '"' => r.push_str("\\\""),
                '\n' => r.push_str("\\n"),
                c => r.push(c),
            }
        }

        r.push('"');
        r
    }
}

/// Accept the time spellings the host hands us and normalize them.
pub fn parse_time(name: &str, text: &str) -> Result<NaiveDateTime> {
    let text = text.trim();

    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Ok(t.naive_utc());
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(t);
        }
    }

    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(t) = d.and_hms_opt(0, 0, 0) {
            return Ok(t);
        }
    }

    Err(OsaError::invalid_parameter(
        name,
        format!("cannot interpret `{}` as an ISO8601 time", text),
    ))
}

/// Time/direction selection of science windows.
#[derive(Clone, Debug, PartialEq)]
pub struct RangeQuery {
    pub ra: f64,
    pub dec: f64,
    pub radius: f64,
    pub t1: NaiveDateTime,
    pub t2: NaiveDateTime,
    pub max_pointings: usize,
}

impl fmt::Display for RangeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(use_coordinates=dict(RA={},DEC={},radius={}),use_timespan=dict(T1=\"{}\",T2=\"{}\"),use_max_pointings={},use_scwversion=\"any\")",
            RANGE_QUERY_NODE,
            py::float(self.ra),
            py::float(self.dec),
            py::float(self.radius),
            self.t1.format(ISO_FORMAT),
            self.t2.format(ISO_FORMAT),
            self.max_pointings,
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EnergyBinStyle {
    /// `use_ebins=[(e1,e2)],use_version="onebin_e1_e2"` (ISGRI nodes)
    Versioned,
    /// `use_bins=[(e1,e2)]` (JEM-X nodes)
    Plain,
}

/// One directive of the assume list.
#[derive(Clone, Debug, PartialEq)]
pub enum Assumption {
    /// Points a product node at the science-window list root.
    ScwInput {
        node: &'static str,
        scwlist_root: String,
    },
    FixedScwList(Vec<String>),
    RangeQuery(RangeQuery),
    EnergyBins {
        node: &'static str,
        style: EnergyBinStyle,
        e1: f64,
        e2: f64,
    },
    TimeBin {
        node: &'static str,
        seconds: f64,
    },
    /// Pins the IC tree to a non-default version.
    IcRootOverride(String),
    /// A fixed node configuration, already in wire syntax.
    Fixed(&'static str),
    /// JEM-X unit selection.
    JemxUnit(u8),
    /// Text produced elsewhere; passed through untouched.
    Serialized(String),
}

impl fmt::Display for Assumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assumption::ScwInput { node, scwlist_root } => {
                write!(f, "{}(input_scwlist={})", node, scwlist_root)
            }

            Assumption::FixedScwList(ids) => {
                let quoted: Vec<String> = ids.iter().map(|s| py::string(s)).collect();
                write!(
                    f,
                    "{}(use_scwid_list=[{}])",
                    FIXED_SCW_LIST_NODE,
                    quoted.join(", ")
                )
            }

            Assumption::RangeQuery(q) => q.fmt(f),

            Assumption::EnergyBins {
                node,
                style,
                e1,
                e2,
            } => {
                let (e1, e2) = (py::float(*e1), py::float(*e2));

                match style {
                    EnergyBinStyle::Versioned => write!(
                        f,
                        "{}(use_ebins=[({},{})],use_version=\"onebin_{}_{}\")",
                        node, e1, e2, e1, e2
                    ),
                    EnergyBinStyle::Plain => write!(f, "{}(use_bins=[({},{})])", node, e1, e2),
                }
            }

            Assumption::TimeBin { node, seconds } => {
                write!(f, "{}(use_time_bin_seconds={:.6})", node, seconds)
            }

            Assumption::IcRootOverride(version) => write!(
                f,
                "ddosa.ICRoot(use_ic_root_version={})",
                py::string(version)
            ),

            Assumption::Fixed(text) => f.write_str(text),

            Assumption::JemxUnit(num) => write!(f, "ddjemx.JEMX(use_num={})", num),

            Assumption::Serialized(text) => f.write_str(text),
        }
    }
}

/// The science-window selection that every job starts from: the name of the
/// root node plus the directive configuring it.
#[derive(Clone, Debug, PartialEq)]
pub struct ScwAssumption {
    pub root: String,
    pub assumption: Assumption,
}

impl ScwAssumption {
    /// Wrap an already-serialized pair.
    pub fn from_parts(root: impl Into<String>, assumption: impl Into<String>) -> Self {
        ScwAssumption {
            root: root.into(),
            assumption: Assumption::Serialized(assumption.into()),
        }
    }

    pub fn is_range_query(&self) -> bool {
        matches!(self.assumption, Assumption::RangeQuery(_))
    }

    pub fn to_pair(&self) -> (String, String) {
        (self.root.clone(), self.assumption.to_string())
    }
}

pub fn is_valid_scw_id(id: &str) -> bool {
    let b = id.as_bytes();
    b.len() == 16 && b[12] == b'.' && b[..12].iter().chain(&b[13..]).all(u8::is_ascii_digit)
}

/// Build the science-window selection.
///
/// An explicit, non-empty `scw_list` wins; otherwise the selection is a
/// range query over time and sky position, in which case `t1` and `t2` must
/// be given.
pub fn build_scw_assumption(
    scw_list: Option<&[String]>,
    t1: Option<&str>,
    t2: Option<&str>,
    ra: f64,
    dec: f64,
    radius: f64,
    max_pointings: usize,
) -> Result<ScwAssumption> {
    if let Some(ids) = scw_list.filter(|l| !l.is_empty()) {
        let bad: Vec<String> = ids
            .iter()
            .filter(|id| !is_valid_scw_id(id))
            .cloned()
            .collect();

        if !bad.is_empty() {
            return Err(OsaError::BadScwFormat { bad });
        }

        if ids.len() > max_pointings {
            return Err(OsaError::TooManyPointings {
                given: ids.len(),
                max: max_pointings,
            });
        }

        return Ok(ScwAssumption {
            root: FIXED_SCW_LIST_NODE.to_owned(),
            assumption: Assumption::FixedScwList(ids.to_vec()),
        });
    }

    let t1 = t1.ok_or_else(|| OsaError::invalid_parameter("T1", "required without scw_list"))?;
    let t2 = t2.ok_or_else(|| OsaError::invalid_parameter("T2", "required without scw_list"))?;
    let t1 = parse_time("T1", t1)?;
    let t2 = parse_time("T2", t2)?;

    if t2 <= t1 {
        return Err(OsaError::invalid_parameter("T2", "must be later than T1"));
    }

    Ok(ScwAssumption {
        root: RANGE_QUERY_NODE.to_owned(),
        assumption: Assumption::RangeQuery(RangeQuery {
            ra,
            dec,
            radius,
            t1,
            t2,
            max_pointings,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_floats() {
        assert_eq!(py::float(25.), "25.0");
        assert_eq!(py::float(80.5), "80.5");
        assert_eq!(py::float(-0.1), "-0.1");
        assert_eq!(py::float(0.), "0.0");
        assert_eq!(py::float(1e16), "1e+16");
        assert_eq!(py::float(1.5e-5), "1.5e-05");
        assert_eq!(py::float(83.633083), "83.633083");
    }

    #[test]
    fn scw_ids() {
        assert!(is_valid_scw_id("066500230010.001"));
        assert!(!is_valid_scw_id("066500230010.01"));
        assert!(!is_valid_scw_id("06650023001a.001"));
        assert!(!is_valid_scw_id("0665002300100001"));
        assert!(!is_valid_scw_id(" 066500230010.001"));
    }

    #[test]
    fn fixed_list() {
        let ids = vec!["066500230010.001".to_owned(), "066500250010.001".to_owned()];
        let sa = build_scw_assumption(Some(ids.as_slice()), None, None, 0., 0., 5., 50).unwrap();
        assert_eq!(
            sa.to_pair(),
            (
                "ddosa.IDScWList".to_owned(),
                r#"ddosa.IDScWList(use_scwid_list=["066500230010.001", "066500250010.001"])"#
                    .to_owned()
            )
        );
    }

    #[test]
    fn too_many_pointings_even_if_valid() {
        let ids = vec!["066500230010.001".to_owned(), "066500250010.001".to_owned()];
        let err = build_scw_assumption(Some(ids.as_slice()), None, None, 0., 0., 5., 1).unwrap_err();
        assert!(matches!(err, OsaError::TooManyPointings { given: 2, max: 1 }));
    }

    #[test]
    fn bad_format_reported() {
        let ids = vec!["066500230010.001".to_owned(), "nonsense".to_owned()];
        match build_scw_assumption(Some(ids.as_slice()), None, None, 0., 0., 5., 1).unwrap_err() {
            OsaError::BadScwFormat { bad } => assert_eq!(bad, ["nonsense"]),
            e => panic!("unexpected {e}"),
        }
    }

    #[test]
    fn range_query() {
        let sa = build_scw_assumption(
            None,
            Some("2003-03-15T23:27:40.0"),
            Some("2003-03-16 00:03:12"),
            83.63,
            22.01,
            15.,
            50,
        )
        .unwrap();

        assert!(sa.is_range_query());
        assert_eq!(sa.root, "rangequery.TimeDirectionScWList");
        assert_eq!(
            sa.assumption.to_string(),
            "rangequery.TimeDirectionScWList(use_coordinates=dict(RA=83.63,DEC=22.01,radius=15.0),\
             use_timespan=dict(T1=\"2003-03-15T23:27:40.000\",T2=\"2003-03-16T00:03:12.000\"),\
             use_max_pointings=50,use_scwversion=\"any\")"
        );
    }

    #[test]
    fn empty_list_means_range() {
        let sa = build_scw_assumption(
            Some(&[][..]),
            Some("2003-03-15"),
            Some("2003-03-16T00:00:00Z"),
            0.,
            0.,
            5.,
            10,
        )
        .unwrap();
        assert!(sa.is_range_query());
    }

    #[test]
    fn range_needs_ordered_times() {
        assert!(build_scw_assumption(None, Some("2004-01-01"), Some("2003-01-01"), 0., 0., 5., 10).is_err());
        assert!(build_scw_assumption(None, None, Some("2003-01-01"), 0., 0., 5., 10).is_err());
        assert!(build_scw_assumption(None, Some("yesterday"), Some("2003-01-01"), 0., 0., 5., 10).is_err());
    }

    #[test]
    fn directives() {
        let a = Assumption::EnergyBins {
            node: "ddosa.ImageBins",
            style: EnergyBinStyle::Versioned,
            e1: 25.,
            e2: 80.,
        };
        assert_eq!(
            a.to_string(),
            r#"ddosa.ImageBins(use_ebins=[(25.0,80.0)],use_version="onebin_25.0_80.0")"#
        );

        let a = Assumption::TimeBin {
            node: "ddosa.LCTimeBin",
            seconds: 1000.,
        };
        assert_eq!(a.to_string(), "ddosa.LCTimeBin(use_time_bin_seconds=1000.000000)");

        let a = Assumption::IcRootOverride("dev".to_owned());
        assert_eq!(a.to_string(), r#"ddosa.ICRoot(use_ic_root_version="dev")"#);
    }
}
