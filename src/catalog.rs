//! User source catalogs and their injection into jobs.
//!
//! The host hands us a catalog either as a list of rows or in its own
//! column-oriented dictionary form (`cat_column_names` + `cat_column_list`).
//! Either way we turn it into the `SourceCatalog` literal that the `gencat`
//! module on the data server knows how to read.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::{OsaError, Result};

pub const CATALOG_MODULE: &str = "git://gencat";
pub const CATALOG_VERSION: &str = "v2";

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CatalogRow {
    #[serde(alias = "RA")]
    pub ra: f64,
    #[serde(alias = "DEC")]
    pub dec: f64,
    #[serde(alias = "NAME", alias = "src_names")]
    pub name: String,
    #[serde(default, alias = "FLAG")]
    pub flag: Option<i64>,
    #[serde(default, alias = "ISGRI_FLAG")]
    pub isgri_flag: Option<i64>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum CatalogRepr {
    Rows(Vec<CatalogRow>),
    Columns {
        cat_column_names: Vec<String>,
        cat_column_list: Vec<Vec<Value>>,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(try_from = "CatalogRepr")]
pub struct UserCatalog {
    pub rows: Vec<CatalogRow>,
}

impl TryFrom<CatalogRepr> for UserCatalog {
    type Error = String;

    fn try_from(repr: CatalogRepr) -> std::result::Result<Self, String> {
        match repr {
            CatalogRepr::Rows(rows) => Ok(UserCatalog { rows }),
            CatalogRepr::Columns {
                cat_column_names,
                cat_column_list,
            } => from_columns(&cat_column_names, &cat_column_list),
        }
    }
}

fn from_columns(names: &[String], columns: &[Vec<Value>]) -> std::result::Result<UserCatalog, String> {
    if names.len() != columns.len() {
        return Err(format!(
            "catalog has {} column names but {} columns",
            names.len(),
            columns.len()
        ));
    }

    let column = |wanted: &[&str]| {
        names
            .iter()
            .position(|n| wanted.contains(&n.as_str()))
            .map(|i| &columns[i])
    };

    let ra = column(&["ra", "RA"]).ok_or("catalog has no `ra` column")?;
    let dec = column(&["dec", "DEC"]).ok_or("catalog has no `dec` column")?;
    let src_names = column(&["src_names", "NAME", "name"]).ok_or("catalog has no `src_names` column")?;
    let flag = column(&["FLAG"]);
    let isgri_flag = column(&["ISGRI_FLAG"]);

    let mut rows = Vec::with_capacity(ra.len());

    for i in 0..ra.len() {
        let num = |col: &Vec<Value>, what: &str| {
            col.get(i)
                .and_then(Value::as_f64)
                .ok_or_else(|| format!("catalog row {}: bad `{}` value", i, what))
        };

        let name = match src_names.get(i) {
            Some(Value::String(s)) => s.clone(),
            Some(v) => v.to_string(),
            None => return Err(format!("catalog row {}: missing source name", i)),
        };

        rows.push(CatalogRow {
            ra: num(ra, "ra")?,
            dec: num(dec, "dec")?,
            name,
            flag: flag.and_then(|c| c.get(i)).and_then(Value::as_i64),
            isgri_flag: isgri_flag.and_then(|c| c.get(i)).and_then(Value::as_i64),
        });
    }

    Ok(UserCatalog { rows })
}

impl UserCatalog {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The literal handed to the data server in the job's `inject` list.
    pub fn to_injection(&self) -> Result<Value> {
        let mut entries = Vec::with_capacity(self.rows.len());

        for row in &self.rows {
            if !(row.ra.is_finite() && row.dec.is_finite()) {
                return Err(OsaError::invalid_parameter(
                    "user_catalog",
                    format!("source `{}` has non-finite coordinates", row.name),
                ));
            }

            let mut e = Map::new();
            e.insert("RA".to_owned(), json!(row.ra));
            e.insert("DEC".to_owned(), json!(row.dec));
            e.insert("NAME".to_owned(), json!(row.name));

            if let Some(f) = row.flag {
                e.insert("FLAG".to_owned(), json!(f));
            }

            if let Some(f) = row.isgri_flag {
                e.insert("ISGRI_FLAG".to_owned(), json!(f));
            }

            entries.push(Value::Object(e));
        }

        Ok(json!([
            "SourceCatalog",
            {
                "catalog": entries,
                "version": CATALOG_VERSION,
                "autoversion": true,
            }
        ]))
    }
}
