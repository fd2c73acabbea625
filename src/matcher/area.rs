//! Patterns over geographic areas.
//!
//! Two forms: `id NAME` (exact grid identifier) and
//! `bbox (coveredby|intersects) LATMIN LONMIN LATMAX LONMAX`.

use std::fmt;

use crate::metadata::types::{Area, BBox};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BBoxOp {
    CoveredBy,
    Intersects,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AreaPattern {
    Id(String),
    Bbox { op: BBoxOp, bbox: BBox },
}

fn parse_f64(text: &str, whole: &str) -> Result<f64> {
    text.parse()
        .map_err(|_| Error::Parse(format!("area: `{text}` is not a coordinate in `{whole}`")))
}

impl AreaPattern {
    pub fn parse(text: &str) -> Result<AreaPattern> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        match tokens.as_slice() {
            ["id", name] => Ok(AreaPattern::Id((*name).to_string())),
            ["bbox", op, a, b, c, d] => {
                let op = match *op {
                    "coveredby" => BBoxOp::CoveredBy,
                    "intersects" => BBoxOp::Intersects,
                    other => {
                        return Err(Error::Parse(format!(
                            "area: unknown bbox predicate `{other}` in `{text}`"
                        )))
                    }
                };
                let lat_min = parse_f64(a, text)?;
                let lon_min = parse_f64(b, text)?;
                let lat_max = parse_f64(c, text)?;
                let lon_max = parse_f64(d, text)?;
                if lat_min > lat_max || lon_min > lon_max {
                    return Err(Error::Parse(format!(
                        "area: inverted bounding box in `{text}`"
                    )));
                }
                Ok(AreaPattern::Bbox {
                    op,
                    bbox: BBox { lat_min, lat_max, lon_min, lon_max },
                })
            }
            _ => Err(Error::Parse(format!(
                "area: expected `id NAME` or `bbox PRED LATMIN LONMIN LATMAX LONMAX`, got `{text}`"
            ))),
        }
    }

    pub fn matches(&self, value: &Area) -> bool {
        match self {
            AreaPattern::Id(name) => value.id.as_deref() == Some(name.as_str()),
            AreaPattern::Bbox { op, bbox } => match &value.bbox {
                None => false,
                Some(vb) => match op {
                    BBoxOp::CoveredBy => bbox.contains(vb),
                    BBoxOp::Intersects => bbox.intersects(vb),
                },
            },
        }
    }
}

impl fmt::Display for AreaPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AreaPattern::Id(name) => write!(f, "id {name}"),
            AreaPattern::Bbox { op, bbox } => {
                let op = match op {
                    BBoxOp::CoveredBy => "coveredby",
                    BBoxOp::Intersects => "intersects",
                };
                write!(
                    f,
                    "bbox {op} {} {} {} {}",
                    bbox.lat_min, bbox.lon_min, bbox.lat_max, bbox.lon_max
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(bbox: BBox) -> Area {
        Area { id: None, bbox: Some(bbox) }
    }

    #[test]
    fn coveredby_requires_containment() {
        let p = AreaPattern::parse("bbox coveredby 40 5 50 20").unwrap();
        assert!(p.matches(&area(BBox { lat_min: 43.0, lat_max: 47.0, lon_min: 7.0, lon_max: 13.0 })));
        assert!(!p.matches(&area(BBox { lat_min: 43.0, lat_max: 55.0, lon_min: 7.0, lon_max: 13.0 })));
    }

    #[test]
    fn intersects_needs_only_overlap() {
        let p = AreaPattern::parse("bbox intersects 40 5 50 20").unwrap();
        assert!(p.matches(&area(BBox { lat_min: 48.0, lat_max: 55.0, lon_min: 18.0, lon_max: 30.0 })));
        assert!(!p.matches(&area(BBox { lat_min: 51.0, lat_max: 55.0, lon_min: 18.0, lon_max: 30.0 })));
    }

    #[test]
    fn id_match_is_exact() {
        let p = AreaPattern::parse("id lmsmr4x52").unwrap();
        assert!(p.matches(&Area { id: Some("lmsmr4x52".into()), bbox: None }));
        assert!(!p.matches(&Area { id: Some("other".into()), bbox: None }));
        assert!(!p.matches(&Area { id: None, bbox: None }));
    }
}
