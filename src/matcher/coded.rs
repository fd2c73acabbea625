//! Patterns over coded identifiers (origin, product).
//!
//! Grammar: `STYLE[,a[,b[,c]]]` where an empty position is a wildcard, e.g.
//! `GRIB1,98` matches any subcentre/process from centre 98 and `GRIB1,,21`
//! matches process 21 from any centre.

use std::fmt;

use crate::metadata::types::{CodeStyle, CodeTriple, Kind};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodedPattern {
    pub style: CodeStyle,
    pub codes: [Option<u32>; 3],
}

impl CodedPattern {
    pub fn parse(kind: Kind, text: &str) -> Result<CodedPattern> {
        let mut fields = text.split(',').map(str::trim);
        let style_name = fields.next().unwrap_or("");
        let style = CodeStyle::from_name(style_name).ok_or_else(|| {
            Error::Parse(format!("{kind}: unknown style `{style_name}` in `{text}`"))
        })?;
        let mut codes = [None; 3];
        for slot in codes.iter_mut() {
            match fields.next() {
                None => break,
                Some("") => continue,
                Some(field) => {
                    *slot = Some(field.parse().map_err(|_| {
                        Error::Parse(format!("{kind}: `{field}` is not a numeric code in `{text}`"))
                    })?);
                }
            }
        }
        if fields.next().is_some() {
            return Err(Error::Parse(format!("{kind}: too many fields in `{text}`")));
        }
        Ok(CodedPattern { style, codes })
    }

    pub fn matches(&self, value: &CodeTriple) -> bool {
        if self.style != value.style {
            return false;
        }
        self.codes
            .iter()
            .zip(value.codes.iter())
            .all(|(pattern, code)| match pattern {
                None => true,
                Some(want) => *code == Some(*want),
            })
    }
}

impl fmt::Display for CodedPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.style.name())?;
        let last_set = self.codes.iter().rposition(|c| c.is_some());
        if let Some(last) = last_set {
            for code in &self.codes[..=last] {
                match code {
                    Some(v) => write!(f, ",{v}")?,
                    None => f.write_str(",")?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(style: CodeStyle, a: Option<u32>, b: Option<u32>, c: Option<u32>) -> CodeTriple {
        CodeTriple::new(style, [a, b, c])
    }

    #[test]
    fn wildcards_skip_positions() {
        let p = CodedPattern::parse(Kind::Origin, "GRIB1,,21").unwrap();
        assert!(p.matches(&triple(CodeStyle::Grib1, Some(98), Some(21), None)));
        assert!(p.matches(&triple(CodeStyle::Grib1, None, Some(21), Some(3))));
        assert!(!p.matches(&triple(CodeStyle::Grib1, Some(98), Some(22), None)));
        assert!(!p.matches(&triple(CodeStyle::Grib2, Some(98), Some(21), None)));
    }

    #[test]
    fn set_position_requires_value() {
        let p = CodedPattern::parse(Kind::Origin, "GRIB1,98").unwrap();
        assert!(!p.matches(&triple(CodeStyle::Grib1, None, None, None)));
    }

    #[test]
    fn rejects_malformed() {
        assert!(CodedPattern::parse(Kind::Origin, "NOPE,1").is_err());
        assert!(CodedPattern::parse(Kind::Origin, "GRIB1,x").is_err());
        assert!(CodedPattern::parse(Kind::Origin, "GRIB1,1,2,3,4").is_err());
    }

    #[test]
    fn renders_back() {
        let p = CodedPattern::parse(Kind::Product, "GRIB1,200,,11").unwrap();
        assert_eq!(p.to_string(), "GRIB1,200,,11");
    }
}
