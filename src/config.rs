//! Minimal section/key-value configuration reader.
//!
//! Both the alias database and the session dataset registry are fed from the
//! same flat format: `[section]` headers followed by `name = value` lines.
//! Blank lines and lines starting with `#` or `;` are ignored.

use crate::{Error, Result};

#[derive(Debug, Clone)]
pub(crate) struct Section {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

pub(crate) fn parse_sections(text: &str) -> Result<Vec<Section>> {
    let mut sections: Vec<Section> = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[') {
            let name = name
                .strip_suffix(']')
                .ok_or_else(|| Error::Parse(format!("line {}: unterminated section header", lineno + 1)))?
                .trim();
            if name.is_empty() {
                return Err(Error::Parse(format!("line {}: empty section name", lineno + 1)));
            }
            sections.push(Section {
                name: name.to_string(),
                entries: Vec::new(),
            });
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| Error::Parse(format!("line {}: expected `name = value`", lineno + 1)))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::Parse(format!("line {}: empty name", lineno + 1)));
        }
        let section = sections
            .last_mut()
            .ok_or_else(|| Error::Parse(format!("line {}: entry outside of any section", lineno + 1)))?;
        section
            .entries
            .push((key.to_string(), value.trim().to_string()));
    }
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_and_entries() {
        let doc = "# comment\n[level]\ng500 = GRIB1,100,500\n\n[product]\nt2m = GRIB1,200,2,11\n";
        let sections = parse_sections(doc).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].name, "level");
        assert_eq!(sections[0].entries[0], ("g500".to_string(), "GRIB1,100,500".to_string()));
    }

    #[test]
    fn entry_outside_section_is_rejected() {
        assert!(parse_sections("orphan = 1\n").is_err());
    }
}
