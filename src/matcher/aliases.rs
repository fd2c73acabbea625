//! Named shorthands for match sub-expressions, scoped per attribute kind.
//!
//! Sources use the flat section format of [`crate::config`]:
//!
//! ```text
//! [level]
//! g500 = GRIB1,100,500
//! tropo = g500 or GRIB1,100,250
//! ```
//!
//! Sources are layered: a later source's entry for the same (kind, name)
//! replaces the earlier one. After every load the whole database is
//! re-expanded: aliases may reference other aliases of the same kind, chains
//! are followed up to a fixed depth with a visited set, and any cycle or
//! overflow is reported as a load error rather than at match time.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::parse_sections;
use crate::matcher::Pattern;
use crate::metadata::types::Kind;
use crate::{Error, Result};

const MAX_ALIAS_DEPTH: usize = 16;

#[derive(Debug, Clone, Default)]
pub struct AliasDatabase {
    /// Raw definitions as loaded, name lowercased.
    raw: BTreeMap<Kind, BTreeMap<String, String>>,
    /// Fully expanded alternative texts per alias, rebuilt after each load.
    expanded: BTreeMap<Kind, BTreeMap<String, Vec<String>>>,
}

impl AliasDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one definition source and re-expand. On error the database is
    /// left unchanged.
    pub fn load_str(&mut self, text: &str) -> Result<()> {
        let mut raw = self.raw.clone();
        for section in parse_sections(text)? {
            let kind = Kind::from_name(&section.name).ok_or_else(|| {
                Error::Parse(format!("alias section `{}` is not an attribute kind", section.name))
            })?;
            let entries = raw.entry(kind).or_default();
            for (name, expr) in section.entries {
                entries.insert(name.to_ascii_lowercase(), expr);
            }
        }
        let expanded = Self::expand_all(&raw)?;
        self.raw = raw;
        self.expanded = expanded;
        Ok(())
    }

    pub fn load_path(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| Error::from(err).context(&path.display().to_string()))?;
        self.load_str(&text)
            .map_err(|err| err.context(&path.display().to_string()))
    }

    /// The expanded alternatives for an alias, or None if undefined.
    pub fn resolve(&self, kind: Kind, name: &str) -> Option<&[String]> {
        self.expanded
            .get(&kind)?
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    fn expand_all(
        raw: &BTreeMap<Kind, BTreeMap<String, String>>,
    ) -> Result<BTreeMap<Kind, BTreeMap<String, Vec<String>>>> {
        let mut expanded = BTreeMap::new();
        for (kind, entries) in raw {
            let mut kind_expanded = BTreeMap::new();
            for name in entries.keys() {
                let mut chain = vec![name.clone()];
                let alts = Self::expand_one(*kind, entries, name, &mut chain)?;
                // Fail fast: every expanded alternative must parse.
                for alt in &alts {
                    Pattern::parse(*kind, alt).map_err(|err| {
                        err.context(&format!("alias `{name}` for {kind}"))
                    })?;
                }
                kind_expanded.insert(name.clone(), alts);
            }
            expanded.insert(*kind, kind_expanded);
        }
        Ok(expanded)
    }

    fn expand_one(
        kind: Kind,
        entries: &BTreeMap<String, String>,
        name: &str,
        chain: &mut Vec<String>,
    ) -> Result<Vec<String>> {
        if chain.len() > MAX_ALIAS_DEPTH {
            return Err(Error::AliasLoop(format!(
                "{kind} alias chain exceeds depth {MAX_ALIAS_DEPTH}: {}",
                chain.join(" -> ")
            )));
        }
        let expr = entries
            .get(name)
            .ok_or_else(|| Error::Parse(format!("{kind}: `{name}` is not a known alias")))?;
        let mut alts = Vec::new();
        for alt in expr.split(" or ") {
            let alt = alt.trim();
            let lowered = alt.to_ascii_lowercase();
            if entries.contains_key(&lowered) {
                if chain.iter().any(|seen| seen == &lowered) {
                    return Err(Error::AliasLoop(format!(
                        "{kind} alias cycle: {} -> {lowered}",
                        chain.join(" -> ")
                    )));
                }
                chain.push(lowered.clone());
                alts.extend(Self::expand_one(kind, entries, &lowered, chain)?);
                chain.pop();
            } else {
                alts.push(alt.to_string());
            }
        }
        Ok(alts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chains_expand_and_layer() {
        let mut db = AliasDatabase::new();
        db.load_str("[level]\ng500 = GRIB1,100,500\ntropo = g500 or GRIB1,100,250\n")
            .unwrap();
        assert_eq!(
            db.resolve(Kind::Level, "tropo").unwrap().to_vec(),
            vec!["GRIB1,100,500".to_string(), "GRIB1,100,250".to_string()]
        );
        // A later layer overrides g500 and tropo re-expands through it.
        db.load_str("[level]\ng500 = GRIB1,100,501\n").unwrap();
        assert_eq!(
            db.resolve(Kind::Level, "tropo").unwrap().to_vec(),
            vec!["GRIB1,100,501".to_string(), "GRIB1,100,250".to_string()]
        );
    }

    #[test]
    fn cycles_fail_at_load() {
        let mut db = AliasDatabase::new();
        let err = db
            .load_str("[level]\na = b\nb = a\n")
            .unwrap_err();
        assert!(matches!(err, Error::AliasLoop(_)));
        // The failed load left the database untouched.
        assert!(db.is_empty());
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let mut db = AliasDatabase::new();
        assert!(matches!(
            db.load_str("[origin]\nme = me\n").unwrap_err(),
            Error::AliasLoop(_)
        ));
    }

    #[test]
    fn unparseable_expansion_fails_at_load() {
        let mut db = AliasDatabase::new();
        assert!(db.load_str("[level]\nbad = GRIB1,not-a-number\n").is_err());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut db = AliasDatabase::new();
        db.load_str("[origin]\nEcmwf = GRIB1,98\n").unwrap();
        assert!(db.resolve(Kind::Origin, "ECMWF").is_some());
        assert!(db.resolve(Kind::Origin, "ecmwf").is_some());
    }
}
