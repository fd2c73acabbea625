use nimbus::matcher::{AliasDatabase, Matcher};
use nimbus::metadata::types::{CodeStyle, CodeTriple, Level, Value};
use nimbus::{Error, Metadata};

const BASE_ALIASES: &str = "\
[level]
g500 = GRIB1,100,500
g850 = GRIB1,100,850
standard = g500 or g850

[origin]
ecmwf = GRIB1,98
";

#[test]
fn aliases_expand_during_parse() {
    let mut db = AliasDatabase::new();
    db.load_str(BASE_ALIASES).unwrap();
    let m = Matcher::parse_with_aliases("level:standard; origin:ecmwf", &db).unwrap();

    let md = Metadata::new()
        .with(Value::Level(Level::Coded { ltype: 100, l1: Some(850), l2: None }))
        .with(Value::Origin(CodeTriple::new(CodeStyle::Grib1, [Some(98), None, None])));
    assert!(m.matches(&md));

    let md = Metadata::new()
        .with(Value::Level(Level::Coded { ltype: 100, l1: Some(700), l2: None }))
        .with(Value::Origin(CodeTriple::new(CodeStyle::Grib1, [Some(98), None, None])));
    assert!(!m.matches(&md));
}

#[test]
fn expansion_is_idempotent() {
    let mut db = AliasDatabase::new();
    db.load_str(BASE_ALIASES).unwrap();
    let expanded = Matcher::parse_with_aliases("level:standard", &db).unwrap();
    // The rendering of an expanded matcher contains no alias names, so
    // re-parsing it with the same alias database changes nothing.
    let again = Matcher::parse_with_aliases(&expanded.to_string(), &db).unwrap();
    assert_eq!(expanded, again);
}

#[test]
fn unresolvable_alias_is_a_parse_error() {
    let db = AliasDatabase::new();
    let err = Matcher::parse_with_aliases("level:standard", &db).unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
    assert!(err.to_string().contains("standard"));
}

#[test]
fn cyclic_definitions_fail_at_load_time() {
    let mut db = AliasDatabase::new();
    let err = db
        .load_str("[product]\nwind = gusts\ngusts = wind\n")
        .unwrap_err();
    assert!(matches!(err, Error::AliasLoop(_)));
}

#[test]
fn deep_but_acyclic_chains_resolve() {
    let mut text = String::from("[origin]\na0 = GRIB1,98\n");
    for i in 1..10 {
        text.push_str(&format!("a{i} = a{}\n", i - 1));
    }
    let mut db = AliasDatabase::new();
    db.load_str(&text).unwrap();
    assert_eq!(
        db.resolve(nimbus::metadata::types::Kind::Origin, "a9")
            .unwrap()
            .to_vec(),
        vec!["GRIB1,98".to_string()]
    );
}

#[test]
fn chains_past_the_depth_bound_fail() {
    let mut text = String::from("[origin]\na0 = GRIB1,98\n");
    for i in 1..40 {
        text.push_str(&format!("a{i} = a{}\n", i - 1));
    }
    let mut db = AliasDatabase::new();
    assert!(matches!(db.load_str(&text).unwrap_err(), Error::AliasLoop(_)));
}

#[test]
fn later_layers_override_earlier_ones() {
    let mut db = AliasDatabase::new();
    db.load_str(BASE_ALIASES).unwrap();
    db.load_str("[origin]\necmwf = GRIB1,200\n").unwrap();
    let m = Matcher::parse_with_aliases("origin:ecmwf", &db).unwrap();
    let md = Metadata::new().with(Value::Origin(CodeTriple::new(
        CodeStyle::Grib1,
        [Some(200), None, None],
    )));
    assert!(m.matches(&md));
}
