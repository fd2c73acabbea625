use nimbus::matcher::Matcher;
use nimbus::metadata::time::{parse_instant, TimeInterval};
use nimbus::metadata::types::{CodeStyle, CodeTriple, Level, Value};
use nimbus::Metadata;

fn record(reftime: &str, centre: u32, product: u32, l1: u32) -> Metadata {
    Metadata::new()
        .with(Value::Reftime(TimeInterval::instant(
            parse_instant(reftime).expect("reftime"),
        )))
        .with(Value::Origin(CodeTriple::new(
            CodeStyle::Grib1,
            [Some(centre), Some(0), None],
        )))
        .with(Value::Product(CodeTriple::new(
            CodeStyle::Grib1,
            [Some(product), Some(2), Some(11)],
        )))
        .with(Value::Level(Level::Coded {
            ltype: 100,
            l1: Some(l1),
            l2: None,
        }))
}

#[test]
fn level_or_product_scenario() {
    let m = Matcher::parse("level:1000 or 2000; product:GRIB1,200").unwrap();
    assert!(m.matches(&record("2020-01-15 12:00:00", 98, 200, 1000)));
    assert!(!m.matches(&record("2020-01-15 12:00:00", 98, 200, 500)));
}

#[test]
fn reftime_window_scenario() {
    let m = Matcher::parse("reftime:>=2020-01-01,<2020-02-01").unwrap();
    assert!(m.matches(&record("2020-01-31 23:59:59", 98, 200, 1000)));
    assert!(!m.matches(&record("2020-02-01 00:00:00", 98, 200, 1000)));
    assert!(!m.matches(&record("2019-12-31 23:59:59", 98, 200, 1000)));
}

#[test]
fn evaluation_is_deterministic() {
    let m = Matcher::parse("origin:GRIB1,98; level:1000").unwrap();
    let md = record("2020-06-01 00:00:00", 98, 200, 1000);
    let first = m.matches(&md);
    for _ in 0..100 {
        assert_eq!(m.matches(&md), first);
    }
    assert!(first);
}

#[test]
fn merge_equals_boolean_and() {
    let a = Matcher::parse("level:1000 or 2000").unwrap();
    let b = Matcher::parse("origin:GRIB1,98; reftime:>=2020-01-01").unwrap();
    let merged = a.merge(&b);
    let fixtures = [
        record("2020-01-15 12:00:00", 98, 200, 1000),
        record("2020-01-15 12:00:00", 98, 200, 500),
        record("2019-06-15 12:00:00", 98, 200, 2000),
        record("2020-06-15 12:00:00", 200, 200, 2000),
        record("2020-06-15 12:00:00", 98, 105, 2000),
    ];
    for md in &fixtures {
        assert_eq!(
            merged.matches(md),
            a.matches(md) && b.matches(md),
            "merge disagrees with AND on {md}"
        );
    }
}

#[test]
fn missing_attribute_kind_passes() {
    let m = Matcher::parse("task:volume; quantity:DBZH").unwrap();
    // The fixture has neither task nor quantity.
    assert!(m.matches(&record("2020-01-01 00:00:00", 98, 200, 1000)));
}

#[test]
fn empty_matcher_matches_everything() {
    let m = Matcher::parse("").unwrap();
    assert!(m.is_empty());
    assert!(m.matches(&record("2020-01-01 00:00:00", 98, 200, 1000)));
    assert!(m.matches(&Metadata::new()));
}

#[test]
fn parse_errors_identify_the_clause() {
    let err = Matcher::parse("reftime:>=2020-99-01").unwrap_err();
    assert!(err.to_string().contains("2020-99-01"), "got: {err}");
    let err = Matcher::parse("timerange:GRIB1,0,6h,1mo").unwrap_err();
    assert!(err.to_string().contains("mixed"), "got: {err}");
    let err = Matcher::parse("banana:1").unwrap_err();
    assert!(err.to_string().contains("banana"), "got: {err}");
}

#[test]
fn rendering_reparses_to_the_same_matcher() {
    let exprs = [
        "origin:GRIB1,98,0 or GRIB1,200",
        "level:1000 or 2000; product:GRIB1,200",
        "reftime:>=2020-01-01,<2020-02-01; run:MINUTE,00:00",
        "area:bbox coveredby 40 5 50 20",
        "proddef:GRIB=1,ld=3; quantity:DBZH,VRAD; task:volume",
    ];
    for expr in exprs {
        let m = Matcher::parse(expr).unwrap();
        let reparsed = Matcher::parse(&m.to_string()).unwrap();
        assert_eq!(m, reparsed, "round trip failed for `{expr}`");
    }
}
