use nimbus::dataset::Step;
use nimbus::matcher::Matcher;
use nimbus::metadata::time::{parse_instant, TimeInterval};
use nimbus::metadata::types::{CodeStyle, CodeTriple, Value};
use nimbus::{DatasetConfig, Flavor, Format, Metadata, Reader, Session, Writer};
use tempfile::tempdir;

fn config(name: &str, root: &std::path::Path) -> DatasetConfig {
    let mut config = DatasetConfig::new(name, root, Format::Grib);
    config.step = Step::Monthly;
    config.flavor = Flavor::Concat;
    config
}

fn record(reftime: &str, centre: u32) -> Metadata {
    Metadata::new()
        .with(Value::Reftime(TimeInterval::instant(
            parse_instant(reftime).expect("reftime"),
        )))
        .with(Value::Origin(CodeTriple::new(
            CodeStyle::Grib1,
            [Some(centre), None, None],
        )))
}

#[test]
fn reftime_query_prunes_other_months_before_any_record_work() {
    let dir = tempdir().unwrap();
    let mut writer = Writer::open(config("pruned", dir.path())).unwrap();
    for reftime in [
        "2020-01-05 00:00:00",
        "2020-01-20 00:00:00",
        "2020-02-10 00:00:00",
        "2020-03-15 00:00:00",
    ] {
        writer.acquire(&mut record(reftime, 98), b"payload").unwrap();
    }
    writer.flush().unwrap();
    drop(writer);

    let reader = Reader::open(config("pruned", dir.path())).unwrap();
    let matcher = Matcher::parse("reftime:>=2020-01-01,<2020-02-01").unwrap();
    let mut query = reader.query(&matcher, false).unwrap();
    let results: Vec<_> = query.by_ref().collect::<nimbus::Result<Vec<_>>>().unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(query.segments_considered(), 3);
    // Only the January segment was ever opened.
    assert_eq!(query.segments_visited(), 1);
}

#[test]
fn origin_summary_prunes_segments() {
    let dir = tempdir().unwrap();
    let mut writer = Writer::open(config("pruned", dir.path())).unwrap();
    writer
        .acquire(&mut record("2020-01-05 00:00:00", 98), b"ecmwf")
        .unwrap();
    writer
        .acquire(&mut record("2020-02-05 00:00:00", 200), b"other centre")
        .unwrap();
    writer.flush().unwrap();
    drop(writer);

    let reader = Reader::open(config("pruned", dir.path())).unwrap();
    let matcher = Matcher::parse("origin:GRIB1,200").unwrap();
    let mut query = reader.query(&matcher, false).unwrap();
    let results: Vec<_> = query.by_ref().collect::<nimbus::Result<Vec<_>>>().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(query.segments_visited(), 1);
}

#[test]
fn results_stream_in_reftime_order() {
    let dir = tempdir().unwrap();
    let mut writer = Writer::open(config("ordered", dir.path())).unwrap();
    for reftime in [
        "2020-02-10 00:00:00",
        "2020-01-20 00:00:00",
        "2020-03-15 00:00:00",
        "2020-01-05 00:00:00",
    ] {
        writer.acquire(&mut record(reftime, 98), b"payload").unwrap();
    }
    writer.flush().unwrap();
    drop(writer);

    let reader = Reader::open(config("ordered", dir.path())).unwrap();
    let results: Vec<_> = reader
        .query(&Matcher::parse("").unwrap(), false)
        .unwrap()
        .collect::<nimbus::Result<Vec<_>>>()
        .unwrap();
    let reftimes: Vec<_> = results
        .iter()
        .map(|(md, _)| md.reftime().unwrap().begin)
        .collect();
    let mut sorted = reftimes.clone();
    sorted.sort();
    assert_eq!(reftimes, sorted);
}

#[test]
fn early_termination_stops_cleanly() {
    let dir = tempdir().unwrap();
    let mut writer = Writer::open(config("lazy", dir.path())).unwrap();
    for reftime in ["2020-01-05 00:00:00", "2020-02-05 00:00:00", "2020-03-05 00:00:00"] {
        writer.acquire(&mut record(reftime, 98), b"payload").unwrap();
    }
    writer.flush().unwrap();
    drop(writer);

    let reader = Reader::open(config("lazy", dir.path())).unwrap();
    let mut query = reader.query(&Matcher::parse("").unwrap(), true).unwrap();
    let first = query.next().unwrap().unwrap();
    assert_eq!(first.1.as_deref(), Some(&b"payload"[..]));
    // Stop pulling: only the first segment was touched.
    assert_eq!(query.segments_visited(), 1);
    drop(query);
}

#[test]
fn merged_session_query_interleaves_by_reftime() {
    let dir = tempdir().unwrap();
    let root_a = dir.path().join("a");
    let root_b = dir.path().join("b");

    let mut writer = Writer::open(config("a", &root_a)).unwrap();
    writer.acquire(&mut record("2020-01-05 00:00:00", 98), b"a1").unwrap();
    writer.acquire(&mut record("2020-01-15 00:00:00", 98), b"a2").unwrap();
    writer.flush().unwrap();
    drop(writer);

    let mut writer = Writer::open(config("b", &root_b)).unwrap();
    writer.acquire(&mut record("2020-01-10 00:00:00", 200), b"b1").unwrap();
    writer.acquire(&mut record("2020-01-20 00:00:00", 200), b"b2").unwrap();
    writer.flush().unwrap();
    drop(writer);

    let mut session = Session::new();
    session.add_dataset(config("a", &root_a));
    session.add_dataset(config("b", &root_b));

    let matcher = session.parse_matcher("reftime:=2020-01").unwrap();
    let payloads: Vec<Vec<u8>> = session
        .query_merged(&matcher, true)
        .unwrap()
        .map(|item| item.unwrap().1.unwrap())
        .collect();
    assert_eq!(payloads, vec![b"a1".to_vec(), b"b1".to_vec(), b"a2".to_vec(), b"b2".to_vec()]);
}

#[test]
fn session_aliases_reach_parse() {
    let mut session = Session::new();
    session
        .load_aliases("[origin]\necmwf = GRIB1,98\n")
        .unwrap();
    let matcher = session.parse_matcher("origin:ecmwf").unwrap();
    assert!(matcher.matches(&record("2020-01-01 00:00:00", 98)));
    assert!(!matcher.matches(&record("2020-01-01 00:00:00", 200)));
}

#[test]
fn session_config_file_registers_datasets() {
    let dir = tempdir().unwrap();
    let text = format!(
        "[obs]\npath = {}\nformat = grib\nstep = daily\nsegment = dir\n",
        dir.path().join("obs").display()
    );
    let mut session = Session::new();
    session.load_config(&text).unwrap();
    let config = session.dataset("obs").unwrap();
    assert_eq!(config.format, Format::Grib);
    assert_eq!(config.step, Step::Daily);
    assert_eq!(config.flavor, Flavor::Dir);
    assert!(session.dataset("missing").is_err());
}
