//! The same contract suite exercised against every segment backend.

use nimbus::segment::{Flavor, Segment, SegmentState};
use nimbus::Format;
use tempfile::tempdir;

const ALL_FLAVORS: [Flavor; 5] = [
    Flavor::Concat,
    Flavor::Dir,
    Flavor::Gzip,
    Flavor::Tar,
    Flavor::Zip,
];

const PAYLOADS: [&[u8]; 3] = [
    b"GRIB first payload......",
    b"GRIB the second one",
    b"GRIB third and last payload bytes",
];

fn fill(segment: &mut Segment) -> Vec<(u64, u64)> {
    PAYLOADS
        .iter()
        .map(|payload| segment.append(payload).expect("append"))
        .collect()
}

#[test]
fn append_then_read_range_returns_exact_bytes() {
    for flavor in ALL_FLAVORS {
        let dir = tempdir().unwrap();
        let mut segment = Segment::new(flavor, dir.path().join("2020/01.grib"), Format::Grib);
        std::fs::create_dir_all(dir.path().join("2020")).unwrap();
        let placed = fill(&mut segment);
        for (i, &(offset, length)) in placed.iter().enumerate() {
            let data = segment.read_range(offset, length).expect("read_range");
            assert_eq!(data, PAYLOADS[i], "{flavor:?}: payload {i}");
        }
        assert_eq!(segment.check(&placed), SegmentState::Ok, "{flavor:?}");
    }
}

#[test]
fn read_outside_committed_extent_is_not_found() {
    for flavor in ALL_FLAVORS {
        let dir = tempdir().unwrap();
        let mut segment = Segment::new(flavor, dir.path().join("01.grib"), Format::Grib);
        segment.append(b"only payload").unwrap();
        let err = segment.read_range(10_000, 4).unwrap_err();
        assert!(
            matches!(err, nimbus::Error::NotFound(_)),
            "{flavor:?}: got {err}"
        );
    }
}

#[test]
fn scan_lists_the_physical_directory_where_self_describing() {
    for flavor in ALL_FLAVORS {
        let dir = tempdir().unwrap();
        let mut segment = Segment::new(flavor, dir.path().join("01.grib"), Format::Grib);
        let placed = fill(&mut segment);
        let scanned = segment.scan().expect("scan");
        match flavor {
            Flavor::Concat => assert!(scanned.is_none()),
            _ => assert_eq!(scanned.unwrap(), placed, "{flavor:?}"),
        }
    }
}

#[test]
fn repack_retains_listed_payloads_in_order() {
    for flavor in ALL_FLAVORS {
        let dir = tempdir().unwrap();
        let mut segment = Segment::new(flavor, dir.path().join("01.grib"), Format::Grib);
        let placed = fill(&mut segment);
        // Keep the third then the first; drop the second.
        let retained = [placed[2], placed[0]];
        let moves = segment.repack(&retained).expect("repack");
        assert_eq!(moves.len(), 2, "{flavor:?}");
        let new_ranges: Vec<(u64, u64)> =
            moves.iter().map(|m| (m.new_offset, m.length)).collect();
        assert_eq!(
            segment.read_range(new_ranges[0].0, new_ranges[0].1).unwrap(),
            PAYLOADS[2],
            "{flavor:?}"
        );
        assert_eq!(
            segment.read_range(new_ranges[1].0, new_ranges[1].1).unwrap(),
            PAYLOADS[0],
            "{flavor:?}"
        );
        assert_eq!(segment.check(&new_ranges), SegmentState::Ok, "{flavor:?}");
        // The dropped payload's old range is gone.
        assert!(
            segment.read_range(placed[1].0, placed[1].1).is_err()
                || segment.read_range(placed[1].0, placed[1].1).unwrap() != PAYLOADS[1],
            "{flavor:?}: dropped payload still readable"
        );
    }
}

#[test]
fn check_reports_missing_when_expected_records_have_no_segment() {
    for flavor in ALL_FLAVORS {
        let dir = tempdir().unwrap();
        let segment = Segment::new(flavor, dir.path().join("01.grib"), Format::Grib);
        assert_eq!(segment.check(&[]), SegmentState::Ok, "{flavor:?}");
        assert_eq!(
            segment.check(&[(0, 10)]),
            SegmentState::Missing,
            "{flavor:?}"
        );
    }
}

#[test]
fn remove_destroys_the_segment() {
    for flavor in ALL_FLAVORS {
        let dir = tempdir().unwrap();
        let mut segment = Segment::new(flavor, dir.path().join("01.grib"), Format::Grib);
        segment.append(b"payload").unwrap();
        assert!(segment.exists());
        segment.remove().unwrap();
        assert!(!segment.exists());
        // Removing twice is fine.
        segment.remove().unwrap();
    }
}
