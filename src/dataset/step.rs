//! Time-span policy: which segment a reference time lands in.

use crate::metadata::time::Timestamp;
use crate::metadata::Format;

/// One segment per day, month or year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Daily,
    Monthly,
    Yearly,
}

impl Step {
    pub fn name(self) -> &'static str {
        match self {
            Step::Daily => "daily",
            Step::Monthly => "monthly",
            Step::Yearly => "yearly",
        }
    }

    pub fn from_name(name: &str) -> Option<Step> {
        match name {
            "daily" => Some(Step::Daily),
            "monthly" => Some(Step::Monthly),
            "yearly" => Some(Step::Yearly),
            _ => None,
        }
    }

    /// Segment path relative to the dataset root, extension included.
    pub fn relpath(self, at: Timestamp, format: Format) -> String {
        let year = at.year();
        let month = u8::from(at.month());
        let day = at.day();
        match self {
            Step::Daily => format!("{year:04}/{month:02}-{day:02}.{}", format.ext()),
            Step::Monthly => format!("{year:04}/{month:02}.{}", format.ext()),
            Step::Yearly => format!("{year:04}.{}", format.ext()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn bucket_paths() {
        let at = datetime!(2020-07-09 06:00:00);
        assert_eq!(Step::Daily.relpath(at, Format::Grib), "2020/07-09.grib");
        assert_eq!(Step::Monthly.relpath(at, Format::Bufr), "2020/07.bufr");
        assert_eq!(Step::Yearly.relpath(at, Format::Vm2), "2020.vm2");
    }
}
