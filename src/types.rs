#![allow(clippy::wrong_self_convention)]

//! Value types shared by the directory records: host system, MS-DOS timestamps, the general
//! purpose bit flags and the packed version field.
use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt;
use std::time::SystemTime;
use time::{
    Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset, error::ComponentRange,
};

use crate::result::DateTimeRangeError;

pub(crate) mod ffi {
    pub(crate) const S_IFDIR: u32 = 0o0040000;
    pub(crate) const S_IFREG: u32 = 0o0100000;
}

/// Host system that produced the file attribute information.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum System {
    Dos = 0,
    Unix = 3,
    WindowsNtfs = 10,
    #[num_enum(default)]
    Unknown,
}

/// An MS-DOS timestamp as stored in the directory records.
///
/// The format covers 1980 through 2107 at two second resolution and has no time zone, so
/// [`DateTime::to_time`] interprets it as UTC. The NTFS extra field carries precise
/// timestamps when they matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateTime {
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
}

impl Default for DateTime {
    /// 1980-01-01 00:00:00, the DOS epoch.
    fn default() -> DateTime {
        DateTime {
            year: 1980,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
        }
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

impl DateTime {
    /// Latest moment the DOS format can hold.
    pub const MAX: DateTime = DateTime {
        year: 2107,
        month: 12,
        day: 31,
        hour: 23,
        minute: 59,
        second: 58,
    };

    /// Splits the packed date and time words. No validation happens here.
    pub const fn from_msdos(datepart: u16, timepart: u16) -> DateTime {
        let seconds = (timepart & 0b0000000000011111) << 1;
        let minutes = (timepart & 0b0000011111100000) >> 5;
        let hours = (timepart & 0b1111100000000000) >> 11;
        let days = datepart & 0b0000000000011111;
        let months = (datepart & 0b0000000111100000) >> 5;
        let years = (datepart & 0b1111111000000000) >> 9;

        DateTime {
            year: years + 1980,
            month: months as u8,
            day: days as u8,
            hour: hours as u8,
            minute: minutes as u8,
            second: seconds as u8,
        }
    }

    /// Checked constructor. Years run from 1980 to 2107; a second of 60 is accepted for leap
    /// seconds.
    pub fn from_date_and_time(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Result<DateTime, DateTimeRangeError> {
        if (1980..=2107).contains(&year)
            && (1..=12).contains(&month)
            && (1..=31).contains(&day)
            && hour <= 23
            && minute <= 59
            && second <= 60
        {
            Ok(DateTime {
                year,
                month,
                day,
                hour,
                minute,
                second,
            })
        } else {
            Err(DateTimeRangeError)
        }
    }

    /// Converts a calendar timestamp, clamping to the representable range.
    ///
    /// Moments before 1980 become 1980-01-01 00:00:00, moments after 2107 become
    /// [`DateTime::MAX`], and seconds are truncated to an even value.
    pub fn from_time_lossy(dt: OffsetDateTime) -> DateTime {
        match DateTime::try_from(dt) {
            Ok(converted) => DateTime {
                second: converted.second & !1,
                ..converted
            },
            Err(DateTimeRangeError) if dt.to_offset(UtcOffset::UTC).year() < 1980 => {
                DateTime::default()
            }
            Err(DateTimeRangeError) => DateTime::MAX,
        }
    }

    /// Converts a system time, as UTC, clamping like [`DateTime::from_time_lossy`].
    pub fn from_system_time_lossy(time: SystemTime) -> DateTime {
        DateTime::from_time_lossy(OffsetDateTime::from(time))
    }

    /// The current time in UTC.
    pub fn now() -> DateTime {
        DateTime::from_system_time_lossy(SystemTime::now())
    }

    /// Whether every component is inside the range the DOS format can encode.
    pub fn is_valid(&self) -> bool {
        DateTime::from_date_and_time(
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
        )
        .is_ok()
    }

    /// Packed time word: seconds / 2, minutes and hours.
    pub const fn timepart(&self) -> u16 {
        ((self.second as u16) >> 1) | ((self.minute as u16) << 5) | ((self.hour as u16) << 11)
    }

    /// Packed date word: day, month and years since 1980.
    pub const fn datepart(&self) -> u16 {
        (self.day as u16) | ((self.month as u16) << 5) | ((self.year - 1980) << 9)
    }

    /// Interpret as a UTC calendar time. Fails for out of range components read from disk.
    pub fn to_time(&self) -> Result<OffsetDateTime, ComponentRange> {
        let date =
            Date::from_calendar_date(self.year as i32, Month::try_from(self.month)?, self.day)?;
        let time = Time::from_hms(self.hour, self.minute, self.second)?;
        Ok(PrimitiveDateTime::new(date, time).assume_utc())
    }

    /// Full calendar year, e.g. 2018.
    pub const fn year(&self) -> u16 {
        self.year
    }

    /// Month from 1 to 12, though values read from an archive are not checked.
    pub const fn month(&self) -> u8 {
        self.month
    }

    pub const fn day(&self) -> u8 {
        self.day
    }

    pub const fn hour(&self) -> u8 {
        self.hour
    }

    pub const fn minute(&self) -> u8 {
        self.minute
    }

    pub const fn second(&self) -> u8 {
        self.second
    }
}

impl TryFrom<OffsetDateTime> for DateTime {
    type Error = DateTimeRangeError;

    fn try_from(dt: OffsetDateTime) -> Result<Self, Self::Error> {
        let dt = dt.to_offset(UtcOffset::UTC);
        if dt.year() >= 1980 && dt.year() <= 2107 {
            Ok(DateTime {
                year: dt.year().try_into()?,
                month: dt.month().into(),
                day: dt.day(),
                hour: dt.hour(),
                minute: dt.minute(),
                second: dt.second(),
            })
        } else {
            Err(DateTimeRangeError)
        }
    }
}

/// Version needed to extract entries written by this crate: 4.5, the first with ZIP64.
pub const DEFAULT_VERSION: u8 = 45;
/// Version needed for plain stored or deflated entries.
pub const BASE_VERSION: u8 = 20;

/// Deflate strategy recorded in general purpose bits 1 and 2.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DeflateStrategy {
    #[default]
    Normal,
    Maximum,
    Fast,
    SuperFast,
}

/// The 16-bit general purpose bit flag of a directory record.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GeneralPurposeFlags(u16);

impl fmt::Debug for GeneralPurposeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GeneralPurposeFlags({:#06x})", self.0)
    }
}

impl GeneralPurposeFlags {
    const ENCRYPTED: u16 = 1 << 0;
    const DEFLATE_MAX: u16 = 1 << 1;
    const DEFLATE_FAST: u16 = 1 << 2;
    const DEFLATE_MASK: u16 = Self::DEFLATE_MAX | Self::DEFLATE_FAST;
    const DATA_DESCRIPTOR: u16 = 1 << 3;
    const STRONG_ENCRYPTION: u16 = 1 << 6;
    const UTF8: u16 = 1 << 11;
    const DIRECTORY_MASKED: u16 = 1 << 13;

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    const fn set(self, mask: u16, on: bool) -> Self {
        if on {
            Self(self.0 | mask)
        } else {
            Self(self.0 & !mask)
        }
    }

    pub const fn is_encrypted(self) -> bool {
        self.0 & Self::ENCRYPTED != 0
    }

    pub const fn is_strong_encryption(self) -> bool {
        self.0 & Self::STRONG_ENCRYPTION != 0
    }

    pub const fn is_directory_masked(self) -> bool {
        self.0 & Self::DIRECTORY_MASKED != 0
    }

    pub const fn has_data_descriptor(self) -> bool {
        self.0 & Self::DATA_DESCRIPTOR != 0
    }

    #[must_use]
    pub const fn with_data_descriptor(self, on: bool) -> Self {
        self.set(Self::DATA_DESCRIPTOR, on)
    }

    /// Names and comments are UTF-8 rather than code page 437.
    pub const fn is_utf8(self) -> bool {
        self.0 & Self::UTF8 != 0
    }

    #[must_use]
    pub const fn with_utf8(self, on: bool) -> Self {
        self.set(Self::UTF8, on)
    }

    pub const fn deflate_strategy(self) -> DeflateStrategy {
        match self.0 & Self::DEFLATE_MASK {
            0 => DeflateStrategy::Normal,
            Self::DEFLATE_MAX => DeflateStrategy::Maximum,
            Self::DEFLATE_FAST => DeflateStrategy::Fast,
            _ => DeflateStrategy::SuperFast,
        }
    }

    /// Record `strategy`, clearing whichever strategy was set before.
    #[must_use]
    pub const fn with_deflate_strategy(self, strategy: DeflateStrategy) -> Self {
        let bits = match strategy {
            DeflateStrategy::Normal => 0,
            DeflateStrategy::Maximum => Self::DEFLATE_MAX,
            DeflateStrategy::Fast => Self::DEFLATE_FAST,
            DeflateStrategy::SuperFast => Self::DEFLATE_MASK,
        };
        Self((self.0 & !Self::DEFLATE_MASK) | bits)
    }

    pub const fn is_deflate_normal(self) -> bool {
        matches!(self.deflate_strategy(), DeflateStrategy::Normal)
    }

    pub const fn is_deflate_max(self) -> bool {
        matches!(self.deflate_strategy(), DeflateStrategy::Maximum)
    }

    pub const fn is_deflate_fast(self) -> bool {
        matches!(self.deflate_strategy(), DeflateStrategy::Fast)
    }

    pub const fn is_deflate_super_fast(self) -> bool {
        matches!(self.deflate_strategy(), DeflateStrategy::SuperFast)
    }
}

/// Packed version field: the low byte is `major * 10 + minor`, the high byte the host system.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Version(u16);

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({}.{}, {:?})", self.major(), self.minor(), self.system())
    }
}

impl Version {
    pub const fn new(major: u8, minor: u8, system: System) -> Self {
        Self(((system as u16) << 8) | (major as u16 * 10 + minor as u16))
    }

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    /// The `major * 10 + minor` byte.
    pub const fn specification(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub const fn major(self) -> u8 {
        self.specification() / 10
    }

    pub const fn minor(self) -> u8 {
        self.specification() % 10
    }

    pub fn system(self) -> System {
        System::from((self.0 >> 8) as u8)
    }

    pub const fn supports_zip64(self) -> bool {
        self.major() > 4 || (self.major() == 4 && self.minor() >= 5)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use time::format_description::well_known::Rfc3339;
    use time::macros::datetime;

    #[test]
    fn system() {
        assert_eq!(u8::from(System::Dos), 0u8);
        assert_eq!(System::Unix as u8, 3u8);
        assert_eq!(System::from(0), System::Dos);
        assert_eq!(System::from(3), System::Unix);
        assert_eq!(System::from(10), System::WindowsNtfs);
        assert_eq!(System::from(200), System::Unknown);
    }

    #[test]
    #[allow(clippy::unusual_byte_groupings)]
    fn datetime_default() {
        let dt = DateTime::default();
        assert_eq!(dt.timepart(), 0);
        assert_eq!(dt.datepart(), 0b0000000_0001_00001);
        assert_eq!(dt.datepart(), 0x0021);
    }

    #[test]
    #[allow(clippy::unusual_byte_groupings)]
    fn datetime_max() {
        let dt = DateTime::from_date_and_time(2107, 12, 31, 23, 59, 60).unwrap();
        assert_eq!(dt.timepart(), 0b10111_111011_11110);
        assert_eq!(dt.datepart(), 0b1111111_1100_11111);
    }

    #[test]
    fn datetime_bounds() {
        assert!(DateTime::from_date_and_time(2000, 1, 1, 23, 59, 60).is_ok());
        assert!(DateTime::from_date_and_time(2000, 1, 1, 24, 0, 0).is_err());
        assert!(DateTime::from_date_and_time(2000, 1, 1, 0, 60, 0).is_err());
        assert!(DateTime::from_date_and_time(2000, 1, 1, 0, 0, 61).is_err());
        assert!(DateTime::from_date_and_time(1979, 1, 1, 0, 0, 0).is_err());
        assert!(DateTime::from_date_and_time(2108, 12, 31, 0, 0, 0).is_err());
    }

    #[test]
    fn datetime_try_from_bounds() {
        assert!(DateTime::try_from(datetime!(1979-12-31 23:59:59 UTC)).is_err());
        assert!(DateTime::try_from(datetime!(1980-01-01 00:00:00 UTC)).is_ok());
        assert!(DateTime::try_from(datetime!(2107-12-31 23:59:59 UTC)).is_ok());
        assert!(DateTime::try_from(datetime!(2108-01-01 00:00:00 UTC)).is_err());
    }

    #[test]
    fn lossy_clamps_before_epoch() {
        let dt = DateTime::from_time_lossy(datetime!(1970-06-15 12:30:00 UTC));
        assert_eq!(dt, DateTime::default());
        assert_eq!(dt.datepart(), 0x0021);
        assert_eq!(dt.timepart(), 0);
    }

    #[test]
    fn lossy_clamps_after_range() {
        let dt = DateTime::from_time_lossy(datetime!(2200-01-01 00:00:00 UTC));
        assert_eq!(dt, DateTime::MAX);
    }

    #[test]
    fn lossy_truncates_to_two_seconds() {
        let source = datetime!(2021-03-04 05:06:07 UTC);
        let dt = DateTime::from_time_lossy(source);
        assert_eq!(dt.second(), 6);
        let back = DateTime::from_msdos(dt.datepart(), dt.timepart());
        assert_eq!(back, dt);
        let diff = source - back.to_time().unwrap();
        assert!(diff.whole_seconds() >= 0 && diff.whole_seconds() < 2);
    }

    #[test]
    fn lossy_converts_offsets_to_utc() {
        let dt = DateTime::from_time_lossy(datetime!(2021-03-04 23:30:00 -02:00));
        assert_eq!((dt.day(), dt.hour(), dt.minute()), (5, 1, 30));
    }

    #[test]
    fn time_conversion() {
        let dt = DateTime::from_msdos(0x4D71, 0x54CF);
        assert_eq!(dt.year(), 2018);
        assert_eq!(dt.month(), 11);
        assert_eq!(dt.day(), 17);
        assert_eq!(dt.hour(), 10);
        assert_eq!(dt.minute(), 38);
        assert_eq!(dt.second(), 30);
        assert_eq!(
            dt.to_time().unwrap().format(&Rfc3339).unwrap(),
            "2018-11-17T10:38:30Z"
        );
        assert_eq!(dt.to_string(), "2018-11-17 10:38:30");
    }

    #[test]
    fn time_out_of_bounds() {
        let dt = DateTime::from_msdos(0xFFFF, 0xFFFF);
        assert_eq!(dt.year(), 2107);
        assert_eq!(dt.month(), 15);
        assert!(!dt.is_valid());
        assert!(dt.to_time().is_err());

        let dt = DateTime::from_msdos(0x0000, 0x0000);
        assert_eq!(dt.month(), 0);
        assert!(dt.to_time().is_err());
    }

    #[test]
    fn deflate_strategy_bits_are_exclusive() {
        for bits in 0u16..4 {
            let flags = GeneralPurposeFlags::from_bits(bits << 1);
            let views = [
                flags.is_deflate_normal(),
                flags.is_deflate_max(),
                flags.is_deflate_fast(),
                flags.is_deflate_super_fast(),
            ];
            assert_eq!(views.iter().filter(|v| **v).count(), 1, "bits {bits:#b}");
            let normal_max_fast = &views[..3];
            assert!(normal_max_fast.iter().filter(|v| **v).count() <= 1);
        }
    }

    #[test]
    fn setting_strategy_clears_others() {
        let flags = GeneralPurposeFlags::from_bits(0xFFFF);
        for strategy in [
            DeflateStrategy::Normal,
            DeflateStrategy::Maximum,
            DeflateStrategy::Fast,
            DeflateStrategy::SuperFast,
        ] {
            let updated = flags.with_deflate_strategy(strategy);
            assert_eq!(updated.deflate_strategy(), strategy);
            // Unrelated bits survive.
            assert_eq!(updated.bits() | 0b110, 0xFFFF);
        }
        let fast = GeneralPurposeFlags::default().with_deflate_strategy(DeflateStrategy::Fast);
        let max = fast.with_deflate_strategy(DeflateStrategy::Maximum);
        assert!(max.is_deflate_max());
        assert!(!max.is_deflate_fast());
        assert_eq!(max.bits(), 0b010);
    }

    #[test]
    fn named_flag_bits() {
        let flags = GeneralPurposeFlags::default()
            .with_data_descriptor(true)
            .with_utf8(true);
        assert_eq!(flags.bits(), (1 << 3) | (1 << 11));
        assert!(flags.has_data_descriptor());
        assert!(flags.is_utf8());
        assert!(!flags.is_encrypted());
        assert!(!flags.with_data_descriptor(false).has_data_descriptor());
        let flags = GeneralPurposeFlags::from_bits((1 << 0) | (1 << 6) | (1 << 13));
        assert!(flags.is_encrypted());
        assert!(flags.is_strong_encryption());
        assert!(flags.is_directory_masked());
    }

    #[test]
    fn version_fields() {
        let version = Version::new(4, 5, System::Unix);
        assert_eq!(version.bits(), 0x032D);
        assert_eq!((version.major(), version.minor()), (4, 5));
        assert_eq!(version.system(), System::Unix);
        assert!(version.supports_zip64());
        assert!(!Version::new(2, 0, System::Dos).supports_zip64());
        assert!(!Version::new(4, 4, System::Dos).supports_zip64());
        assert!(Version::new(5, 0, System::Dos).supports_zip64());
        assert!(Version::from_bits(63).supports_zip64());
    }
}
