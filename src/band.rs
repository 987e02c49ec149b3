//! Band and granule identification for CEReS gridded AHI full-disk products
//!
//! File names look like `202301010100.ext.01.fld.geoss`. The band token that sits
//! directly in front of `.fld.geoss` decides everything downstream, so it is parsed
//! once into a [`BandId`] and validated against the fixed family table.

use crate::types::{GeoError, GeoResult};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::OnceLock;

/// Suffix of a decompressed gridded granule
pub const GEOSS_SUFFIX: &str = ".fld.geoss";

/// Suffix added by the archive to compressed granules
pub const BZ2_SUFFIX: &str = ".bz2";

/// AHI channel groups in the gridded product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandFamily {
    /// 0.5 km red band (band 3)
    Ext,
    /// 1 km visible bands
    Vis,
    /// 2 km short-wave infrared
    Sir,
    /// 2 km thermal infrared
    Tir,
}

impl BandFamily {
    pub const ALL: [BandFamily; 4] = [BandFamily::Ext, BandFamily::Vis, BandFamily::Sir, BandFamily::Tir];

    /// Lowercase token used in file names
    pub fn token(&self) -> &'static str {
        match self {
            BandFamily::Ext => "ext",
            BandFamily::Vis => "vis",
            BandFamily::Sir => "sir",
            BandFamily::Tir => "tir",
        }
    }

    /// Uppercase token used in archive directory names
    pub fn dir_token(&self) -> &'static str {
        match self {
            BandFamily::Ext => "EXT",
            BandFamily::Vis => "VIS",
            BandFamily::Sir => "SIR",
            BandFamily::Tir => "TIR",
        }
    }

    /// Exact token match, no substring search
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|family| family.token() == token)
    }

    /// Side length of the square full-disk raster in pixels
    pub fn edge_length(&self) -> usize {
        match self {
            BandFamily::Ext => 24000,
            BandFamily::Vis => 12000,
            BandFamily::Sir | BandFamily::Tir => 6000,
        }
    }

    /// Native grid spacing in degrees per pixel
    pub fn resolution(&self) -> f64 {
        match self {
            BandFamily::Ext => 0.005,
            BandFamily::Vis => 0.01,
            BandFamily::Sir | BandFamily::Tir => 0.02,
        }
    }

    /// Channel numbers distributed for this family
    pub fn channels(&self) -> RangeInclusive<u8> {
        match self {
            BandFamily::Ext => 1..=1,
            BandFamily::Vis => 1..=3,
            BandFamily::Sir => 1..=2,
            BandFamily::Tir => 1..=10,
        }
    }
}

impl std::fmt::Display for BandFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// A validated family/channel pair such as `tir.02`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BandId {
    pub family: BandFamily,
    pub number: u8,
}

impl BandId {
    pub fn new(family: BandFamily, number: u8) -> GeoResult<Self> {
        if !family.channels().contains(&number) {
            return Err(GeoError::PatternDispatch(format!(
                "{} has no channel {:02} (valid: {:02}-{:02})",
                family,
                number,
                family.channels().start(),
                family.channels().end()
            )));
        }
        Ok(Self { family, number })
    }

    /// Parse a `family.NN` token
    pub fn parse(token: &str) -> GeoResult<Self> {
        let (family, number) = token
            .split_once('.')
            .ok_or_else(|| GeoError::PatternDispatch(format!("malformed band token '{}'", token)))?;
        Self::from_parts(family, number, token)
    }

    /// Extract the band token that directly precedes `.fld.geoss`
    pub fn from_file_name(file_name: &str) -> GeoResult<Self> {
        let caps = band_pattern()
            .captures(file_name)
            .ok_or_else(|| GeoError::PatternDispatch(format!("'{}' is not a gridded granule name", file_name)))?;
        Self::from_parts(&caps[1], &caps[2], file_name)
    }

    fn from_parts(family: &str, number: &str, context: &str) -> GeoResult<Self> {
        let family = BandFamily::from_token(family).ok_or_else(|| {
            GeoError::PatternDispatch(format!("unknown band family '{}' in '{}'", family, context))
        })?;
        let number = number
            .parse::<u8>()
            .map_err(|_| GeoError::PatternDispatch(format!("bad channel number in '{}'", context)))?;
        Self::new(family, number)
    }

    /// Canonical token, e.g. `ext.01`
    pub fn token(&self) -> String {
        format!("{}.{:02}", self.family.token(), self.number)
    }
}

impl std::fmt::Display for BandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.family.token(), self.number)
    }
}

impl FromStr for BandId {
    type Err = GeoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BandId {
    type Error = GeoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BandId> for String {
    fn from(band: BandId) -> Self {
        band.token()
    }
}

fn band_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?:^|\.)([a-z]+)\.(\d{2})\.fld\.geoss$").expect("static regex"))
}

fn granule_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4})(\d{2})(\d{2})(\d{2})(\d{2})\.([a-z]+)\.(\d{2})\.fld\.geoss$").expect("static regex")
    })
}

/// One granule on the acquisition grid
///
/// The date fields are kept as-is: a candidate such as 2023-02-31 is a valid
/// identifier that simply does not exist on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GranuleId {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub band: BandId,
}

impl GranuleId {
    /// `YYYYMMDDHHMM`
    pub fn stamp(&self) -> String {
        format!(
            "{:04}{:02}{:02}{:02}{:02}",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }

    /// Decompressed local file name
    pub fn file_name(&self) -> String {
        format!("{}.{}{}", self.stamp(), self.band, GEOSS_SUFFIX)
    }

    /// Compressed file name as published by the archive
    pub fn compressed_name(&self) -> String {
        format!("{}{}", self.file_name(), BZ2_SUFFIX)
    }

    /// Path below the archive root: `YYYYMM/BAND/<file>.bz2`
    pub fn remote_path(&self) -> String {
        format!(
            "{:04}{:02}/{}/{}",
            self.year,
            self.month,
            self.band.family.dir_token(),
            self.compressed_name()
        )
    }

    /// Full remote location under `root`
    pub fn remote_url(&self, root: &str) -> String {
        format!("{}/{}", root.trim_end_matches('/'), self.remote_path())
    }

    /// Parse a decompressed granule file name
    pub fn parse_file_name(file_name: &str) -> GeoResult<Self> {
        let caps = granule_pattern()
            .captures(file_name)
            .ok_or_else(|| GeoError::PatternDispatch(format!("'{}' is not a gridded granule name", file_name)))?;

        let field = |i: usize| -> GeoResult<u16> {
            caps[i]
                .parse::<u16>()
                .map_err(|_| GeoError::PatternDispatch(format!("bad timestamp in '{}'", file_name)))
        };

        Ok(Self {
            year: field(1)?,
            month: field(2)? as u8,
            day: field(3)? as u8,
            hour: field(4)? as u8,
            minute: field(5)? as u8,
            band: BandId::from_parts(&caps[6], &caps[7], file_name)?,
        })
    }

    /// Nominal observation time, `None` for non-calendar candidates
    pub fn acquisition_time(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)?
            .and_hms_opt(self.hour as u32, self.minute as u32, 0)
    }
}

impl std::fmt::Display for GranuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.stamp(), self.band)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext01() -> BandId {
        BandId::new(BandFamily::Ext, 1).unwrap()
    }

    #[test]
    fn test_band_token_parsing() {
        assert_eq!(BandId::parse("tir.02").unwrap(), BandId { family: BandFamily::Tir, number: 2 });
        assert_eq!(BandId::parse("vis.03").unwrap().token(), "vis.03");
        assert!(BandId::parse("vis.04").is_err());
        assert!(BandId::parse("abc.01").is_err());
        assert!(BandId::parse("ext01").is_err());
    }

    #[test]
    fn test_band_from_file_name_is_exact() {
        let band = BandId::from_file_name("202301010100.tir.01.fld.geoss").unwrap();
        assert_eq!(band, BandId { family: BandFamily::Tir, number: 1 });

        // Only the token in front of the suffix counts
        let band = BandId::from_file_name("vis_copy.sir.02.fld.geoss").unwrap();
        assert_eq!(band.family, BandFamily::Sir);

        let err = BandId::from_file_name("202301010100.xyz.01.fld.geoss").unwrap_err();
        assert_eq!(err.kind(), crate::types::FailureKind::PatternDispatch);

        assert!(BandId::from_file_name("202301010100.tir.01.dat").is_err());
    }

    #[test]
    fn test_granule_paths() {
        let id = GranuleId { year: 2023, month: 1, day: 2, hour: 3, minute: 40, band: ext01() };
        assert_eq!(id.stamp(), "202301020340");
        assert_eq!(id.file_name(), "202301020340.ext.01.fld.geoss");
        assert_eq!(id.remote_path(), "202301/EXT/202301020340.ext.01.fld.geoss.bz2");
        assert_eq!(
            id.remote_url("ftp://host/gridded/FD/V20190123/"),
            "ftp://host/gridded/FD/V20190123/202301/EXT/202301020340.ext.01.fld.geoss.bz2"
        );
        assert_eq!(GranuleId::parse_file_name(&id.file_name()).unwrap(), id);
    }

    #[test]
    fn test_non_calendar_candidate() {
        let id = GranuleId { year: 2023, month: 2, day: 31, hour: 1, minute: 0, band: ext01() };
        assert!(id.acquisition_time().is_none());
        assert_eq!(id.file_name(), "202302310100.ext.01.fld.geoss");

        let valid = GranuleId { day: 28, ..id };
        assert_eq!(valid.acquisition_time().unwrap().to_string(), "2023-02-28 01:00:00");
    }
}
