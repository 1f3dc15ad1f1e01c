use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ChannelMismatchError, Result};
use crate::models::{Channel, PlannedSegment, ThresholdProfile};

/// One of five ordered intensity bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Zone {
    Z1,
    Z2,
    Z3,
    Z4,
    Z5,
}

impl Zone {
    pub const ALL: [Zone; 5] = [Zone::Z1, Zone::Z2, Zone::Z3, Zone::Z4, Zone::Z5];

    /// Zero-based position, usable as an array index
    pub fn index(self) -> usize {
        self as usize
    }

    /// Conventional 1-based zone number
    pub fn number(self) -> u8 {
        self as u8 + 1
    }

    pub fn from_index(index: usize) -> Option<Zone> {
        Zone::ALL.get(index).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Zone::Z1 => "Active Recovery",
            Zone::Z2 => "Endurance",
            Zone::Z3 => "Tempo",
            Zone::Z4 => "Threshold",
            Zone::Z5 => "VO2 Max",
        }
    }

    /// Zone steps to the nearest zone of the set (0 when inside)
    pub fn distance_to(self, set: ZoneSet) -> u8 {
        if self < set.lowest {
            set.lowest.number() - self.number()
        } else if self > set.highest {
            self.number() - set.highest.number()
        } else {
            0
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Z{}", self.number())
    }
}

/// Contiguous range of zones a planned segment is allowed to occupy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSet {
    pub lowest: Zone,
    pub highest: Zone,
}

impl ZoneSet {
    pub fn new(a: Zone, b: Zone) -> Self {
        Self {
            lowest: a.min(b),
            highest: a.max(b),
        }
    }

    pub fn single(zone: Zone) -> Self {
        Self::new(zone, zone)
    }

    pub fn contains(&self, zone: Zone) -> bool {
        zone >= self.lowest && zone <= self.highest
    }

    pub fn iter(&self) -> impl Iterator<Item = Zone> + '_ {
        Zone::ALL.into_iter().filter(move |z| self.contains(*z))
    }
}

/// Percentage-of-threshold breakpoints for the five zones
///
/// Zone 1 is strictly below `z1_below`; zones 2-4 include their upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneTable {
    pub z1_below: Decimal,
    pub z2_max: Decimal,
    pub z3_max: Decimal,
    pub z4_max: Decimal,
}

impl ZoneTable {
    /// Power zones based on FTP:
    /// - Z1: < 55% FTP (Active Recovery)
    /// - Z2: 55-75% FTP (Endurance)
    /// - Z3: 76-90% FTP (Tempo)
    /// - Z4: 91-105% FTP (Threshold)
    /// - Z5: > 105% FTP (VO2 Max)
    pub const POWER: ZoneTable = ZoneTable {
        z1_below: dec!(55),
        z2_max: dec!(75),
        z3_max: dec!(90),
        z4_max: dec!(105),
    };

    /// Heart rate zones based on LTHR:
    /// - Z1: < 81% LTHR
    /// - Z2: 81-89% LTHR
    /// - Z3: 90-93% LTHR
    /// - Z4: 94-99% LTHR
    /// - Z5: 100%+ LTHR
    pub const HEART_RATE: ZoneTable = ZoneTable {
        z1_below: dec!(81),
        z2_max: dec!(89),
        z3_max: dec!(93),
        z4_max: dec!(99),
    };

    pub fn for_channel(channel: Channel) -> ZoneTable {
        match channel {
            Channel::Power => Self::POWER,
            Channel::HeartRate => Self::HEART_RATE,
        }
    }

    /// Classify a percentage of threshold. Total over f64: NaN lands in Z1,
    /// values too large for a decimal in Z5.
    pub fn classify_pct(&self, pct: f64) -> Zone {
        match Decimal::from_f64(pct) {
            Some(pct) => self.classify_decimal(pct),
            None if pct > 0.0 => Zone::Z5,
            None => Zone::Z1,
        }
    }

    fn classify_decimal(&self, pct: Decimal) -> Zone {
        if pct < self.z1_below {
            Zone::Z1
        } else if pct <= self.z2_max {
            Zone::Z2
        } else if pct <= self.z3_max {
            Zone::Z3
        } else if pct <= self.z4_max {
            Zone::Z4
        } else {
            Zone::Z5
        }
    }
}

/// Maps raw channel values to zones against an athlete threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneClassifier {
    pub channel: Channel,
    pub threshold: f64,
    pub table: ZoneTable,
}

impl ZoneClassifier {
    pub fn power(ftp_watts: f64) -> Self {
        Self {
            channel: Channel::Power,
            threshold: ftp_watts,
            table: ZoneTable::POWER,
        }
    }

    pub fn heart_rate(threshold_hr_bpm: f64) -> Self {
        Self {
            channel: Channel::HeartRate,
            threshold: threshold_hr_bpm,
            table: ZoneTable::HEART_RATE,
        }
    }

    /// Classifier for the requested channel; never falls back to another one
    pub fn for_channel(profile: &ThresholdProfile, channel: Channel) -> Result<Self> {
        let threshold = profile
            .threshold_for(channel)
            .ok_or(ChannelMismatchError::MissingThreshold { channel })?;

        Ok(Self {
            channel,
            threshold,
            table: ZoneTable::for_channel(channel),
        })
    }

    pub fn percent_of_threshold(&self, value: f64) -> f64 {
        value / self.threshold * 100.0
    }

    pub fn classify(&self, value: f64) -> Zone {
        self.table.classify_pct(self.percent_of_threshold(value))
    }

    pub fn classify_pct(&self, pct: f64) -> Zone {
        self.table.classify_pct(pct)
    }

    /// Zones covered by a segment's target range
    pub fn target_zones(&self, segment: &PlannedSegment) -> ZoneSet {
        ZoneSet::new(
            self.classify_pct(segment.target_min_pct),
            self.classify_pct(segment.target_max_pct),
        )
    }
}
