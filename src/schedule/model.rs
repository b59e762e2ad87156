use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Lower-case day names accepted in `BlockRule::days`
pub const DAY_NAMES: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// Decoded blocking schedule
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
pub struct Schedule {
    /// Offset of device-local time from UTC, in minutes
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Recurring blocking windows
    #[serde(default)]
    pub rules: Vec<BlockRule>,

    /// One-off blocking periods
    #[serde(default)]
    pub absolute: Vec<AbsoluteBlock>,
}

/// Recurring window during which the listed devices are blocked
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BlockRule {
    /// Devices this rule blocks
    pub macs: Vec<MacAddress>,

    /// Days the window starts on (lowercase: monday, tuesday, etc.).
    /// Empty means every day.
    #[serde(default)]
    pub days: Vec<String>,

    /// Local time the block starts
    pub start: TimeOfDay,

    /// Local time the block ends (exclusive). Earlier than `start` means the
    /// window runs past midnight into the next day.
    pub end: TimeOfDay,
}

/// Block between two absolute instants
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AbsoluteBlock {
    pub macs: Vec<MacAddress>,
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl Schedule {
    /// Offset used to turn instants into device-local time
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// Compute the set of devices blocked at `at`
    pub fn blocked_at(&self, at: DateTime<Utc>) -> BlockedSet {
        let local = at.with_timezone(&self.offset());
        let weekday = local.weekday();
        let time = TimeOfDay::from_minutes((local.hour() * 60 + local.minute()) as u16);

        let mut blocked = BlockedSet::new();

        for rule in &self.rules {
            if rule.covers(weekday, time) {
                blocked.extend(rule.macs.iter().cloned());
            }
        }

        for block in &self.absolute {
            if block.covers(at) {
                blocked.extend(block.macs.iter().cloned());
            }
        }

        blocked
    }
}

impl BlockRule {
    /// Check whether this rule's window starts on `weekday`
    pub fn applies_on(&self, weekday: Weekday) -> bool {
        let name = weekday_name(weekday);
        self.days.is_empty() || self.days.iter().any(|d| d.eq_ignore_ascii_case(name))
    }

    /// Check whether local `time` on `weekday` falls inside this window
    pub fn covers(&self, weekday: Weekday, time: TimeOfDay) -> bool {
        if self.start < self.end {
            self.applies_on(weekday) && self.start <= time && time < self.end
        } else {
            // Overnight: evening part belongs to today, morning part to yesterday's window
            (self.applies_on(weekday) && time >= self.start)
                || (self.applies_on(weekday.pred()) && time < self.end)
        }
    }
}

impl AbsoluteBlock {
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at < self.until
    }
}

/// Convert Weekday to its lowercase name
pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Minutes since local midnight, written as `HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn new(hour: u16, minute: u16) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self(hour * 60 + minute))
    }

    fn from_minutes(minutes: u16) -> Self {
        Self(minutes % (24 * 60))
    }

    pub fn hour(&self) -> u16 {
        self.0 / 60
    }

    pub fn minute(&self) -> u16 {
        self.0 % 60
    }
}

impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid time of day '{}', expected HH:MM", value);

        let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;
        let digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if hour.is_empty()
            || hour.len() > 2
            || minute.len() != 2
            || !digits(hour)
            || !digits(minute)
        {
            return Err(invalid());
        }

        let hour: u16 = hour.parse().map_err(|_| invalid())?;
        let minute: u16 = minute.parse().map_err(|_| invalid())?;

        Self::new(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// Device hardware address, normalized to `AA:BB:CC:DD:EE:FF`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(String);

impl MacAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MacAddress {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let separator = if value.contains(':') { ':' } else { '-' };
        let octets: Vec<&str> = value.split(separator).collect();

        let valid = octets.len() == 6
            && octets
                .iter()
                .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
        if !valid {
            return Err(format!("invalid MAC address: {}", value));
        }

        Ok(Self(octets.join(":").to_ascii_uppercase()))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(value: MacAddress) -> Self {
        value.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Devices blocked at one instant, kept sorted so the canonical form is stable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockedSet(BTreeSet<MacAddress>);

impl BlockedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MacAddress> {
        self.0.iter()
    }

    /// Space-separated, sorted address list. Empty set gives an empty string.
    pub fn canonical(&self) -> String {
        self.0
            .iter()
            .map(MacAddress::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for BlockedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl Extend<MacAddress> for BlockedSet {
    fn extend<I: IntoIterator<Item = MacAddress>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl FromIterator<MacAddress> for BlockedSet {
    fn from_iter<I: IntoIterator<Item = MacAddress>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
