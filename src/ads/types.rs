use chrono::{Datelike, Duration, NaiveDate};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Advertising / commerce platform an account lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
  Meta,
  Google,
  Ecforce,
}

impl Platform {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Meta => "meta",
      Self::Google => "google",
      Self::Ecforce => "ecforce",
    }
  }
}

impl FromStr for Platform {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "meta" | "facebook" | "fb" => Ok(Self::Meta),
      "google" | "gads" => Ok(Self::Google),
      "ecforce" => Ok(Self::Ecforce),
      other => Err(Error::InvalidArgument(format!("unknown platform: {}", other))),
    }
  }
}

/// An account on a platform. Its string form is the cache scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountScope {
  pub platform: Platform,
  pub account_id: String,
}

impl AccountScope {
  /// Build a scope, normalizing platform-specific id spellings so the same
  /// account always maps to the same cache keys.
  pub fn new(platform: Platform, account_id: &str) -> Result<Self, Error> {
    let id = account_id.trim();
    if id.is_empty() {
      return Err(Error::InvalidArgument("account id must not be empty".to_string()));
    }

    let account_id = match platform {
      // Graph API ids are "act_<n>"; accept the bare number too
      Platform::Meta if id.chars().all(|c| c.is_ascii_digit()) => format!("act_{}", id),
      // Customer ids are shown as 123-456-7890 but are the same without dashes
      Platform::Google => id.replace('-', ""),
      _ => id.to_string(),
    };

    Ok(Self {
      platform,
      account_id,
    })
  }
}

impl fmt::Display for AccountScope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.platform.as_str(), self.account_id)
  }
}

impl FromStr for AccountScope {
  type Err = Error;

  /// Parses `platform:account`.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (platform, account) = s.split_once(':').ok_or_else(|| {
      Error::InvalidArgument(format!("expected platform:account, got {:?}", s))
    })?;
    Self::new(platform.parse()?, account)
  }
}

/// What is being fetched for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
  /// Daily performance rows (spend, impressions, frequency, CTR...)
  Insights,
  Campaigns,
  AdSets,
  Ads,
  Creatives,
  /// E-commerce orders
  Orders,
}

impl DataKind {
  pub const ALL: [DataKind; 6] = [
    Self::Insights,
    Self::Campaigns,
    Self::AdSets,
    Self::Ads,
    Self::Creatives,
    Self::Orders,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Insights => "insights",
      Self::Campaigns => "campaigns",
      Self::AdSets => "adsets",
      Self::Ads => "ads",
      Self::Creatives => "creatives",
      Self::Orders => "orders",
    }
  }
}

impl fmt::Display for DataKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DataKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim().to_lowercase();
    Self::ALL
      .into_iter()
      .find(|k| k.as_str() == s)
      .ok_or_else(|| Error::InvalidArgument(format!("unknown data kind: {}", s)))
  }
}

/// Named date ranges, as understood by the reporting APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePreset {
  Today,
  Yesterday,
  Last7d,
  Last14d,
  Last30d,
  ThisMonth,
  LastMonth,
}

impl DatePreset {
  pub const ALL: [DatePreset; 7] = [
    Self::Today,
    Self::Yesterday,
    Self::Last7d,
    Self::Last14d,
    Self::Last30d,
    Self::ThisMonth,
    Self::LastMonth,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Today => "today",
      Self::Yesterday => "yesterday",
      Self::Last7d => "last_7d",
      Self::Last14d => "last_14d",
      Self::Last30d => "last_30d",
      Self::ThisMonth => "this_month",
      Self::LastMonth => "last_month",
    }
  }
}

/// Date-range selector for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateRange {
  Preset(DatePreset),
  /// Inclusive on both ends
  Custom { since: NaiveDate, until: NaiveDate },
}

impl DateRange {
  pub fn custom(since: NaiveDate, until: NaiveDate) -> Result<Self, Error> {
    if since > until {
      return Err(Error::InvalidArgument(format!(
        "range starts after it ends: {}..{}",
        since, until
      )));
    }
    Ok(Self::Custom { since, until })
  }

  /// Stable string used as the range part of cache keys.
  pub fn descriptor(&self) -> String {
    match self {
      Self::Preset(p) => format!("preset:{}", p.as_str()),
      Self::Custom { since, until } => format!("custom:{}..{}", since, until),
    }
  }

  /// Concrete inclusive bounds relative to `today`.
  ///
  /// Rolling presets (`last_Nd`) end yesterday, matching how the platforms
  /// report them.
  pub fn resolve(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let yesterday = today - Duration::days(1);
    match self {
      Self::Custom { since, until } => (*since, *until),
      Self::Preset(DatePreset::Today) => (today, today),
      Self::Preset(DatePreset::Yesterday) => (yesterday, yesterday),
      Self::Preset(DatePreset::Last7d) => (today - Duration::days(7), yesterday),
      Self::Preset(DatePreset::Last14d) => (today - Duration::days(14), yesterday),
      Self::Preset(DatePreset::Last30d) => (today - Duration::days(30), yesterday),
      Self::Preset(DatePreset::ThisMonth) => (today.with_day(1).unwrap_or(today), today),
      Self::Preset(DatePreset::LastMonth) => {
        let end = today.with_day(1).unwrap_or(today) - Duration::days(1);
        (end.with_day(1).unwrap_or(end), end)
      }
    }
  }
}

impl fmt::Display for DateRange {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.descriptor())
  }
}

impl FromStr for DateRange {
  type Err = Error;

  /// Accepts `last_7d`, `preset:last_7d`, `2024-01-01..2024-01-31` and
  /// `custom:2024-01-01..2024-01-31`.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    let body = s
      .strip_prefix("preset:")
      .or_else(|| s.strip_prefix("custom:"))
      .unwrap_or(s);

    if let Some(preset) = DatePreset::ALL.into_iter().find(|p| p.as_str() == body) {
      return Ok(Self::Preset(preset));
    }

    let (since, until) = body
      .split_once("..")
      .ok_or_else(|| Error::InvalidArgument(format!("unrecognized date range: {}", s)))?;
    let parse = |d: &str| {
      NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d")
        .map_err(|e| Error::InvalidArgument(format!("invalid date {:?}: {}", d, e)))
    };
    Self::custom(parse(since)?, parse(until)?)
  }
}
