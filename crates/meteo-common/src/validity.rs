//! Temporal metadata attached to fields.
//!
//! A validity is a basis (the model run time) plus a forecast term, with an
//! optional cumulative duration for statistically processed fields.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MeteoError, MeteoResult};

/// Validity of a field: basis, term and optional cumulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValidity {
    /// Model run/reference time
    pub basis: DateTime<Utc>,
    /// Forecast term from basis
    #[serde(with = "duration_seconds")]
    pub term: Duration,
    /// Length of the period a statistically processed field covers.
    #[serde(default, with = "option_duration_seconds")]
    pub cumulativeduration: Option<Duration>,
    /// GRIB2 code table 4.10 statistical process.
    #[serde(default)]
    pub statistical_process_on_duration: Option<u8>,
    /// The resource holding this validity stores several terms.
    #[serde(default)]
    pub multi: bool,
}

impl FieldValidity {
    pub fn new(basis: DateTime<Utc>, term: Duration) -> Self {
        Self {
            basis,
            term,
            cumulativeduration: None,
            statistical_process_on_duration: None,
            multi: false,
        }
    }

    /// Analysis validity (term = 0).
    pub fn analysis(basis: DateTime<Utc>) -> Self {
        Self::new(basis, Duration::zero())
    }

    /// Build from a basis and a validity date (term = date - basis).
    pub fn from_dates(basis: DateTime<Utc>, date: DateTime<Utc>) -> Self {
        Self::new(basis, date - basis)
    }

    pub fn with_cumulativeduration(mut self, cumulativeduration: Duration) -> Self {
        self.cumulativeduration = Some(cumulativeduration);
        self
    }

    pub fn with_statistical_process(mut self, code: u8) -> Self {
        self.statistical_process_on_duration = Some(code);
        self
    }

    pub fn with_multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }

    /// Validity date (basis + term).
    pub fn get(&self) -> DateTime<Utc> {
        self.basis + self.term
    }

    /// Start of the cumulation period, if any.
    pub fn cumulativeduration_start(&self) -> Option<DateTime<Utc>> {
        self.cumulativeduration.map(|c| self.get() - c)
    }

    /// Forecast term in (possibly fractional) hours.
    pub fn term_hours(&self) -> f64 {
        self.term.num_seconds() as f64 / 3600.0
    }

    pub fn term_seconds(&self) -> i64 {
        self.term.num_seconds()
    }

    /// True when validity and basis coincide.
    pub fn is_analysis(&self) -> bool {
        self.term.is_zero()
    }

    /// Same validity with a different term.
    pub fn with_term(&self, term: Duration) -> Self {
        Self {
            term,
            ..self.clone()
        }
    }

    /// One-line summary, e.g. `2024-01-15 00:00:00 +6h`.
    pub fn describe(&self) -> String {
        let mut s = format!(
            "basis {} term {}",
            self.basis.format("%Y-%m-%d %H:%M:%S"),
            format_term(self.term)
        );
        if let Some(c) = self.cumulativeduration {
            s.push_str(&format!(" cumulation {}", format_term(c)));
        }
        s
    }
}

/// Format a duration as `+HhMMmSSs`, omitting empty trailing components.
pub fn format_term(d: Duration) -> String {
    let total = d.num_seconds();
    let sign = if total < 0 { "-" } else { "+" };
    let total = total.abs();
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    match (m, s) {
        (0, 0) => format!("{}{}h", sign, h),
        (_, 0) => format!("{}{}h{:02}m", sign, h, m),
        _ => format!("{}{}h{:02}m{:02}s", sign, h, m, s),
    }
}

/// Parse a date in one of the compact forms used by file headers and CLIs.
///
/// Accepts RFC 3339, `%Y-%m-%d %H:%M:%S`, `%Y%m%d%H%M%S`, `%Y%m%d%H%M` and
/// `%Y%m%d%H`.
pub fn parse_datetime(s: &str) -> MeteoResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y%m%d%H%M%S",
    ] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }
    let padded = match s.len() {
        10 => format!("{}0000", s),
        12 => format!("{}00", s),
        _ => String::new(),
    };
    if !padded.is_empty() {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(&padded, "%Y%m%d%H%M%S") {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }
    Err(MeteoError::InvalidValidity(format!("unparsable date '{}'", s)))
}

// ============================================================================
// Validity lists
// ============================================================================

/// One or more validities. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValidityList(Vec<FieldValidity>);

impl FieldValidityList {
    pub fn new(validity: FieldValidity) -> Self {
        Self(vec![validity])
    }

    pub fn from_vec(validities: Vec<FieldValidity>) -> MeteoResult<Self> {
        if validities.is_empty() {
            return Err(MeteoError::InvalidValidity(
                "a validity list holds at least one validity".to_string(),
            ));
        }
        Ok(Self(validities))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_single(&self) -> bool {
        self.0.len() == 1
    }

    pub fn first(&self) -> &FieldValidity {
        &self.0[0]
    }

    pub fn get(&self, index: usize) -> Option<&FieldValidity> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldValidity> {
        self.0.iter()
    }

    pub fn push(&mut self, validity: FieldValidity) {
        self.0.push(validity);
    }

    /// The only validity of a single-validity list.
    pub fn single(&self) -> MeteoResult<&FieldValidity> {
        if self.is_single() {
            Ok(&self.0[0])
        } else {
            Err(MeteoError::InvalidValidity(format!(
                "expected exactly one validity, got {}",
                self.0.len()
            )))
        }
    }

    pub fn into_vec(self) -> Vec<FieldValidity> {
        self.0
    }
}

impl From<FieldValidity> for FieldValidityList {
    fn from(v: FieldValidity) -> Self {
        Self::new(v)
    }
}

impl<'a> IntoIterator for &'a FieldValidityList {
    type Item = &'a FieldValidity;
    type IntoIter = std::slice::Iter<'a, FieldValidity>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

mod duration_seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::seconds(i64::deserialize(d)?))
    }
}

mod option_duration_seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.num_seconds()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<i64>::deserialize(d)?.map(Duration::seconds))
    }
}
