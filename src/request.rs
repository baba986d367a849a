//! Form fields of a metric request and their typed, validated forms.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use axum::body::Bytes;
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use multer::{parse_boundary, Multipart};

use crate::error::ValidationError;

/// Delta of a count without `value`.
pub const DEFAULT_COUNT_DELTA: i64 = 1;
/// Value of a gauge without `value`.
pub const DEFAULT_GAUGE_VALUE: i64 = 1;
/// Member of a set without `value`.
pub const DEFAULT_SET_MEMBER: i64 = 1;
/// Rate of a count or timing without `sampleRate`.
pub const DEFAULT_SAMPLE_RATE: f32 = 1.0;

/// The four metric kinds accepted over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricType {
    /// Counter increment, `|c`.
    Count,
    /// Absolute value, `|g`.
    Gauge,
    /// Duration in milliseconds, `|ms`.
    Timing,
    /// Unique member, `|s`.
    Set,
}

impl MetricType {
    /// Every type, in route registration order.
    pub const ALL: [Self; 4] = [Self::Count, Self::Gauge, Self::Timing, Self::Set];

    /// Route segment naming this type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Gauge => "gauge",
            Self::Timing => "timing",
            Self::Set => "set",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned for a route segment that names no metric type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMetricType(pub String);

impl FromStr for MetricType {
    type Err = UnknownMetricType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count" => Ok(Self::Count),
            "gauge" => Ok(Self::Gauge),
            "timing" => Ok(Self::Timing),
            "set" => Ok(Self::Set),
            other => Err(UnknownMetricType(other.to_string())),
        }
    }
}

/// Submitted form fields of one request. The first occurrence of a field wins.
#[derive(Debug, Clone, Default)]
pub struct FormFields(HashMap<String, String>);

impl FormFields {
    /// Decodes a form-urlencoded body. An empty body yields no fields.
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidBody`] when the body is not form-urlencoded.
    pub fn from_body(body: &[u8]) -> Result<Self, ValidationError> {
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_bytes(body).map_err(|_| ValidationError::InvalidBody)?;
        Ok(pairs.into_iter().collect())
    }

    /// Decodes a request body by its content type: `multipart/form-data` bodies are read as
    /// multipart, anything else as form-urlencoded.
    ///
    /// File parts of a multipart body are skipped.
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidBody`] for a body that does not decode, including a
    /// multipart content type without a boundary.
    pub async fn from_request(headers: &HeaderMap, body: Bytes) -> Result<Self, ValidationError> {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());

        match content_type.map(parse_boundary) {
            Some(Ok(boundary)) => Self::from_multipart(body, boundary).await,
            Some(Err(multer::Error::NoBoundary)) => Err(ValidationError::InvalidBody),
            _ => Self::from_body(&body),
        }
    }

    async fn from_multipart(body: Bytes, boundary: String) -> Result<Self, ValidationError> {
        let stream = futures::stream::once(async move { Ok::<_, Infallible>(body) });
        let mut multipart = Multipart::new(stream, boundary);

        let mut pairs = Vec::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|_| ValidationError::InvalidBody)?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if field.file_name().is_some() {
                continue;
            }
            let value = field.text().await.map_err(|_| ValidationError::InvalidBody)?;
            pairs.push((name, value));
        }
        Ok(pairs.into_iter().collect())
    }

    /// Value of `name`; an empty value counts as absent.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

impl FromIterator<(String, String)> for FormFields {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut fields = HashMap::new();
        for (name, value) in iter {
            fields.entry(name).or_insert(value);
        }
        Self(fields)
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for FormFields {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }
}

fn parse_or<T: FromStr>(
    fields: &FormFields,
    name: &str,
    default: T,
    error: ValidationError,
) -> Result<T, ValidationError> {
    fields
        .get(name)
        .map_or(Ok(default), |raw| raw.parse().map_err(|_| error))
}

fn sample_rate(fields: &FormFields) -> Result<f32, ValidationError> {
    let rate = parse_or(
        fields,
        "sampleRate",
        DEFAULT_SAMPLE_RATE,
        ValidationError::InvalidSampleRate,
    )?;
    // StatsD servers divide by the rate
    if rate.is_finite() && rate > 0.0 && rate <= 1.0 {
        Ok(rate)
    } else {
        Err(ValidationError::InvalidSampleRate)
    }
}

/// Fields of `POST /count/{key}`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountRequest {
    /// `value`, defaults to [`DEFAULT_COUNT_DELTA`].
    pub delta: i64,
    /// `sampleRate` in `(0, 1]`.
    pub sample_rate: f32,
}

impl CountRequest {
    /// # Errors
    /// Fails on a non-integer `value` or a `sampleRate` outside `(0, 1]`.
    pub fn parse(fields: &FormFields) -> Result<Self, ValidationError> {
        Ok(Self {
            delta: parse_or(
                fields,
                "value",
                DEFAULT_COUNT_DELTA,
                ValidationError::InvalidValue,
            )?,
            sample_rate: sample_rate(fields)?,
        })
    }
}

/// Fields of `POST /gauge/{key}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaugeRequest {
    /// `value`, defaults to [`DEFAULT_GAUGE_VALUE`].
    pub value: i64,
}

impl GaugeRequest {
    /// # Errors
    /// Fails on a non-integer `value`.
    pub fn parse(fields: &FormFields) -> Result<Self, ValidationError> {
        Ok(Self {
            value: parse_or(
                fields,
                "value",
                DEFAULT_GAUGE_VALUE,
                ValidationError::InvalidValue,
            )?,
        })
    }
}

/// Fields of `POST /timing/{key}`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingRequest {
    /// `time`, required.
    pub duration_millis: i64,
    /// `sampleRate` in `(0, 1]`.
    pub sample_rate: f32,
}

impl TimingRequest {
    /// # Errors
    /// Fails when `time` is missing or not an integer, or on a `sampleRate` outside `(0, 1]`.
    pub fn parse(fields: &FormFields) -> Result<Self, ValidationError> {
        let duration_millis = fields
            .get("time")
            .ok_or(ValidationError::InvalidTime)?
            .parse()
            .map_err(|_| ValidationError::InvalidTime)?;

        Ok(Self {
            duration_millis,
            sample_rate: sample_rate(fields)?,
        })
    }
}

/// Fields of `POST /set/{key}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetRequest {
    /// `value`, defaults to [`DEFAULT_SET_MEMBER`].
    pub member: i64,
}

impl SetRequest {
    /// # Errors
    /// Fails on a non-integer `value`.
    pub fn parse(fields: &FormFields) -> Result<Self, ValidationError> {
        Ok(Self {
            member: parse_or(
                fields,
                "value",
                DEFAULT_SET_MEMBER,
                ValidationError::InvalidSetValue,
            )?,
        })
    }
}
