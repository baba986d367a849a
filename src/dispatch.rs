use std::sync::Arc;

use axum::http::HeaderMap;
use tracing::debug;

use crate::error::ValidationError;
use crate::keys::{MetricKeySet, MetricPrefix};
use crate::request::{
    CountRequest, FormFields, GaugeRequest, MetricType, SetRequest, TimingRequest,
};
use crate::statsd::StatsdTransport;

/// A parsed metric, ready to be sent under one or more keys.
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(missing_docs)]
pub enum StatsdEvent {
    Count { delta: i64, sample_rate: f32 },
    Gauge { value: i64 },
    Timing { duration_millis: i64, sample_rate: f32 },
    Set { member: i64 },
}

impl StatsdEvent {
    /// Parses the fields `metric_type` needs.
    ///
    /// # Errors
    /// Returns the first field that fails validation.
    pub fn parse(metric_type: MetricType, fields: &FormFields) -> Result<Self, ValidationError> {
        Ok(match metric_type {
            MetricType::Count => {
                let CountRequest { delta, sample_rate } = CountRequest::parse(fields)?;
                Self::Count { delta, sample_rate }
            }
            MetricType::Gauge => Self::Gauge {
                value: GaugeRequest::parse(fields)?.value,
            },
            MetricType::Timing => {
                let TimingRequest {
                    duration_millis,
                    sample_rate,
                } = TimingRequest::parse(fields)?;
                Self::Timing {
                    duration_millis,
                    sample_rate,
                }
            }
            MetricType::Set => Self::Set {
                member: SetRequest::parse(fields)?.member,
            },
        })
    }

    /// Sends the event under `key`.
    pub fn forward(&self, transport: &dyn StatsdTransport, key: &str) {
        match *self {
            Self::Count { delta, sample_rate } => transport.count(key, delta, sample_rate),
            Self::Gauge { value } => transport.gauge(key, value),
            Self::Timing {
                duration_millis,
                sample_rate,
            } => transport.timing(key, duration_millis, sample_rate),
            Self::Set { member } => transport.set(key, member),
        }
    }
}

/// What happened to a request the dispatcher accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// The event went out under this many keys.
    Forwarded(usize),
    /// The route named no metric type; nothing was sent.
    UnknownType,
}

/// Turns metric requests into StatsD events and sends them to the shared transport.
pub struct RouteHandler {
    transport: Arc<dyn StatsdTransport>,
    prefix: MetricPrefix,
    key_part_header: String,
}

impl RouteHandler {
    /// `key_part_header` names the dimension header; an empty name disables the second key.
    #[must_use]
    pub fn new(
        transport: Arc<dyn StatsdTransport>,
        prefix: MetricPrefix,
        key_part_header: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            prefix,
            key_part_header: key_part_header.into(),
        }
    }

    /// Validates the request and forwards the event under every derived key.
    ///
    /// Nothing is sent when validation fails. Each key is sent on its own, so losing one
    /// datagram never affects the other key.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] for an empty `suffix` or a malformed field.
    pub fn handle_metric(
        &self,
        metric_type: MetricType,
        suffix: &str,
        headers: &HeaderMap,
        fields: &FormFields,
    ) -> Result<usize, ValidationError> {
        if suffix.is_empty() {
            return Err(ValidationError::EmptySuffix);
        }

        let keys = MetricKeySet::build(&self.prefix, suffix, &self.key_part_header, headers);
        let event = StatsdEvent::parse(metric_type, fields)?;

        let mut forwarded = 0;
        for key in keys.iter() {
            debug!(%metric_type, key, ?event, "sending metric");
            event.forward(self.transport.as_ref(), key);
            forwarded += 1;
        }
        Ok(forwarded)
    }

    /// Like [`Self::handle_metric`] for a metric type taken from the request path.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] for a known type with a malformed request.
    pub fn handle_named(
        &self,
        metric_type: &str,
        suffix: &str,
        headers: &HeaderMap,
        fields: &FormFields,
    ) -> Result<Dispatched, ValidationError> {
        match metric_type.parse::<MetricType>() {
            Ok(metric_type) => self
                .handle_metric(metric_type, suffix, headers, fields)
                .map(Dispatched::Forwarded),
            Err(unknown) => {
                debug!(metric_type = %unknown.0, "ignoring unknown metric type");
                Ok(Dispatched::UnknownType)
            }
        }
    }
}
