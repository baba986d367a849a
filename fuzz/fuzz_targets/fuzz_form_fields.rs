#![no_main]

use axum::http::HeaderMap;
use libfuzzer_sys::fuzz_target;
use statsd_http_proxy::request::{CountRequest, GaugeRequest, SetRequest, TimingRequest};
use statsd_http_proxy::{FormFields, MetricKeySet, MetricPrefix, MetricType};

// Arbitrary request bodies must either parse or be rejected, never panic
fuzz_target!(|data: &[u8]| {
    let Ok(fields) = FormFields::from_body(data) else {
        return;
    };

    let _ = CountRequest::parse(&fields);
    let _ = GaugeRequest::parse(&fields);
    let _ = TimingRequest::parse(&fields);
    let _ = SetRequest::parse(&fields);

    if let Some(suffix) = fields.get("suffix") {
        let keys = MetricKeySet::build(
            &MetricPrefix::new("fuzz"),
            suffix,
            "Geoip-Country-Code",
            &HeaderMap::new(),
        );
        assert!(keys.iter().all(|key| key.ends_with(suffix)));
    }

    if let Some(name) = fields.get("type") {
        if let Ok(metric_type) = name.parse::<MetricType>() {
            assert_eq!(metric_type.as_str(), name);
        }
    }
});
