use axum::http::HeaderMap;

/// Segment placed in front of the dimensional key.
pub const DIMENSION_KEY_PREFIX: &str = "by_country.";

/// A metric prefix normalized once at configuration time.
///
/// A non-empty prefix always ends with exactly the `.` it was given or one appended here, so
/// `MetricPrefix::new("app")` and `MetricPrefix::new("app.")` are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricPrefix(String);

impl MetricPrefix {
    /// Appends the separating `.` unless `prefix` is empty or already has it.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        if prefix.is_empty() || prefix.ends_with('.') {
            Self(prefix.to_string())
        } else {
            Self(format!("{prefix}."))
        }
    }

    /// The normalized prefix, trailing `.` included.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fully qualified key for `suffix`.
    #[must_use]
    pub fn qualify(&self, suffix: &str) -> String {
        let mut key = String::with_capacity(self.0.len() + suffix.len());
        key.push_str(&self.0);
        key.push_str(suffix);
        key
    }
}

/// The keys one request fans out to: the primary key and, when the dimension header carried a
/// value, the dimensional key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricKeySet {
    primary: String,
    dimensional: Option<String>,
}

impl MetricKeySet {
    /// Builds the key set for `suffix`.
    ///
    /// `dimension_header` is read from `headers` only when it is non-empty; a missing or empty
    /// header value produces a single key. The header value is used as-is.
    #[must_use]
    pub fn build(
        prefix: &MetricPrefix,
        suffix: &str,
        dimension_header: &str,
        headers: &HeaderMap,
    ) -> Self {
        let primary = prefix.qualify(suffix);
        let dimensional = if dimension_header.is_empty() {
            None
        } else {
            headers
                .get(dimension_header)
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.is_empty())
                .map(|value| format!("{DIMENSION_KEY_PREFIX}{value}.{primary}"))
        };

        Self {
            primary,
            dimensional,
        }
    }

    /// `<prefix><suffix>`.
    #[must_use]
    pub fn primary(&self) -> &str {
        &self.primary
    }

    /// `by_country.<header value>.<primary>`, when the header carried a value.
    #[must_use]
    pub fn dimensional(&self) -> Option<&str> {
        self.dimensional.as_deref()
    }

    /// Non-empty keys in forwarding order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str())
            .chain(self.dimensional.as_deref())
            .filter(|key| !key.is_empty())
    }
}
