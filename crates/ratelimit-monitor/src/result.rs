//! Per-account outcome of one refresh cycle

use dockerhub_client::{RateLimitHeaders, parse_leading_int};

/// Why an account produced a scrape error. Rendering treats every failure the
/// same; the reason is kept for logs and self-metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeFailure {
    /// No response from the limits endpoint
    Unreachable,
    /// Limits endpoint answered with something other than 200 or 401
    UnexpectedStatus(u16),
    /// Still 401 after renewing the token: the username/password pair is wrong
    CredentialsRejected,
}

/// Result of checking one account's quota. Produced fresh every cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    Success {
        limit: u64,
        remaining: u64,
        source_ip: Option<String>,
    },
    /// 200 response without usable quota headers. Docker Hub omits them for
    /// accounts that have no pull limit.
    NoLimitsConfigured,
    ScrapeError(ScrapeFailure),
}

impl RateLimitResult {
    /// Classify the headers of a 200 response.
    ///
    /// Both `ratelimit-limit` and `ratelimit-remaining` must be present and
    /// start with an integer; otherwise no limit is reported.
    pub fn from_headers(headers: &RateLimitHeaders) -> Self {
        let limit = headers.limit.as_deref().and_then(parse_leading_int);
        let remaining = headers.remaining.as_deref().and_then(parse_leading_int);
        match (limit, remaining) {
            (Some(limit), Some(remaining)) => RateLimitResult::Success {
                limit,
                remaining,
                source_ip: headers.source.clone(),
            },
            _ => RateLimitResult::NoLimitsConfigured,
        }
    }

    /// Label for logging and self-metrics.
    pub fn label(&self) -> &'static str {
        match self {
            RateLimitResult::Success { .. } => "success",
            RateLimitResult::NoLimitsConfigured => "no_limits",
            RateLimitResult::ScrapeError(_) => "scrape_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(limit: Option<&str>, remaining: Option<&str>, source: Option<&str>) -> RateLimitHeaders {
        RateLimitHeaders {
            limit: limit.map(String::from),
            remaining: remaining.map(String::from),
            source: source.map(String::from),
        }
    }

    #[test]
    fn both_headers_yield_success_with_integer_prefix() {
        let result = RateLimitResult::from_headers(&headers(
            Some("100;w=21600"),
            Some("76;w=21600"),
            Some("1.2.3.4"),
        ));
        assert_eq!(
            result,
            RateLimitResult::Success {
                limit: 100,
                remaining: 76,
                source_ip: Some("1.2.3.4".into()),
            }
        );
    }

    #[test]
    fn source_header_is_optional() {
        let result =
            RateLimitResult::from_headers(&headers(Some("200;w=21600"), Some("0;w=21600"), None));
        assert_eq!(
            result,
            RateLimitResult::Success {
                limit: 200,
                remaining: 0,
                source_ip: None,
            }
        );
    }

    #[test]
    fn missing_either_header_means_no_limits() {
        for h in [
            headers(None, Some("100;w=21600"), Some("1.2.3.4")),
            headers(Some("100;w=21600"), None, Some("1.2.3.4")),
            headers(None, None, None),
        ] {
            assert_eq!(RateLimitResult::from_headers(&h), RateLimitResult::NoLimitsConfigured);
        }
    }

    #[test]
    fn unparsable_header_means_no_limits() {
        let result = RateLimitResult::from_headers(&headers(Some("unlimited"), Some("76;w=21600"), None));
        assert_eq!(result, RateLimitResult::NoLimitsConfigured);
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(RateLimitResult::NoLimitsConfigured.label(), "no_limits");
        assert_eq!(
            RateLimitResult::ScrapeError(ScrapeFailure::Unreachable).label(),
            "scrape_error"
        );
    }
}
