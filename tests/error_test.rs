use std::time::Duration;

use heimdall::{FailureClass, HeimdallError, NetworkErrorKind, Stage, UpstreamError};

#[test]
fn status_429_maps_to_rate_limited() {
    let err = UpstreamError::from_status(429, Some(Duration::from_secs(2)), "slow down");
    assert!(err.is_rate_limited());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));

    let err = UpstreamError::from_status(503, None, "unavailable");
    assert_eq!(
        err,
        UpstreamError::Status {
            status: 503,
            message: "unavailable".into()
        }
    );
    assert_eq!(err.retry_after(), None);
}

#[test]
fn stage_and_class_attribute_failures() {
    let timeout = HeimdallError::AdmissionTimeout {
        endpoint: "/api/users".into(),
        waited: Duration::from_secs(5),
    };
    assert_eq!(timeout.stage(), Stage::Admission);
    assert_eq!(timeout.class(), FailureClass::Infrastructure);
    assert_eq!(timeout.attempts(), None);

    let exhausted = HeimdallError::RetryExhausted {
        endpoint: "/api/users".into(),
        attempts: 3,
        last_error: UpstreamError::network(NetworkErrorKind::Reset, "peer reset"),
    };
    assert_eq!(exhausted.stage(), Stage::Retry);
    assert_eq!(exhausted.class(), FailureClass::Infrastructure);
    assert_eq!(exhausted.attempts(), Some(3));

    let rejected = HeimdallError::NonRetryable {
        endpoint: "/api/users".into(),
        attempts: 1,
        error: UpstreamError::from_status(422, None, "invalid email"),
    };
    assert_eq!(rejected.stage(), Stage::Retry);
    assert_eq!(rejected.class(), FailureClass::Test);
    assert_eq!(
        rejected.upstream(),
        Some(&UpstreamError::from_status(422, None, "invalid email"))
    );

    let config = HeimdallError::Configuration("bad".into());
    assert_eq!(config.stage(), Stage::Configuration);
    assert_eq!(config.class(), FailureClass::Infrastructure);

    let mock = HeimdallError::MockRequired {
        endpoint: "https://api.stripe.com/v1".into(),
    };
    assert_eq!(mock.stage(), Stage::Policy);
    assert_eq!(mock.class(), FailureClass::Test);
}

#[test]
fn display_includes_attempts_and_last_error() {
    let err = HeimdallError::RetryExhausted {
        endpoint: "/api/orders".into(),
        attempts: 3,
        last_error: UpstreamError::from_status(502, None, "bad gateway"),
    };
    let msg = err.to_string();
    assert!(msg.contains("/api/orders"));
    assert!(msg.contains("3 attempts"));
    assert!(msg.contains("502"));
}

#[test]
fn stage_names_are_stable() {
    assert_eq!(Stage::Admission.to_string(), "admission");
    assert_eq!(Stage::Retry.as_str(), "retry");
    assert_eq!(Stage::Policy.as_str(), "policy");
}
