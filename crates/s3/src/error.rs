//! Mapping of AWS SDK failures onto the awss error taxonomy

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

use awss_core::error::{is_access_denied_message, is_session_expired_message};
use awss_core::{Error, Profile};

/// Header S3 uses to tell clients where a bucket lives
const BUCKET_REGION_HEADER: &str = "x-amz-bucket-region";

const DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AllAccessDisabled",
    "Forbidden",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "AccountProblem",
];

const EXPIRED_CODES: &[&str] = &["ExpiredToken", "ExpiredTokenException", "TokenRefreshRequired"];

const NOT_FOUND_CODES: &[&str] = &["NoSuchKey", "NoSuchBucket", "NotFound"];

/// Codes for throttling and server-side trouble; they say nothing about permissions
const RETRYABLE_CODES: &[&str] = &[
    "SlowDown",
    "Throttling",
    "ThrottlingException",
    "RequestTimeout",
    "InternalError",
    "ServiceUnavailable",
];

/// Codes returned when a request reached the wrong regional endpoint
const REDIRECT_CODES: &[&str] = &[
    "PermanentRedirect",
    "AuthorizationHeaderMalformed",
    "IllegalLocationConstraintException",
];

/// An SDK failure mapped for the engine, with a region hint when the bucket
/// lives elsewhere
#[derive(Debug)]
pub(crate) struct SdkFailure {
    pub error: Error,
    pub region: Option<String>,
}

impl SdkFailure {
    pub fn new<E>(err: SdkError<E, HttpResponse>, profile: &Profile, bucket: &str) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        let message = DisplayErrorContext(&err).to_string();
        let error = match &err {
            SdkError::TimeoutError(_) => Error::Timeout(message),
            SdkError::ServiceError(service) => {
                let status = service.raw().status().as_u16();
                classify(err.code(), Some(status), &message, profile, bucket)
            }
            SdkError::ConstructionFailure(_) => Error::General(message),
            // Credential resolution failures surface as dispatch failures
            _ if is_session_expired_message(&message) => Error::SessionExpired {
                profile: profile.name.clone(),
                detail: message,
            },
            _ => Error::Transport(message),
        };

        let redirected = err.code().is_some_and(|c| REDIRECT_CODES.contains(&c))
            || err
                .raw_response()
                .is_some_and(|r| r.status().as_u16() == 301);
        let region = if redirected {
            err.raw_response()
                .and_then(|r| r.headers().get(BUCKET_REGION_HEADER))
                .map(str::to_string)
        } else {
            None
        };

        Self { error, region }
    }
}

/// Map a service error onto the error taxonomy
///
/// The error code and HTTP status decide. The message text is only consulted
/// when the service sent no code, since the rendered message also carries
/// request ids.
pub(crate) fn classify(
    code: Option<&str>,
    status: Option<u16>,
    message: &str,
    profile: &Profile,
    bucket: &str,
) -> Error {
    let expired = || Error::SessionExpired {
        profile: profile.name.clone(),
        detail: message.to_string(),
    };
    let denied = |detail: &str| Error::AccessDenied {
        profile: profile.name.clone(),
        bucket: bucket.to_string(),
        detail: detail.to_string(),
    };

    match code {
        Some(code) if EXPIRED_CODES.contains(&code) => expired(),
        Some(code) if DENIED_CODES.contains(&code) => denied(code),
        Some(code) if NOT_FOUND_CODES.contains(&code) => Error::NotFound(format!("{bucket}: {code}")),
        Some(code) if RETRYABLE_CODES.contains(&code) => Error::Transport(message.to_string()),
        _ if status.is_some_and(|s| s >= 500) => Error::Transport(message.to_string()),
        _ if status == Some(403) => denied(code.unwrap_or("403 Forbidden")),
        Some(_) => Error::General(message.to_string()),
        None if is_session_expired_message(message) => expired(),
        None if is_access_denied_message(message) => denied(message),
        None => Error::General(message.to_string()),
    }
}
