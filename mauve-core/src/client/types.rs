use super::Fault;
use http::StatusCode;

/// The envelope returned for every call, success or failure.
///
/// Content is present if and only if the status is [`StatusCode::OK`]. The fields are private
/// and the only constructors are [`Response::success`], [`Response::failure`] and
/// [`Default`], so the pairing cannot be broken from the outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response<T> {
    content: Option<T>,
    status_code: StatusCode,
    message: String,
}

impl<T> Default for Response<T> {
    /// The state of an envelope before execution proved anything: no content and an
    /// internal failure status.
    fn default() -> Self {
        Self {
            content: None,
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
            message: String::new(),
        }
    }
}

impl<T> Response<T> {
    /// The message carried by every successful envelope.
    pub const SUCCESS_MESSAGE: &'static str = "Success.";

    pub fn success(content: T) -> Self {
        Self {
            content: Some(content),
            status_code: StatusCode::OK,
            message: Self::SUCCESS_MESSAGE.to_string(),
        }
    }

    /// Builds a failed envelope whose message lists every leaf cause of `fault`.
    pub fn failure(fault: &Fault) -> Self {
        Self {
            message: fault.to_string(),
            ..Self::default()
        }
    }

    pub fn content(&self) -> Option<&T> {
        self.content.as_ref()
    }

    pub fn into_content(self) -> Option<T> {
        self.content
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_success(&self) -> bool {
        self.status_code == StatusCode::OK
    }
}

impl<T> From<Result<T, Fault>> for Response<T> {
    fn from(result: Result<T, Fault>) -> Self {
        match result {
            Ok(content) => Self::success(content),
            Err(fault) => Self::failure(&fault),
        }
    }
}
