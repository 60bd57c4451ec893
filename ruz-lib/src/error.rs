use std::fmt;

use serde_json::Value;

type Cause = Box<dyn std::error::Error + Send + Sync>;

/// Where an [`ErrorKind`] sits in the taxonomy.
///
/// The tree mirrors how the RUZ service misbehaves: transport failures,
/// envelopes that explicitly flag an error, envelopes that are missing
/// promised keys, and purely client-side lookups that come up empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport-level failure (connection refused, timeout, TLS).
    Network,
    /// The transport produced a response that could not be read.
    BadResponseCode,
    /// The server was reached but the exchange is invalid.
    Api,
    /// The server explicitly reported a logical error (`"error": true`).
    ApiResponse,
    /// The server-side "internal data retrieval failure" phrase matched.
    ApiInternal,
    /// An expected key was missing from an otherwise successful envelope.
    ResponseValue,
    /// The response content-type is not JSON.
    ResponseType,
    /// The body failed to parse as JSON.
    JsonDecode,
    /// The server reported that a requested entity does not exist.
    ApiNotFound,
    GroupNotFound,
    TeacherNotFound,
    FacultyNotFound,
    BuildingNotFound,
    AuditoryNotFound,
    /// Raised client-side, never from the network.
    LocalNotFound,
    /// A schedule search yielded no matching day.
    DayNotFound,
    /// A method template was resolved with missing, null, or unexpected
    /// arguments. Indicates programmer error and is never suppressed.
    InvalidParams,
}

impl ErrorKind {
    /// Parent kind in the taxonomy, `None` for roots.
    pub fn parent(self) -> Option<ErrorKind> {
        use ErrorKind::*;
        match self {
            Network | Api | LocalNotFound | InvalidParams => None,
            BadResponseCode => Some(Network),
            ApiResponse => Some(Api),
            ApiInternal | ResponseValue | ResponseType | JsonDecode | ApiNotFound => {
                Some(ApiResponse)
            }
            GroupNotFound | TeacherNotFound | FacultyNotFound | BuildingNotFound
            | AuditoryNotFound => Some(ApiNotFound),
            DayNotFound => Some(LocalNotFound),
        }
    }

    /// Whether `self` is `ancestor` or one of its descendants.
    ///
    /// This is what suppression is checked against, so skipping a parent
    /// kind (e.g. [`ErrorKind::ApiNotFound`]) also skips all its children.
    pub fn is(self, ancestor: ErrorKind) -> bool {
        self == ancestor || self.parent().is_some_and(|parent| parent.is(ancestor))
    }
}

/// Substrings the server embeds in error texts, used to pick the most
/// specific [`ErrorKind`] for a failed envelope.
///
/// The service reports errors as free-form Russian phrases. If it ever
/// changes its wording, classification degrades to [`ErrorKind::ApiResponse`]
/// rather than breaking, and the table can be swapped at client construction.
#[derive(Debug, Clone)]
pub struct ClassifyRules {
    /// Phrase marking "entity not found" responses.
    pub not_found_text: String,
    /// Phrase marking internal data-retrieval failures.
    pub internal_text: String,
}

impl Default for ClassifyRules {
    fn default() -> Self {
        Self {
            not_found_text: "не найден".to_owned(),
            internal_text: "Ошибка получения данных".to_owned(),
        }
    }
}

impl ClassifyRules {
    /// Expected error-text substring for a kind, if it declares one.
    fn expected_text(&self, kind: ErrorKind) -> Option<&str> {
        if kind.is(ErrorKind::ApiNotFound) {
            Some(&self.not_found_text)
        } else if kind == ErrorKind::ApiInternal {
            Some(&self.internal_text)
        } else {
            None
        }
    }

    /// Select the kind to raise for an `{"error": true}` envelope.
    ///
    /// `method_kind` is the kind the method descriptor configured for this
    /// operation. If it declares no expected substring it wins outright;
    /// otherwise an ordered rule list is evaluated, most specific first.
    pub fn classify(&self, method_kind: ErrorKind, text: Option<&str>) -> ErrorKind {
        let Some(expected) = self.expected_text(method_kind) else {
            return method_kind;
        };
        let rules = [
            (expected, method_kind),
            (self.internal_text.as_str(), ErrorKind::ApiInternal),
        ];
        match text {
            Some(text) => rules
                .iter()
                .find(|(needle, _)| text.contains(needle))
                .map(|&(_, kind)| kind)
                .unwrap_or(ErrorKind::ApiResponse),
            None => ErrorKind::ApiResponse,
        }
    }
}

/// Error raised by every fallible operation of the client.
///
/// Carries enough context to reconstruct what happened without re-running
/// the request: the URL, the raw or decoded response, and the underlying
/// cause. Construction never fails; missing fields are simply omitted from
/// the rendered message.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    url: Option<String>,
    response: Option<Value>,
    cause: Option<Cause>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            url: None,
            response: None,
            cause: None,
        }
    }

    pub(crate) fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub(crate) fn with_response(mut self, response: Value) -> Self {
        self.response = Some(response);
        self
    }

    pub(crate) fn with_cause(mut self, cause: impl Into<Cause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub(crate) fn network(url: &str, cause: impl Into<Cause>) -> Self {
        Self::new(ErrorKind::Network, "network error")
            .with_url(url)
            .with_cause(cause)
    }

    pub(crate) fn response_type(url: &str, body: String) -> Self {
        Self::new(ErrorKind::ResponseType, "response content-type is not JSON")
            .with_url(url)
            .with_response(Value::String(body))
    }

    pub(crate) fn json_decode(url: &str, body: String, cause: impl Into<Cause>) -> Self {
        Self::new(ErrorKind::JsonDecode, "failed to decode response as JSON")
            .with_url(url)
            .with_response(Value::String(body))
            .with_cause(cause)
    }

    pub(crate) fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    pub(crate) fn day_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DayNotFound, message)
    }

    /// The most specific kind of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// URL of the request that failed, if any network activity happened.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Raw response body or decoded error envelope, if one was received.
    pub fn response(&self) -> Option<&Value> {
        self.response.as_ref()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(url) = &self.url {
            write!(f, ", request: {url}")?;
            if let Some(response) = &self.response {
                write!(f, ", response: {response}")?;
            }
        }
        if let Some(cause) = &self.cause {
            write!(f, ". Caused by: {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_kinds_descend_from_api_response() {
        for kind in [
            ErrorKind::GroupNotFound,
            ErrorKind::TeacherNotFound,
            ErrorKind::FacultyNotFound,
            ErrorKind::BuildingNotFound,
            ErrorKind::AuditoryNotFound,
        ] {
            assert!(kind.is(ErrorKind::ApiNotFound));
            assert!(kind.is(ErrorKind::ApiResponse));
            assert!(kind.is(ErrorKind::Api));
            assert!(!kind.is(ErrorKind::Network));
        }
    }

    #[test]
    fn local_not_found_is_not_an_api_error() {
        assert!(ErrorKind::DayNotFound.is(ErrorKind::LocalNotFound));
        assert!(!ErrorKind::DayNotFound.is(ErrorKind::Api));
        assert!(!ErrorKind::DayNotFound.is(ErrorKind::ApiNotFound));
    }

    #[test]
    fn classify_prefers_the_method_kind_when_its_phrase_matches() {
        let rules = ClassifyRules::default();
        let kind = rules.classify(ErrorKind::GroupNotFound, Some("Группа: 999 не найден"));
        assert_eq!(kind, ErrorKind::GroupNotFound);
    }

    #[test]
    fn classify_falls_back_to_internal_then_generic() {
        let rules = ClassifyRules::default();
        assert_eq!(
            rules.classify(
                ErrorKind::GroupNotFound,
                Some("Ошибка получения данных с сервера"),
            ),
            ErrorKind::ApiInternal,
        );
        assert_eq!(
            rules.classify(ErrorKind::GroupNotFound, Some("что-то пошло не так")),
            ErrorKind::ApiResponse,
        );
        assert_eq!(
            rules.classify(ErrorKind::GroupNotFound, None),
            ErrorKind::ApiResponse,
        );
    }

    #[test]
    fn classify_raises_the_method_kind_when_no_phrase_is_declared() {
        let rules = ClassifyRules::default();
        assert_eq!(
            rules.classify(ErrorKind::ApiResponse, Some("произвольный текст")),
            ErrorKind::ApiResponse,
        );
    }

    #[test]
    fn custom_rules_replace_the_stock_phrases() {
        let rules = ClassifyRules {
            not_found_text: "not found".to_owned(),
            internal_text: "internal failure".to_owned(),
        };
        assert_eq!(
            rules.classify(ErrorKind::TeacherNotFound, Some("teacher 5 not found")),
            ErrorKind::TeacherNotFound,
        );
        assert_eq!(
            rules.classify(ErrorKind::TeacherNotFound, Some("не найден")),
            ErrorKind::ApiResponse,
        );
    }

    #[test]
    fn display_appends_url_response_and_cause_when_present() {
        let bare = Error::new(ErrorKind::Api, "bad API response [503]");
        assert_eq!(bare.to_string(), "bad API response [503]");

        let full = Error::new(ErrorKind::ApiResponse, "API returned error")
            .with_url("https://example.com/api/v1/ruz/faculties")
            .with_response(serde_json::json!({"error": true}))
            .with_cause("boom");
        let rendered = full.to_string();
        assert!(rendered.starts_with("API returned error, request: https://"));
        assert!(rendered.contains(r#"response: {"error":true}"#));
        assert!(rendered.ends_with("Caused by: boom"));
    }
}
