use std::future::Future;

use chrono::{Local, NaiveDate};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{ClassifyRules, Error, ErrorKind};
use crate::method::{methods, BaseUrls, MethodDescriptor, Params, ResolvedRequest};
use crate::model::{Auditory, Building, Faculty, Group, Schedule, Teacher};
use crate::transport::{HyperTransport, Transport};

/// What a public operation ultimately yields.
///
/// When the error kind raised by an operation is in the client's skip list,
/// the raw error envelope is returned in place of the error. Callers relying
/// on suppression must inspect the variant themselves — a suppressed payload
/// is indistinguishable in shape from a successful-but-empty search result.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Data(T),
    /// Raw error payload of a suppressed error, if the response carried one.
    Suppressed(Option<Value>),
}

impl<T> Fetched<T> {
    pub fn data(self) -> Option<T> {
        match self {
            Fetched::Data(data) => Some(data),
            Fetched::Suppressed(_) => None,
        }
    }

    pub fn as_data(&self) -> Option<&T> {
        match self {
            Fetched::Data(data) => Some(data),
            Fetched::Suppressed(_) => None,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, Fetched::Suppressed(_))
    }

    pub fn suppressed_payload(&self) -> Option<&Value> {
        match self {
            Fetched::Suppressed(payload) => payload.as_ref(),
            Fetched::Data(_) => None,
        }
    }
}

/// Default identifiers used when a schedule call omits its id.
#[derive(Debug, Clone, Copy, Default)]
pub struct Defaults {
    pub group_id: Option<i64>,
    pub teacher_id: Option<i64>,
    pub auditory_id: Option<i64>,
    pub faculty_id: Option<i64>,
}

/// Asynchronous client for the RUZ schedule service.
///
/// One asynchronous operation per upstream endpoint, each returning typed
/// entities. Entities that can fetch related data take the client
/// explicitly; there is no ambient "current client" slot.
pub struct RuzApi<T = HyperTransport> {
    transport: T,
    urls: BaseUrls,
    rules: ClassifyRules,
    skip: Vec<ErrorKind>,
    defaults: Defaults,
}

impl RuzApi<HyperTransport> {
    /// Client over the default hyper/rustls transport.
    pub fn new() -> Self {
        Self::with_transport(HyperTransport::new())
    }
}

impl Default for RuzApi<HyperTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> RuzApi<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            urls: BaseUrls::default(),
            rules: ClassifyRules::default(),
            skip: Vec::new(),
            defaults: Defaults::default(),
        }
    }

    /// Error kinds to return as data instead of raising. Matching follows
    /// the taxonomy, so skipping [`ErrorKind::ApiNotFound`] also skips every
    /// concrete not-found kind. [`ErrorKind::InvalidParams`] is never
    /// suppressed.
    pub fn skip_errors(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.skip.extend(kinds);
        self
    }

    pub fn defaults(mut self, defaults: Defaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn classify_rules(mut self, rules: ClassifyRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn base_urls(mut self, urls: BaseUrls) -> Self {
        self.urls = urls;
        self
    }

    pub fn urls(&self) -> &BaseUrls {
        &self.urls
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn faculties(&self) -> Result<Fetched<Vec<Faculty>>, Error> {
        self.guard(async {
            let method = methods::get_faculties();
            let request = method.resolve(&Params::new(), &self.urls)?;
            let mut envelope = self.request(&request).await?;
            let faculties = take_field(&mut envelope, &method, "faculties", request.url())?;
            decode_list(faculties, request.url())
        })
        .await
    }

    pub async fn teachers(&self) -> Result<Fetched<Vec<Teacher>>, Error> {
        self.guard(async {
            let method = methods::get_teachers();
            let request = method.resolve(&Params::new(), &self.urls)?;
            let mut envelope = self.request(&request).await?;
            let teachers = take_field(&mut envelope, &method, "teachers", request.url())?;
            decode_list(teachers, request.url())
        })
        .await
    }

    pub async fn buildings(&self) -> Result<Fetched<Vec<Building>>, Error> {
        self.guard(async {
            let method = methods::get_buildings();
            let request = method.resolve(&Params::new(), &self.urls)?;
            let mut envelope = self.request(&request).await?;
            let buildings = take_field(&mut envelope, &method, "buildings", request.url())?;
            decode_list(buildings, request.url())
        })
        .await
    }

    pub async fn faculty(&self, faculty_id: i64) -> Result<Fetched<Faculty>, Error> {
        self.guard(async {
            let method = methods::get_faculty();
            let request =
                method.resolve(&Params::new().set("faculty_id", faculty_id), &self.urls)?;
            let envelope = self.request(&request).await?;
            decode(Value::Object(envelope), request.url())
        })
        .await
    }

    pub async fn group(&self, group_id: i64) -> Result<Fetched<Group>, Error> {
        self.guard(async {
            let method = methods::get_group();
            let request = method.resolve(&Params::new().set("group_id", group_id), &self.urls)?;
            let envelope = self.request(&request).await?;
            decode(Value::Object(envelope), request.url())
        })
        .await
    }

    pub async fn teacher(&self, teacher_id: i64) -> Result<Fetched<Teacher>, Error> {
        self.guard(async {
            let method = methods::get_teacher();
            let request =
                method.resolve(&Params::new().set("teacher_id", teacher_id), &self.urls)?;
            let envelope = self.request(&request).await?;
            decode(Value::Object(envelope), request.url())
        })
        .await
    }

    pub async fn building(&self, building_id: i64) -> Result<Fetched<Building>, Error> {
        self.guard(async {
            let method = methods::get_building();
            let request =
                method.resolve(&Params::new().set("building_id", building_id), &self.urls)?;
            let envelope = self.request(&request).await?;
            decode(Value::Object(envelope), request.url())
        })
        .await
    }

    pub async fn search_groups(&self, group_name: &str) -> Result<Fetched<Vec<Group>>, Error> {
        self.guard(async {
            let method = methods::search_groups();
            let request =
                method.resolve(&Params::new().set("group_name", group_name), &self.urls)?;
            let mut envelope = self.request(&request).await?;
            let groups = take_field(&mut envelope, &method, "groups", request.url())?;
            decode_list(groups, request.url())
        })
        .await
    }

    pub async fn search_teachers(
        &self,
        teacher_name: &str,
    ) -> Result<Fetched<Vec<Teacher>>, Error> {
        self.guard(async {
            let method = methods::search_teachers();
            let request =
                method.resolve(&Params::new().set("teacher_name", teacher_name), &self.urls)?;
            let mut envelope = self.request(&request).await?;
            let teachers = take_field(&mut envelope, &method, "teachers", request.url())?;
            decode_list(teachers, request.url())
        })
        .await
    }

    pub async fn search_auditories(
        &self,
        auditory_name: &str,
    ) -> Result<Fetched<Vec<Auditory>>, Error> {
        self.guard(async {
            let method = methods::search_auditories();
            let request = method.resolve(
                &Params::new().set("auditory_name", auditory_name),
                &self.urls,
            )?;
            let mut envelope = self.request(&request).await?;
            let auditories = take_field(&mut envelope, &method, "auditories", request.url())?;
            decode_list(auditories, request.url())
        })
        .await
    }

    /// Groups of a faculty, each carrying the faculty as a back-reference.
    pub async fn faculty_groups(
        &self,
        faculty_id: Option<i64>,
    ) -> Result<Fetched<Vec<Group>>, Error> {
        self.guard(async {
            let method = methods::get_faculty_groups();
            let params = Params::new().set_opt("faculty_id", faculty_id.or(self.defaults.faculty_id));
            let request = method.resolve(&params, &self.urls)?;
            let mut envelope = self.request(&request).await?;
            let faculty: Faculty = decode(
                take_field(&mut envelope, &method, "faculty", request.url())?,
                request.url(),
            )?;
            let mut groups: Vec<Group> = decode_list(
                take_field(&mut envelope, &method, "groups", request.url())?,
                request.url(),
            )?;
            for group in &mut groups {
                group.faculty = Some(faculty.clone());
            }
            Ok(groups)
        })
        .await
    }

    /// Auditories of a building, each carrying the building as a
    /// back-reference.
    pub async fn building_auditories(
        &self,
        building_id: i64,
    ) -> Result<Fetched<Vec<Auditory>>, Error> {
        self.guard(async {
            let method = methods::get_building_auditories();
            let request =
                method.resolve(&Params::new().set("building_id", building_id), &self.urls)?;
            let mut envelope = self.request(&request).await?;
            let building: Building = decode(
                take_field(&mut envelope, &method, "building", request.url())?,
                request.url(),
            )?;
            let mut auditories: Vec<Auditory> = decode_list(
                take_field(&mut envelope, &method, "auditories", request.url())?,
                request.url(),
            )?;
            for auditory in &mut auditories {
                auditory.building = Some(building.clone());
            }
            Ok(auditories)
        })
        .await
    }

    /// Weekly schedule of a group, for the week containing `date` (today
    /// when omitted). Falls back to the default group id.
    pub async fn group_schedule(
        &self,
        group_id: Option<i64>,
        date: Option<NaiveDate>,
    ) -> Result<Fetched<Schedule>, Error> {
        self.guard(async {
            let method = methods::get_group_schedule();
            let params = Params::new()
                .set_opt("group_id", group_id.or(self.defaults.group_id))
                .set("date", iso_date(date));
            let request = method.resolve(&params, &self.urls)?;
            let envelope = self.request(&request).await?;
            decode(Value::Object(envelope), request.url())
        })
        .await
    }

    pub async fn teacher_schedule(
        &self,
        teacher_id: Option<i64>,
        date: Option<NaiveDate>,
    ) -> Result<Fetched<Schedule>, Error> {
        self.guard(async {
            let method = methods::get_teacher_schedule();
            let params = Params::new()
                .set_opt("teacher_id", teacher_id.or(self.defaults.teacher_id))
                .set("date", iso_date(date));
            let request = method.resolve(&params, &self.urls)?;
            let envelope = self.request(&request).await?;
            decode(Value::Object(envelope), request.url())
        })
        .await
    }

    pub async fn auditory_schedule(
        &self,
        auditory_id: Option<i64>,
        date: Option<NaiveDate>,
    ) -> Result<Fetched<Schedule>, Error> {
        self.guard(async {
            let method = methods::get_auditory_schedule();
            let params = Params::new()
                .set_opt("auditory_id", auditory_id.or(self.defaults.auditory_id))
                .set("date", iso_date(date));
            let request = method.resolve(&params, &self.urls)?;
            let envelope = self.request(&request).await?;
            decode(Value::Object(envelope), request.url())
        })
        .await
    }

    /// Suppression funnel every public operation routes through: errors
    /// whose dynamic kind is in the skip list are logged and converted into
    /// [`Fetched::Suppressed`] carrying the raw response payload.
    async fn guard<V>(
        &self,
        operation: impl Future<Output = Result<V, Error>>,
    ) -> Result<Fetched<V>, Error> {
        match operation.await {
            Ok(data) => Ok(Fetched::Data(data)),
            Err(error) if self.is_suppressed(error.kind()) => {
                warn!("suppressed error in request: {error}");
                Ok(Fetched::Suppressed(error.response().cloned()))
            }
            Err(error) => Err(error),
        }
    }

    fn is_suppressed(&self, kind: ErrorKind) -> bool {
        kind != ErrorKind::InvalidParams && self.skip.iter().any(|&skip| kind.is(skip))
    }

    /// Execute a resolved request and validate the response envelope.
    async fn request(&self, request: &ResolvedRequest) -> Result<Map<String, Value>, Error> {
        let url = request.url();
        debug!("request: {url}");

        let raw = self
            .transport
            .get(url)
            .await
            .map_err(|cause| Error::network(url, cause))?;
        debug!("response for {url}: [{}] {:?}", raw.status, raw.body);

        let is_json = raw
            .content_type
            .as_deref()
            .and_then(|value| value.split(';').next())
            .is_some_and(|mime| mime.trim() == "application/json");
        if !is_json {
            return Err(Error::response_type(url, raw.body));
        }

        let decoded = match serde_json::from_str::<Value>(&raw.body) {
            Ok(decoded) => decoded,
            Err(cause) => return Err(Error::json_decode(url, raw.body, cause)),
        };
        let envelope = match decoded {
            Value::Object(envelope) => envelope,
            other => {
                return Err(
                    Error::new(ErrorKind::ResponseValue, "response body is not a JSON object")
                        .with_url(url)
                        .with_response(other),
                );
            }
        };

        if envelope.get("error").is_some_and(is_truthy) {
            let text = envelope.get("text").and_then(Value::as_str);
            let kind = self.rules.classify(request.descriptor().error_kind, text);
            let message = match text {
                Some(text) => format!("API returned error: {text}"),
                None => "API returned error".to_owned(),
            };
            return Err(Error::new(kind, message)
                .with_url(url)
                .with_response(Value::Object(envelope)));
        }

        let expected = &request.descriptor().expected_keys;
        if let Some(key) = expected
            .iter()
            .map(|(_, key)| key)
            .find(|key| !envelope.contains_key(*key))
        {
            return Err(Error::new(
                ErrorKind::ResponseValue,
                format!("key `{key}` not found in response, expected keys: {expected:?}"),
            )
            .with_url(url)
            .with_response(Value::Object(envelope)));
        }

        if !(200..=226).contains(&raw.status) {
            return Err(
                Error::new(ErrorKind::Api, format!("bad API response [{}]", raw.status))
                    .with_url(url)
                    .with_response(Value::Object(envelope)),
            );
        }

        Ok(envelope)
    }
}

fn iso_date(date: Option<NaiveDate>) -> String {
    date.unwrap_or_else(|| Local::now().date_naive())
        .format("%Y-%m-%d")
        .to_string()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|number| number != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

fn take_field(
    envelope: &mut Map<String, Value>,
    method: &MethodDescriptor,
    field: &str,
    url: &str,
) -> Result<Value, Error> {
    let key = method.expected_keys.key(field).ok_or_else(|| {
        Error::new(
            ErrorKind::ResponseValue,
            format!("no expected key registered for `{field}`"),
        )
        .with_url(url)
    })?;
    envelope.remove(key).ok_or_else(|| {
        Error::new(
            ErrorKind::ResponseValue,
            format!(
                "key `{key}` not found in response, expected keys: {:?}",
                method.expected_keys
            ),
        )
        .with_url(url)
    })
}

/// Decode a payload value into an entity, re-wrapping validation failures
/// into the taxonomy.
fn decode<D: DeserializeOwned>(value: Value, url: &str) -> Result<D, Error> {
    serde_json::from_value(value).map_err(|cause| {
        Error::new(ErrorKind::ResponseValue, "response payload failed validation")
            .with_url(url)
            .with_cause(cause)
    })
}

/// Like [`decode`], but a null payload becomes an empty list (the service
/// returns `null` for searches with no matches).
fn decode_list<D: DeserializeOwned>(value: Value, url: &str) -> Result<Vec<D>, Error> {
    match value {
        Value::Null => Ok(Vec::new()),
        value => decode(value, url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_follows_the_envelope_convention() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("yes")));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(null)));
    }

    #[test]
    fn suppression_respects_the_taxonomy_but_never_invalid_params() {
        let api = RuzApi::with_transport(NoTransport).skip_errors([ErrorKind::ApiNotFound]);
        assert!(api.is_suppressed(ErrorKind::GroupNotFound));
        assert!(api.is_suppressed(ErrorKind::ApiNotFound));
        assert!(!api.is_suppressed(ErrorKind::ApiResponse));
        assert!(!api.is_suppressed(ErrorKind::Network));

        let api = RuzApi::with_transport(NoTransport).skip_errors([ErrorKind::InvalidParams]);
        assert!(!api.is_suppressed(ErrorKind::InvalidParams));
    }

    struct NoTransport;

    impl Transport for NoTransport {
        async fn get(
            &self,
            _url: &str,
        ) -> Result<crate::transport::RawResponse, crate::transport::TransportError> {
            Err(crate::transport::TransportError::Other(
                "no transport in unit tests".into(),
            ))
        }
    }
}
