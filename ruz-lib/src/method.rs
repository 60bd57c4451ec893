use std::fmt;

use regex::Regex;
use url::form_urlencoded;

use crate::error::{Error, ErrorKind};

const PLACEHOLDER_PATTERN: &str = r"\{([^{}]+)\}";

/// Which root a resolved endpoint is joined to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlBase {
    /// The versioned JSON API root.
    Api,
    /// The human-facing site root, used only to compute display URLs.
    Site,
}

/// Roots the client resolves endpoints against.
///
/// Overridable so tests (or a mirror deployment) can point the client
/// elsewhere without touching the method table.
#[derive(Debug, Clone)]
pub struct BaseUrls {
    pub base_url: String,
    pub api_url: String,
}

impl Default for BaseUrls {
    fn default() -> Self {
        Self {
            base_url: "https://ruz.spbstu.ru".to_owned(),
            api_url: "https://ruz.spbstu.ru/api/v1/ruz".to_owned(),
        }
    }
}

/// Normalized mapping from a semantic field name to the literal JSON key
/// expected in a response body, e.g. `auditories_key -> rooms`.
///
/// Insertion order is preserved; normalization is idempotent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedKeys(Vec<(String, String)>);

impl ExpectedKeys {
    /// No keys are promised; the whole envelope is the payload.
    pub fn none() -> Self {
        Self(Vec::new())
    }

    /// A single key, field name derived from it.
    pub fn one(key: &str) -> Self {
        Self(vec![(field_name(key), key.to_owned())])
    }

    /// A list of keys, each becoming its own field/key pair.
    pub fn many(keys: &[&str]) -> Self {
        Self(keys.iter().map(|key| (field_name(key), key.to_string())).collect())
    }

    /// An explicit field-to-key mapping, field names normalized.
    pub fn map(pairs: &[(&str, &str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(field, key)| (field_name(field), key.to_string()))
                .collect(),
        )
    }

    /// Re-apply the field-name convention. Yields an equal mapping when the
    /// input is already normalized.
    pub fn normalize(self) -> Self {
        Self(
            self.0
                .into_iter()
                .map(|(field, key)| (field_name(&field), key))
                .collect(),
        )
    }

    /// Literal JSON key registered for `field` (with or without the `_key`
    /// suffix).
    pub fn key(&self, field: &str) -> Option<&str> {
        let field = field_name(field);
        self.0
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, key)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(field, key)| (field.as_str(), key.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn field_name(name: &str) -> String {
    if name.ends_with("_key") {
        name.to_owned()
    } else {
        format!("{name}_key")
    }
}

/// Ordered argument map supplied when resolving a method template.
///
/// A `None` value models an explicitly-null argument, which fails resolution
/// the same way a missing one does.
#[derive(Debug, Clone, Default)]
pub struct Params(Vec<(&'static str, Option<String>)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(self, name: &'static str, value: impl fmt::Display) -> Self {
        self.set_opt(name, Some(value))
    }

    pub fn set_opt(mut self, name: &'static str, value: Option<impl fmt::Display>) -> Self {
        self.0.push((name, value.map(|value| value.to_string())));
        self
    }

    fn get(&self, name: &str) -> Option<&Option<String>> {
        self.0
            .iter()
            .find(|(param, _)| *param == name)
            .map(|(_, value)| value)
    }

    fn iter(&self) -> impl Iterator<Item = (&'static str, Option<&str>)> + '_ {
        self.0.iter().map(|(name, value)| (*name, value.as_deref()))
    }
}

/// Declarative definition of one remote operation: endpoint template,
/// expected response keys, and the error kind to raise when the server
/// signals failure.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub name: &'static str,
    pub template: &'static str,
    pub expected_keys: ExpectedKeys,
    pub error_kind: ErrorKind,
    pub base: UrlBase,
    pub allow_extra_query: bool,
}

impl MethodDescriptor {
    pub fn new(name: &'static str, template: &'static str) -> Self {
        Self {
            name,
            template,
            expected_keys: ExpectedKeys::none(),
            error_kind: ErrorKind::ApiResponse,
            base: UrlBase::Api,
            allow_extra_query: false,
        }
    }

    pub fn keys(mut self, keys: ExpectedKeys) -> Self {
        self.expected_keys = keys.normalize();
        self
    }

    pub fn on_error(mut self, kind: ErrorKind) -> Self {
        self.error_kind = kind;
        self
    }

    pub fn site(mut self) -> Self {
        self.base = UrlBase::Site;
        self
    }

    pub fn extra_query(mut self) -> Self {
        self.allow_extra_query = true;
        self
    }

    /// Placeholder names extracted from the template, in order of first
    /// appearance, without duplicates.
    pub fn required_params(&self) -> Vec<&str> {
        let placeholder = Regex::new(PLACEHOLDER_PATTERN).unwrap();
        let mut names = Vec::new();
        for capture in placeholder.captures_iter(self.template) {
            if let Some(name) = capture.get(1) {
                if !names.contains(&name.as_str()) {
                    names.push(name.as_str());
                }
            }
        }
        names
    }

    /// Substitute `params` into the template and join the result to the
    /// descriptor's base URL. Fails before any network activity when a
    /// required parameter is missing or null, or when an unexpected one is
    /// supplied.
    pub fn resolve(&self, params: &Params, urls: &BaseUrls) -> Result<ResolvedRequest, Error> {
        let required = self.required_params();

        for name in &required {
            match params.get(name) {
                Some(Some(_)) => {}
                Some(None) => {
                    return Err(Error::invalid_params(format!(
                        "parameter `{name}` is unfilled, required parameters: {required:?}"
                    )));
                }
                None => {
                    return Err(Error::invalid_params(format!(
                        "parameter `{name}` not found, required parameters: {required:?}"
                    )));
                }
            }
        }

        let mut endpoint = self.template.to_owned();
        let mut query = Vec::new();
        for (name, value) in params.iter() {
            let Some(value) = value else {
                return Err(Error::invalid_params(format!(
                    "parameter `{name}` is unfilled, required parameters: {required:?}"
                )));
            };
            if required.contains(&name) {
                endpoint = endpoint.replace(&format!("{{{name}}}"), &encode(value));
            } else if self.allow_extra_query || required.is_empty() {
                query.push((name, value));
            } else {
                return Err(Error::invalid_params(format!(
                    "unexpected parameter `{name}={value}`, allowed parameters: {required:?}"
                )));
            }
        }

        if !query.is_empty() {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (name, value) in query {
                serializer.append_pair(name, value);
            }
            let separator = if endpoint.contains('?') { '&' } else { '?' };
            endpoint = format!("{endpoint}{separator}{}", serializer.finish());
        }

        let root = match self.base {
            UrlBase::Api => &urls.api_url,
            UrlBase::Site => &urls.base_url,
        };
        let url = if endpoint.starts_with('/') {
            format!("{root}{endpoint}")
        } else {
            format!("{root}/{endpoint}")
        };

        Ok(ResolvedRequest {
            url,
            descriptor: self.clone(),
        })
    }
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// A concrete, executable request: absolute URL plus the descriptor that
/// produced it (consulted again at response-validation time). Immutable once
/// constructed.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    url: String,
    descriptor: MethodDescriptor,
}

impl ResolvedRequest {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }
}

/// The method table: one descriptor per upstream endpoint.
pub mod methods {
    use super::{ExpectedKeys, MethodDescriptor};
    use crate::error::ErrorKind;

    pub fn get_faculties() -> MethodDescriptor {
        MethodDescriptor::new("get_faculties", "faculties").keys(ExpectedKeys::one("faculties"))
    }

    pub fn get_teachers() -> MethodDescriptor {
        MethodDescriptor::new("get_teachers", "teachers").keys(ExpectedKeys::one("teachers"))
    }

    pub fn get_buildings() -> MethodDescriptor {
        MethodDescriptor::new("get_buildings", "buildings").keys(ExpectedKeys::one("buildings"))
    }

    pub fn get_group() -> MethodDescriptor {
        MethodDescriptor::new("get_group", "group/{group_id}").on_error(ErrorKind::GroupNotFound)
    }

    pub fn get_faculty() -> MethodDescriptor {
        MethodDescriptor::new("get_faculty", "faculties/{faculty_id}")
            .on_error(ErrorKind::FacultyNotFound)
    }

    pub fn get_building() -> MethodDescriptor {
        MethodDescriptor::new("get_building", "buildings/{building_id}")
            .on_error(ErrorKind::BuildingNotFound)
    }

    pub fn get_teacher() -> MethodDescriptor {
        MethodDescriptor::new("get_teacher", "teachers/{teacher_id}")
            .on_error(ErrorKind::TeacherNotFound)
    }

    pub fn search_groups() -> MethodDescriptor {
        MethodDescriptor::new("search_groups", "search/groups?q={group_name}")
            .keys(ExpectedKeys::one("groups"))
    }

    pub fn search_teachers() -> MethodDescriptor {
        MethodDescriptor::new("search_teachers", "search/teachers?q={teacher_name}")
            .keys(ExpectedKeys::one("teachers"))
    }

    pub fn search_auditories() -> MethodDescriptor {
        MethodDescriptor::new("search_auditories", "search/rooms?q={auditory_name}")
            .keys(ExpectedKeys::map(&[("auditories", "rooms")]))
    }

    pub fn get_building_auditories() -> MethodDescriptor {
        MethodDescriptor::new("get_building_auditories", "buildings/{building_id}/rooms")
            .keys(ExpectedKeys::map(&[
                ("auditories", "rooms"),
                ("building", "building"),
            ]))
            .on_error(ErrorKind::BuildingNotFound)
    }

    pub fn get_faculty_groups() -> MethodDescriptor {
        MethodDescriptor::new("get_faculty_groups", "faculties/{faculty_id}/groups")
            .keys(ExpectedKeys::many(&["faculty", "groups"]))
            .on_error(ErrorKind::FacultyNotFound)
    }

    pub fn get_group_schedule() -> MethodDescriptor {
        MethodDescriptor::new("get_group_schedule", "scheduler/{group_id}?date={date}")
            .on_error(ErrorKind::GroupNotFound)
    }

    pub fn get_teacher_schedule() -> MethodDescriptor {
        MethodDescriptor::new(
            "get_teacher_schedule",
            "teachers/{teacher_id}/scheduler?date={date}",
        )
        .on_error(ErrorKind::TeacherNotFound)
    }

    pub fn get_auditory_schedule() -> MethodDescriptor {
        MethodDescriptor::new(
            "get_auditory_schedule",
            "buildings/0/rooms/{auditory_id}/scheduler?date={date}",
        )
        .on_error(ErrorKind::AuditoryNotFound)
    }

    // Site endpoints, used only to compute display URLs. The faculty slug in
    // the group URL is ignored by the site, any non-empty segment works.
    pub fn site_group_schedule() -> MethodDescriptor {
        MethodDescriptor::new(
            "site_group_schedule",
            "/faculty/ruz/groups/{group_id}?date={date}",
        )
        .site()
    }

    pub fn site_teacher_schedule() -> MethodDescriptor {
        MethodDescriptor::new("site_teacher_schedule", "/teachers/{teacher_id}?date={date}").site()
    }

    pub fn site_auditory_schedule() -> MethodDescriptor {
        MethodDescriptor::new(
            "site_auditory_schedule",
            "/places/ruz/{auditory_id}?date={date}",
        )
        .site()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_params_follow_first_appearance_order() {
        let method = MethodDescriptor::new("test", "a/{x}/b/{y}?q={x}");
        assert_eq!(method.required_params(), vec!["x", "y"]);
        assert!(methods::get_faculties().required_params().is_empty());
    }

    #[test]
    fn resolve_substitutes_placeholders_and_joins_the_api_root() {
        let request = methods::get_group_schedule()
            .resolve(
                &Params::new().set("group_id", 13501).set("date", "2019-09-02"),
                &BaseUrls::default(),
            )
            .unwrap();
        assert_eq!(
            request.url(),
            "https://ruz.spbstu.ru/api/v1/ruz/scheduler/13501?date=2019-09-02"
        );
    }

    #[test]
    fn resolve_joins_site_templates_to_the_site_root() {
        let request = methods::site_teacher_schedule()
            .resolve(
                &Params::new().set("teacher_id", 7).set("date", "2019-09-02"),
                &BaseUrls::default(),
            )
            .unwrap();
        assert_eq!(
            request.url(),
            "https://ruz.spbstu.ru/teachers/7?date=2019-09-02"
        );
    }

    #[test]
    fn resolve_rejects_missing_and_null_parameters() {
        let method = methods::get_group();
        let missing = method
            .resolve(&Params::new(), &BaseUrls::default())
            .unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::InvalidParams);
        assert!(missing.to_string().contains("group_id"));

        let null = method
            .resolve(
                &Params::new().set_opt("group_id", None::<i64>),
                &BaseUrls::default(),
            )
            .unwrap_err();
        assert_eq!(null.kind(), ErrorKind::InvalidParams);
        assert!(null.to_string().contains("unfilled"));
    }

    #[test]
    fn resolve_rejects_unexpected_parameters() {
        let error = methods::get_group()
            .resolve(
                &Params::new().set("group_id", 1).set("bogus", 2),
                &BaseUrls::default(),
            )
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidParams);
        assert!(error.to_string().contains("bogus"));
    }

    #[test]
    fn extras_become_query_parameters_when_permitted() {
        let templated = MethodDescriptor::new("test", "scheduler/{group_id}").extra_query();
        let request = templated
            .resolve(
                &Params::new().set("group_id", 1).set("lang", "ru"),
                &BaseUrls::default(),
            )
            .unwrap();
        assert_eq!(
            request.url(),
            "https://ruz.spbstu.ru/api/v1/ruz/scheduler/1?lang=ru"
        );

        // Templates without placeholders always route extras to the query.
        let plain = MethodDescriptor::new("test", "faculties");
        let request = plain
            .resolve(
                &Params::new().set("lang", "ru").set("page", 2),
                &BaseUrls::default(),
            )
            .unwrap();
        assert_eq!(
            request.url(),
            "https://ruz.spbstu.ru/api/v1/ruz/faculties?lang=ru&page=2"
        );
    }

    #[test]
    fn substituted_values_are_url_encoded() {
        let request = methods::search_groups()
            .resolve(
                &Params::new().set("group_name", "35/01"),
                &BaseUrls::default(),
            )
            .unwrap();
        assert_eq!(
            request.url(),
            "https://ruz.spbstu.ru/api/v1/ruz/search/groups?q=35%2F01"
        );
    }

    #[test]
    fn expected_keys_normalization_is_idempotent() {
        let variants = [
            ExpectedKeys::one("groups"),
            ExpectedKeys::many(&["faculty", "groups"]),
            ExpectedKeys::map(&[("auditories_key", "rooms"), ("building", "building")]),
        ];
        for keys in variants {
            assert_eq!(keys.clone().normalize(), keys);
        }
        assert_eq!(
            ExpectedKeys::map(&[("auditories", "rooms")]),
            ExpectedKeys::map(&[("auditories_key", "rooms")]),
        );
    }

    #[test]
    fn expected_keys_lookup_accepts_both_spellings() {
        let keys = ExpectedKeys::many(&["faculty", "groups"]);
        assert_eq!(keys.key("faculty"), Some("faculty"));
        assert_eq!(keys.key("faculty_key"), Some("faculty"));
        assert_eq!(keys.key("rooms"), None);
    }
}
