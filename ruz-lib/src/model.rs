use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::client::{Fetched, RuzApi};
use crate::error::Error;
use crate::method::{methods, BaseUrls, Params};
use crate::transport::Transport;

/// A faculty (institute). Can list its own groups through the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faculty {
    pub id: i64,
    pub name: String,
    pub abbr: String,
    #[serde(skip)]
    groups: Option<Vec<Group>>,
}

impl Faculty {
    /// Groups of this faculty, fetched once and cached on the entity.
    pub async fn groups<T: Transport>(
        &mut self,
        api: &RuzApi<T>,
    ) -> Result<Fetched<Vec<Group>>, Error> {
        if let Some(groups) = &self.groups {
            return Ok(Fetched::Data(groups.clone()));
        }
        let fetched = api.faculty_groups(Some(self.id)).await?;
        if let Fetched::Data(groups) = &fetched {
            self.groups = Some(groups.clone());
        }
        Ok(fetched)
    }
}

/// Study form of a group, from the numeric `kind` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GroupKind {
    Baccalaureate,
    Magistracy,
    Specialty,
    Secondary,
    Unknown,
}

impl<'de> Deserialize<'de> for GroupKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match i64::deserialize(deserializer)? {
            0 => GroupKind::Baccalaureate,
            1 => GroupKind::Magistracy,
            2 => GroupKind::Specialty,
            6 => GroupKind::Secondary,
            _ => GroupKind::Unknown,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    /// Grade, 1 through 6.
    pub level: i64,
    #[serde(rename = "type")]
    pub group_type: String,
    pub kind: GroupKind,
    pub spec: String,
    #[serde(default)]
    pub faculty: Option<Faculty>,
}

impl Group {
    pub async fn schedule<T: Transport>(
        &self,
        api: &RuzApi<T>,
        date: Option<NaiveDate>,
    ) -> Result<Fetched<Schedule>, Error> {
        api.group_schedule(Some(self.id), date).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: i64,
    pub oid: i64,
    pub full_name: String,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub grade: String,
    pub chair: String,
}

impl Teacher {
    pub async fn schedule<T: Transport>(
        &self,
        api: &RuzApi<T>,
        date: Option<NaiveDate>,
    ) -> Result<Fetched<Schedule>, Error> {
        api.teacher_schedule(Some(self.id), date).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub id: i64,
    pub name: String,
    pub abbr: String,
    pub address: String,
    #[serde(default)]
    rooms: Option<Vec<Auditory>>,
}

impl Building {
    /// Auditories of this building, fetched once and cached on the entity.
    pub async fn auditories<T: Transport>(
        &mut self,
        api: &RuzApi<T>,
    ) -> Result<Fetched<Vec<Auditory>>, Error> {
        if let Some(rooms) = &self.rooms {
            return Ok(Fetched::Data(rooms.clone()));
        }
        let fetched = api.building_auditories(self.id).await?;
        if let Fetched::Data(rooms) = &fetched {
            self.rooms = Some(rooms.clone());
        }
        Ok(fetched)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auditory {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub building: Option<Building>,
}

impl Auditory {
    pub async fn schedule<T: Transport>(
        &self,
        api: &RuzApi<T>,
        date: Option<NaiveDate>,
    ) -> Result<Fetched<Schedule>, Error> {
        api.auditory_schedule(Some(self.id), date).await
    }
}

/// Kind of a lesson (lecture, lab, exam, ...), as reported by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonType {
    pub id: i64,
    pub name: String,
    pub abbr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub subject: String,
    pub subject_short: String,
    #[serde(rename = "type")]
    pub lesson_type: Option<i64>,
    pub additional_info: String,
    #[serde(deserialize_with = "de_time")]
    pub time_start: NaiveTime,
    #[serde(deserialize_with = "de_time")]
    pub time_end: NaiveTime,
    pub parity: i64,
    #[serde(rename = "typeObj")]
    pub type_obj: Option<LessonType>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub teachers: Option<Vec<Teacher>>,
    pub auditories: Vec<Auditory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Day {
    #[serde(
        deserialize_with = "de_weekday",
        serialize_with = "ser_weekday"
    )]
    pub weekday: Weekday,
    pub date: NaiveDate,
    #[serde(deserialize_with = "de_lessons")]
    pub lessons: Vec<Lesson>,
}

impl Day {
    /// ISO weekday number, 1 = Monday.
    pub fn iso_weekday(&self) -> u32 {
        self.weekday.number_from_monday()
    }
}

/// The week a schedule covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Week {
    #[serde(deserialize_with = "de_dotted_date")]
    pub date_start: NaiveDate,
    #[serde(deserialize_with = "de_dotted_date")]
    pub date_end: NaiveDate,
    pub is_odd: bool,
}

/// The single entity a schedule was fetched for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduleOwner<'a> {
    Group(&'a Group),
    Teacher(&'a Teacher),
    Auditory(&'a Auditory),
}

impl ScheduleOwner<'_> {
    pub fn id(&self) -> i64 {
        match self {
            ScheduleOwner::Group(group) => group.id,
            ScheduleOwner::Teacher(teacher) => teacher.id,
            ScheduleOwner::Auditory(auditory) => auditory.id,
        }
    }
}

/// One week of lessons for a group, teacher, or auditory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub week: Week,
    pub days: Vec<Day>,
    #[serde(default)]
    pub group: Option<Group>,
    #[serde(default)]
    pub teacher: Option<Teacher>,
    #[serde(default, rename = "room")]
    pub auditory: Option<Auditory>,
}

impl Schedule {
    /// The entity this schedule belongs to, if the response named one.
    pub fn owner(&self) -> Option<ScheduleOwner<'_>> {
        if let Some(group) = &self.group {
            Some(ScheduleOwner::Group(group))
        } else if let Some(teacher) = &self.teacher {
            Some(ScheduleOwner::Teacher(teacher))
        } else {
            self.auditory.as_ref().map(ScheduleOwner::Auditory)
        }
    }

    pub fn first_day(&self) -> Option<&Day> {
        self.days.first()
    }

    pub fn last_day(&self) -> Option<&Day> {
        self.days.last()
    }

    pub fn days_count(&self) -> usize {
        self.days.len()
    }

    pub fn day_on(&self, date: NaiveDate) -> Option<&Day> {
        self.days.iter().find(|day| day.date == date)
    }

    pub fn day_on_or_after(&self, date: NaiveDate) -> Option<&Day> {
        self.days.iter().find(|day| day.date >= date)
    }

    pub fn day_on_or_before(&self, date: NaiveDate) -> Option<&Day> {
        self.days.iter().rev().find(|day| day.date <= date)
    }

    pub fn day_with_weekday(&self, weekday: Weekday) -> Option<&Day> {
        self.days.iter().find(|day| day.weekday == weekday)
    }

    /// Like [`Schedule::day_on`], but failing with
    /// [`ErrorKind::DayNotFound`](crate::ErrorKind::DayNotFound) when the
    /// schedule has no such day.
    pub fn require_day(&self, date: NaiveDate) -> Result<&Day, Error> {
        self.day_on(date)
            .ok_or_else(|| Error::day_not_found(format!("no day on {date} in this schedule")))
    }

    /// Human-facing page for this schedule on the site. `None` when the
    /// response did not name an owner. Never fetched by the library.
    pub fn site_url(&self, urls: &BaseUrls) -> Option<String> {
        let date = self.week.date_start.format("%Y-%m-%d").to_string();
        let (method, id_name) = match self.owner()? {
            ScheduleOwner::Group(_) => (methods::site_group_schedule(), "group_id"),
            ScheduleOwner::Teacher(_) => (methods::site_teacher_schedule(), "teacher_id"),
            ScheduleOwner::Auditory(_) => (methods::site_auditory_schedule(), "auditory_id"),
        };
        let params = Params::new().set(id_name, self.owner()?.id()).set("date", date);
        method
            .resolve(&params, urls)
            .ok()
            .map(|request| request.url().to_owned())
    }

    /// Calendar-export variant of [`Schedule::site_url`]: the `/ical` suffix
    /// inserted before the query string. The site serves it for group and
    /// teacher schedules only.
    pub fn ical_url(&self, urls: &BaseUrls) -> Option<String> {
        if matches!(self.owner()?, ScheduleOwner::Auditory(_)) {
            return None;
        }
        let url = self.site_url(urls)?;
        Some(match url.find('?') {
            Some(query) => format!("{}/ical{}", &url[..query], &url[query..]),
            None => format!("{url}/ical"),
        })
    }
}

fn de_time<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    // The service emits "HH:MM".
    NaiveTime::parse_from_str(&raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
        .map_err(de::Error::custom)
}

fn de_dotted_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
    // Week boundaries arrive as "2019.09.02" while day dates are ISO.
    let raw = String::deserialize(deserializer)?;
    NaiveDate::parse_from_str(&raw.replace('.', "-"), "%Y-%m-%d").map_err(de::Error::custom)
}

fn de_weekday<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Weekday, D::Error> {
    // 1-based in the API, Monday first.
    match u8::deserialize(deserializer)? {
        1 => Ok(Weekday::Mon),
        2 => Ok(Weekday::Tue),
        3 => Ok(Weekday::Wed),
        4 => Ok(Weekday::Thu),
        5 => Ok(Weekday::Fri),
        6 => Ok(Weekday::Sat),
        7 => Ok(Weekday::Sun),
        other => Err(de::Error::custom(format!("weekday out of range: {other}"))),
    }
}

fn ser_weekday<S: Serializer>(weekday: &Weekday, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u32(weekday.number_from_monday())
}

fn de_lessons<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Lesson>, D::Error> {
    Ok(merge_duplicate_lessons(Vec::<Lesson>::deserialize(
        deserializer,
    )?))
}

/// Collapse consecutive duplicates — same subject, same start time, same
/// lesson-type id — into one lesson: auditory and teacher lists are unioned
/// preserving order without duplicates, and differing `additional_info`
/// strings are concatenated.
fn merge_duplicate_lessons(lessons: Vec<Lesson>) -> Vec<Lesson> {
    let mut merged: Vec<Lesson> = Vec::with_capacity(lessons.len());
    for lesson in lessons {
        match merged.last_mut() {
            Some(last) if is_duplicate(last, &lesson) => merge_into(last, lesson),
            _ => merged.push(lesson),
        }
    }
    merged
}

fn is_duplicate(a: &Lesson, b: &Lesson) -> bool {
    a.subject == b.subject
        && a.time_start == b.time_start
        && a.type_obj.as_ref().map(|kind| kind.id) == b.type_obj.as_ref().map(|kind| kind.id)
}

fn merge_into(target: &mut Lesson, other: Lesson) {
    for auditory in other.auditories {
        if !target.auditories.contains(&auditory) {
            target.auditories.push(auditory);
        }
    }
    match (&mut target.teachers, other.teachers) {
        (Some(current), Some(incoming)) => {
            for teacher in incoming {
                if !current.contains(&teacher) {
                    current.push(teacher);
                }
            }
        }
        (current @ None, incoming @ Some(_)) => *current = incoming,
        _ => {}
    }
    if target.additional_info != other.additional_info {
        target.additional_info.push('\n');
        target.additional_info.push_str(&other.additional_info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;

    fn lesson_json(subject: &str, start: &str, type_id: i64, auditories: &[i64]) -> serde_json::Value {
        json!({
            "subject": subject,
            "subject_short": subject,
            "type": 1,
            "additional_info": "",
            "time_start": start,
            "time_end": "11:40",
            "parity": 0,
            "typeObj": {"id": type_id, "name": "Лекции", "abbr": "Лек"},
            "groups": [],
            "teachers": null,
            "auditories": auditories
                .iter()
                .map(|id| json!({"id": id, "name": format!("1{id}")}))
                .collect::<Vec<_>>(),
        })
    }

    fn schedule_json(owner_field: &str, owner: serde_json::Value) -> serde_json::Value {
        json!({
            "week": {"date_start": "2019.09.02", "date_end": "2019.09.08", "is_odd": false},
            "days": [
                {
                    "weekday": 1,
                    "date": "2019-09-02",
                    "lessons": [lesson_json("Матанализ", "10:00", 2, &[100])],
                },
                {
                    "weekday": 3,
                    "date": "2019-09-04",
                    "lessons": [],
                },
            ],
            (owner_field): owner,
        })
    }

    fn group_json() -> serde_json::Value {
        json!({
            "id": 13501,
            "name": "13501/1",
            "level": 1,
            "type": "common",
            "kind": 0,
            "spec": "01.03.02",
            "faculty": {"id": 95, "name": "Институт компьютерных наук", "abbr": "ИКНТ"},
        })
    }

    #[test]
    fn consecutive_duplicate_lessons_merge_their_auditories() {
        let day: Day = serde_json::from_value(json!({
            "weekday": 1,
            "date": "2019-09-02",
            "lessons": [
                lesson_json("Физика", "10:00", 2, &[1, 2]),
                lesson_json("Физика", "10:00", 2, &[2, 3]),
            ],
        }))
        .unwrap();

        assert_eq!(day.lessons.len(), 1);
        let ids: Vec<i64> = day.lessons[0].auditories.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn lessons_differing_in_subject_time_or_type_stay_separate() {
        let day: Day = serde_json::from_value(json!({
            "weekday": 1,
            "date": "2019-09-02",
            "lessons": [
                lesson_json("Физика", "10:00", 2, &[1]),
                lesson_json("Физика", "12:00", 2, &[1]),
                lesson_json("Физика", "12:00", 3, &[1]),
                lesson_json("Химия", "12:00", 3, &[1]),
            ],
        }))
        .unwrap();
        assert_eq!(day.lessons.len(), 4);
    }

    #[test]
    fn merging_unions_teachers_and_joins_additional_info() {
        let teacher = |id: i64, name: &str| {
            json!({
                "id": id, "oid": id, "full_name": name, "first_name": name,
                "middle_name": "", "last_name": name, "grade": "", "chair": "",
            })
        };
        let mut first = lesson_json("Физика", "10:00", 2, &[1]);
        first["teachers"] = json!([teacher(1, "Иванов")]);
        first["additional_info"] = json!("поток А");
        let mut second = lesson_json("Физика", "10:00", 2, &[1]);
        second["teachers"] = json!([teacher(1, "Иванов"), teacher(2, "Петров")]);
        second["additional_info"] = json!("поток Б");

        let day: Day = serde_json::from_value(json!({
            "weekday": 1,
            "date": "2019-09-02",
            "lessons": [first, second],
        }))
        .unwrap();

        let lesson = &day.lessons[0];
        let names: Vec<&str> = lesson
            .teachers
            .as_ref()
            .unwrap()
            .iter()
            .map(|t| t.full_name.as_str())
            .collect();
        assert_eq!(names, vec!["Иванов", "Петров"]);
        assert_eq!(lesson.additional_info, "поток А\nпоток Б");
    }

    #[test]
    fn week_dates_accept_the_dotted_format() {
        let week: Week = serde_json::from_value(
            json!({"date_start": "2019.09.02", "date_end": "2019.09.08", "is_odd": true}),
        )
        .unwrap();
        assert_eq!(week.date_start, NaiveDate::from_ymd_opt(2019, 9, 2).unwrap());
        assert_eq!(week.date_end, NaiveDate::from_ymd_opt(2019, 9, 8).unwrap());
    }

    #[test]
    fn schedule_owner_is_the_single_entity_named_by_the_response() {
        let schedule: Schedule =
            serde_json::from_value(schedule_json("group", group_json())).unwrap();
        match schedule.owner() {
            Some(ScheduleOwner::Group(group)) => {
                assert_eq!(group.id, 13501);
                assert_eq!(group.kind, GroupKind::Baccalaureate);
            }
            other => panic!("expected group owner, got {other:?}"),
        }

        let schedule: Schedule = serde_json::from_value(
            schedule_json("room", json!({"id": 100, "name": "101"})),
        )
        .unwrap();
        assert!(matches!(
            schedule.owner(),
            Some(ScheduleOwner::Auditory(auditory)) if auditory.id == 100
        ));

        let mut ownerless = schedule_json("group", group_json());
        ownerless.as_object_mut().unwrap().remove("group");
        let schedule: Schedule = serde_json::from_value(ownerless).unwrap();
        assert!(schedule.owner().is_none());
    }

    #[test]
    fn day_search_honours_direction() {
        let schedule: Schedule =
            serde_json::from_value(schedule_json("group", group_json())).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2019, 9, 3).unwrap();

        assert!(schedule.day_on(tuesday).is_none());
        assert_eq!(
            schedule.day_on_or_after(tuesday).unwrap().weekday,
            Weekday::Wed
        );
        assert_eq!(
            schedule.day_on_or_before(tuesday).unwrap().weekday,
            Weekday::Mon
        );
        assert_eq!(
            schedule.day_with_weekday(Weekday::Wed).unwrap().iso_weekday(),
            3
        );
        assert_eq!(schedule.days_count(), 2);
        assert_eq!(schedule.first_day().unwrap().weekday, Weekday::Mon);
        assert_eq!(schedule.last_day().unwrap().weekday, Weekday::Wed);

        let missing = schedule.require_day(tuesday).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::DayNotFound);
    }

    #[test]
    fn site_and_ical_urls_come_from_the_site_templates() {
        let urls = BaseUrls::default();
        let schedule: Schedule =
            serde_json::from_value(schedule_json("group", group_json())).unwrap();
        assert_eq!(
            schedule.site_url(&urls).unwrap(),
            "https://ruz.spbstu.ru/faculty/ruz/groups/13501?date=2019-09-02"
        );
        assert_eq!(
            schedule.ical_url(&urls).unwrap(),
            "https://ruz.spbstu.ru/faculty/ruz/groups/13501/ical?date=2019-09-02"
        );

        let schedule: Schedule = serde_json::from_value(
            schedule_json("room", json!({"id": 100, "name": "101"})),
        )
        .unwrap();
        assert_eq!(
            schedule.site_url(&urls).unwrap(),
            "https://ruz.spbstu.ru/places/ruz/100?date=2019-09-02"
        );
        assert_eq!(schedule.ical_url(&urls), None);
    }
}
