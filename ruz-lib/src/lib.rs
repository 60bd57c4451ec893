//! Async typed client for the PolyTech (SPbSTU) "RUZ" class-schedule
//! service.
//!
//! Each remote endpoint is described declaratively by a
//! [`MethodDescriptor`]; a single request executor performs the call,
//! validates the response envelope, and maps server failures onto the
//! [`ErrorKind`] taxonomy. Specific kinds can be suppressed per client, in
//! which case operations yield [`Fetched::Suppressed`] with the raw error
//! payload instead of failing.
//!
//! ```no_run
//! use ruz_lib::{ErrorKind, Fetched, RuzApi};
//!
//! # async fn run() -> Result<(), ruz_lib::Error> {
//! let api = RuzApi::new();
//!
//! let faculties = api.faculties().await?;
//! if let Some(faculties) = faculties.as_data() {
//!     for mut faculty in faculties.clone() {
//!         let groups = faculty.groups(&api).await?;
//!         println!("{}: {:?} groups", faculty.name, groups.as_data().map(Vec::len));
//!     }
//! }
//!
//! // Treat "not found" as data instead of an error, for every concrete
//! // not-found kind.
//! let api = RuzApi::new().skip_errors([ErrorKind::ApiNotFound]);
//! if let Fetched::Suppressed(payload) = api.group(999).await? {
//!     println!("{payload:?}"); // Some({"error": true, "text": "..."})
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod method;
mod model;
mod transport;

pub use client::{Defaults, Fetched, RuzApi};
pub use error::{ClassifyRules, Error, ErrorKind};
pub use method::{
    methods, BaseUrls, ExpectedKeys, MethodDescriptor, Params, ResolvedRequest, UrlBase,
};
pub use model::{
    Auditory, Building, Day, Faculty, Group, GroupKind, Lesson, LessonType, Schedule,
    ScheduleOwner, Teacher, Week,
};
pub use transport::{HyperTransport, RawResponse, Transport, TransportError};
