use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Options {
    #[command(subcommand)]
    pub command: Command,
    /// Pretty-print the JSON output
    #[clap(long)]
    pub pretty: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List all faculties
    Faculties,
    /// List all teachers
    Teachers,
    /// List all buildings
    Buildings,
    /// Fetch one group by id
    Group { id: i64 },
    /// Fetch one faculty by id
    Faculty { id: i64 },
    /// Fetch one building by id
    Building { id: i64 },
    /// Fetch one teacher by id
    Teacher { id: i64 },
    /// Search groups by name
    SearchGroups { name: String },
    /// Search teachers by name
    SearchTeachers { name: String },
    /// Search auditories by name
    SearchRooms { name: String },
    /// List the groups of a faculty
    FacultyGroups { id: i64 },
    /// List the auditories of a building
    BuildingRooms { id: i64 },
    /// Weekly schedule of a group
    GroupSchedule {
        id: i64,
        /// Any date inside the week to fetch (YYYY-MM-DD, today if omitted)
        #[clap(long)]
        date: Option<NaiveDate>,
    },
    /// Weekly schedule of a teacher
    TeacherSchedule {
        id: i64,
        /// Any date inside the week to fetch (YYYY-MM-DD, today if omitted)
        #[clap(long)]
        date: Option<NaiveDate>,
    },
    /// Weekly schedule of an auditory
    RoomSchedule {
        id: i64,
        /// Any date inside the week to fetch (YYYY-MM-DD, today if omitted)
        #[clap(long)]
        date: Option<NaiveDate>,
    },
}
