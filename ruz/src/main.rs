use clap::Parser;
use ruz_lib::{Fetched, RuzApi};
use serde::Serialize;

use crate::options::{Command, Options};

mod options;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    env_logger::init();
    let args = Options::parse();
    let api = RuzApi::new();

    let output = match args.command {
        Command::Faculties => render(api.faculties().await?, args.pretty)?,
        Command::Teachers => render(api.teachers().await?, args.pretty)?,
        Command::Buildings => render(api.buildings().await?, args.pretty)?,
        Command::Group { id } => render(api.group(id).await?, args.pretty)?,
        Command::Faculty { id } => render(api.faculty(id).await?, args.pretty)?,
        Command::Building { id } => render(api.building(id).await?, args.pretty)?,
        Command::Teacher { id } => render(api.teacher(id).await?, args.pretty)?,
        Command::SearchGroups { name } => render(api.search_groups(&name).await?, args.pretty)?,
        Command::SearchTeachers { name } => {
            render(api.search_teachers(&name).await?, args.pretty)?
        }
        Command::SearchRooms { name } => render(api.search_auditories(&name).await?, args.pretty)?,
        Command::FacultyGroups { id } => render(api.faculty_groups(Some(id)).await?, args.pretty)?,
        Command::BuildingRooms { id } => render(api.building_auditories(id).await?, args.pretty)?,
        Command::GroupSchedule { id, date } => {
            render(api.group_schedule(Some(id), date).await?, args.pretty)?
        }
        Command::TeacherSchedule { id, date } => {
            render(api.teacher_schedule(Some(id), date).await?, args.pretty)?
        }
        Command::RoomSchedule { id, date } => {
            render(api.auditory_schedule(Some(id), date).await?, args.pretty)?
        }
    };
    println!("{output}");

    Ok(())
}

fn render<T: Serialize>(fetched: Fetched<T>, pretty: bool) -> Result<String, Error> {
    let result = match fetched {
        Fetched::Data(data) => to_json(&data, pretty)?,
        Fetched::Suppressed(payload) => to_json(&payload, pretty)?,
    };
    Ok(result)
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, serde_json::Error> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    RequestFailed(#[from] ruz_lib::Error),
    #[error(transparent)]
    JsonSerializeFailed(#[from] serde_json::Error),
}
