//! Command dispatch

use std::path::PathBuf;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::application::ApplicationError;
use crate::cli::args::{Cli, Commands, ConfigCommands, Target};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_path, local_config_path, Settings};
use crate::domain::{ContentKind, SummaryTable};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let Some(command) = &cli.command else {
        return Err(CliError::Usage(
            "no command given, see --help".to_string(),
        ));
    };

    let settings = load_settings(cli)?;
    match command {
        Commands::Config { command } => cmd_config(cli, &settings, command),
        Commands::Completion { .. } => Ok(()),
        command => {
            let container = ServiceContainer::new(settings)?;
            run(cli, &container, command)
        }
    }
}

fn project_dir(cli: &Cli) -> CliResult<PathBuf> {
    match &cli.project_dir {
        Some(dir) => Ok(dir.clone()),
        None => std::env::current_dir()
            .map_err(|e| InfraError::io("determine current directory", e).into()),
    }
}

fn load_settings(cli: &Cli) -> CliResult<Settings> {
    let dir = project_dir(cli)?;
    let mut settings = Settings::load(Some(dir.as_path()))?;
    if let Some(catalog) = &cli.catalog {
        settings.catalog = Some(catalog.clone());
    }
    if let Some(progress) = &cli.progress {
        settings.progress = Some(progress.clone());
    }
    debug!("settings: {:?}", settings);
    Ok(settings)
}

fn course_id(settings: &Settings, course: &Option<String>) -> CliResult<String> {
    course
        .clone()
        .or_else(|| settings.default_course.clone())
        .ok_or_else(|| {
            CliError::InvalidArgs("no --course given and no default_course configured".into())
        })
}

fn emit<T: Serialize>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| ApplicationError::OperationFailed {
        context: "render JSON".to_string(),
        source: Box::new(e),
    })?;
    output::info(&text);
    Ok(())
}

#[instrument(level = "debug", skip(cli, container))]
fn run(cli: &Cli, container: &ServiceContainer, command: &Commands) -> CliResult<()> {
    let settings = container.settings.as_ref();
    let courses = container.courses.as_ref();

    match command {
        Commands::Map { target } => {
            let course = course_id(settings, &target.course)?;
            let (map, active) = courses.map_with_active(&course, &target.profile)?;
            if cli.json {
                let table = SummaryTable::default();
                let entries: Vec<_> = map.iter().map(|e| table.summarize(&e.node)).collect();
                return emit(&json!({ "map": entries, "active": active }));
            }
            output::header(&format!("{course} / {}", target.profile));
            for (idx, entry) in map.iter().enumerate() {
                let line = format!("{idx:>3} {} {}", entry.kind(), entry.id());
                if idx < active {
                    output::success_detail(&line);
                } else if idx == active {
                    output::current(&line);
                } else {
                    output::detail(&line);
                }
            }
            if active == map.len() {
                output::detail("(all visible content done)");
            }
            Ok(())
        }

        Commands::Active { target } => {
            let course = course_id(settings, &target.course)?;
            let active = courses.active(&course, &target.profile)?;
            if cli.json {
                return emit(&json!({ "active": active }));
            }
            output::info(&active);
            Ok(())
        }

        Commands::Depth { course } => {
            let course = course_id(settings, course)?;
            let depth = courses.max_depth(&course)?;
            if cli.json {
                return emit(&json!({ "max_depth": depth }));
            }
            output::info(&depth);
            Ok(())
        }

        Commands::Number { target, lesson } => {
            let course = course_id(settings, &target.course)?;
            let lesson_number = courses.lesson_number(&course, &target.profile, lesson)?;
            let quest_number = courses.quest_number(&course, &target.profile, lesson)?;
            if cli.json {
                return emit(&json!({
                    "lesson_number": lesson_number,
                    "quest_number": quest_number,
                }));
            }
            output::action("lesson", &number(lesson_number));
            output::action("quest", &number(quest_number));
            Ok(())
        }

        Commands::Choose {
            target,
            branching,
            identities,
        } => {
            let course = course_id(settings, &target.course)?;
            let choice = container
                .progress
                .choose(&course, &target.profile, branching, identities)?;
            if cli.json {
                return emit(&choice);
            }
            output::success(&format!("{} chose {} at {}", choice.profile, choice.choice, branching));
            output::detail(&format!("balance: {}", courses.balance(&target.profile)));
            Ok(())
        }

        Commands::Complete { target, lesson } => {
            let course = course_id(settings, &target.course)?;
            let done = container
                .progress
                .complete_lesson(&course, &target.profile, lesson)?;
            if cli.json {
                return emit(&done);
            }
            output::success(&format!("{} completed {}", done.profile, done.lesson));
            output::detail(&format!("balance: {}", courses.balance(&target.profile)));
            Ok(())
        }

        Commands::Units { lesson, from } => {
            let chunk = courses.units(lesson, from.as_deref())?;
            if cli.json {
                return emit(&chunk);
            }
            if let Some(location) = &chunk.location {
                output::action("location", location);
            }
            if let Some(npc) = &chunk.npc {
                output::action("npc", npc);
            }
            for unit in &chunk.units {
                output::detail(unit);
            }
            if chunk.finished {
                output::detail("(end of lesson)");
            } else if let Some(last) = &chunk.last {
                output::detail(&format!("continue with --from {last}"));
            }
            Ok(())
        }

        Commands::Tasks { lesson } => {
            let count = courses.task_count(lesson)?;
            if cli.json {
                return emit(&json!({ "tasks": count }));
            }
            output::info(&count);
            Ok(())
        }

        Commands::Tree { course } => {
            let course = course_id(settings, course)?;
            let tree = courses.graph(&course)?;
            output::info(&tree);
            Ok(())
        }

        Commands::Status { target } => status(cli, container, target),

        Commands::Config { .. } | Commands::Completion { .. } => Ok(()),
    }
}

fn status(cli: &Cli, container: &ServiceContainer, target: &Target) -> CliResult<()> {
    let course = course_id(&container.settings, &target.course)?;
    let status = container.courses.status(&course, &target.profile)?;
    if cli.json {
        return emit(&status);
    }

    let map = container.courses.map(&course, &target.profile)?;
    let lessons = map.iter().filter(|e| e.kind() == ContentKind::Lesson).count();
    output::header(&format!("{} / {}", status.course, status.profile));
    output::action("active", &format!("{} of {}", status.active, status.map.len()));
    output::action("max depth", &status.max_depth);
    output::action("lessons visible", &lessons);
    output::action("balance", &status.balance);
    if let Some(next) = status.map.get(status.active) {
        output::action("next", next);
    }
    Ok(())
}

fn number(n: Option<usize>) -> String {
    n.map(|n| n.to_string()).unwrap_or_else(|| "-1".to_string())
}

fn cmd_config(cli: &Cli, settings: &Settings, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            if cli.json {
                return emit(settings);
            }
            output::info(&settings.to_toml()?);
            Ok(())
        }
        ConfigCommands::Path => {
            match global_config_path() {
                Some(path) => output::action("global", &path.display()),
                None => output::warning("no global config directory on this platform"),
            }
            let local = local_config_path(&project_dir(cli)?);
            output::action("local", &local.display());
            output::action("catalog", &settings.catalog_path().display());
            output::action("progress", &settings.progress_path().display());
            Ok(())
        }
        ConfigCommands::Init { global } => {
            let path = if *global {
                global_config_path().ok_or_else(|| {
                    CliError::Usage("no global config directory on this platform".into())
                })?
            } else {
                local_config_path(&project_dir(cli)?)
            };
            if path.exists() {
                return Err(CliError::Usage(format!(
                    "config already exists: {}",
                    path.display()
                )));
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| InfraError::io(format!("create {}", parent.display()), e))?;
            }
            std::fs::write(&path, Settings::template())
                .map_err(|e| InfraError::io(format!("write {}", path.display()), e))?;
            output::success(&format!("created {}", path.display()));
            Ok(())
        }
    }
}
