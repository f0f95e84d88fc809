//! MSBuild-style project file reader.

use quick_xml::{Reader, events::Event};

/// The parts of a project file the engine cares about. Values are raw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFile {
    pub sdk: Option<String>,
    /// First moniker of `TargetFramework` or `TargetFrameworks`.
    pub target_framework: Option<String>,
    pub run_command: Option<String>,
    pub run_arguments: Option<String>,
    pub run_working_directory: Option<String>,
    pub references: Vec<String>,
    pub compile_items: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Property {
    TargetFramework,
    TargetFrameworks,
    RunCommand,
    RunArguments,
    RunWorkingDirectory,
}

impl Property {
    fn from_name(name: &[u8]) -> Option<Self> {
        Some(match name {
            b"TargetFramework" => Self::TargetFramework,
            b"TargetFrameworks" => Self::TargetFrameworks,
            b"RunCommand" => Self::RunCommand,
            b"RunArguments" => Self::RunArguments,
            b"RunWorkingDirectory" => Self::RunWorkingDirectory,
            _ => return None,
        })
    }
}

/// Parse project XML. Returns the byte position and message on error.
pub fn parse(content: &str) -> Result<ProjectFile, (u64, String)> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut project = ProjectFile::default();
    let mut current: Option<Property> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(elem)) => {
                let name = elem.name();
                current = Property::from_name(name.as_ref());
                if name.as_ref() == b"Project" {
                    project.sdk = attribute(&elem, b"Sdk");
                } else {
                    collect_item(&mut project, name.as_ref(), &elem);
                }
            }
            Ok(Event::Empty(elem)) => {
                let name = elem.name();
                if name.as_ref() == b"Project" {
                    project.sdk = attribute(&elem, b"Sdk");
                } else {
                    collect_item(&mut project, name.as_ref(), &elem);
                }
            }
            Ok(Event::Text(text)) => {
                if let Some(property) = current {
                    let value = String::from_utf8_lossy(&text).trim().to_string();
                    if !value.is_empty() {
                        apply(&mut project, property, value);
                    }
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err((reader.error_position(), err.to_string())),
        }
    }

    Ok(project)
}

fn apply(project: &mut ProjectFile, property: Property, value: String) {
    match property {
        Property::TargetFramework => project.target_framework = Some(value),
        Property::TargetFrameworks => {
            if project.target_framework.is_none() {
                project.target_framework = value
                    .split(';')
                    .map(str::trim)
                    .find(|s| !s.is_empty())
                    .map(str::to_string);
            }
        }
        Property::RunCommand => project.run_command = Some(value),
        Property::RunArguments => project.run_arguments = Some(value),
        Property::RunWorkingDirectory => project.run_working_directory = Some(value),
    }
}

fn collect_item(project: &mut ProjectFile, name: &[u8], elem: &quick_xml::events::BytesStart<'_>) {
    let target = match name {
        b"ProjectReference" => &mut project.references,
        b"Compile" => &mut project.compile_items,
        _ => return,
    };
    if let Some(include) = attribute(elem, b"Include") {
        target.extend(
            include
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
    }
}

fn attribute(elem: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    elem.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .map(|attr| String::from_utf8_lossy(&attr.value).trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Version of a target framework moniker: `net6.0` → `6.0`,
/// `netcoreapp3.1` → `3.1`, `net48` → `4.8`, `net8.0-windows` → `8.0`.
pub fn framework_version(moniker: &str) -> Option<String> {
    let moniker = moniker.split('-').next().unwrap_or(moniker).trim();
    let version = moniker.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    if version.is_empty() || !version.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    if version.contains('.') {
        Some(version.to_string())
    } else {
        let digits: Vec<String> = version.chars().map(String::from).collect();
        Some(digits.join("."))
    }
}
