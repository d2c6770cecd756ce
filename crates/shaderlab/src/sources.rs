use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use renderer::{Parameter, ProjectSnapshot};

use crate::cli::SourceArgs;

/// Files a project is assembled from. Explicit shader and parameter files
/// override the corresponding fields of the project JSON.
#[derive(Debug, Clone)]
pub struct SourceSet {
    project: Option<PathBuf>,
    fragment: Option<PathBuf>,
    vertex: Option<PathBuf>,
    params: Option<PathBuf>,
}

impl SourceSet {
    pub fn from_args(args: SourceArgs) -> Result<Self> {
        if args.project.is_none() && args.fragment.is_none() {
            bail!("nothing to load: pass a project file or --fragment");
        }
        Ok(Self {
            project: args.project,
            fragment: args.fragment,
            vertex: args.vertex,
            params: args.params,
        })
    }

    /// Every file the set reads, for change polling.
    pub fn files(&self) -> Vec<PathBuf> {
        [&self.project, &self.fragment, &self.vertex, &self.params]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// Display name: the project's name, else the fragment file stem.
    pub fn title(&self) -> String {
        self.project
            .as_deref()
            .or(self.fragment.as_deref())
            .and_then(Path::file_stem)
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "shaderlab".to_string())
    }

    pub fn load(&self) -> Result<ProjectSnapshot> {
        let mut project = match &self.project {
            Some(path) => read_project(path)?,
            None => ProjectSnapshot {
                name: self.title(),
                description: String::new(),
                vertex_shader: None,
                fragment_shader: String::new(),
                parameters: Vec::new(),
            },
        };
        if let Some(path) = &self.fragment {
            project.fragment_shader = read_text(path, "fragment shader")?;
        }
        if let Some(path) = &self.vertex {
            project.vertex_shader = Some(read_text(path, "vertex shader")?);
        }
        if let Some(path) = &self.params {
            project.parameters = read_parameters(path)?;
        }
        tracing::debug!(
            name = %project.name,
            parameters = project.parameters.len(),
            "sources loaded"
        );
        Ok(project)
    }
}

pub fn read_project(path: &Path) -> Result<ProjectSnapshot> {
    let contents = read_text(path, "project")?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse project file at {}", path.display()))
}

pub fn write_project(path: &Path, project: &ProjectSnapshot) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
    }
    let serialized =
        serde_json::to_string_pretty(project).context("failed to serialize project to JSON")?;
    fs::write(path, serialized + "\n")
        .with_context(|| format!("failed to write project file to {}", path.display()))
}

fn read_parameters(path: &Path) -> Result<Vec<Parameter>> {
    let contents = read_text(path, "parameters")?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse parameters file at {}", path.display()))
}

fn read_text(path: &Path, what: &str) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read {what} file at {}", path.display()))
}
