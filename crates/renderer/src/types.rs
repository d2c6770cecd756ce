use serde::{Deserialize, Serialize};

/// Shader stage a source text belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStageKind {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStageKind::Vertex => f.write_str("vertex"),
            ShaderStageKind::Fragment => f.write_str("fragment"),
        }
    }
}

/// Vertex and fragment text submitted together for compilation.
///
/// A pair is an immutable value: once handed to the engine it is only ever
/// cloned, compared, or kept as the last-known-good source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderSourcePair {
    vertex: String,
    fragment: String,
}

impl ShaderSourcePair {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    /// Built-in pair that seeds the last-known-good slot.
    ///
    /// It renders a UV gradient, so a user who only ever submitted broken
    /// shaders still sees that the surface is alive.
    pub fn fallback() -> Self {
        Self::new(FALLBACK_VERTEX_SHADER, FALLBACK_FRAGMENT_SHADER)
    }

    /// Shaders a freshly created project starts with.
    pub fn starter() -> Self {
        Self::new(DEFAULT_VERTEX_SHADER, STARTER_FRAGMENT_SHADER)
    }

    pub fn vertex(&self) -> &str {
        &self.vertex
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn stage(&self, stage: ShaderStageKind) -> &str {
        match stage {
            ShaderStageKind::Vertex => &self.vertex,
            ShaderStageKind::Fragment => &self.fragment,
        }
    }
}

/// Kind tag attached to a user parameter by the parameter editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Float,
    Int,
    Bool,
    Color,
    Vec2,
    Vec3,
    Vec4,
}

/// Loosely typed parameter value as it arrives from the editor or a project file.
///
/// Arrays of the wrong length (or anything else that is not a number, a
/// boolean, or a 2/3/4-element float array) land in `Unsupported` and are
/// dropped by the binding translator instead of failing to load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Unsupported(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    pub value: ParameterValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f32>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParameterKind, value: ParameterValue) -> Self {
        Self {
            name: name.into(),
            kind,
            value,
            min: None,
            max: None,
            step: None,
        }
    }

    pub fn float(name: impl Into<String>, value: f32) -> Self {
        Self::new(name, ParameterKind::Float, ParameterValue::Float(value))
    }

    pub fn with_range(mut self, min: f32, max: f32, step: f32) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self.step = Some(step);
        self
    }
}

/// What the persistence collaborator hands over on load and receives on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub vertex_shader: Option<String>,
    pub fragment_shader: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl ProjectSnapshot {
    /// A new, unsaved project seeded with the starter shaders.
    pub fn starter(name: impl Into<String>) -> Self {
        let sources = ShaderSourcePair::starter();
        Self {
            name: name.into(),
            description: String::new(),
            vertex_shader: Some(sources.vertex().to_string()),
            fragment_shader: sources.fragment().to_string(),
            parameters: Vec::new(),
        }
    }

    /// Source pair for this project; a missing vertex shader means the default one.
    pub fn sources(&self) -> ShaderSourcePair {
        let vertex = self
            .vertex_shader
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or(DEFAULT_VERTEX_SHADER);
        ShaderSourcePair::new(vertex, self.fragment_shader.as_str())
    }
}

/// GPU adapter power preference requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuPowerPreference {
    Low,
    #[default]
    High,
}

/// Presentation pacing for windowed surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VsyncMode {
    /// Fifo presentation; frames pace to the display refresh.
    #[default]
    On,
    /// Prefer Immediate, then Mailbox, for the lowest latency.
    Off,
}

/// Start-up configuration for a [`crate::ShaderEngine`] and its GPU backend.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Drawing buffer size in physical pixels.
    pub surface_size: (u32, u32),
    pub power: GpuPowerPreference,
    pub vsync: VsyncMode,
    /// Attach with the render loop paused instead of playing.
    pub start_paused: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            surface_size: (1280, 720),
            power: GpuPowerPreference::default(),
            vsync: VsyncMode::default(),
            start_paused: false,
        }
    }
}

pub const FALLBACK_VERTEX_SHADER: &str = r"void main() {
  gl_Position = vec4(position, 1.0);
}
";

pub const FALLBACK_FRAGMENT_SHADER: &str = r"precision mediump float;
uniform vec2 resolution;
void main() {
  vec2 uv = gl_FragCoord.xy / resolution.xy;
  gl_FragColor = vec4(uv.x, 0.1, uv.y, 1.0);
}
";

pub const DEFAULT_VERTEX_SHADER: &str = r"void main() {
  gl_Position = vec4(position, 1.0);
}
";

pub const STARTER_FRAGMENT_SHADER: &str = r"// Fragment shader
precision mediump float;

// Built-in uniforms
uniform float time;      // Animation time in seconds
uniform vec2 resolution; // Viewport resolution (width, height)

// Add your custom uniforms here:
// uniform float myParam;

void main() {
  vec2 uv = gl_FragCoord.xy / resolution.xy;

  vec3 color = 0.5 + 0.5 * cos(time * 0.5 + uv.xyx * 6.0 + vec3(0.0, 2.0, 4.0));

  float d = length(uv - 0.5) * 2.0;
  vec3 color2 = vec3(smoothstep(0.5, 0.2, d + sin(time) * 0.2));

  color = mix(color, color2, 0.5);

  gl_FragColor = vec4(color, 1.0);
}
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_values_deserialize_by_shape() {
        let params: Vec<Parameter> = serde_json::from_str(
            r#"[
                {"name": "glow", "type": "float", "value": 0.5},
                {"name": "steps", "type": "int", "value": 4},
                {"name": "enabled", "type": "bool", "value": true},
                {"name": "tint", "type": "color", "value": [1.0, 0.5, 0.25]},
                {"name": "offset", "type": "vec2", "value": [0.1, 0.2]},
                {"name": "broken", "type": "vec2", "value": [0.1]}
            ]"#,
        )
        .unwrap();

        assert_eq!(params[0].value, ParameterValue::Float(0.5));
        assert_eq!(params[1].value, ParameterValue::Int(4));
        assert_eq!(params[2].value, ParameterValue::Bool(true));
        assert_eq!(params[3].value, ParameterValue::Vec3([1.0, 0.5, 0.25]));
        assert_eq!(params[4].value, ParameterValue::Vec2([0.1, 0.2]));
        assert!(matches!(params[5].value, ParameterValue::Unsupported(_)));
    }

    #[test]
    fn project_without_vertex_shader_uses_default() {
        let project: ProjectSnapshot = serde_json::from_str(
            r#"{"name": "demo", "fragmentShader": "void main() { gl_FragColor = vec4(1.0); }"}"#,
        )
        .unwrap();
        let sources = project.sources();
        assert_eq!(sources.vertex(), DEFAULT_VERTEX_SHADER);
        assert!(project.parameters.is_empty());
    }
}
