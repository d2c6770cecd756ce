use std::collections::HashMap;

use tracing::{debug, trace};
use wgpu::naga;
use wgpu::naga::front::glsl::{Frontend, Options, ParseErrors};
use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};
use wgpu::naga::ShaderStage;

use crate::bindings::RESERVED_RESOLUTION;
use crate::error::CompileRejection;
use crate::types::{ShaderSourcePair, ShaderStageKind};
use crate::uniforms::{UniformLayout, UniformType};

/// Vertex attributes every program receives from the full-surface quad.
const VERTEX_INPUTS: &str = "layout(location = 0) in vec3 position;
layout(location = 1) in vec2 uv;
";

/// Redirects the WebGL fragment builtins onto explicit outputs and renames the
/// user's entry point so [`fragment_footer`] can wrap it.
const FRAGMENT_PRELUDE: &str = "layout(location = 0) out vec4 shaderlab_frag_color;
#define gl_FragColor shaderlab_frag_color
vec4 shaderlab_frag_coord;
#define gl_FragCoord shaderlab_frag_coord
#define main shaderlab_user_main
";

/// Real entry point. Flips `gl_FragCoord` to a bottom-left origin before
/// running the user's `main`. `resolution` is the block field holding the
/// drawing buffer size in this stage.
fn fragment_footer(resolution: &str) -> String {
    format!(
        "#undef main
#undef gl_FragCoord
void main() {{
    shaderlab_frag_coord = vec4(gl_FragCoord.x, {resolution}.y - gl_FragCoord.y, gl_FragCoord.z, gl_FragCoord.w);
    shaderlab_user_main();
}}
"
    )
}

const PRECISION_QUALIFIERS: [&str; 3] = ["lowp", "mediump", "highp"];

/// Attributes the quad provides; anything else cannot be fed.
const PROVIDED_ATTRIBUTES: [&str; 2] = ["position", "uv"];

/// Wrapped sources that passed CPU-side validation, ready for a backend.
#[derive(Debug, Clone)]
pub struct PreparedProgram {
    pub sources: ShaderSourcePair,
    pub vertex: String,
    pub fragment: String,
    pub layout: UniformLayout,
}

/// Cheap structural check run before any translation work.
pub fn precheck(sources: &ShaderSourcePair) -> Result<(), CompileRejection> {
    for stage in [ShaderStageKind::Vertex, ShaderStageKind::Fragment] {
        let text = sources.stage(stage);
        if !(text.contains("main") && text.contains('{') && text.contains('}')) {
            return Err(CompileRejection::MissingEntryPoint { stage });
        }
    }
    Ok(())
}

/// Translates a source pair to the device dialect and validates both stages.
///
/// Nothing here touches a GPU; a program that passes may still be rejected
/// by the device when the backend builds its pipeline.
pub fn prepare(sources: &ShaderSourcePair) -> Result<PreparedProgram, CompileRejection> {
    precheck(sources)?;

    let vertex = StageRewrite::new(ShaderStageKind::Vertex, sources.vertex(), None)?;
    let fragment = StageRewrite::new(
        ShaderStageKind::Fragment,
        sources.fragment(),
        Some(&vertex.varyings),
    )?;

    let mut builder = UniformLayout::builder();
    for stage in [&vertex, &fragment] {
        for (name, ty) in &stage.uniforms {
            builder.declare(stage.stage, name, *ty)?;
        }
    }
    let layout = builder.finish();

    let vertex_text = wrap(&vertex, &layout);
    let fragment_text = wrap(&fragment, &layout);
    validate(&vertex, &vertex_text)?;
    validate(&fragment, &fragment_text)?;

    debug!(
        uniforms = layout.members().len(),
        block_size = layout.size(),
        "shader pair validated"
    );

    Ok(PreparedProgram {
        sources: sources.clone(),
        vertex: vertex_text.text,
        fragment: fragment_text.text,
        layout,
    })
}

/// User source with WebGL-only declarations rewritten line by line.
///
/// Removed lines become comments so line numbers in diagnostics still match
/// what the user typed.
#[derive(Debug)]
struct StageRewrite {
    stage: ShaderStageKind,
    lines: Vec<String>,
    uniforms: Vec<(String, UniformType)>,
    varyings: HashMap<String, u32>,
}

impl StageRewrite {
    fn new(
        stage: ShaderStageKind,
        source: &str,
        upstream_varyings: Option<&HashMap<String, u32>>,
    ) -> Result<Self, CompileRejection> {
        let mut rewrite = Self {
            stage,
            lines: Vec::new(),
            uniforms: Vec::new(),
            varyings: upstream_varyings.cloned().unwrap_or_default(),
        };
        let mut in_block_comment = false;

        for (index, line) in source.lines().enumerate() {
            let line_number = index + 1;
            let trimmed = line.trim_start();

            if in_block_comment {
                in_block_comment = !line.contains("*/");
                rewrite.lines.push(line.to_string());
                continue;
            }
            if trimmed.starts_with("/*") && !trimmed.contains("*/") {
                in_block_comment = true;
                rewrite.lines.push(line.to_string());
                continue;
            }

            let code = trimmed.split("//").next().unwrap_or("").trim_end();
            let keyword = code.split_whitespace().next().unwrap_or("");
            let rewritten = match keyword {
                "#version" | "precision" => Some(comment_out(line)),
                "uniform" if code.ends_with(';') => {
                    rewrite.uniform(code, line_number)?;
                    Some(comment_out(line))
                }
                "varying" if code.ends_with(';') => Some(rewrite.varying(code, line_number)?),
                "attribute" if code.ends_with(';') => {
                    rewrite.attribute(code, line_number)?;
                    Some(comment_out(line))
                }
                _ => None,
            };
            rewrite
                .lines
                .push(rewritten.unwrap_or_else(|| line.to_string()));
        }

        Ok(rewrite)
    }

    fn uniform(&mut self, code: &str, line: usize) -> Result<(), CompileRejection> {
        let (type_name, names) = split_declaration(code, line, self.stage)?;
        let Some(ty) = UniformType::from_glsl(type_name) else {
            return Err(self.error(line, format!("unsupported uniform type '{type_name}'")));
        };
        for name in names {
            if name.contains('[') {
                return Err(self.error(line, format!("uniform arrays are not supported ('{name}')")));
            }
            self.uniforms.push((name.to_string(), ty));
        }
        Ok(())
    }

    fn varying(&mut self, code: &str, line: usize) -> Result<String, CompileRejection> {
        let (type_name, names) = split_declaration(code, line, self.stage)?;
        let direction = match self.stage {
            ShaderStageKind::Vertex => "out",
            ShaderStageKind::Fragment => "in",
        };
        let mut declarations = Vec::with_capacity(names.len());
        for name in names {
            let next = self.varyings.len() as u32;
            let location = *self.varyings.entry(name.to_string()).or_insert(next);
            declarations.push(format!(
                "layout(location = {location}) {direction} {type_name} {name};"
            ));
        }
        Ok(declarations.join(" "))
    }

    fn attribute(&self, code: &str, line: usize) -> Result<(), CompileRejection> {
        if self.stage != ShaderStageKind::Vertex {
            return Err(self.error(line, "attributes are only allowed in the vertex shader"));
        }
        let (_, names) = split_declaration(code, line, self.stage)?;
        match names.iter().find(|name| !PROVIDED_ATTRIBUTES.contains(*name)) {
            Some(name) => Err(self.error(
                line,
                format!("attribute '{name}' is not provided; only position and uv are available"),
            )),
            None => Ok(()),
        }
    }

    fn error(&self, line: usize, message: impl std::fmt::Display) -> CompileRejection {
        CompileRejection::failed(format!("{}:{line}:1: {message}", self.stage))
    }
}

fn comment_out(line: &str) -> String {
    format!("// {}", line.trim())
}

/// Splits `qualifier [precision] type name[, name...];` into type and names.
fn split_declaration(
    code: &str,
    line: usize,
    stage: ShaderStageKind,
) -> Result<(&str, Vec<&str>), CompileRejection> {
    let body = code.trim_end_matches(';');
    let mut tokens = body
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .skip(1)
        .filter(|token| !PRECISION_QUALIFIERS.contains(token));
    let type_name = tokens.next();
    let names: Vec<&str> = tokens.collect();
    match type_name {
        Some(type_name) if !names.is_empty() => Ok((type_name, names)),
        _ => Err(CompileRejection::failed(format!(
            "{stage}:{line}:1: malformed declaration"
        ))),
    }
}

/// A wrapped stage and the number of lines injected ahead of user code.
struct WrappedStage {
    text: String,
    prelude_lines: usize,
    user_lines: usize,
}

fn wrap(stage: &StageRewrite, layout: &UniformLayout) -> WrappedStage {
    let mut prelude = String::from("#version 450\n");
    let visible: Vec<&str> = stage.uniforms.iter().map(|(name, _)| name.as_str()).collect();
    prelude.push_str(&layout.block_declaration(&visible));
    for (name, _) in &stage.uniforms {
        if let Some(alias) = layout.alias(name) {
            prelude.push_str(&alias);
            prelude.push('\n');
        }
    }
    prelude.push_str(match stage.stage {
        ShaderStageKind::Vertex => VERTEX_INPUTS,
        ShaderStageKind::Fragment => FRAGMENT_PRELUDE,
    });

    let prelude_lines = prelude.lines().count();
    let mut text = prelude;
    for line in &stage.lines {
        text.push_str(line);
        text.push('\n');
    }
    if stage.stage == ShaderStageKind::Fragment {
        let resolution = layout
            .field_name(RESERVED_RESOLUTION, &visible)
            .unwrap_or_else(|| RESERVED_RESOLUTION.to_string());
        text.push_str(&fragment_footer(&resolution));
    }
    WrappedStage {
        text,
        prelude_lines,
        user_lines: stage.lines.len(),
    }
}

fn naga_stage(stage: ShaderStageKind) -> ShaderStage {
    match stage {
        ShaderStageKind::Vertex => ShaderStage::Vertex,
        ShaderStageKind::Fragment => ShaderStage::Fragment,
    }
}

fn validate(stage: &StageRewrite, wrapped: &WrappedStage) -> Result<(), CompileRejection> {
    trace!(stage = %stage.stage, source = %wrapped.text, "validating wrapped stage");

    let module = Frontend::default()
        .parse(&Options::from(naga_stage(stage.stage)), &wrapped.text)
        .map_err(|errors| parse_failure(stage.stage, wrapped, &errors))?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    validator.validate(&module).map_err(|err| {
        let span = err
            .spans()
            .map(|(span, _)| *span)
            .find(|span| span.is_defined());
        let message = error_chain(err.as_inner());
        CompileRejection::failed(locate(stage.stage, wrapped, span, &message))
    })?;
    Ok(())
}

fn parse_failure(
    stage: ShaderStageKind,
    wrapped: &WrappedStage,
    errors: &ParseErrors,
) -> CompileRejection {
    let lines: Vec<String> = errors
        .errors
        .iter()
        .map(|error| {
            let span = error.meta.is_defined().then_some(error.meta);
            locate(stage, wrapped, span, &error.kind.to_string())
        })
        .collect();
    CompileRejection::failed(lines.join("\n"))
}

/// Formats `stage:line:col: message`, mapping wrapped lines back onto the
/// user's source. Errors inside injected code carry no location.
fn locate(
    stage: ShaderStageKind,
    wrapped: &WrappedStage,
    span: Option<naga::Span>,
    message: &str,
) -> String {
    let Some(span) = span else {
        return format!("{stage}: {message}");
    };
    let location = span.location(&wrapped.text);
    let line = location.line_number as usize;
    match line.checked_sub(wrapped.prelude_lines) {
        Some(user_line) if user_line >= 1 && user_line <= wrapped.user_lines => {
            format!("{stage}:{user_line}:{}: {message}", location.line_position)
        }
        _ => format!("{stage}: {message}"),
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
