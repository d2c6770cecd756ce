//! std140 uniform block shared by both shader stages.
//!
//! Loose `uniform` declarations from user shaders are gathered into a single
//! block at `set = 0, binding = 0`. `time` and `resolution` always occupy the
//! first two members; user members follow in declaration order, vertex stage
//! first.
//!
//! The block has no instance name, so a stage reads its members as plain
//! globals and ordinary GLSL scoping applies. Members a stage does not declare
//! get a prefixed name there, and booleans are stored as `uint` behind a
//! prefixed field plus a `#define`.

use tracing::trace;

use crate::bindings::{UniformMap, UniformValue, RESERVED_RESOLUTION, RESERVED_TIME};
use crate::error::CompileRejection;
use crate::types::ShaderStageKind;

/// Prefix for block fields a stage cannot refer to by the user's name.
const HIDDEN_PREFIX: &str = "shaderlab_";
const BLOCK_NAME: &str = "ShaderlabUniforms";

/// GLSL types accepted in a loose `uniform` declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Float,
    Int,
    Uint,
    Bool,
    Vec2,
    Vec3,
    Vec4,
}

impl UniformType {
    pub fn from_glsl(name: &str) -> Option<Self> {
        Some(match name {
            "float" => Self::Float,
            "int" => Self::Int,
            "uint" => Self::Uint,
            "bool" => Self::Bool,
            "vec2" => Self::Vec2,
            "vec3" => Self::Vec3,
            "vec4" => Self::Vec4,
            _ => return None,
        })
    }

    pub fn glsl_name(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Bool => "bool",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
        }
    }

    /// Member type inside the block; booleans are stored as `uint`.
    fn member_type(self) -> &'static str {
        match self {
            Self::Bool => "uint",
            other => other.glsl_name(),
        }
    }

    fn size(self) -> usize {
        match self {
            Self::Float | Self::Int | Self::Uint | Self::Bool => 4,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 => 16,
        }
    }

    fn align(self) -> usize {
        match self {
            Self::Float | Self::Int | Self::Uint | Self::Bool => 4,
            Self::Vec2 => 8,
            Self::Vec3 | Self::Vec4 => 16,
        }
    }
}

impl std::fmt::Display for UniformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.glsl_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformMember {
    pub name: String,
    pub ty: UniformType,
    pub offset: usize,
}

impl UniformMember {
    /// Field name inside a stage that declares the uniforms in `visible`.
    fn field(&self, visible: &[&str]) -> String {
        if self.ty != UniformType::Bool && visible.contains(&self.name.as_str()) {
            self.name.clone()
        } else {
            format!("{HIDDEN_PREFIX}{}", self.name)
        }
    }
}

/// Byte layout of the uniform block for one compiled program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformLayout {
    members: Vec<UniformMember>,
    size: usize,
}

impl Default for UniformLayout {
    fn default() -> Self {
        Self::builder().finish()
    }
}

impl UniformLayout {
    pub fn builder() -> UniformLayoutBuilder {
        let mut builder = UniformLayoutBuilder {
            members: Vec::new(),
            cursor: 0,
        };
        builder.push(RESERVED_TIME, UniformType::Float);
        builder.push(RESERVED_RESOLUTION, UniformType::Vec2);
        builder
    }

    pub fn members(&self) -> &[UniformMember] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&UniformMember> {
        self.members.iter().find(|member| member.name == name)
    }

    /// Total block size in bytes, rounded up to 16.
    pub fn size(&self) -> usize {
        self.size
    }

    /// GLSL declaration of the block for a stage declaring `visible`.
    pub(crate) fn block_declaration(&self, visible: &[&str]) -> String {
        let mut text = format!("layout(std140, set = 0, binding = 0) uniform {BLOCK_NAME} {{\n");
        for member in &self.members {
            text.push_str(&format!(
                "    {} {};\n",
                member.ty.member_type(),
                member.field(visible)
            ));
        }
        text.push_str("};\n");
        text
    }

    /// Field name `name` is stored under in a stage declaring `visible`.
    pub(crate) fn field_name(&self, name: &str, visible: &[&str]) -> Option<String> {
        self.member(name).map(|member| member.field(visible))
    }

    /// `#define` exposing a boolean member as `bool`. Other types need none.
    pub(crate) fn alias(&self, name: &str) -> Option<String> {
        let member = self.member(name)?;
        (member.ty == UniformType::Bool)
            .then(|| format!("#define {name} ({} != 0u)", member.field(&[])))
    }

    /// Serialises the current values into a buffer of exactly [`Self::size`] bytes.
    ///
    /// Members without a value, or whose value cannot be converted to the
    /// declared type, are left zeroed.
    pub fn pack(&self, state: &UniformState) -> Vec<u8> {
        let mut bytes = vec![0u8; self.size];
        for member in &self.members {
            let value = match member.name.as_str() {
                RESERVED_TIME => Some(UniformValue::Float(state.reserved.time)),
                RESERVED_RESOLUTION => Some(UniformValue::Vec2(state.reserved.resolution)),
                name => state.user.get(name),
            };
            let Some(value) = value else {
                continue;
            };
            let slot = &mut bytes[member.offset..member.offset + member.ty.size()];
            if !write_member(slot, member.ty, value) {
                trace!(
                    name = %member.name,
                    declared = %member.ty,
                    ?value,
                    "uniform value does not match declaration; leaving zeroed"
                );
            }
        }
        bytes
    }
}

fn write_member(slot: &mut [u8], ty: UniformType, value: UniformValue) -> bool {
    use UniformValue as V;

    let scalar = match value {
        V::Float(v) => Some(v),
        V::Int(v) => Some(v as f32),
        V::Bool(v) => Some(if v { 1.0 } else { 0.0 }),
        _ => None,
    };

    match (ty, value) {
        (UniformType::Float, _) => match scalar {
            Some(v) => slot.copy_from_slice(bytemuck::bytes_of(&v)),
            None => return false,
        },
        (UniformType::Int, V::Int(v)) => slot.copy_from_slice(bytemuck::bytes_of(&v)),
        (UniformType::Int, _) => match scalar {
            Some(v) => slot.copy_from_slice(bytemuck::bytes_of(&(v as i32))),
            None => return false,
        },
        (UniformType::Uint, V::Int(v)) => {
            slot.copy_from_slice(bytemuck::bytes_of(&(v.max(0) as u32)))
        }
        (UniformType::Uint, _) => match scalar {
            Some(v) => slot.copy_from_slice(bytemuck::bytes_of(&(v.max(0.0) as u32))),
            None => return false,
        },
        (UniformType::Bool, _) => match scalar {
            Some(v) => slot.copy_from_slice(bytemuck::bytes_of(&u32::from(v != 0.0))),
            None => return false,
        },
        (UniformType::Vec2, V::Vec2(v)) => slot.copy_from_slice(bytemuck::cast_slice(&v)),
        (UniformType::Vec3, V::Vec3(v)) => slot.copy_from_slice(bytemuck::cast_slice(&v)),
        (UniformType::Vec4, V::Vec4(v)) => slot.copy_from_slice(bytemuck::cast_slice(&v)),
        _ => return false,
    }
    true
}

/// Accumulates declarations from both stages into a [`UniformLayout`].
#[derive(Debug)]
pub struct UniformLayoutBuilder {
    members: Vec<UniformMember>,
    cursor: usize,
}

impl UniformLayoutBuilder {
    /// Adds a declaration. Redeclaring a name with the same type is a no-op;
    /// a different type is a compile error.
    pub fn declare(
        &mut self,
        stage: ShaderStageKind,
        name: &str,
        ty: UniformType,
    ) -> Result<&mut Self, CompileRejection> {
        if let Some(existing) = self.members.iter().find(|member| member.name == name) {
            if existing.ty != ty {
                return Err(CompileRejection::failed(format!(
                    "{stage}: uniform '{name}' declared as {ty} but expected {}",
                    existing.ty
                )));
            }
            return Ok(self);
        }
        self.push(name, ty);
        Ok(self)
    }

    fn push(&mut self, name: &str, ty: UniformType) {
        let offset = self.cursor.next_multiple_of(ty.align());
        self.cursor = offset + ty.size();
        self.members.push(UniformMember {
            name: name.to_string(),
            ty,
            offset,
        });
    }

    pub fn finish(self) -> UniformLayout {
        UniformLayout {
            size: self.cursor.next_multiple_of(16),
            members: self.members,
        }
    }
}

/// Values driven by the engine itself rather than the parameter editor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReservedUniforms {
    /// Accumulated playing time in seconds.
    pub time: f32,
    /// Drawing buffer size in physical pixels.
    pub resolution: [f32; 2],
}

/// Everything needed to fill the uniform block for a frame.
#[derive(Debug, Clone, Default)]
pub struct UniformState {
    pub reserved: ReservedUniforms,
    pub user: UniformMap,
}

impl UniformState {
    pub fn set_time(&mut self, seconds: f32) {
        self.reserved.time = seconds;
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.reserved.resolution = [width as f32, height as f32];
    }
}
