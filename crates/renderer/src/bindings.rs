//! Parameter binding translator.
//!
//! Turns the editor's flat, loosely typed parameter list into typed uniform
//! values keyed by name. Slots are append-only: a name keeps its slot and its
//! last value for the lifetime of the engine, even after the parameter
//! disappears from the editor.

use std::collections::HashMap;

use tracing::{trace, warn};

use crate::types::{Parameter, ParameterKind, ParameterValue};

/// Uniform names driven by the render loop and the surface, never by users.
pub const RESERVED_TIME: &str = "time";
pub const RESERVED_RESOLUTION: &str = "resolution";

pub fn is_reserved(name: &str) -> bool {
    matches!(name, RESERVED_TIME | RESERVED_RESOLUTION)
}

/// A parameter value projected into a shape the graphics API understands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

/// Projects one parameter into a uniform value, or `None` for shapes we drop.
pub fn project(parameter: &Parameter) -> Option<UniformValue> {
    match (&parameter.value, parameter.kind) {
        (ParameterValue::Float(value), _) => Some(UniformValue::Float(*value)),
        (ParameterValue::Int(value), _) => Some(UniformValue::Int(*value)),
        (ParameterValue::Bool(value), _) => Some(UniformValue::Bool(*value)),
        (ParameterValue::Vec2(value), _) => Some(UniformValue::Vec2(*value)),
        (ParameterValue::Vec3(value), _) => Some(UniformValue::Vec3(*value)),
        // Colors are RGB; an alpha component from a picker is discarded.
        (ParameterValue::Vec4([r, g, b, _]), ParameterKind::Color) => {
            Some(UniformValue::Vec3([*r, *g, *b]))
        }
        (ParameterValue::Vec4(value), _) => Some(UniformValue::Vec4(*value)),
        (ParameterValue::Unsupported(_), _) => None,
    }
}

/// Stable index of a uniform slot inside a [`UniformMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

/// User uniform values with append-only slot identity.
#[derive(Debug, Clone, Default)]
pub struct UniformMap {
    slots: Vec<(String, UniformValue)>,
    index: HashMap<String, SlotId>,
}

impl UniformMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates `name`, returning its slot.
    pub fn set(&mut self, name: &str, value: UniformValue) -> SlotId {
        if let Some(slot) = self.index.get(name).copied() {
            self.slots[slot.0].1 = value;
            return slot;
        }
        let slot = SlotId(self.slots.len());
        self.slots.push((name.to_string(), value));
        self.index.insert(name.to_string(), slot);
        slot
    }

    pub fn get(&self, name: &str) -> Option<UniformValue> {
        self.index.get(name).map(|slot| self.slots[slot.0].1)
    }

    pub fn slot_of(&self, name: &str) -> Option<SlotId> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, UniformValue)> {
        self.slots.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

/// Applies `parameters` to `uniforms`, in order, so duplicate names resolve
/// last-write-wins. Reserved names and unsupported shapes are skipped.
pub fn bind(uniforms: &mut UniformMap, parameters: &[Parameter]) {
    for parameter in parameters {
        if is_reserved(&parameter.name) {
            warn!(
                name = %parameter.name,
                "parameter shadows a reserved uniform; ignoring"
            );
            continue;
        }
        match project(parameter) {
            Some(value) => {
                let slot = uniforms.set(&parameter.name, value);
                trace!(name = %parameter.name, ?slot, ?value, "bound parameter");
            }
            None => {
                warn!(
                    name = %parameter.name,
                    kind = ?parameter.kind,
                    "unsupported parameter shape; dropping"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tracing::{Level, Subscriber};
    use tracing_subscriber::layer::{Context as LayerContext, Layer, SubscriberExt};

    use super::*;

    fn param(name: &str, kind: ParameterKind, value: ParameterValue) -> Parameter {
        Parameter::new(name, kind, value)
    }

    /// Collects the level of every event emitted while installed.
    struct LevelRecorder(Arc<Mutex<Vec<Level>>>);

    impl<S: Subscriber> Layer<S> for LevelRecorder {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: LayerContext<'_, S>) {
            self.0.lock().unwrap().push(*event.metadata().level());
        }
    }

    #[test]
    fn scalars_pass_through() {
        let mut map = UniformMap::new();
        bind(
            &mut map,
            &[
                Parameter::float("glow", 0.5),
                param("steps", ParameterKind::Int, ParameterValue::Int(3)),
                param("on", ParameterKind::Bool, ParameterValue::Bool(true)),
            ],
        );
        assert_eq!(map.get("glow"), Some(UniformValue::Float(0.5)));
        assert_eq!(map.get("steps"), Some(UniformValue::Int(3)));
        assert_eq!(map.get("on"), Some(UniformValue::Bool(true)));
    }

    #[test]
    fn colors_become_three_component_vectors() {
        let mut map = UniformMap::new();
        bind(
            &mut map,
            &[
                param(
                    "tint",
                    ParameterKind::Color,
                    ParameterValue::Vec4([1.0, 0.5, 0.25, 1.0]),
                ),
                param(
                    "base",
                    ParameterKind::Color,
                    ParameterValue::Vec3([0.1, 0.2, 0.3]),
                ),
                param(
                    "plane",
                    ParameterKind::Vec4,
                    ParameterValue::Vec4([1.0, 2.0, 3.0, 4.0]),
                ),
            ],
        );
        assert_eq!(map.get("tint"), Some(UniformValue::Vec3([1.0, 0.5, 0.25])));
        assert_eq!(map.get("base"), Some(UniformValue::Vec3([0.1, 0.2, 0.3])));
        assert_eq!(
            map.get("plane"),
            Some(UniformValue::Vec4([1.0, 2.0, 3.0, 4.0]))
        );
    }

    #[test]
    fn unsupported_shapes_are_dropped() {
        let mut map = UniformMap::new();
        bind(
            &mut map,
            &[param(
                "label",
                ParameterKind::Float,
                ParameterValue::Unsupported(serde_json::json!("red")),
            )],
        );
        assert!(map.is_empty());
    }

    #[test]
    fn skipped_parameters_are_warned_about() {
        let levels = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(LevelRecorder(Arc::clone(&levels)));
        let mut map = UniformMap::new();
        tracing::subscriber::with_default(subscriber, || {
            bind(
                &mut map,
                &[
                    Parameter::float("time", 9.0),
                    param(
                        "label",
                        ParameterKind::Float,
                        ParameterValue::Unsupported(serde_json::json!("red")),
                    ),
                    Parameter::float("glow", 0.5),
                ],
            );
        });
        let levels = levels.lock().unwrap();
        assert_eq!(levels.iter().filter(|level| **level == Level::WARN).count(), 2);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn existing_names_keep_their_slot() {
        let mut map = UniformMap::new();
        bind(&mut map, &[Parameter::float("a", 1.0), Parameter::float("b", 2.0)]);
        let slot = map.slot_of("b");
        bind(&mut map, &[Parameter::float("b", 5.0)]);
        assert_eq!(map.slot_of("b"), slot);
        assert_eq!(map.get("b"), Some(UniformValue::Float(5.0)));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn duplicate_names_resolve_last_write_wins() {
        let mut map = UniformMap::new();
        bind(
            &mut map,
            &[Parameter::float("glow", 0.1), Parameter::float("glow", 0.9)],
        );
        assert_eq!(map.get("glow"), Some(UniformValue::Float(0.9)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn removed_parameters_keep_their_uniform() {
        let mut map = UniformMap::new();
        bind(&mut map, &[Parameter::float("glow", 0.5)]);
        bind(&mut map, &[]);
        assert_eq!(map.get("glow"), Some(UniformValue::Float(0.5)));
    }

    #[test]
    fn reserved_names_are_never_bound() {
        let mut map = UniformMap::new();
        bind(
            &mut map,
            &[
                Parameter::float("time", 99.0),
                param(
                    "resolution",
                    ParameterKind::Vec2,
                    ParameterValue::Vec2([1.0, 1.0]),
                ),
            ],
        );
        assert!(map.get("time").is_none());
        assert!(map.get("resolution").is_none());
    }
}
