use std::collections::HashMap;

use crate::types::ObjectType;

/// Renderer-independent description of how a category is drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct Appearance {
    pub asset: &'static str,
    pub width: f32,
    pub height: f32,
}

impl Appearance {
    pub const fn new(asset: &'static str, width: f32, height: f32) -> Self {
        Self {
            asset,
            width,
            height,
        }
    }
}

/// Category to appearance mapping. Partial on purpose: a category without an
/// entry is not drawn and its updates are rejected.
#[derive(Debug, Clone)]
pub struct AppearanceTable {
    entries: HashMap<ObjectType, Appearance>,
}

impl AppearanceTable {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn with(mut self, object_type: ObjectType, appearance: Appearance) -> Self {
        self.entries.insert(object_type, appearance);
        self
    }

    pub fn get(&self, object_type: ObjectType) -> Option<&Appearance> {
        self.entries.get(&object_type)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AppearanceTable {
    /// Road users and signage. Street furniture is left out.
    fn default() -> Self {
        Self::empty()
            .with(ObjectType::Person, Appearance::new("pedestrian.png", 12.0, 12.0))
            .with(ObjectType::Bicycle, Appearance::new("bicycle.png", 10.0, 24.0))
            .with(ObjectType::Car, Appearance::new("car.png", 24.0, 48.0))
            .with(ObjectType::Motorcycle, Appearance::new("motorcycle.png", 10.0, 26.0))
            .with(ObjectType::Bus, Appearance::new("bus.png", 32.0, 110.0))
            .with(ObjectType::Truck, Appearance::new("truck.png", 30.0, 80.0))
            .with(ObjectType::TrafficLight, Appearance::new("traffic_light.png", 12.0, 12.0))
            .with(ObjectType::StopSign, Appearance::new("stop_sign.png", 12.0, 12.0))
    }
}
