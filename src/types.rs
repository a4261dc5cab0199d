use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Mul};

use serde::Serialize;
use strum::{Display, EnumIter};

/// Opaque identifier the tracker assigns to an object. Always the JSON object
/// key of a `TRACKING` frame, so it is kept as text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category codes emitted by the tracker's detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Person,
    Bicycle,
    Car,
    Motorcycle,
    Bus,
    Truck,
    TrafficLight,
    FireHydrant,
    StopSign,
    ParkingMeter,
}

impl ObjectType {
    pub fn from_code(code: i64) -> Option<Self> {
        let object_type = match code {
            0 => ObjectType::Person,
            1 => ObjectType::Bicycle,
            2 => ObjectType::Car,
            3 => ObjectType::Motorcycle,
            5 => ObjectType::Bus,
            7 => ObjectType::Truck,
            9 => ObjectType::TrafficLight,
            10 => ObjectType::FireHydrant,
            11 => ObjectType::StopSign,
            12 => ObjectType::ParkingMeter,
            _ => return None,
        };
        Some(object_type)
    }

    pub fn code(self) -> i64 {
        match self {
            ObjectType::Person => 0,
            ObjectType::Bicycle => 1,
            ObjectType::Car => 2,
            ObjectType::Motorcycle => 3,
            ObjectType::Bus => 5,
            ObjectType::Truck => 7,
            ObjectType::TrafficLight => 9,
            ObjectType::FireHydrant => 10,
            ObjectType::StopSign => 11,
            ObjectType::ParkingMeter => 12,
        }
    }
}

/// A point or vector in scene space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Vec2 {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// What the renderer needs to place a sprite.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose {
    pub position: Vec2,
    /// Radians.
    pub rotation: f64,
}

impl Pose {
    pub fn new(position: Vec2, rotation: f64) -> Self {
        Self { position, rotation }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedUpdate {
    pub object_type: ObjectType,
    pub position: Vec2,
    pub rotation: f64,
    /// Units per second.
    pub velocity: Vec2,
}

/// Every object the tracker currently sees, as of one `TRACKING` frame.
pub type TrackedUpdateBatch = BTreeMap<ObjectId, TrackedUpdate>;

/// Milliseconds since the session started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn millis_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}
