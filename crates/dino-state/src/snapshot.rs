//! Decoded frame state.

use std::fmt::Write as _;

use crate::layout::flag;

/// The player-controlled actor.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Actor {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub is_airborne: bool,
    pub is_destroyed: bool,
}

/// Obstacle category.
///
/// On the wire a flag cell above 0.5 means [`ObstacleKind::Small`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObstacleKind {
    Small,
    Large,
}

impl ObstacleKind {
    /// Decode the kind flag cell.
    #[must_use]
    pub fn from_flag(cell: f32) -> Self {
        if flag(cell) {
            Self::Small
        } else {
            Self::Large
        }
    }

    /// Flag cell written by the simulation module.
    #[must_use]
    pub const fn to_flag(self) -> f32 {
        match self {
            Self::Small => 1.0,
            Self::Large => 0.0,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Large => "large",
        }
    }
}

/// One obstacle. Sizes are always finite and positive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Obstacle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub kind: ObstacleKind,
}

impl Obstacle {
    /// Right edge.
    #[must_use]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }
}

/// One fully decoded frame.
///
/// Built fresh for every decode and never mutated by the bridge afterwards.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub actor: Actor,
    /// Scrolling ground phase.
    pub ground_offset: f32,
    pub speed: f32,
    pub score: f32,
    pub high_score: f32,
    pub obstacles: Vec<Obstacle>,
}

impl Snapshot {
    /// First obstacle whose right edge is still ahead of `x`.
    #[must_use]
    pub fn nearest_obstacle_ahead(&self, x: f32) -> Option<&Obstacle> {
        self.obstacles
            .iter()
            .filter(|o| o.right() > x)
            .min_by(|a, b| a.x.total_cmp(&b.x))
    }

    /// Render as a single-line JSON object.
    #[must_use]
    pub fn to_json(&self) -> String {
        let a = &self.actor;
        let mut out = String::with_capacity(192 + self.obstacles.len() * 72);
        let _ = write!(
            out,
            r#"{{"actor":{{"x":{},"y":{},"width":{},"height":{},"is_airborne":{},"is_destroyed":{}}},"ground_offset":{},"speed":{},"score":{},"high_score":{},"obstacles":["#,
            json_num(a.x),
            json_num(a.y),
            json_num(a.width),
            json_num(a.height),
            a.is_airborne,
            a.is_destroyed,
            json_num(self.ground_offset),
            json_num(self.speed),
            json_num(self.score),
            json_num(self.high_score),
        );
        for (i, o) in self.obstacles.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(
                out,
                r#"{{"x":{},"y":{},"width":{},"height":{},"kind":"{}"}}"#,
                json_num(o.x),
                json_num(o.y),
                json_num(o.width),
                json_num(o.height),
                o.kind.as_str()
            );
        }
        out.push_str("]}");
        out
    }
}

/// JSON has no NaN or infinity.
fn json_num(value: f32) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        "null".to_string()
    }
}
