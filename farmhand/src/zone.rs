//! Declarative screen zones.
//!
//! Flows never hard-code client rectangles; they name a [`Zone`] that is
//! resolved against the *current* client area right before each operation,
//! so window resizes between steps are harmless.

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::geometry::{Rect, Size};

/// A declarative rectangle, resolved against the client area at use time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Zone {
    /// The whole client area.
    Full,
    /// Absolute client-relative rectangle.
    Fixed {
        left: i32,
        top: i32,
        width: u32,
        height: u32,
    },
    /// Centered within the client area.
    Centered { width: u32, height: u32 },
    /// Anchored to one or more window edges; the size extends inward.
    /// Missing horizontal/vertical anchors default to the left/top edge.
    Anchored {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        left: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        top: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        right: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bottom: Option<i32>,
        width: u32,
        height: u32,
    },
    /// Origin at a fraction of the client size, fixed pixel dimensions.
    Ratio {
        left_ratio: f32,
        top_ratio: f32,
        width: u32,
        height: u32,
    },
}

impl Zone {
    /// Resolve this zone into a concrete rectangle, clamped to the client
    /// area. A zone that ends up empty (zero-size client, off-screen
    /// anchor, degenerate ratio) is a data bug and reports `BadZone`.
    pub fn resolve(&self, client: Size) -> Result<Rect, AgentError> {
        let raw = match *self {
            Zone::Full => Rect::from_origin_size(0, 0, client.width, client.height),
            Zone::Fixed {
                left,
                top,
                width,
                height,
            } => Rect::from_origin_size(left, top, width, height),
            Zone::Centered { width, height } => {
                let left = (client.width as i32 - width as i32) / 2;
                let top = (client.height as i32 - height as i32) / 2;
                Rect::from_origin_size(left, top, width, height)
            }
            Zone::Anchored {
                left,
                top,
                right,
                bottom,
                width,
                height,
            } => {
                let l = match (left, right) {
                    (Some(l), _) => l,
                    (None, Some(r)) => client.width as i32 - r - width as i32,
                    (None, None) => 0,
                };
                let t = match (top, bottom) {
                    (Some(t), _) => t,
                    (None, Some(b)) => client.height as i32 - b - height as i32,
                    (None, None) => 0,
                };
                Rect::from_origin_size(l, t, width, height)
            }
            Zone::Ratio {
                left_ratio,
                top_ratio,
                width,
                height,
            } => {
                let left = (client.width as f32 * left_ratio).round() as i32;
                let top = (client.height as f32 * top_ratio).round() as i32;
                Rect::from_origin_size(left, top, width, height)
            }
        };

        let clamped = raw.clamp_to(client);
        if clamped.is_empty() {
            return Err(AgentError::BadZone(format!(
                "{self:?} within {}x{}",
                client.width, client.height
            )));
        }
        Ok(clamped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT: Size = Size {
        width: 1280,
        height: 720,
    };

    #[test]
    fn full_covers_client() {
        let r = Zone::Full.resolve(CLIENT).unwrap();
        assert_eq!(r, Rect::new(0, 0, 1280, 720));
    }

    #[test]
    fn fixed_is_literal() {
        let z = Zone::Fixed {
            left: 10,
            top: 20,
            width: 100,
            height: 40,
        };
        assert_eq!(z.resolve(CLIENT).unwrap(), Rect::new(10, 20, 110, 60));
    }

    #[test]
    fn centered_splits_margins() {
        let z = Zone::Centered {
            width: 280,
            height: 120,
        };
        assert_eq!(z.resolve(CLIENT).unwrap(), Rect::new(500, 300, 780, 420));
    }

    #[test]
    fn anchored_right_bottom_extends_inward() {
        let z = Zone::Anchored {
            left: None,
            top: None,
            right: Some(10),
            bottom: Some(20),
            width: 200,
            height: 100,
        };
        assert_eq!(z.resolve(CLIENT).unwrap(), Rect::new(1070, 600, 1270, 700));
    }

    #[test]
    fn anchored_defaults_to_top_left() {
        let z = Zone::Anchored {
            left: None,
            top: Some(5),
            right: None,
            bottom: None,
            width: 50,
            height: 50,
        };
        assert_eq!(z.resolve(CLIENT).unwrap(), Rect::new(0, 5, 50, 55));
    }

    #[test]
    fn ratio_rounds_origin() {
        let z = Zone::Ratio {
            left_ratio: 0.5,
            top_ratio: 0.25,
            width: 64,
            height: 32,
        };
        assert_eq!(z.resolve(CLIENT).unwrap(), Rect::new(640, 180, 704, 212));
    }

    #[test]
    fn resolve_is_pure() {
        let z = Zone::Ratio {
            left_ratio: 0.33,
            top_ratio: 0.66,
            width: 10,
            height: 10,
        };
        let a = z.resolve(CLIENT).unwrap();
        let b = z.resolve(CLIENT).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn outputs_stay_inside_client() {
        let zones = [
            Zone::Fixed {
                left: -40,
                top: -40,
                width: 5000,
                height: 5000,
            },
            Zone::Anchored {
                left: None,
                top: None,
                right: Some(-100),
                bottom: Some(0),
                width: 300,
                height: 300,
            },
        ];
        for z in zones {
            let r = z.resolve(CLIENT).unwrap();
            assert!(r.left >= 0 && r.top >= 0);
            assert!(r.right <= 1280 && r.bottom <= 720);
        }
    }

    #[test]
    fn empty_result_is_rejected() {
        let z = Zone::Fixed {
            left: 2000,
            top: 0,
            width: 10,
            height: 10,
        };
        assert!(matches!(z.resolve(CLIENT), Err(AgentError::BadZone(_))));
    }
}
