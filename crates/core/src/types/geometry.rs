//! Shapes and coordinates used by `inside`, area mappings and hotspots.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Point;
use crate::error::ModelError;

/// Area shapes, following the HTML image-map vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Shape {
    Default,
    Rect,
    Circle,
    Poly,
    Ellipse,
}

impl Shape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::Default => "default",
            Shape::Rect => "rect",
            Shape::Circle => "circle",
            Shape::Poly => "poly",
            Shape::Ellipse => "ellipse",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Shape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Shape::Default),
            "rect" => Ok(Shape::Rect),
            "circle" => Ok(Shape::Circle),
            "poly" => Ok(Shape::Poly),
            "ellipse" => Ok(Shape::Ellipse),
            other => Err(format!("unknown shape '{}'", other)),
        }
    }
}

/// A shape together with its coordinate list.
///
/// - `rect`: `x1, y1, x2, y2` (top-left, bottom-right)
/// - `circle`: `cx, cy, r`
/// - `ellipse`: `cx, cy, rx, ry`
/// - `poly`: `x1, y1, x2, y2, ...` with at least three vertices
/// - `default`: no coordinates, covers everything
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coords {
    shape: Shape,
    values: Vec<i64>,
}

impl Coords {
    pub fn new(shape: Shape, values: Vec<i64>) -> Result<Self, ModelError> {
        let invalid = |message: String| ModelError::InvalidCoords {
            shape: shape.to_string(),
            message,
        };
        match shape {
            Shape::Default => {}
            Shape::Rect | Shape::Ellipse if values.len() != 4 => {
                return Err(invalid(format!("expected 4 values, got {}", values.len())));
            }
            Shape::Circle if values.len() != 3 => {
                return Err(invalid(format!("expected 3 values, got {}", values.len())));
            }
            Shape::Circle if values[2] < 0 => {
                return Err(invalid("radius must not be negative".to_string()));
            }
            Shape::Poly if values.len() < 6 || values.len() % 2 != 0 => {
                return Err(invalid(format!(
                    "expected an even number of values describing at least 3 vertices, got {}",
                    values.len()
                )));
            }
            _ => {}
        }
        Ok(Coords { shape, values })
    }

    /// Parse a comma separated coordinate list such as `"0,0,5,3"`.
    pub fn parse(shape: Shape, text: &str) -> Result<Self, ModelError> {
        let trimmed = text.trim();
        let values = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed
                .split(',')
                .map(|v| v.trim().parse::<i64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ModelError::InvalidCoords {
                    shape: shape.to_string(),
                    message: e.to_string(),
                })?
        };
        Coords::new(shape, values)
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// Whether `point` lies within the area. Boundaries are inclusive for
    /// rectangles, circles and ellipses.
    pub fn inside(&self, point: &Point) -> bool {
        let (x, y) = (point.x, point.y);
        let v = &self.values;
        match self.shape {
            Shape::Default => true,
            Shape::Rect => {
                let (left, right) = (v[0].min(v[2]), v[0].max(v[2]));
                let (top, bottom) = (v[1].min(v[3]), v[1].max(v[3]));
                x >= left && x <= right && y >= top && y <= bottom
            }
            Shape::Circle => {
                let dx = x as i128 - v[0] as i128;
                let dy = y as i128 - v[1] as i128;
                let r = v[2] as i128;
                // r² always fits; a distance whose square does not is outside
                dx.checked_mul(dx)
                    .and_then(|dx2| dy.checked_mul(dy).and_then(|dy2| dx2.checked_add(dy2)))
                    .is_some_and(|d2| d2 <= r * r)
            }
            Shape::Ellipse => {
                let (rx, ry) = (v[2] as f64, v[3] as f64);
                if rx == 0.0 || ry == 0.0 {
                    return false;
                }
                let dx = (x as f64 - v[0] as f64) / rx;
                let dy = (y as f64 - v[1] as f64) / ry;
                dx * dx + dy * dy <= 1.0
            }
            Shape::Poly => {
                let vertices: Vec<(f64, f64)> = v
                    .chunks(2)
                    .map(|c| (c[0] as f64, c[1] as f64))
                    .collect();
                point_in_polygon(x as f64, y as f64, &vertices)
            }
        }
    }
}

/// Even-odd rule: count how many polygon edges a horizontal ray from the
/// point crosses.
fn point_in_polygon(x: f64, y: f64, vertices: &[(f64, f64)]) -> bool {
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (xi, yi) = vertices[i];
        let (xj, yj) = vertices[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

impl fmt::Display for Coords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", joined.join(","))
    }
}
