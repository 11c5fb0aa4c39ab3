//! Calculation functions behind the two endpoints.
//!
//! Both are pure and total over validated input: non-finite results are
//! returned as produced by IEEE-754 arithmetic.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Side-angle-side input for `/calculate-triangle`
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriangleInput {
    pub side_a: f64,
    pub side_b: f64,
    /// Included angle in degrees
    pub angle: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriangleResponse {
    pub area: f64,
}

/// Input for `/calculate-expression`
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ExpressionInput {
    pub a: f64,
    /// Validated as a positive integer before it gets here
    pub n: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExpressionResponse {
    pub result: f64,
}

/// Area of a triangle from two sides and the included angle in degrees.
pub fn triangle_area(side_a: f64, side_b: f64, angle_degrees: f64) -> f64 {
    let radians = angle_degrees * PI / 180.0;
    0.5 * side_a * side_b * radians.sin()
}

/// Product `(a + 1)(a + 2)...(a + n + 1)`, i.e. `n + 1` factors.
pub fn expression_product(a: f64, n: u64) -> f64 {
    (0..=n).fold(1.0, |acc, i| acc * (a + i as f64 + 1.0))
}

impl TriangleInput {
    pub fn area(&self) -> TriangleResponse {
        TriangleResponse {
            area: triangle_area(self.side_a, self.side_b, self.angle),
        }
    }
}

impl ExpressionInput {
    pub fn evaluate(&self) -> ExpressionResponse {
        // The validator guarantees an integer in [1, MAX_EXPRESSION_N].
        let n = self.n as u64;
        tracing::debug!(a = self.a, n, "evaluating product series");
        ExpressionResponse {
            result: expression_product(self.a, n),
        }
    }
}
