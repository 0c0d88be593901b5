//! Polygon containment
//!
//! A point is inside a region when a vertical ray cast from it crosses the
//! polygon outline an odd number of times. Queries are shifted to the pixel
//! centre first, so a query landing exactly on a vertex is never ambiguous.

use crate::foundation::math::Vec2;

/// Slope below which a segment counts as vertical
const VERTICAL_EPSILON: f32 = 0.0001;

/// Check if a vertical ray from `ray` crosses segment `a`-`b`
fn vertical_ray_crosses(ray: Vec2, a: Vec2, b: Vec2) -> bool {
    let (left, right) = if a.x <= b.x { (a.x, b.x) } else { (b.x, a.x) };
    let (bottom, top) = if a.y <= b.y { (a.y, b.y) } else { (b.y, a.y) };

    if ray.x >= right || ray.x <= left || ray.y >= top {
        return false;
    }
    if ray.y < bottom {
        return true;
    }

    let dx = b.x - a.x;
    let dy = b.y - a.y;
    if dx.abs() < VERTICAL_EPSILON {
        return false;
    }
    let y = dy / dx * (ray.x - a.x) + a.y;
    y > ray.y
}

/// Check if `point` (in the polygon's own coordinates) lies inside the closed
/// polygon `points`
pub fn is_local_point_inside(points: &[Vec2], point: Vec2) -> bool {
    let ray = Vec2::new(point.x.floor() + 0.5, point.y.floor() + 0.5);
    let count = points.len();
    let crossings = (0..count)
        .filter(|&i| vertical_ray_crosses(ray, points[i], points[(i + 1) % count]))
        .count();
    crossings % 2 == 1
}

/// Integer bounds of a point set: `(left, down, right, up)`
pub fn bounds(points: &[Vec2]) -> Option<(i32, i32, i32, i32)> {
    points.iter().fold(None, |acc, p| {
        let (x, y) = (p.x as i32, p.y as i32);
        Some(match acc {
            None => (x, y, x, y),
            Some((left, down, right, up)) => (left.min(x), down.min(y), right.max(x), up.max(y)),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Vec<Vec2> {
        vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ]
    }

    #[test]
    fn test_unit_square_containment() {
        let square = unit_square();
        assert!(is_local_point_inside(&square, Vec2::new(0.5, 0.5)));
        assert!(!is_local_point_inside(&square, Vec2::new(-0.5, 0.5)));
        assert!(!is_local_point_inside(&square, Vec2::new(1.5, 0.5)));
        assert!(!is_local_point_inside(&square, Vec2::new(0.5, 1.5)));
    }

    #[test]
    fn test_vertex_queries_use_pixel_centre() {
        let square = unit_square();
        // (0,0) and (0.9,0.9) both land on the centre of pixel (0,0)
        assert!(is_local_point_inside(&square, Vec2::new(0.0, 0.0)));
        assert!(is_local_point_inside(&square, Vec2::new(0.9, 0.9)));
        assert!(!is_local_point_inside(&square, Vec2::new(1.0, 1.0)));
    }

    #[test]
    fn test_concave_polygon() {
        // U shape opening upwards
        let u = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(30.0, 0.0),
            Vec2::new(30.0, 30.0),
            Vec2::new(20.0, 30.0),
            Vec2::new(20.0, 10.0),
            Vec2::new(10.0, 10.0),
            Vec2::new(10.0, 30.0),
            Vec2::new(0.0, 30.0),
        ];
        assert!(is_local_point_inside(&u, Vec2::new(5.0, 20.0)));
        assert!(is_local_point_inside(&u, Vec2::new(25.0, 20.0)));
        assert!(is_local_point_inside(&u, Vec2::new(15.0, 5.0)));
        assert!(!is_local_point_inside(&u, Vec2::new(15.0, 20.0)));
    }

    #[test]
    fn test_degenerate_polygons_contain_nothing() {
        assert!(!is_local_point_inside(&[], Vec2::new(0.0, 0.0)));
        assert!(!is_local_point_inside(&[Vec2::new(0.0, 0.0), Vec2::new(5.0, 5.0)], Vec2::new(2.0, 2.0)));
    }

    #[test]
    fn test_bounds() {
        assert_eq!(bounds(&[]), None);
        let b = bounds(&[Vec2::new(3.0, -2.0), Vec2::new(-4.0, 7.0), Vec2::new(1.0, 1.0)]);
        assert_eq!(b, Some((-4, -2, 3, 7)));
    }
}
