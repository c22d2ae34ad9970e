use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};

use crate::models::Contour;

/// Trace the outermost borders of a binary edge image.
/// Holes and borders nested inside other shapes are skipped.
pub fn find_external_contours(edges: &GrayImage) -> Vec<Contour> {
    find_contours::<i32>(edges)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| Contour::from_points(c.points))
        .collect()
}

/// Contour enclosing the largest area, first one wins on ties
pub fn largest_contour(contours: &[Contour]) -> Option<&Contour> {
    contours.iter().fold(None, |best: Option<&Contour>, c| match best {
        Some(b) if b.area() >= c.area() => Some(b),
        _ => Some(c),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn outlined_rect(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let on_border = (x == x0 || x == x1) && (y0..=y1).contains(&y)
                || (y == y0 || y == y1) && (x0..=x1).contains(&x);
            Luma([if on_border { 255 } else { 0 }])
        })
    }

    #[test]
    fn finds_single_outer_rectangle() {
        let edges = outlined_rect(50, 50, 10, 10, 39, 29);
        let contours = find_external_contours(&edges);
        assert_eq!(contours.len(), 1);
        let c = &contours[0];
        assert_eq!(c.width(), 30);
        assert_eq!(c.height(), 20);
        assert!(c.area() > 500.0);
    }

    #[test]
    fn empty_edge_map_has_no_contours() {
        let edges = GrayImage::new(20, 20);
        assert!(find_external_contours(&edges).is_empty());
        assert!(largest_contour(&[]).is_none());
    }
}
