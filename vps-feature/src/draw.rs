use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use imageproc::{drawing, pixelops};
use itertools::Itertools;
use palette::{FromColor, Hsv, RgbHue, Srgb};
use vps_core::{KeyPoint, PointMatch};

/// Color `ix` of a wheel over the most saturated colors.
fn wheel_color(ix: usize) -> Rgba<u8> {
    let hsv = Hsv::new(RgbHue::from_radians(ix as f32 * 0.1), 1.0, 1.0);
    let rgb = Srgb::from_color(hsv);
    Rgba([
        (rgb.red * 255.0) as u8,
        (rgb.green * 255.0) as u8,
        (rgb.blue * 255.0) as u8,
        255,
    ])
}

/// Draws a translucent cross on every keypoint.
pub fn render_keypoints(image: &DynamicImage, keypoints: &[KeyPoint]) -> RgbaImage {
    let mut canvas = drawing::Blend(image.to_rgba8());
    for kp in keypoints {
        drawing::draw_cross_mut(
            &mut canvas,
            Rgba([0, 255, 255, 128]),
            kp.point.x as i32,
            kp.point.y as i32,
        );
    }
    canvas.0
}

/// Renders the query image on the left and the reference image on the right, with a line
/// between the two points of every match.
pub fn render_matches(
    query: &DynamicImage,
    reference: &DynamicImage,
    matches: &[PointMatch],
) -> RgbaImage {
    let (query_width, query_height) = query.dimensions();
    let (reference_width, reference_height) = reference.dimensions();
    let mut canvas = RgbaImage::from_pixel(
        query_width + reference_width,
        query_height.max(reference_height),
        Rgba([0, 0, 0, 255]),
    );

    let mut render_at_x_offset = |image: &RgbaImage, x_offset: u32| {
        let (width, height) = image.dimensions();
        for (x, y) in (0..width).cartesian_product(0..height) {
            canvas.put_pixel(x + x_offset, y, *image.get_pixel(x, y));
        }
    };
    render_at_x_offset(&query.to_rgba8(), 0);
    render_at_x_offset(&reference.to_rgba8(), query_width);

    for (ix, PointMatch(a, b)) in matches.iter().enumerate() {
        drawing::draw_antialiased_line_segment_mut(
            &mut canvas,
            (a.x as i32, a.y as i32),
            (b.x as i32 + query_width as i32, b.y as i32),
            wheel_color(ix),
            pixelops::interpolate,
        );
    }
    canvas
}
