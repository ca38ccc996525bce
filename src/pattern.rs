//! Test pattern for the demo: a clear color cycling through the hue wheel.

/// Frames for one full turn of the hue wheel.
pub const HUE_PERIOD: u64 = 180;

/// RGB clear color for `frame`, fully saturated, starting at red.
pub fn clear_color(frame: u64) -> [f32; 3] {
    let hue = (frame % HUE_PERIOD) as f32 * 6. / HUE_PERIOD as f32;
    let sector = hue.floor();
    let f = hue - sector;

    match sector as u32 {
        0 => [1., f, 0.],
        1 => [1. - f, 1., 0.],
        2 => [0., 1., f],
        3 => [0., 1. - f, 1.],
        4 => [f, 0., 1.],
        _ => [1., 0., 1. - f],
    }
}
