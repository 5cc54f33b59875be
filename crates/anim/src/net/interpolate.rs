/// Interpolates a replicated blend weight between two snapshots.
///
/// A distance of exactly ±1 is an instant activate/deactivate, not a ramp;
/// it snaps at the midpoint instead of lerping.
pub fn interpolate_weight(from: f32, to: f32, alpha: f32) -> f32 {
    let distance = to - from;

    if distance == 1.0 || distance == -1.0 {
        return if alpha < 0.5 { from } else { to };
    }

    from + distance * alpha
}

/// Interpolates a normalized play time, wrapping across the loop point when
/// the target sits behind the source. A non-positive weight means the clip is
/// not audible, so the time just snaps at the midpoint.
pub fn interpolate_time(from: f32, to: f32, length: f32, alpha: f32, weight: f32) -> f32 {
    if weight <= 0.0 {
        return if alpha < 0.5 { from } else { to };
    }

    if to >= from {
        return from + (to - from) * alpha;
    }

    let mut time = from + (to + length - from) * alpha;
    if time > length {
        time -= length;
    }

    time
}
